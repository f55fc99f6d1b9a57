use crate::error::{MaiError, MaiResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COOKIE_SCHEME: &str = "cookie://";
const ACCOUNT_SCHEME: &str = "account://";
const ACCOUNT_DELIMITER: &str = ":://";

lazy_static! {
    static ref COOKIE_PATTERN: Regex = Regex::new(r"^clal=[a-zA-Z0-9]+$").unwrap();
}

/// Game server region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Intl,
    Jp,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Intl => "intl",
            Region::Jp => "jp",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "intl" => Ok(Region::Intl),
            "jp" => Ok(Region::Jp),
            other => Err(MaiError::input(format!("Invalid region: {other}"))),
        }
    }
}

/// Credential used to log into the game data site.
///
/// Stored as an opaque string (`cookie://...` or `account://user:://pass[:://cookie]`);
/// only [`Credential::parse`] and [`Credential::to_stored`] know that format.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Cookie {
        value: String,
    },
    Account {
        username: String,
        password: String,
        cached_cookie: Option<String>,
    },
}

impl Credential {
    /// Parse a stored or user-supplied credential string
    pub fn parse(raw: &str) -> MaiResult<Self> {
        let raw = raw.trim();

        if let Some(value) = raw.strip_prefix(COOKIE_SCHEME) {
            let value = value.trim();
            if value.is_empty() {
                return Err(MaiError::input("Cookie cannot be empty."));
            }
            return Ok(Credential::Cookie {
                value: value.to_string(),
            });
        }

        if let Some(rest) = raw.strip_prefix(ACCOUNT_SCHEME) {
            let parts: Vec<&str> = rest.split(ACCOUNT_DELIMITER).collect();
            let (username, password, cached_cookie) = match parts.as_slice() {
                [username, password] => (*username, *password, None),
                [username, password, cookie] => (*username, *password, Some(*cookie)),
                _ => return Err(MaiError::input("Malformed account credential.")),
            };

            if username.trim().is_empty() || password.is_empty() {
                return Err(MaiError::input("Username and password are required."));
            }

            return Ok(Credential::Account {
                username: username.trim().to_string(),
                password: password.to_string(),
                cached_cookie: cached_cookie
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            });
        }

        Err(MaiError::input(
            "Unknown credential format. Expected cookie:// or account://",
        ))
    }

    /// Serialize back into the credential store format
    pub fn to_stored(&self) -> String {
        match self {
            Credential::Cookie { value } => format!("{COOKIE_SCHEME}{value}"),
            Credential::Account {
                username,
                password,
                cached_cookie: None,
            } => format!("{ACCOUNT_SCHEME}{username}{ACCOUNT_DELIMITER}{password}"),
            Credential::Account {
                username,
                password,
                cached_cookie: Some(cookie),
            } => format!(
                "{ACCOUNT_SCHEME}{username}{ACCOUNT_DELIMITER}{password}{ACCOUNT_DELIMITER}{cookie}"
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Cookie { .. } => "cookie",
            Credential::Account { .. } => "account",
        }
    }

    /// Account credential upgraded with a freshly obtained cookie
    pub fn with_cookie(&self, cookie: &str) -> Option<Self> {
        match self {
            Credential::Account {
                username, password, ..
            } => Some(Credential::Account {
                username: username.clone(),
                password: password.clone(),
                cached_cookie: Some(cookie.to_string()),
            }),
            Credential::Cookie { .. } => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Cookie { value } => f
                .debug_struct("Cookie")
                .field("len", &value.len())
                .finish(),
            Credential::Account { cached_cookie, .. } => f
                .debug_struct("Account")
                .field("has_cached_cookie", &cached_cookie.is_some())
                .finish(),
        }
    }
}

/// Check the shape of an auth cookie (`clal=` followed by alphanumerics)
pub fn is_valid_cookie(value: &str) -> bool {
    COOKIE_PATTERN.is_match(value)
}
