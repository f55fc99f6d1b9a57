//! Caller context extracted from incoming requests
//!
//! The stats server sits behind the application that owns user identity.
//! That application forwards the signed-in user's id in the `X-User-Id`
//! header; [`UserContext`] is the request guard that reads it.

use crate::error::MaiError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Longest accepted user id
const MAX_USER_ID_LEN: usize = 64;

/// Identity of the user a request acts for
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    /// Best available client address, for logging only
    pub ip: Option<String>,
}

impl UserContext {
    /// Validate a raw header value as a user id
    pub fn parse_user_id(raw: &str) -> Result<String, MaiError> {
        let user_id = raw.trim();
        if user_id.is_empty() {
            return Err(MaiError::input("Missing user id"));
        }
        if user_id.len() > MAX_USER_ID_LEN || user_id.chars().any(char::is_control) {
            return Err(MaiError::input("Invalid user id"));
        }
        Ok(user_id.to_string())
    }
}

/// Client address. Priority: X-Real-IP > first X-Forwarded-For > remote address
fn client_ip(request: &Request<'_>) -> Option<String> {
    let headers = request.headers();
    if let Some(real_ip) = headers.get_one("X-Real-IP").filter(|s| !s.is_empty()) {
        return Some(real_ip.to_string());
    }
    if let Some(forwarded) = headers.get_one("X-Forwarded-For") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    request.client_ip().map(|ip| ip.to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserContext {
    type Error = MaiError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(raw) = request.headers().get_one(USER_ID_HEADER) else {
            return Outcome::Error((
                Status::Unauthorized,
                MaiError::input("Missing X-User-Id header"),
            ));
        };

        match UserContext::parse_user_id(raw) {
            Ok(user_id) => Outcome::Success(UserContext {
                user_id,
                ip: client_ip(request),
            }),
            Err(e) => Outcome::Error((Status::BadRequest, e)),
        }
    }
}
