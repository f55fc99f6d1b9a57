//! Credential resolution against the game data site
//!
//! Turns a stored or freshly supplied [`Credential`] into an
//! [`ExternalSession`]. Cookies are checked against the auth endpoint; accounts
//! go through the region's login form. Definitive rejections remove the stored
//! credential so the user is asked for a new one, transient failures keep it.

use crate::config::Config;
use crate::error::{MaiError, MaiResult};
use crate::model::{is_valid_cookie, Credential, Region};
use crate::service::client::{
    cookie_header, cookie_value, is_error_page, parse_url, redirect_target, seed_cookies,
    RegionProfile, RegionProfiles,
};
use crate::service::parser::login_form_token;
use crate::service::store::CredentialStore;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;

const AUTH_COOKIE: &str = "clal";

/// Authenticated entry point into the player pages. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct ExternalSession {
    pub redirect_url: String,
    /// URL the session cookies were issued for
    pub cookie_url: String,
    pub cookie_header: String,
}

impl fmt::Debug for ExternalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSession")
            .field("redirect_url", &"<redacted>")
            .field("cookies", &self.cookie_header.split(';').count())
            .finish()
    }
}

enum CookieCheck {
    Valid(ExternalSession),
    Expired,
}

enum LoginOutcome {
    Success {
        session: ExternalSession,
        /// Auth cookie worth caching on the account credential
        auth_cookie: Option<String>,
    },
    BadCredentials,
}

/// Reject credential/region combinations that can never work, before any
/// network access.
pub fn check_supported(region: Region, credential: &Credential) -> MaiResult<()> {
    match (region, credential) {
        (Region::Jp, Credential::Cookie { .. }) => Err(MaiError::input(
            "The jp region only supports account login. Please provide your SEGA ID and password.",
        )),
        (_, Credential::Cookie { value }) if !is_valid_cookie(value) => Err(MaiError::input(
            "Invalid token format. Expected a cookie of the form clal=<token>.",
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct AuthResolver {
    credentials: Arc<dyn CredentialStore>,
    profiles: Arc<RegionProfiles>,
    config: Config,
}

impl AuthResolver {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        profiles: Arc<RegionProfiles>,
        config: Config,
    ) -> Self {
        Self {
            credentials,
            profiles,
            config,
        }
    }

    /// Produce a validated session for `credential`, logging in when needed
    pub async fn resolve(
        &self,
        user_id: &str,
        region: Region,
        credential: &Credential,
    ) -> MaiResult<ExternalSession> {
        if let Err(e) = check_supported(region, credential) {
            log::warn!(
                "Rejecting unusable {} credential of user {user_id} in {region}",
                credential.kind()
            );
            self.forget(user_id, region, credential).await;
            return Err(e);
        }

        let profile = self.profiles.get(region);

        match credential {
            Credential::Cookie { value } => match self.validate_cookie(profile, value).await? {
                CookieCheck::Valid(session) => Ok(session),
                CookieCheck::Expired => {
                    log::info!("Token of user {user_id} in {region} has expired");
                    self.forget(user_id, region, credential).await;
                    Err(MaiError::auth_rejected(
                        "Token has expired. Please provide a new token.",
                    ))
                }
            },
            Credential::Account {
                username,
                password,
                cached_cookie,
            } => {
                let cached = cached_cookie
                    .as_deref()
                    .filter(|c| region == Region::Intl && is_valid_cookie(c));
                if let Some(cookie) = cached {
                    match self.validate_cookie(profile, cookie).await? {
                        CookieCheck::Valid(session) => {
                            log::info!("Reusing cached session of user {user_id} in {region}");
                            return Ok(session);
                        }
                        CookieCheck::Expired => {
                            log::info!("Cached session of user {user_id} in {region} expired, logging in")
                        }
                    }
                }

                let jar = Arc::new(Jar::default());
                let client = profile.build_client(&self.config, jar.clone())?;
                let outcome = match region {
                    Region::Intl => login_intl(&client, &jar, profile, username, password).await?,
                    Region::Jp => login_jp(&client, &jar, profile, username, password).await?,
                };
                match outcome {
                    LoginOutcome::Success {
                        session,
                        auth_cookie,
                    } => {
                        log::info!("Logged in user {user_id} in {region}");
                        if let Some(cookie) = auth_cookie {
                            self.remember_cookie(user_id, region, credential, &cookie)
                                .await;
                        }
                        Ok(session)
                    }
                    LoginOutcome::BadCredentials => {
                        log::info!("Login of user {user_id} in {region} was rejected");
                        self.forget(user_id, region, credential).await;
                        Err(MaiError::auth_rejected(
                            "Login failed. Please check your username and password.",
                        ))
                    }
                }
            }
        }
    }

    /// Whether the store still holds exactly the credential that was used
    async fn is_current(&self, user_id: &str, region: Region, credential: &Credential) -> bool {
        match self.credentials.get_credential(user_id, region).await {
            Ok(Some(stored)) => stored == credential.to_stored(),
            Ok(None) => false,
            Err(e) => {
                log::error!("Failed to read credential of user {user_id} in {region}: {e}");
                false
            }
        }
    }

    async fn forget(&self, user_id: &str, region: Region, credential: &Credential) {
        if !self.is_current(user_id, region, credential).await {
            return;
        }
        match self.credentials.delete_credential(user_id, region).await {
            Ok(()) => log::info!("Deleted stored credential of user {user_id} in {region}"),
            Err(e) => log::error!("Failed to delete credential of user {user_id} in {region}: {e}"),
        }
    }

    /// 302 means the cookie is still good and points at the site, 200 means
    /// the login page was served again.
    async fn validate_cookie(&self, profile: &RegionProfile, cookie: &str) -> MaiResult<CookieCheck> {
        let check_url = parse_url(&profile.auth_check_url)?;
        let jar = Arc::new(Jar::default());
        seed_cookies(&jar, &check_url, cookie);
        let client = profile.build_client(&self.config, jar)?;

        let response = client.get(check_url.clone()).send().await?;
        match response.status() {
            StatusCode::FOUND => {
                let redirect_url = redirect_target(&response)
                    .ok_or_else(|| MaiError::upstream("Auth check redirect without a location"))?;
                Ok(CookieCheck::Valid(ExternalSession {
                    redirect_url,
                    cookie_url: check_url.into(),
                    cookie_header: cookie.to_string(),
                }))
            }
            StatusCode::OK => Ok(CookieCheck::Expired),
            status => Err(unexpected(status)),
        }
    }

    async fn remember_cookie(
        &self,
        user_id: &str,
        region: Region,
        credential: &Credential,
        cookie: &str,
    ) {
        let Some(upgraded) = credential.with_cookie(cookie) else {
            return;
        };
        if upgraded == *credential || !self.is_current(user_id, region, credential).await {
            return;
        }
        if let Err(e) = self
            .credentials
            .put_credential(user_id, region, &upgraded.to_stored())
            .await
        {
            log::error!("Failed to cache session of user {user_id} in {region}: {e}");
        }
    }
}

async fn login_intl(
    client: &Client,
    jar: &Jar,
    profile: &RegionProfile,
    username: &str,
    password: &str,
) -> MaiResult<LoginOutcome> {
    let page_url = parse_url(&profile.login_page_url)?;
    let submit_url = parse_url(&profile.login_submit_url)?;

    let page = client.get(page_url.clone()).send().await?;
    if page.status() != StatusCode::OK {
        return Err(unexpected(page.status()));
    }
    if jar.cookies(&submit_url).is_none() {
        return Err(MaiError::upstream("Login page did not start a session"));
    }

    let form = encode_form(&[("sid", username), ("password", password), ("retention", "1")])?;
    let response = client
        .post(submit_url.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form)
        .send()
        .await?;

    match response.status() {
        StatusCode::FOUND => {
            // The gateway redirects refused logins too, just without an auth cookie
            let Some(auth) = cookie_value(jar, &submit_url, AUTH_COOKIE)
                .map(|value| format!("{AUTH_COOKIE}={value}"))
                .filter(|cookie| is_valid_cookie(cookie))
            else {
                return Ok(LoginOutcome::BadCredentials);
            };
            let redirect_url = redirect_target(&response)
                .ok_or_else(|| MaiError::upstream("Login redirect without a location"))?;
            Ok(LoginOutcome::Success {
                session: ExternalSession {
                    redirect_url,
                    cookie_url: submit_url.into(),
                    cookie_header: auth.clone(),
                },
                auth_cookie: Some(auth),
            })
        }
        StatusCode::OK => Ok(LoginOutcome::BadCredentials),
        status => Err(unexpected(status)),
    }
}

async fn login_jp(
    client: &Client,
    jar: &Jar,
    profile: &RegionProfile,
    username: &str,
    password: &str,
) -> MaiResult<LoginOutcome> {
    let page = client.get(&profile.login_page_url).send().await?;
    if page.status() != StatusCode::OK {
        return Err(unexpected(page.status()));
    }
    let html = page.text().await?;
    let token = login_form_token(&html)
        .ok_or_else(|| MaiError::upstream("Login page did not carry a form token"))?;

    let form = encode_form(&[
        ("segaId", username),
        ("password", password),
        ("save_cookie", "on"),
        ("token", token.as_str()),
    ])?;
    let response = client
        .post(&profile.login_submit_url)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form)
        .send()
        .await?;

    match response.status() {
        StatusCode::FOUND => {
            let redirect_url = redirect_target(&response)
                .ok_or_else(|| MaiError::upstream("Login redirect without a location"))?;
            if is_error_page(&redirect_url) {
                return Ok(LoginOutcome::BadCredentials);
            }
            let cookies = cookie_header(jar, &parse_url(&redirect_url)?)
                .ok_or_else(|| MaiError::upstream("Login did not start a site session"))?;
            Ok(LoginOutcome::Success {
                session: ExternalSession {
                    cookie_url: redirect_url.clone(),
                    redirect_url,
                    cookie_header: cookies,
                },
                auth_cookie: None,
            })
        }
        StatusCode::OK => Ok(LoginOutcome::BadCredentials),
        status => Err(unexpected(status)),
    }
}

fn encode_form(fields: &[(&str, &str)]) -> MaiResult<String> {
    serde_urlencoded::to_string(fields)
        .map_err(|e| MaiError::input(format!("Failed to encode login form: {e}")))
}

fn unexpected(status: StatusCode) -> MaiError {
    MaiError::upstream(format!(
        "Unexpected response from SEGA servers ({})",
        status.as_u16()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::mock_site::{MockResponse, MockSite, RecordedRequest};
    use crate::service::store::MemoryStore;

    fn resolver(site: &MockSite, store: Arc<MemoryStore>) -> AuthResolver {
        AuthResolver::new(store, site.profiles(), Config::default())
    }

    async fn stored(store: &MemoryStore, region: Region) -> Option<String> {
        store.get_credential("user", region).await.unwrap()
    }

    async fn store_credential(store: &MemoryStore, region: Region, raw: &str) -> Credential {
        store.put_credential("user", region, raw).await.unwrap();
        Credential::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_valid_cookie_follows_redirect() {
        let site = MockSite::start(|req| {
            if req.header("cookie") == Some("clal=abc123") {
                MockResponse::redirect("/maimai-mobile/?ssid=xyz")
            } else {
                MockResponse::ok("login page")
            }
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "cookie://clal=abc123").await;

        let session = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap();

        assert_eq!(session.cookie_header, "clal=abc123");
        assert_eq!(
            session.redirect_url,
            format!("{}/maimai-mobile/?ssid=xyz", site.base)
        );
        assert!(stored(&store, Region::Intl).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_cookie_deletes_credential() {
        let site = MockSite::start(|_| MockResponse::ok("login page")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "cookie://clal=abc123").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::AuthRejected { .. }));
        assert_eq!(
            err.to_string(),
            "Token has expired. Please provide a new token."
        );
        assert!(stored(&store, Region::Intl).await.is_none());
    }

    #[tokio::test]
    async fn test_unexpected_status_keeps_credential() {
        let site = MockSite::start(|_| MockResponse::status(503)).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "cookie://clal=abc123").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::Upstream { .. }));
        assert!(err.to_string().contains("503"));
        assert!(stored(&store, Region::Intl).await.is_some());
    }

    #[tokio::test]
    async fn test_malformed_cookie_rejected_without_network() {
        let site = MockSite::start(|_| MockResponse::redirect("/")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "cookie://clal=abc 123").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::Input { .. }));
        assert!(site.requests().is_empty());
        assert!(stored(&store, Region::Intl).await.is_none());
    }

    #[tokio::test]
    async fn test_jp_rejects_cookie_credentials() {
        let site = MockSite::start(|_| MockResponse::redirect("/")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = Credential::parse("cookie://clal=abc123").unwrap();

        let err = resolver(&site, store)
            .resolve("user", Region::Jp, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::Input { .. }));
        assert!(site.requests().is_empty());
    }

    fn intl_login_site(
        password_ok: &'static str,
    ) -> impl Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static {
        move |req: &RecordedRequest| match (req.method.as_str(), req.path.as_str()) {
            ("GET", path) if path.starts_with("/common_auth/login?") => {
                if req.header("cookie").map_or(false, |c| c.contains("clal=")) {
                    // Cached cookies are always stale on this site
                    MockResponse::ok("login page")
                } else {
                    MockResponse::ok("login page").with_cookie("JSESSIONID=pre")
                }
            }
            ("POST", "/common_auth/login/sid/") => {
                let expected = format!("password={password_ok}");
                if req.body.contains(&expected)
                    && req.header("cookie") == Some("JSESSIONID=pre")
                {
                    MockResponse::redirect("/maimai-mobile/?ssid=fresh").with_cookie("clal=NEWCOOKIE")
                } else {
                    MockResponse::ok("login page")
                }
            }
            _ => MockResponse::status(404),
        }
    }

    #[tokio::test]
    async fn test_intl_login_caches_cookie() {
        let site = MockSite::start(intl_login_site("hunter2")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "account://player:://hunter2").await;

        let session = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap();

        assert_eq!(session.cookie_header, "clal=NEWCOOKIE");
        assert!(session.redirect_url.ends_with("/maimai-mobile/?ssid=fresh"));
        assert_eq!(
            stored(&store, Region::Intl).await.as_deref(),
            Some("account://player:://hunter2:://clal=NEWCOOKIE")
        );

        let post = site
            .requests()
            .into_iter()
            .find(|r| r.method == "POST")
            .unwrap();
        assert!(post.body.contains("sid=player"));
        assert!(post.body.contains("retention=1"));
    }

    #[tokio::test]
    async fn test_intl_expired_cached_cookie_falls_back_to_login() {
        let site = MockSite::start(intl_login_site("hunter2")).await;
        let store = Arc::new(MemoryStore::new());
        let credential =
            store_credential(&store, Region::Intl, "account://player:://hunter2:://clal=OLD").await;

        let session = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap();

        assert_eq!(session.cookie_header, "clal=NEWCOOKIE");
        assert_eq!(
            stored(&store, Region::Intl).await.as_deref(),
            Some("account://player:://hunter2:://clal=NEWCOOKIE")
        );
    }

    #[tokio::test]
    async fn test_intl_bad_password_deletes_credential() {
        let site = MockSite::start(intl_login_site("hunter2")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "account://player:://wrong").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::AuthRejected { .. }));
        assert!(stored(&store, Region::Intl).await.is_none());
    }

    #[tokio::test]
    async fn test_login_page_failure_is_transient() {
        let site = MockSite::start(|_| MockResponse::status(500)).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "account://player:://hunter2").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::Upstream { .. }));
        assert!(stored(&store, Region::Intl).await.is_some());
    }

    #[tokio::test]
    async fn test_intl_redirect_without_auth_cookie_is_rejected() {
        let site = MockSite::start(|req| match req.method.as_str() {
            "GET" => MockResponse::ok("login page").with_cookie("JSESSIONID=pre"),
            _ => MockResponse::redirect("/common_auth/login?site_id=test"),
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "account://player:://pw").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::AuthRejected { .. }));
        assert!(stored(&store, Region::Intl).await.is_none());
    }

    #[tokio::test]
    async fn test_intl_login_ignores_cleared_and_foreign_cookies() {
        let site = MockSite::start(|req| match req.method.as_str() {
            "GET" => MockResponse::ok("login page")
                .with_cookie("JSESSIONID=pre")
                .with_cookie("sso=1; Domain=lng-tgk-aime-gw.am-all.net"),
            _ => MockResponse::redirect("/maimai-mobile/?ssid=fresh")
                .with_cookie("JSESSIONID=; Max-Age=0")
                .with_cookie("clal=NEWCOOKIE"),
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Intl, "account://player:://pw").await;

        let session = resolver(&site, store.clone())
            .resolve("user", Region::Intl, &credential)
            .await
            .unwrap();

        assert_eq!(session.cookie_header, "clal=NEWCOOKIE");
        let post = site
            .requests()
            .into_iter()
            .find(|r| r.method == "POST")
            .unwrap();
        assert_eq!(post.header("cookie"), Some("JSESSIONID=pre"));
    }

    fn jp_login_site(
        token_input: &'static str,
    ) -> impl Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static {
        move |req: &RecordedRequest| match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/maimai-mobile/") => {
                MockResponse::ok(format!("<form>{token_input}</form>")).with_cookie("_t=pre")
            }
            ("POST", "/maimai-mobile/submit/")
                if req.body.contains("token=tok42") && req.body.contains("password=pw") =>
            {
                MockResponse::redirect("/maimai-mobile/aimeList/").with_cookie("userId=777")
            }
            ("POST", _) => MockResponse::redirect("/maimai-mobile/error/"),
            _ => MockResponse::status(404),
        }
    }

    const TOKEN_INPUT: &str = r#"<input type="hidden" name="token" value="tok42">"#;

    #[tokio::test]
    async fn test_jp_login_uses_form_token() {
        let site = MockSite::start(jp_login_site(TOKEN_INPUT)).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Jp, "account://player:://pw").await;

        let session = resolver(&site, store.clone())
            .resolve("user", Region::Jp, &credential)
            .await
            .unwrap();

        assert!(session.redirect_url.ends_with("/maimai-mobile/aimeList/"));
        assert!(session.cookie_header.contains("_t=pre"));
        assert!(session.cookie_header.contains("userId=777"));
        // No cookie caching for jp
        assert_eq!(
            stored(&store, Region::Jp).await.as_deref(),
            Some("account://player:://pw")
        );
    }

    #[tokio::test]
    async fn test_jp_error_redirect_deletes_credential() {
        let site = MockSite::start(jp_login_site(TOKEN_INPUT)).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Jp, "account://player:://wrong").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Jp, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::AuthRejected { .. }));
        assert!(stored(&store, Region::Jp).await.is_none());
        let post = site
            .requests()
            .into_iter()
            .find(|r| r.method == "POST")
            .unwrap();
        assert_eq!(post.header("cookie"), Some("_t=pre"));
    }

    #[tokio::test]
    async fn test_jp_missing_form_token_keeps_credential() {
        let site = MockSite::start(jp_login_site("")).await;
        let store = Arc::new(MemoryStore::new());
        let credential = store_credential(&store, Region::Jp, "account://player:://pw").await;

        let err = resolver(&site, store.clone())
            .resolve("user", Region::Jp, &credential)
            .await
            .unwrap_err();

        assert!(matches!(err, MaiError::Upstream { .. }));
        assert!(stored(&store, Region::Jp).await.is_some());
        assert!(site.requests().iter().all(|r| r.method == "GET"));
    }

    #[test]
    fn test_session_debug_hides_cookies() {
        let session = ExternalSession {
            redirect_url: "https://example.com/?ssid=secret".to_string(),
            cookie_url: "https://example.com/".to_string(),
            cookie_header: "clal=secret".to_string(),
        };
        assert!(!format!("{session:?}").contains("secret"));
    }
}
