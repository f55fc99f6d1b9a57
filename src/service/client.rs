//! Per-region access configuration for the game data site

use crate::config::Config;
use crate::error::{MaiError, MaiResult};
use crate::model::{Difficulty, Region};
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Endpoints, TLS policy and page wording of one region
#[derive(Debug, Clone)]
pub struct RegionProfile {
    pub region: Region,
    /// GET with the auth cookie: 302 when valid, 200 when expired
    pub auth_check_url: String,
    /// Login form page, hands out the pre-login session
    pub login_page_url: String,
    /// Login form target
    pub login_submit_url: String,
    /// Root of the player pages, with trailing slash
    pub site_base_url: String,
    /// Accept the site's legacy certificate chain
    pub relaxed_tls: bool,
    pub version_play_count: Regex,
    pub total_play_count: Regex,
}

impl RegionProfile {
    pub fn intl() -> Self {
        let auth = "https://lng-tgk-aime-gw.am-all.net/common_auth/login?site_id=maimaidxex&redirect_url=https://maimaidx-eng.com/maimai-mobile/&back_url=https://maimai.sega.com/";
        Self {
            region: Region::Intl,
            auth_check_url: auth.to_string(),
            login_page_url: auth.to_string(),
            login_submit_url: "https://lng-tgk-aime-gw.am-all.net/common_auth/login/sid/"
                .to_string(),
            site_base_url: "https://maimaidx-eng.com/maimai-mobile/".to_string(),
            relaxed_tls: false,
            version_play_count: Regex::new(r"play count of current version[：:]\s*([\d,]+)")
                .unwrap(),
            total_play_count: Regex::new(r"maimaiDX total play count[：:]\s*([\d,]+)").unwrap(),
        }
    }

    pub fn jp() -> Self {
        Self {
            region: Region::Jp,
            auth_check_url: "https://maimaidx.jp/maimai-mobile/".to_string(),
            login_page_url: "https://maimaidx.jp/maimai-mobile/".to_string(),
            login_submit_url: "https://maimaidx.jp/maimai-mobile/submit/".to_string(),
            site_base_url: "https://maimaidx.jp/maimai-mobile/".to_string(),
            relaxed_tls: true,
            version_play_count: Regex::new(r"現バージョンプレイ回数[：:]\s*([\d,]+)").unwrap(),
            total_play_count: Regex::new(r"maimaiDXトータルプレイ回数[：:]\s*([\d,]+)").unwrap(),
        }
    }

    pub fn for_region(region: Region) -> Self {
        match region {
            Region::Intl => Self::intl(),
            Region::Jp => Self::jp(),
        }
    }

    pub fn player_data_url(&self) -> String {
        format!("{}playerData/", self.site_base_url)
    }

    /// Record listing of every played chart of one difficulty
    pub fn score_list_url(&self, difficulty: Difficulty) -> String {
        format!(
            "{}record/musicGenre/search/?genre=99&diff={}",
            self.site_base_url,
            difficulty.index()
        )
    }

    /// HTTP client for this region, keeping its cookies in `jar`. Redirects
    /// are never followed automatically; every flow inspects the 302s itself.
    pub fn build_client(&self, config: &Config, jar: Arc<Jar>) -> MaiResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .gzip(true)
            .danger_accept_invalid_certs(self.relaxed_tls)
            .build()?;
        Ok(client)
    }
}

/// Profiles of every supported region
#[derive(Debug, Clone)]
pub struct RegionProfiles {
    pub intl: RegionProfile,
    pub jp: RegionProfile,
}

impl Default for RegionProfiles {
    fn default() -> Self {
        Self {
            intl: RegionProfile::intl(),
            jp: RegionProfile::jp(),
        }
    }
}

impl RegionProfiles {
    pub fn get(&self, region: Region) -> &RegionProfile {
        match region {
            Region::Intl => &self.intl,
            Region::Jp => &self.jp,
        }
    }
}

/// Resolve a `Location` header against the URL that produced it
pub fn redirect_target(response: &reqwest::Response) -> Option<String> {
    let raw = response
        .headers()
        .get(reqwest::header::LOCATION)?
        .to_str()
        .ok()?;
    response.url().join(raw).ok().map(String::from)
}

/// Whether a redirect target is one of the site's error pages
pub fn is_error_page(target: &str) -> bool {
    match url::Url::parse(target) {
        Ok(url) => url
            .path_segments()
            .map_or(false, |mut segments| segments.any(|s| s == "error")),
        Err(_) => target.contains("/error"),
    }
}

/// Load a `name=value; name2=value2` header into `jar` as cookies of `url`
pub fn seed_cookies(jar: &Jar, url: &Url, header: &str) {
    for pair in header.split(';').map(str::trim).filter(|p| p.contains('=')) {
        jar.add_cookie_str(&format!("{pair}; Path=/"), url);
    }
}

/// Cookies the jar would send to `url`, as a `Cookie` header value
pub fn cookie_header(jar: &Jar, url: &Url) -> Option<String> {
    jar.cookies(url)?.to_str().ok().map(str::to_string)
}

/// Value of one cookie the jar would send to `url`
pub fn cookie_value(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    cookie_header(jar, url)?.split("; ").find_map(|pair| {
        let (n, v) = pair.split_once('=')?;
        (n == name).then(|| v.to_string())
    })
}

pub fn parse_url(raw: &str) -> MaiResult<Url> {
    Url::parse(raw).map_err(|e| MaiError::upstream(format!("Invalid site URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jar_scopes_cookies_by_host_and_expiry() {
        let gateway = parse_url("https://lng-tgk-aime-gw.am-all.net/common_auth/login/sid/").unwrap();
        let site = parse_url("https://maimaidx-eng.com/maimai-mobile/home/").unwrap();
        let jar = Jar::default();
        seed_cookies(&jar, &gateway, "clal=abc; JSESSIONID=pre");

        assert_eq!(cookie_value(&jar, &gateway, "clal").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&jar, &gateway, "JSESSIONID").as_deref(), Some("pre"));
        assert!(cookie_header(&jar, &site).is_none());

        // A cleared cookie is dropped, not re-sent empty; a foreign domain is refused
        let set_cookies = [
            HeaderValue::from_static("clal=; Max-Age=0; Path=/"),
            HeaderValue::from_static("tracker=1; Domain=maimaidx-eng.com; Path=/"),
        ];
        jar.set_cookies(&mut set_cookies.iter(), &gateway);
        assert_eq!(cookie_header(&jar, &gateway).as_deref(), Some("JSESSIONID=pre"));
        assert!(cookie_header(&jar, &site).is_none());
    }

    #[test]
    fn test_play_count_patterns() {
        let intl = RegionProfile::intl();
        let text = "play count of current version：1,234 maimaiDX total play count：5678";
        assert_eq!(&intl.version_play_count.captures(text).unwrap()[1], "1,234");
        assert_eq!(&intl.total_play_count.captures(text).unwrap()[1], "5678");

        let jp = RegionProfile::jp();
        let text = "現バージョンプレイ回数：321回 maimaiDXトータルプレイ回数：4,321回";
        assert_eq!(&jp.version_play_count.captures(text).unwrap()[1], "321");
        assert_eq!(&jp.total_play_count.captures(text).unwrap()[1], "4,321");
    }

    #[test]
    fn test_error_page_detection() {
        assert!(is_error_page("https://maimaidx.jp/maimai-mobile/error/"));
        assert!(!is_error_page("https://maimaidx.jp/maimai-mobile/home/"));
        assert!(!is_error_page("https://maimaidx.jp/maimai-mobile/?next=/error"));
    }

    #[test]
    fn test_urls() {
        let intl = RegionProfile::intl();
        assert_eq!(
            intl.score_list_url(Difficulty::Remaster),
            "https://maimaidx-eng.com/maimai-mobile/record/musicGenre/search/?genre=99&diff=4"
        );
        assert!(RegionProfile::jp().relaxed_tls);
        assert!(!intl.relaxed_tls);
    }
}
