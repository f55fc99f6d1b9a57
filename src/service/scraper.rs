use crate::config::Config;
use crate::error::{MaiError, MaiResult};
use crate::model::{Difficulty, FetchState, RawPlayerRecord, RawScoreRecord, Region};
use crate::service::auth::ExternalSession;
use crate::service::client::{
    is_error_page, parse_url, redirect_target, seed_cookies, RegionProfile, RegionProfiles,
};
use crate::service::fetch_state::FetchStateTracker;
use crate::service::parser::{ProfilePageParser, ScorePageParser, SitePageParser};
use futures_util::future::{try_join, try_join_all};
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use std::sync::Arc;

/// Redirect hops allowed between the session entry URL and the home page
const MAX_ENTRY_REDIRECTS: usize = 6;

/// Everything scraped for one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub player: RawPlayerRecord,
    pub scores: Vec<RawScoreRecord>,
}

/// Fetches the player data page and the five record listings of a session
#[derive(Clone)]
pub struct Scraper {
    profiles: Arc<RegionProfiles>,
    config: Config,
    tracker: FetchStateTracker,
}

impl Scraper {
    pub fn new(profiles: Arc<RegionProfiles>, config: Config, tracker: FetchStateTracker) -> Self {
        Self {
            profiles,
            config,
            tracker,
        }
    }

    /// Scrape the profile and all difficulty tiers concurrently.
    ///
    /// Each page that parses marks its fetch state on `job_id`. The first
    /// failing page fails the whole scrape.
    pub async fn scrape(
        &self,
        job_id: &str,
        region: Region,
        session: &ExternalSession,
    ) -> MaiResult<ScrapeResult> {
        let profile = self.profiles.get(region);
        let jar = Arc::new(Jar::default());
        seed_cookies(&jar, &parse_url(&session.cookie_url)?, &session.cookie_header);
        let client = profile.build_client(&self.config, jar)?;
        enter_site(&client, profile, session).await?;
        let parser = SitePageParser::new(profile);

        let player_task = async {
            let html = fetch_page(&client, &profile.player_data_url()).await?;
            let player = parser.parse_profile(&html)?;
            self.tracker
                .append_state(job_id, FetchState::PlayerData)
                .await;
            Ok::<_, MaiError>(player)
        };

        let tier_tasks = Difficulty::ALL.into_iter().map(|difficulty| {
            let client = &client;
            let parser = &parser;
            async move {
                let html = fetch_page(client, &profile.score_list_url(difficulty)).await?;
                let records = parser.parse_scores(&html, difficulty);
                log::info!(
                    "Parsed {} {difficulty} scores for job {job_id}",
                    records.len()
                );
                self.tracker
                    .append_state(job_id, FetchState::SongData(difficulty))
                    .await;
                Ok::<_, MaiError>(records)
            }
        });

        let (player, tiers) = try_join(player_task, try_join_all(tier_tasks)).await?;

        Ok(ScrapeResult {
            player,
            scores: tiers.into_iter().flatten().collect(),
        })
    }
}

/// Follow the session's redirect chain into the player pages. The client's
/// jar picks up the site cookies handed out on the way.
async fn enter_site(
    client: &Client,
    profile: &RegionProfile,
    session: &ExternalSession,
) -> MaiResult<()> {
    let mut url = session.redirect_url.clone();

    for _ in 0..MAX_ENTRY_REDIRECTS {
        let response = client.get(&url).send().await?;

        let status = response.status();
        if status.is_redirection() {
            url = redirect_target(&response)
                .ok_or_else(|| MaiError::upstream("Redirect without a location"))?;
            if is_error_page(&url) {
                return Err(MaiError::upstream(
                    "SEGA servers rejected the session. Please try again later.",
                ));
            }
        } else if status == StatusCode::OK {
            // Accounts with several cards land on the card picker first
            if url.contains("/aimeList/") && !url.contains("/aimeList/submit/") {
                url = format!("{}aimeList/submit/?idx=0", profile.site_base_url);
                continue;
            }
            return Ok(());
        } else {
            return Err(MaiError::upstream(format!(
                "Unexpected response from SEGA servers ({})",
                status.as_u16()
            )));
        }
    }

    Err(MaiError::upstream("Too many redirects entering the player pages"))
}

async fn fetch_page(client: &Client, url: &str) -> MaiResult<String> {
    let response = client.get(url).send().await?;

    match response.status() {
        StatusCode::OK => Ok(response.text().await?),
        status if status.is_redirection() => Err(MaiError::upstream(
            "Session ended while fetching player pages. Please try again.",
        )),
        status => Err(MaiError::upstream(format!(
            "Unexpected response from SEGA servers ({})",
            status.as_u16()
        ))),
    }
}
