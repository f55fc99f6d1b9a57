//! Page parsers for the game data site
//!
//! Every selector and extraction rule for scraped HTML lives in this module.
//! The scraper only sees the two parser traits, so a site redesign is fixed
//! here and tested against fixture pages.

use crate::error::{MaiError, MaiResult};
use crate::model::{Difficulty, FullCombo, FullSync, MusicType, RawPlayerRecord, RawScoreRecord};
use crate::service::client::RegionProfile;
use anyhow::{bail, Context};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref ACHIEVEMENT: Regex = Regex::new(r"\d+\.?\d*%").unwrap();
    static ref STARS: Regex = Regex::new(r"×\s*([\d,]+)").unwrap();
    static ref SCORE_BLOCK: Selector = Selector::parse("div.music_score_block").unwrap();
    static ref NAME_BLOCK: Selector = Selector::parse("div.music_name_block").unwrap();
    static ref LEVEL_BLOCK: Selector = Selector::parse("div.music_lv_block").unwrap();
    static ref KIND_ICON: Selector = Selector::parse("img.music_kind_icon").unwrap();
    static ref BADGE_ICON: Selector = Selector::parse("img.h_30").unwrap();
    static ref TIER_BLOCKS: Vec<(Difficulty, Selector)> = Difficulty::ALL
        .into_iter()
        .map(|d| {
            let selector = Selector::parse(&format!("div.music_{}_score_back", d.as_str())).unwrap();
            (d, selector)
        })
        .collect();
    static ref PLAYER_ICON: Selector = Selector::parse("img.w_112").unwrap();
    static ref PLAYER_NAME: Selector = Selector::parse("div.name_block").unwrap();
    static ref PLAYER_RATING: Selector = Selector::parse("div.rating_block").unwrap();
    static ref PLAYER_TITLE: Selector = Selector::parse("div.trophy_block span").unwrap();
    static ref ANY_IMAGE: Selector = Selector::parse("img").unwrap();
    static ref FORM_TOKEN: Selector = Selector::parse(r#"input[name="token"]"#).unwrap();
}

/// Extracts the player profile from the player data page
pub trait ProfilePageParser: Send + Sync {
    /// Fails when any fragment of the profile is missing
    fn parse_profile(&self, html: &str) -> MaiResult<RawPlayerRecord>;
}

/// Extracts played charts from one record listing page
pub trait ScorePageParser: Send + Sync {
    /// Unplayed and malformed blocks are left out
    fn parse_scores(&self, html: &str, difficulty: Difficulty) -> Vec<RawScoreRecord>;
}

/// Parser for the maimai DX NET page layout, shared by both regions apart
/// from the localized play count sentence.
#[derive(Debug, Clone)]
pub struct SitePageParser {
    version_play_count: Regex,
    total_play_count: Regex,
}

impl SitePageParser {
    pub fn new(profile: &RegionProfile) -> Self {
        Self {
            version_play_count: profile.version_play_count.clone(),
            total_play_count: profile.total_play_count.clone(),
        }
    }
}

impl ProfilePageParser for SitePageParser {
    fn parse_profile(&self, html: &str) -> MaiResult<RawPlayerRecord> {
        let document = Html::parse_document(html);
        let page_text: String = document.root_element().text().collect();

        let icon_url = document
            .select(&PLAYER_ICON)
            .next()
            .and_then(|img| img.value().attr("src"))
            .ok_or_else(|| missing("player icon"))?
            .to_string();
        let display_name = first_text(&document, &PLAYER_NAME).ok_or_else(|| missing("display name"))?;
        let rating = first_text(&document, &PLAYER_RATING)
            .and_then(|text| parse_count(&text))
            .ok_or_else(|| missing("rating"))?;
        let title = first_text(&document, &PLAYER_TITLE).ok_or_else(|| missing("title"))?;
        let stars = STARS
            .captures(&page_text)
            .and_then(|c| parse_count(&c[1]))
            .ok_or_else(|| missing("star count"))?;
        let version_play_count = self
            .version_play_count
            .captures(&page_text)
            .and_then(|c| parse_count(&c[1]))
            .ok_or_else(|| missing("current version play count"))?;
        let total_play_count = self
            .total_play_count
            .captures(&page_text)
            .and_then(|c| parse_count(&c[1]))
            .ok_or_else(|| missing("total play count"))?;
        let class_rank_url = image_containing(&document, "class_rank").ok_or_else(|| missing("class rank"))?;
        let course_rank_url = image_containing(&document, "course_rank").ok_or_else(|| missing("course rank"))?;

        Ok(RawPlayerRecord {
            icon_url,
            display_name,
            rating,
            title,
            stars,
            version_play_count,
            total_play_count,
            class_rank_url,
            course_rank_url,
        })
    }
}

impl ScorePageParser for SitePageParser {
    fn parse_scores(&self, html: &str, difficulty: Difficulty) -> Vec<RawScoreRecord> {
        let document = Html::parse_document(html);
        let Some((_, tier_block)) = TIER_BLOCKS.iter().find(|(d, _)| *d == difficulty) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for block in document.select(tier_block) {
            if block.select(&SCORE_BLOCK).next().is_none() {
                continue;
            }
            match parse_score_block(block, difficulty) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping malformed {difficulty} score block: {e:#}"),
            }
        }
        records
    }
}

fn parse_score_block(block: ElementRef, difficulty: Difficulty) -> anyhow::Result<RawScoreRecord> {
    let song_name = block
        .select(&NAME_BLOCK)
        .next()
        .map(element_text)
        .filter(|name| !name.is_empty())
        .context("song name not found")?;
    let level_label = block
        .select(&LEVEL_BLOCK)
        .next()
        .map(element_text)
        .filter(|level| !level.is_empty())
        .with_context(|| format!("level not found for {song_name}"))?;
    let music_type = music_type(block).with_context(|| format!("music type of {song_name}"))?;

    let mut achievement = None;
    let mut dx_score = None;
    for score in block.select(&SCORE_BLOCK) {
        let text = element_text(score);
        if let Some(m) = ACHIEVEMENT.find(&text) {
            achievement = Some(parse_achievement(m.as_str())?);
        } else if let Some((played, _total)) = text.split_once('/') {
            dx_score = parse_count(played);
        }
    }
    let achievement = achievement.with_context(|| format!("achievement not found for {song_name}"))?;
    let dx_score = dx_score.with_context(|| format!("dx score not found for {song_name}"))?;

    let mut full_combo = FullCombo::None;
    let mut full_sync = FullSync::None;
    for icon in block.select(&BADGE_ICON) {
        let Some(stem) = icon.value().attr("src").map(icon_stem) else {
            continue;
        };
        if let Some(fc) = FullCombo::from_icon(stem) {
            full_combo = fc;
        } else if let Some(fs) = FullSync::from_icon(stem) {
            full_sync = fs;
        }
    }

    Ok(RawScoreRecord {
        song_name,
        level_label,
        music_type,
        difficulty,
        achievement,
        dx_score,
        full_combo,
        full_sync,
    })
}

/// The type icon sits inside the block on some pages and next to it on others
fn music_type(block: ElementRef) -> anyhow::Result<MusicType> {
    let inside = block
        .select(&KIND_ICON)
        .next()
        .and_then(|img| img.value().attr("src"));
    let outside = || {
        block
            .parent()
            .and_then(ElementRef::wrap)?
            .select(&KIND_ICON)
            .next()
            .and_then(|img| img.value().attr("src"))
    };
    let src = inside.or_else(outside).context("type icon not found")?;

    match icon_stem(src) {
        "music_standard" => Ok(MusicType::Standard),
        "music_dx" => Ok(MusicType::Dx),
        other => bail!("unexpected type icon {other}"),
    }
}

/// `100.5%` as an integer with four implied decimals, without going through floats
fn parse_achievement(text: &str) -> anyhow::Result<u32> {
    let number = text.trim_end_matches('%');
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole: u32 = whole.parse().with_context(|| format!("bad achievement {text}"))?;
    let fraction: String = fraction.chars().chain("0000".chars()).take(4).collect();
    let fraction: u32 = fraction
        .parse()
        .with_context(|| format!("bad achievement {text}"))?;
    whole
        .checked_mul(10000)
        .and_then(|w| w.checked_add(fraction))
        .with_context(|| format!("achievement out of range {text}"))
}

/// File name of an icon URL without extension or query
fn icon_stem(src: &str) -> &str {
    let file = src.rsplit('/').next().unwrap_or(src);
    let file = file.split('?').next().unwrap_or(file);
    file.strip_suffix(".png").unwrap_or(file)
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().map(element_text)
}

fn image_containing(document: &Html, needle: &str) -> Option<String> {
    document
        .select(&ANY_IMAGE)
        .filter_map(|img| img.value().attr("src"))
        .find(|src| src.contains(needle))
        .map(str::to_string)
}

/// Integer with optional thousands separators
fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    digits.parse().ok()
}

fn missing(fragment: &str) -> MaiError {
    MaiError::parse(format!("Player data page is missing the {fragment}"))
}

/// Anti-forgery token of a login form
pub fn login_form_token(html: &str) -> Option<String> {
    Html::parse_document(html)
        .select(&FORM_TOKEN)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .filter(|token| !token.is_empty())
}
