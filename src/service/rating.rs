//! Rating engine
//!
//! Turns achievements into per-chart ratings and builds the Best 50
//! (15 current-era charts + 35 legacy-era charts). Everything here is pure;
//! every consumer that ranks a snapshot goes through [`split_songs`] and
//! [`assign_ranks`] so their output agrees bit for bit.

use crate::config::Constants;
use crate::model::{CatalogScore, RankedSong, ScoredSong};
use serde::Serialize;
use std::cmp::Ordering;

/// Multiplier for an accuracy percentage (0 below 80%)
pub fn rating_factor(accuracy: f64) -> f64 {
    Constants::RATING_FACTORS
        .iter()
        .find(|(min_accuracy, _)| accuracy >= *min_accuracy)
        .map(|(_, factor)| *factor)
        .unwrap_or(0.0)
}

/// Rating of one chart: `floor(factor * accuracy * levelPrecise / 10)`,
/// with accuracy capped at 100.5%.
pub fn song_rating(achievement: u32, level_precise: i32) -> u32 {
    let accuracy = (achievement as f64 / Constants::ACHIEVEMENT_SCALE)
        .min(Constants::MAX_RATED_ACCURACY);
    let factor = rating_factor(accuracy);
    let rating = (factor * accuracy * level_precise as f64 / 10.0).floor();
    rating.max(0.0) as u32
}

/// First game version epoch whose charts count as current-era
pub fn current_era_boundary(current_version: i32) -> i32 {
    if current_version >= Constants::PREVIOUS_VERSION_GRACE_EPOCH {
        current_version - 1
    } else {
        current_version
    }
}

/// Best 50 pools of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplitSongs {
    pub current_best: Vec<ScoredSong>,
    pub legacy_best: Vec<ScoredSong>,
    pub current_remainder: Vec<ScoredSong>,
    pub legacy_remainder: Vec<ScoredSong>,
}

fn by_rating_desc(a: &ScoredSong, b: &ScoredSong) -> Ordering {
    b.rating
        .cmp(&a.rating)
        .then_with(|| b.score.achievement.cmp(&a.score.achievement))
}

/// Attach ratings and split into current/legacy era pools.
///
/// Ordering inside each pool is rating descending, then achievement
/// descending, then input order. Global ranks are not assigned here; use
/// [`assign_ranks`] on the result.
pub fn split_songs(songs: &[CatalogScore], current_version: i32) -> SplitSongs {
    let mut rated: Vec<ScoredSong> = songs
        .iter()
        .map(|score| ScoredSong {
            rating: song_rating(score.achievement, score.level_precise),
            score: score.clone(),
        })
        .collect();
    // sort_by is stable
    rated.sort_by(by_rating_desc);

    let boundary = current_era_boundary(current_version);
    let (mut current, mut legacy): (Vec<_>, Vec<_>) = rated
        .into_iter()
        .partition(|song| song.score.added_version >= boundary);

    let current_remainder = current.split_off(current.len().min(Constants::NEW_BEST_COUNT));
    let legacy_remainder = legacy.split_off(legacy.len().min(Constants::OLD_BEST_COUNT));

    SplitSongs {
        current_best: current,
        legacy_best: legacy,
        current_remainder,
        legacy_remainder,
    }
}

/// Global ranks: current-era best 0..15, legacy-era best 15..50, then both
/// remainders merged and re-sorted by rating from 50 on.
///
/// Legacy ranks always start at 15 even when fewer than 15 current-era
/// charts exist, so a rank number always identifies its pool.
pub fn assign_ranks(split: &SplitSongs) -> Vec<RankedSong> {
    let mut ranked = Vec::with_capacity(
        split.current_best.len()
            + split.legacy_best.len()
            + split.current_remainder.len()
            + split.legacy_remainder.len(),
    );

    ranked.extend(
        split
            .current_best
            .iter()
            .enumerate()
            .map(|(i, song)| RankedSong {
                song: song.clone(),
                rank: i,
            }),
    );
    ranked.extend(
        split
            .legacy_best
            .iter()
            .enumerate()
            .map(|(i, song)| RankedSong {
                song: song.clone(),
                rank: Constants::NEW_BEST_COUNT + i,
            }),
    );

    let mut remainder: Vec<&ScoredSong> = split
        .current_remainder
        .iter()
        .chain(split.legacy_remainder.iter())
        .collect();
    remainder.sort_by(|a, b| by_rating_desc(a, b));

    let offset = Constants::NEW_BEST_COUNT + Constants::OLD_BEST_COUNT;
    ranked.extend(remainder.into_iter().enumerate().map(|(i, song)| RankedSong {
        song: song.clone(),
        rank: offset + i,
    }));

    ranked
}

/// Player rating: sum of both best pools
pub fn best50_total(split: &SplitSongs) -> u32 {
    split
        .current_best
        .iter()
        .chain(split.legacy_best.iter())
        .map(|song| song.rating)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, FullCombo, FullSync, MusicType};

    fn song(name: &str, achievement: u32, level_precise: i32, added_version: i32) -> CatalogScore {
        CatalogScore {
            song_id: name.to_string(),
            song_name: name.to_string(),
            difficulty: Difficulty::Master,
            music_type: MusicType::Dx,
            level_label: "13".to_string(),
            level_precise,
            added_version,
            achievement,
            dx_score: 0,
            full_combo: FullCombo::None,
            full_sync: FullSync::None,
        }
    }

    #[test]
    fn test_rating_factor_table() {
        let cases = [
            (101.0, 0.224),
            (100.5, 0.224),
            (100.0, 0.216),
            (99.5, 0.211),
            (99.0, 0.208),
            (98.0, 0.203),
            (97.0, 0.2),
            (94.0, 0.168),
            (90.0, 0.152),
            (80.0, 0.136),
            (79.9999, 0.0),
            (0.0, 0.0),
        ];
        for (accuracy, factor) in cases {
            assert_eq!(rating_factor(accuracy), factor, "accuracy {accuracy}");
        }
    }

    #[test]
    fn test_song_rating_known_values() {
        assert_eq!(song_rating(1_000_000, 140), 302);
        assert_eq!(song_rating(1_010_000, 140), 315);
        assert_eq!(song_rating(1_005_000, 140), 315);
        assert_eq!(song_rating(799_999, 150), 0);
    }

    #[test]
    fn test_song_rating_monotonic_and_non_negative() {
        for level in [10, 75, 120, 137, 150] {
            let mut previous = 0;
            for achievement in (0..=1_010_000).step_by(2_500) {
                let rating = song_rating(achievement, level);
                assert!(rating >= previous, "level {level} achievement {achievement}");
                previous = rating;
            }
        }
        assert_eq!(song_rating(1_000_000, -10), 0);
    }

    #[test]
    fn test_era_boundary_shifts_at_epoch_12() {
        let songs = vec![song("a", 1_000_000, 130, 11), song("b", 1_000_000, 130, 10)];

        let split = split_songs(&songs, 12);
        assert_eq!(split.current_best.len(), 1);
        assert_eq!(split.current_best[0].score.song_name, "a");
        assert_eq!(split.legacy_best[0].score.song_name, "b");

        let songs = vec![song("a", 1_000_000, 130, 11), song("b", 1_000_000, 130, 10)];
        let split = split_songs(&songs, 11);
        assert_eq!(split.current_best[0].score.song_name, "a");
        assert_eq!(split.legacy_best[0].score.song_name, "b");

        assert_eq!(current_era_boundary(11), 11);
        assert_eq!(current_era_boundary(12), 11);
        assert_eq!(current_era_boundary(13), 12);
    }

    #[test]
    fn test_short_pools() {
        let mut songs = Vec::new();
        for i in 0..10 {
            songs.push(song(&format!("new{i}"), 990_000 + i * 100, 130, 12));
        }
        for i in 0..40 {
            songs.push(song(&format!("old{i}"), 970_000 + i * 100, 120, 5));
        }

        let split = split_songs(&songs, 12);
        assert_eq!(split.current_best.len(), 10);
        assert_eq!(split.legacy_best.len(), 35);
        assert!(split.current_remainder.is_empty());
        assert_eq!(split.legacy_remainder.len(), 5);
    }

    #[test]
    fn test_empty_input() {
        let split = split_songs(&[], 12);
        assert_eq!(split, SplitSongs::default());
        assert!(assign_ranks(&split).is_empty());
        assert_eq!(best50_total(&split), 0);
    }

    #[test]
    fn test_ordering_and_ties() {
        // 100.0% and 100.05% on a 13.0 both rate 280; achievement breaks the tie
        let songs = vec![
            song("low", 1_000_000, 130, 12),
            song("high", 1_000_500, 130, 12),
            song("top", 1_005_000, 140, 12),
            song("twin", 1_000_000, 130, 12),
        ];
        let split = split_songs(&songs, 12);
        let names: Vec<_> = split
            .current_best
            .iter()
            .map(|s| s.score.song_name.as_str())
            .collect();
        assert_eq!(names, ["top", "high", "low", "twin"]);
    }

    #[test]
    fn test_split_is_idempotent() {
        let songs: Vec<_> = (0..60i32)
            .map(|i| {
                let achievement = 950_000 + (i as u32 * 977) % 60_000;
                song(&format!("s{i}"), achievement, 110 + i % 40, i % 14)
            })
            .collect();
        assert_eq!(split_songs(&songs, 13), split_songs(&songs, 13));
    }

    #[test]
    fn test_assign_ranks() {
        let mut songs = Vec::new();
        for i in 0..20 {
            songs.push(song(&format!("new{i}"), 1_000_000 - i * 1_000, 140, 12));
        }
        for i in 0..40 {
            songs.push(song(&format!("old{i}"), 1_005_000 - i * 1_000, 130, 3));
        }

        let split = split_songs(&songs, 12);
        let ranked = assign_ranks(&split);
        assert_eq!(ranked.len(), 60);

        let ranks: Vec<_> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, (0..60).collect::<Vec<_>>());
        assert_eq!(ranked[0].song.score.song_name, "new0");
        assert_eq!(ranked[15].song.score.song_name, "old0");

        let remainder = &ranked[50..];
        for pair in remainder.windows(2) {
            assert!(pair[0].song.rating >= pair[1].song.rating);
        }
        assert_eq!(remainder.len(), 10);
    }

    #[test]
    fn test_legacy_ranks_start_at_15_with_short_current_pool() {
        let songs = vec![song("new", 1_000_000, 130, 12), song("old", 1_000_000, 130, 1)];
        let ranked = assign_ranks(&split_songs(&songs, 12));
        assert_eq!(ranked[0].rank, 0);
        assert_eq!(ranked[1].rank, 15);
    }

    #[test]
    fn test_best50_total() {
        let songs = vec![song("a", 1_000_000, 140, 12), song("b", 1_010_000, 140, 1)];
        assert_eq!(best50_total(&split_songs(&songs, 12)), 302 + 315);
    }
}
