//! Score calculation and leaderboard ranking for won games.

use chrono::{DateTime, Local};
use shared::{Code, GameMode, PlayerId};
use std::cmp::Reverse;

pub const LEADERBOARD_SIZE: usize = 10;

const TRIAL_PENALTY: i64 = 5;
const TIME_PENALTY_WEIGHT: i64 = 50;

/// Durable record of one won game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    /// 0..=100
    pub score: u32,
    pub plid: PlayerId,
    pub secret: Code,
    pub trials: u32,
    pub mode: GameMode,
    pub completed_at: DateTime<Local>,
}

/// Converts a won game's trial count and play time into a score in `0..=100`.
///
/// Each trial after the first costs 5 points; using the whole time budget
/// costs 50, proportionally and rounded down.
pub fn calculate_score(trials_used: u32, elapsed_secs: u32, budget_secs: u32) -> u32 {
    let trial_penalty = (i64::from(trials_used) - 1).max(0) * TRIAL_PENALTY;
    let time_penalty = if budget_secs == 0 {
        TIME_PENALTY_WEIGHT
    } else {
        i64::from(elapsed_secs) * TIME_PENALTY_WEIGHT / i64::from(budget_secs)
    };

    (100 - trial_penalty - time_penalty).clamp(0, 100) as u32
}

/// Orders score records best first and keeps the top entries.
///
/// Equal scores keep the earlier finisher ahead; the player id settles
/// anything left.
pub fn rank_leaderboard(mut records: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
    records.sort_by_key(|record| (Reverse(record.score), record.completed_at, record.plid));
    records.truncate(LEADERBOARD_SIZE);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{at, code, plid};

    fn record(score: u32, id: &str, completed: i64) -> ScoreRecord {
        ScoreRecord {
            score,
            plid: plid(id),
            secret: code("RGBY"),
            trials: 1,
            mode: GameMode::Play,
            completed_at: at(completed),
        }
    }

    #[test]
    fn test_perfect_game() {
        assert_eq!(calculate_score(1, 0, 600), 100);
    }

    #[test]
    fn test_penalties() {
        assert_eq!(calculate_score(3, 0, 600), 90);
        assert_eq!(calculate_score(1, 300, 600), 75);
        // 50 * 59 / 600 = 4.9, rounded down
        assert_eq!(calculate_score(2, 59, 600), 91);
        assert_eq!(calculate_score(8, 600, 600), 15);
    }

    #[test]
    fn test_clamped() {
        assert_eq!(calculate_score(30, 600, 600), 0);
        assert_eq!(calculate_score(0, 0, 600), 100);
        assert_eq!(calculate_score(1, 10, 0), 50);
    }

    #[test]
    fn test_monotonic_in_trials_and_time() {
        for budget in [1, 60, 600] {
            for trials in 1..=8 {
                for elapsed in 0..=budget {
                    let score = calculate_score(trials, elapsed, budget);
                    assert!(score <= 100);
                    assert!(calculate_score(trials + 1, elapsed, budget) <= score);
                    assert!(calculate_score(trials, elapsed + 1, budget) <= score);
                }
            }
        }
    }

    #[test]
    fn test_rank_descending_and_truncated() {
        let records: Vec<ScoreRecord> = (0..15)
            .map(|i| record(40 + i * 3, &format!("{:06}", i), i as i64))
            .collect();

        let ranked = rank_leaderboard(records);
        assert_eq!(ranked.len(), LEADERBOARD_SIZE);
        assert_eq!(ranked[0].score, 82);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_favor_earlier_completion() {
        let ranked = rank_leaderboard(vec![
            record(90, "000002", 50),
            record(90, "000001", 80),
            record(95, "000003", 90),
            record(90, "000004", 10),
        ]);
        let order: Vec<&str> = ranked.iter().map(|r| r.plid.as_str()).collect();
        assert_eq!(order, vec!["000003", "000004", "000002", "000001"]);
    }
}
