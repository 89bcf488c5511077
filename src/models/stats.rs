// src/models/stats.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::FromRow;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

/// Per-question outcome counts across all submitted participations.
/// For every question: correct + incorrect + unanswered == total_participants.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub unanswered_count: i64,
}

/// Contest-wide aggregates, folded from submitted participations only.
#[derive(Debug, Clone, Serialize)]
pub struct ContestStats {
    pub contest_id: i64,
    /// Participations with a submission timestamp.
    pub total_participants: i64,
    /// All participations, submitted or not.
    pub joined_count: i64,
    /// Scores of submitted participations, ascending.
    pub scores: Vec<i64>,
    pub average: f64,
    /// submitted / joined, in [0, 1].
    pub completion_rate: f64,
    pub per_question: Vec<QuestionStats>,
}

impl ContestStats {
    /// Percentage of submitted participants scoring strictly below `score`.
    /// Higher is better; tied scores share a percentile.
    pub fn percentile_of(&self, score: i64) -> f64 {
        if self.total_participants == 0 {
            return 0.0;
        }
        let below = self.scores.iter().filter(|&&s| s < score).count();
        (below as f64 / self.total_participants as f64) * 100.0
    }
}

/// Raw per-participation score row, as read from answer_records.
#[derive(Debug, FromRow)]
pub struct ScoreRow {
    pub participation_id: i64,
    pub score: i64,
}

/// Raw per-question tally row, as read from answer_records.
#[derive(Debug, FromRow)]
pub struct QuestionTallyRow {
    pub question_id: i64,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub unanswered_count: i64,
}

/// Pure fold from committed rows to the aggregate object.
pub fn build_stats(
    contest_id: i64,
    joined_count: i64,
    score_rows: &[ScoreRow],
    tally_rows: Vec<QuestionTallyRow>,
) -> ContestStats {
    let mut scores: Vec<i64> = score_rows.iter().map(|r| r.score).collect();
    scores.sort_unstable();

    let total_participants = scores.len() as i64;
    let average = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<i64>() as f64 / scores.len() as f64
    };
    let completion_rate = if joined_count == 0 {
        0.0
    } else {
        total_participants as f64 / joined_count as f64
    };

    let per_question = tally_rows
        .into_iter()
        .map(|row| QuestionStats {
            question_id: row.question_id,
            correct_count: row.correct_count,
            incorrect_count: row.incorrect_count,
            unanswered_count: row.unanswered_count,
        })
        .collect();

    ContestStats {
        contest_id,
        total_participants,
        joined_count,
        scores,
        average,
        completion_rate,
        per_question,
    }
}

/// TTL cache for contest statistics, invalidated on every new submission.
///
/// A stale entry is bounded by the TTL; correctness-critical readers (the
/// submit path) never read through this cache.
#[derive(Clone, Default)]
pub struct StatsCache {
    entries: Arc<RwLock<HashMap<i64, (Instant, ContestStats)>>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, contest_id: i64, ttl: Duration) -> Option<ContestStats> {
        let entries = self.entries.read().await;
        let (computed_at, stats) = entries.get(&contest_id)?;
        if computed_at.elapsed() <= ttl {
            Some(stats.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, contest_id: i64, stats: ContestStats) {
        self.entries
            .write()
            .await
            .insert(contest_id, (Instant::now(), stats));
    }

    pub async fn invalidate(&self, contest_id: i64) {
        self.entries.write().await.remove(&contest_id);
    }
}
