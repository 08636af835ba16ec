use super::{RankOrder, SearchResult};
use crate::collection::QueryHit;

const RELEVANCE_WEIGHT: f64 = 0.7;
const RECENCY_WEIGHT: f64 = 0.3;

/// Anything the ranker can reorder.
pub trait Rankable {
    /// Distance, lower is better.
    fn score(&self) -> f64;
    fn mtime(&self) -> f64;
    /// Overwrite the score with the hybrid combined score.
    fn set_score(&mut self, score: f64);
}

impl Rankable for SearchResult {
    fn score(&self) -> f64 {
        self.score
    }

    fn mtime(&self) -> f64 {
        self.mtime
    }

    fn set_score(&mut self, score: f64) {
        self.score = score;
    }
}

impl Rankable for QueryHit {
    fn score(&self) -> f64 {
        self.distance
    }

    fn mtime(&self) -> f64 {
        self.mtime
    }

    fn set_score(&mut self, score: f64) {
        self.distance = score;
    }
}

/// Reorder `results` according to `order`. Sorts are stable.
///
/// Under [`RankOrder::Hybrid`] every item's score is replaced by
/// `0.7 * (1 - distance) + 0.3 * mtime / max_mtime` and items are sorted by
/// that score descending.
pub fn rank<T: Rankable>(mut results: Vec<T>, order: RankOrder) -> Vec<T> {
    match order {
        RankOrder::Relevance => {
            results.sort_by(|a, b| a.score().total_cmp(&b.score()));
        }
        RankOrder::MtimeDesc => {
            results.sort_by(|a, b| b.mtime().total_cmp(&a.mtime()));
        }
        RankOrder::Hybrid => {
            let max_mtime = results.iter().map(Rankable::mtime).fold(0.0_f64, f64::max);
            for r in &mut results {
                let recency = if max_mtime > 0.0 {
                    r.mtime() / max_mtime
                } else {
                    0.0
                };
                let combined = RELEVANCE_WEIGHT * (1.0 - r.score()) + RECENCY_WEIGHT * recency;
                r.set_score(combined);
            }
            results.sort_by(|a, b| b.score().total_cmp(&a.score()));
        }
    }
    results
}
