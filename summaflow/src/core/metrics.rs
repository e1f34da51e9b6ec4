//! Evaluation scores and the promotion rule.

use serde::{Deserialize, Serialize};

/// ROUGE F-measures for one model, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RougeScores {
    /// Unigram overlap.
    pub rouge1: f64,
    /// Bigram overlap.
    pub rouge2: f64,
    /// Longest common subsequence, sentence level.
    #[serde(rename = "rougeL")]
    pub rouge_l: f64,
    /// Longest common subsequence, summary level.
    #[serde(rename = "rougeLsum")]
    pub rouge_lsum: f64,
}

impl RougeScores {
    /// Column names used in the metrics report, in order.
    pub const NAMES: [&'static str; 4] = ["rouge1", "rouge2", "rougeL", "rougeLsum"];

    /// Creates a score set.
    #[must_use]
    pub fn new(rouge1: f64, rouge2: f64, rouge_l: f64, rouge_lsum: f64) -> Self {
        Self {
            rouge1,
            rouge2,
            rouge_l,
            rouge_lsum,
        }
    }

    /// Sub-metric values in [`RougeScores::NAMES`] order.
    #[must_use]
    pub fn values(&self) -> [f64; 4] {
        [self.rouge1, self.rouge2, self.rouge_l, self.rouge_lsum]
    }

    /// Mean of the four sub-metrics; this is the score compared for promotion.
    #[must_use]
    pub fn average(&self) -> f64 {
        let values = self.values();
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Decides whether a newly trained model replaces the stored best.
///
/// Accepts when there is no stored score, or when `new >= old`; ties go to
/// the new model.
#[must_use]
pub fn decide_promotion(new_score: f64, old_score: Option<f64>) -> bool {
    match old_score {
        None => true,
        Some(old) => new_score >= old,
    }
}
