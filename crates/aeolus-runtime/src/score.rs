use serde::Deserialize;

use crate::option::OptionResult;
use crate::services::Heatmap;

/// Which end of the score range ranks first. Has no default; runs must set it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreOrder {
    Ascending,
    Descending,
}

/// Mean over unmasked cells. Non-finite values count as masked. `None` when nothing
/// is left to average.
pub fn mean_unmasked(heatmap: &Heatmap) -> Option<(f64, usize)> {
    let (sum, n) = heatmap
        .values()
        .iter()
        .zip(heatmap.mask())
        .filter(|(v, masked)| !**masked && v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), (v, _)| (s + v, n + 1));
    (n > 0).then(|| (sum / n as f64, n))
}

/// Sort by score in `order`. Equal scores keep option order.
pub fn rank(mut results: Vec<OptionResult>, order: ScoreOrder) -> Vec<OptionResult> {
    results.sort_by(|a, b| {
        let by_score = match order {
            ScoreOrder::Ascending => a.score.total_cmp(&b.score),
            ScoreOrder::Descending => b.score.total_cmp(&a.score),
        };
        by_score.then(a.index.cmp(&b.index))
    });
    results
}
