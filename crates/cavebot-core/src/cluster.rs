//! Spatial deduplication of detections.
//!
//! Template matching over loot markers reports near-duplicate hits: the
//! same corpse matched by several template variants, or matched twice a
//! few pixels apart. Collapsing everything within a minimum pixel
//! distance into one pick target keeps the agent from right-clicking the
//! same spot repeatedly.

use crate::model::Detection;

/// Merge detections closer than `min_distance` pixels into one.
///
/// Input order is preserved and the first detection of each cluster wins,
/// so callers that scan templates in priority order keep that priority.
/// The result is guaranteed to contain no two positions closer than
/// `min_distance`.
pub fn merge_nearby(detections: Vec<Detection>, min_distance: f64) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let duplicate = kept
            .iter()
            .any(|k| k.pos.distance_to(det.pos) < min_distance);
        if !duplicate {
            kept.push(det);
        }
    }
    kept
}
