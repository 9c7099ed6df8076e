//! Loot collection strategies.
//!
//! All three strategies sit behind one interface; which one runs is a
//! configuration choice, not state. They differ in how aggressively they
//! trade time for completeness: a single quick pick, a deduplicated
//! multi-pick, or a bounded multi-pass sweep.

use std::time::Duration;

use async_trait::async_trait;
use cavebot_core::cluster::merge_nearby;
use cavebot_core::config::LootMode;
use cavebot_core::model::{ClickKind, Detection};
use tracing::{debug, info};

use crate::actions::Engine;

/// One loot collection pass after a kill. Returns the pick count.
#[async_trait]
pub trait LootStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn collect(&self, engine: &Engine) -> u32;
}

/// Build the configured strategy.
pub fn strategy_for(mode: &LootMode) -> Box<dyn LootStrategy> {
    match mode {
        LootMode::FirstFound => Box::new(FirstFound),
        LootMode::Clustered { min_distance } => Box::new(Clustered {
            min_distance: *min_distance,
        }),
        LootMode::Sweep { passes } => Box::new(Sweep {
            passes: passes.clone(),
        }),
    }
}

/// Single pick of the first marker found, scanning labels in order.
struct FirstFound;

#[async_trait]
impl LootStrategy for FirstFound {
    fn name(&self) -> &'static str {
        "first_found"
    }

    async fn collect(&self, engine: &Engine) -> u32 {
        let loot = &engine.cfg.loot;
        tokio::time::sleep(Duration::from_millis(loot.appear_delay_ms)).await;

        for label in &loot.labels {
            let Some(pos) = engine.vision.locate_once(label, loot.confidence, false).await else {
                continue;
            };
            if engine.click_at(pos, ClickKind::Right).await {
                info!("picked '{}' at {}", label, pos);
                tokio::time::sleep(Duration::from_millis(loot.between_picks_ms)).await;
                return 1;
            }
        }
        debug!("no loot markers found");
        0
    }
}

/// Gather every detection, merge near-duplicates, pick each cluster once.
struct Clustered {
    min_distance: f64,
}

#[async_trait]
impl LootStrategy for Clustered {
    fn name(&self) -> &'static str {
        "clustered"
    }

    async fn collect(&self, engine: &Engine) -> u32 {
        let loot = &engine.cfg.loot;
        tokio::time::sleep(Duration::from_millis(loot.appear_delay_ms)).await;

        let mut detections: Vec<Detection> = Vec::new();
        for label in &loot.labels {
            for pos in engine.vision.locate_all(label, loot.confidence).await {
                detections.push(Detection {
                    label: label.clone(),
                    pos,
                    confidence: loot.confidence,
                });
            }
        }

        let targets = merge_nearby(detections, self.min_distance);
        debug!("{} unique loot targets after clustering", targets.len());

        let mut picked = 0;
        for det in targets {
            if engine.click_at(det.pos, ClickKind::Right).await {
                info!("picked '{}' at {}", det.label, det.pos);
                picked += 1;
                tokio::time::sleep(Duration::from_millis(loot.between_picks_ms)).await;
            }
        }
        picked
    }
}

/// Fixed passes at a decreasing confidence schedule, collecting
/// everything found per pass. Deliberately does not deduplicate across
/// passes; late-rendering markers are worth an occasional double pick.
struct Sweep {
    passes: Vec<f32>,
}

#[async_trait]
impl LootStrategy for Sweep {
    fn name(&self) -> &'static str {
        "sweep"
    }

    async fn collect(&self, engine: &Engine) -> u32 {
        let loot = &engine.cfg.loot;
        tokio::time::sleep(Duration::from_millis(loot.appear_delay_ms)).await;

        let mut picked = 0;
        for (i, confidence) in self.passes.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(loot.appear_delay_ms)).await;
            }
            debug!("loot sweep pass {}/{} at {:.2}", i + 1, self.passes.len(), confidence);

            for label in &loot.labels {
                let Some(pos) = engine.vision.locate_once(label, *confidence, false).await else {
                    continue;
                };
                if engine.click_at(pos, ClickKind::Right).await {
                    info!("picked '{}' at {}", label, pos);
                    picked += 1;
                    tokio::time::sleep(Duration::from_millis(loot.between_picks_ms)).await;
                }
            }
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{test_config, FakeWorld};
    use cavebot_core::geom::Position;
    use cavebot_core::model::Label;

    fn loot_labels() -> Vec<Label> {
        vec![Label::from("loot1"), Label::from("loot2")]
    }

    #[tokio::test]
    async fn test_first_found_picks_exactly_one() {
        let world = FakeWorld::new();
        world.add_entity("loot1", Position::new(100, 100), 0.9);
        world.add_entity("loot2", Position::new(300, 300), 0.9);

        let mut cfg = test_config();
        cfg.loot.labels = loot_labels();
        let engine = world.engine(cfg);

        let picked = strategy_for(&LootMode::FirstFound).collect(&engine).await;
        assert_eq!(picked, 1);
        assert_eq!(world.clicks().len(), 1);
        assert_eq!(world.clicks()[0].1, "CR", "loot is right-clicked");
    }

    #[tokio::test]
    async fn test_clustered_never_double_picks_close_markers() {
        let world = FakeWorld::new();
        // Two markers on the same corpse, one far away.
        world.add_entity("loot1", Position::new(200, 200), 0.9);
        world.add_entity("loot2", Position::new(210, 205), 0.9);
        world.add_entity("loot1", Position::new(400, 400), 0.9);

        let mut cfg = test_config();
        cfg.loot.labels = loot_labels();
        let engine = world.engine(cfg);

        let strategy = strategy_for(&LootMode::Clustered { min_distance: 50.0 });
        let picked = strategy.collect(&engine).await;
        assert_eq!(picked, 2);

        let clicks = world.clicks();
        assert_eq!(clicks.len(), 2);
        for (i, (a, _)) in clicks.iter().enumerate() {
            for (b, _) in &clicks[i + 1..] {
                assert!(
                    a.distance_to(*b) >= 50.0,
                    "picks at {} and {} violate the clustering distance",
                    a,
                    b
                );
            }
        }
    }

    #[tokio::test]
    async fn test_sweep_finds_low_confidence_marker_on_later_pass() {
        let world = FakeWorld::new();
        // Only matchable at relaxed confidence.
        world.add_entity("loot1", Position::new(150, 150), 0.6);

        let mut cfg = test_config();
        cfg.loot.labels = loot_labels();
        let engine = world.engine(cfg);

        let strategy = strategy_for(&LootMode::Sweep {
            passes: vec![0.8, 0.6],
        });
        let picked = strategy.collect(&engine).await;
        assert_eq!(picked, 1, "second pass at 0.6 must find the marker");
    }

    #[tokio::test]
    async fn test_empty_world_collects_nothing() {
        let world = FakeWorld::new();
        let mut cfg = test_config();
        cfg.loot.labels = loot_labels();
        let engine = world.engine(cfg);

        for mode in [
            LootMode::FirstFound,
            LootMode::Clustered { min_distance: 50.0 },
            LootMode::Sweep { passes: vec![0.7] },
        ] {
            assert_eq!(strategy_for(&mode).collect(&engine).await, 0);
        }
        assert!(world.clicks().is_empty());
    }
}
