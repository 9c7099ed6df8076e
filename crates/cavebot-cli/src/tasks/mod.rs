//! Task model, interrupt conditions, and the monitored-wait primitive.
//!
//! A task is a resumable unit of work driven by the orchestrator. Tasks
//! are not persisted across interruption: an interrupted task is simply
//! restarted from its beginning — the domain (a waypoint click, a single
//! combat exchange) is idempotent to repeat, so resumption is
//! restart-by-design rather than stateful rewind.

pub mod combat;
pub mod loot;
pub mod navigation;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cavebot_core::model::{Detection, HealthState, Outcome, TaskKind};

use crate::actions::Engine;
use crate::orchestrator::Healer;

/// A resumable unit of work.
#[async_trait]
pub trait Task: Send {
    fn kind(&self) -> TaskKind;
    /// Attempts consumed so far in this incarnation of the task.
    fn attempts(&self) -> u32;
    fn max_attempts(&self) -> u32;
    /// Drive the task to its next boundary. `Interrupted` hands control
    /// back to the orchestrator; the task is discarded and rebuilt.
    async fn run(&mut self) -> Outcome;
}

/// A perception-derived condition that preempts the active task.
///
/// Variants are ordered by the priority class that produces them: an
/// enemy beats a healing trigger when both are true simultaneously.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Enemy(Detection),
    Health(HealthState),
}

/// The orchestrator's interrupt hook, handed to tasks so monitored waits
/// and search loops can poll it.
///
/// Checks are deliberately cheap: enemies are single-shot queries at the
/// interrupt confidence (no cascade), scanned in descending per-label
/// priority so the first hit is the highest-priority visible target.
pub struct Watch<'a> {
    pub engine: &'a Engine,
    pub healer: &'a Healer,
}

impl Watch<'_> {
    pub async fn check(&self) -> Option<Interrupt> {
        let cfg = &self.engine.cfg;

        for spec in cfg.combat.enemies_by_priority() {
            if let Some(pos) = self
                .engine
                .vision
                .locate_once(&spec.label, cfg.vision.interrupt_confidence, false)
                .await
            {
                return Some(Interrupt::Enemy(Detection {
                    label: spec.label.clone(),
                    pos,
                    confidence: cfg.vision.interrupt_confidence,
                }));
            }
        }

        if cfg.healing.enabled {
            let state = self.engine.health().await;
            if self.healer.due_rule(state).is_some() {
                return Some(Interrupt::Health(state));
            }
        }

        None
    }
}

/// A sleep that polls the interrupt hook at a fixed interval and returns
/// early when a condition fires.
///
/// With no interrupt the full duration elapses and `None` is returned.
/// The polling interval is an explicit parameter, not a buried sleep
/// constant.
pub async fn monitored_delay(
    watch: &Watch<'_>,
    duration: Duration,
    tick: Duration,
) -> Option<Interrupt> {
    let deadline = Instant::now() + duration;

    loop {
        if let Some(interrupt) = watch.check().await {
            return Some(interrupt);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        tokio::time::sleep(tick.min(remaining)).await;
    }
}
