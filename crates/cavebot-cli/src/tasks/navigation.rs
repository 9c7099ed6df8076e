//! Navigation: waypoint traversal with monitored, interruptible dwells.

use std::time::Duration;

use async_trait::async_trait;
use cavebot_core::error::AgentError;
use cavebot_core::model::{Outcome, TaskKind};
use cavebot_core::route::Waypoint;
use tracing::{debug, info, warn};

use crate::actions::Engine;
use crate::tasks::{monitored_delay, Task, Watch};

/// Pause after a failed waypoint click before the next attempt.
const CLICK_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// One waypoint step: search, click, monitored dwell.
///
/// This is the navigation unit of preemption. An interrupted step is
/// discarded and rebuilt by the orchestrator, restarting from the search
/// with a fresh attempt budget; only not-found searches consume attempts.
pub struct WaypointTask<'a> {
    engine: &'a Engine,
    watch: &'a Watch<'a>,
    waypoint: &'a Waypoint,
    attempts: u32,
}

impl<'a> WaypointTask<'a> {
    pub fn new(engine: &'a Engine, watch: &'a Watch<'a>, waypoint: &'a Waypoint) -> Self {
        Self {
            engine,
            watch,
            waypoint,
            attempts: 0,
        }
    }
}

#[async_trait]
impl Task for WaypointTask<'_> {
    fn kind(&self) -> TaskKind {
        TaskKind::Navigation
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn max_attempts(&self) -> u32 {
        self.engine.cfg.nav.attempts
    }

    async fn run(&mut self) -> Outcome {
        let nav = &self.engine.cfg.nav;
        let wp = self.waypoint;

        while self.attempts < self.max_attempts() {
            let schedule_idx = (self.attempts as usize).min(nav.confidence_schedule.len() - 1);
            let confidence = nav.confidence_schedule[schedule_idx];
            self.attempts += 1;

            // Interrupt conditions are re-checked before every search
            // attempt so a surfacing enemy preempts the search, not just
            // the dwell.
            if self.watch.check().await.is_some() {
                debug!("waypoint '{}' preempted before search", wp.label);
                return Outcome::Interrupted;
            }

            let found = self
                .engine
                .vision
                .locate_timed(
                    &wp.label,
                    confidence,
                    Duration::from_millis(nav.search_timeout_ms),
                    Duration::from_millis(nav.search_poll_ms),
                )
                .await;

            let Some(pos) = found else {
                debug!(
                    "waypoint '{}' not found (attempt {}/{}, confidence {:.2})",
                    wp.label,
                    self.attempts,
                    self.max_attempts(),
                    confidence
                );
                continue;
            };

            info!("waypoint '{}' at {}", wp.label, pos);

            if !self.engine.click_at(pos, wp.click).await {
                warn!("click on waypoint '{}' failed", wp.label);
                tokio::time::sleep(CLICK_RETRY_PAUSE).await;
                continue;
            }
            self.engine.recenter().await;

            let dwell = Duration::from_secs_f32(wp.dwell_secs * nav.dwell_scale);
            if !dwell.is_zero() {
                debug!("dwelling {:?} after '{}'", dwell, wp.label);
                let interrupted = monitored_delay(
                    self.watch,
                    dwell,
                    Duration::from_millis(nav.dwell_tick_ms),
                )
                .await;
                if interrupted.is_some() {
                    info!("dwell after '{}' interrupted", wp.label);
                    return Outcome::Interrupted;
                }
            }

            return Outcome::Completed(1);
        }

        // A single missing waypoint must not stall the route: the step is
        // complete-with-failure and traversal advances.
        warn!("{}", AgentError::route_stall(wp.label.as_str(), self.attempts));
        Outcome::Failed
    }
}

/// Route cursor: which waypoint is next and how many full cycles have
/// completed. The orchestrator owns one of these for the whole session.
#[derive(Debug, Default)]
pub struct RouteCursor {
    pub index: usize,
    pub cycles: u32,
}

impl RouteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance past the current waypoint. Returns `true` when this
    /// wrapped around, completing a full route cycle.
    pub fn advance(&mut self, route_len: usize) -> bool {
        self.index += 1;
        if self.index >= route_len {
            self.index = 0;
            self.cycles += 1;
            return true;
        }
        false
    }
}
