//! Action primitives: composite operations on the device link.
//!
//! [`Engine`] bundles the device link, the perception port, and the
//! configuration; it is the single unit that "holds the input device".
//! Tasks borrow it — the orchestrator never runs two tasks at once, so
//! mutual exclusion on these primitives is structural.

use std::time::{Duration, Instant};

use cavebot_core::config::AgentConfig;
use cavebot_core::geom::{step_toward, Position};
use cavebot_core::model::{ClickKind, HealthState};
use tracing::{debug, warn};

use crate::device::DeviceLink;
use crate::perception::PerceptionPort;

/// Pause between single-pixel steps during stuck recovery.
const STUCK_STEP_PAUSE: Duration = Duration::from_millis(6);

/// The device, the eyes, and the configuration, in one place.
pub struct Engine {
    pub link: DeviceLink,
    pub vision: PerceptionPort,
    pub cfg: AgentConfig,
}

impl Engine {
    pub fn new(link: DeviceLink, vision: PerceptionPort, cfg: AgentConfig) -> Self {
        Self { link, vision, cfg }
    }

    /// Closed-loop cursor move to an exact position.
    ///
    /// Reads the cursor through perception, issues bounded relative steps
    /// (absolute jumps are deliberately avoided), and stops when the
    /// delta reaches zero or the deadline elapses. If the cursor stops
    /// responding to proportional steps while a non-trivial delta
    /// remains, a burst of single-pixel steps breaks out of rounding and
    /// acceleration artifacts before proportional stepping resumes.
    ///
    /// Returns `false` on deadline without reaching the target; the
    /// caller decides whether to retry.
    pub async fn move_to(&self, target: Position) -> bool {
        let mouse = &self.cfg.mouse;
        let deadline = Instant::now() + Duration::from_millis(mouse.move_timeout_ms);
        let mut last_pos: Option<Position> = None;
        let mut stuck_count: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                warn!("move to {} timed out", target);
                return false;
            }

            let Some(current) = self.vision.cursor().await else {
                warn!("cursor position unavailable, aborting move");
                return false;
            };

            let (dx, dy) = current.delta_to(target);
            if dx == 0 && dy == 0 {
                // The device tracks its own absolute estimate; re-sync it
                // now that the real cursor is exactly on target.
                self.link.move_abs_sync(target).await;
                return true;
            }

            // Stuck detection: the cursor did not move since last tick.
            if last_pos == Some(current) {
                stuck_count += 1;
            } else {
                stuck_count = 0;
                last_pos = Some(current);
            }

            let (sx, sy) = step_toward(dx, dy, mouse.step_cap);
            let magnitude = sx.abs().max(sy.abs());

            if stuck_count >= mouse.stuck_ticks && magnitude > 1 {
                debug!("cursor stuck at {}, single-pixel recovery", current);
                let px = dx.signum();
                let py = dy.signum();
                for _ in 0..magnitude {
                    self.link.move_rel(px, py).await;
                    tokio::time::sleep(STUCK_STEP_PAUSE).await;
                }
                stuck_count = 0;
                continue;
            }

            if !self.link.move_rel(sx, sy).await.is_ok() {
                warn!("relative step not acknowledged, aborting move");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(mouse.pause_ms)).await;
        }
    }

    /// Move, settle, click. The whole gesture is bracketed by the device
    /// busy indicator so an operator glancing at it can tell the agent is
    /// mid-gesture.
    pub async fn click_at(&self, pos: Position, kind: ClickKind) -> bool {
        self.link.set_busy(true).await;

        let moved = self.move_to(pos).await;
        let mut ok = false;
        if moved {
            tokio::time::sleep(Duration::from_millis(self.cfg.mouse.settle_ms)).await;
            ok = self.link.click(kind).await.is_ok();
        }

        self.link.set_busy(false).await;
        ok
    }

    /// Press a named key. Ack failures surface as `false`; retry policy
    /// lives in the device link, not here.
    pub async fn press_key(&self, key: &str) -> bool {
        match self.link.press_key(key).await {
            Ok(ack) => ack.is_ok(),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    pub async fn press_combo(&self, mods: &str, key: &str) -> bool {
        match self.link.press_combo(mods, key).await {
            Ok(ack) => ack.is_ok(),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    pub async fn type_text(&self, text: &str) -> bool {
        match self.link.type_text(text).await {
            Ok(ack) => ack.is_ok(),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Park the cursor at screen center so it never occludes the next
    /// template search. Best effort; disabled by configuration.
    pub async fn recenter(&self) {
        if !self.cfg.mouse.recenter_after_click {
            return;
        }
        if let Some((w, h)) = self.vision.screen_size().await {
            let center = Position::new(w as i32 / 2, h as i32 / 2);
            self.move_to(center).await;
        }
    }

    /// Classify the configured health-bar region.
    pub async fn health(&self) -> HealthState {
        self.vision
            .health(self.cfg.healing.region, &self.cfg.healing.classifier)
            .await
    }
}
