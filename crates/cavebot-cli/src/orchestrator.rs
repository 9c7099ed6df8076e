//! The orchestrator: a priority arbitration loop over combat, healing,
//! and navigation.
//!
//! The loop owns no combat or navigation logic. Each iteration it
//! evaluates interrupt conditions in priority order; an enemy suspends
//! whatever is active and hands control to combat until the area scans
//! clean, a due healing trigger fires its key once, and otherwise the
//! active navigation task is driven one waypoint step so interrupts are
//! rechecked between steps. A suspended step is restarted from its
//! beginning on resumption — nothing is rewound.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use cavebot_core::config::{HealingConfig, HealingRule};
use cavebot_core::error::AgentError;
use cavebot_core::model::{HealthState, Outcome};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::actions::Engine;
use crate::tasks::navigation::{RouteCursor, WaypointTask};
use crate::tasks::combat::CombatTask;
use crate::tasks::{Interrupt, Task, Watch};

/// Brief pause after a healing key so the action registers before the
/// next perception poll.
const POST_HEAL_PAUSE: Duration = Duration::from_millis(200);

/// Healing rule table with per-rule cooldown clocks.
///
/// The clocks are the only healing state; they exist so a sustained
/// Medium reading does not spam the healing key every arbitration pass.
pub struct Healer {
    rules: Vec<HealingRule>,
    fired_at: Mutex<Vec<Option<Instant>>>,
}

impl Healer {
    pub fn new(cfg: HealingConfig) -> Self {
        let count = cfg.rules.len();
        Self {
            rules: cfg.rules,
            fired_at: Mutex::new(vec![None; count]),
        }
    }

    /// First rule matching `state` whose cooldown has elapsed. A
    /// poisoned clock mutex suppresses healing rather than panicking the
    /// arbitration loop.
    pub fn due_rule(&self, state: HealthState) -> Option<usize> {
        let fired = self.fired_at.lock().ok()?;
        self.rules.iter().enumerate().position(|(i, rule)| {
            rule.trigger == state
                && match fired[i] {
                    Some(at) => at.elapsed() >= Duration::from_millis(rule.cooldown_ms),
                    None => true,
                }
        })
    }

    pub fn rule(&self, idx: usize) -> &HealingRule {
        &self.rules[idx]
    }

    /// Start the cooldown clock for a rule that just fired.
    pub fn mark(&self, idx: usize) {
        if let Ok(mut fired) = self.fired_at.lock() {
            fired[idx] = Some(Instant::now());
        }
    }
}

/// Session accounting, reported at shutdown.
#[derive(Debug)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub cycles: u32,
    pub engagements: u32,
    pub loot: u32,
    pub heals: u32,
    pub stalls: u32,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            cycles: 0,
            engagements: 0,
            loot: 0,
            heals: 0,
            stalls: 0,
        }
    }
}

/// The arbitration loop. Owns the engine, the route cursor, the healing
/// clocks, and the session stats — the only mutable state in the agent.
pub struct Orchestrator {
    engine: Engine,
    healer: Healer,
    cursor: RouteCursor,
    stats: SessionStats,
    max_cycles: Option<u32>,
}

impl Orchestrator {
    pub fn new(engine: Engine, max_cycles: Option<u32>) -> Self {
        let healer = Healer::new(engine.cfg.healing.clone());
        Self {
            engine,
            healer,
            cursor: RouteCursor::new(),
            stats: SessionStats::new(),
            max_cycles,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Drive the agent until the cycle bound is reached. Runs forever
    /// when no bound is configured; the caller cancels via its signal
    /// handling and then runs [`Orchestrator::finish`].
    pub async fn run(&mut self) -> Result<(), AgentError> {
        self.engine.cfg.route.validate()?;
        let route_len = self.engine.cfg.route.len();
        info!(
            "starting: {} waypoints, {} enemy kinds, healing {}",
            route_len,
            self.engine.cfg.combat.enemies.len(),
            if self.engine.cfg.healing.enabled {
                "on"
            } else {
                "off"
            }
        );

        loop {
            // Arbitrate in priority order: enemy, then healing.
            let interrupt = {
                let watch = Watch {
                    engine: &self.engine,
                    healer: &self.healer,
                };
                watch.check().await
            };

            match interrupt {
                Some(Interrupt::Enemy(det)) => {
                    info!("preempting for combat ('{}' visible)", det.label);
                    let mut combat = CombatTask::new(&self.engine);
                    let outcome = combat.run().await;
                    self.stats.engagements += combat.engagements;
                    self.stats.loot += combat.loot_collected;
                    debug!("combat done ({:?}), resuming suspended step", outcome);
                    continue;
                }
                Some(Interrupt::Health(state)) => {
                    self.heal(state).await;
                    continue;
                }
                None => {}
            }

            // Drive the active task one step.
            let outcome = {
                let watch = Watch {
                    engine: &self.engine,
                    healer: &self.healer,
                };
                let waypoint = self
                    .engine
                    .cfg
                    .route
                    .get(self.cursor.index)
                    .expect("route cursor in bounds");
                let mut step = WaypointTask::new(&self.engine, &watch, waypoint);
                debug!(
                    "driving {:?} step at waypoint '{}'",
                    step.kind(),
                    waypoint.label
                );
                step.run().await
            };

            match outcome {
                Outcome::Completed(_) | Outcome::Failed => {
                    if outcome == Outcome::Failed {
                        self.stats.stalls += 1;
                    }
                    if self.cursor.advance(route_len) {
                        self.stats.cycles += 1;
                        info!("route cycle {} complete", self.stats.cycles);
                        if let Some(max) = self.max_cycles {
                            if self.stats.cycles >= max {
                                info!("cycle bound reached");
                                return Ok(());
                            }
                        }
                    }
                }
                // The interrupt is still observable; the next arbitration
                // pass dispatches it and the step restarts from search.
                Outcome::Interrupted => {}
            }
        }
    }

    /// Issue the configured healing action once, then continue.
    async fn heal(&mut self, state: HealthState) {
        let Some(idx) = self.healer.due_rule(state) else {
            return;
        };
        let rule = self.healer.rule(idx).clone();
        info!("health {:?}, pressing '{}'", state, rule.key);
        if self.engine.press_key(&rule.key).await {
            self.healer.mark(idx);
            self.stats.heals += 1;
        } else {
            warn!("healing key press not acknowledged");
        }
        tokio::time::sleep(POST_HEAL_PAUSE).await;
    }

    /// Deterministic unwind: return the device to idle and report the
    /// session, whether the run ended by bound or by operator cancel.
    /// The device must never be left mid-gesture.
    pub async fn finish(&self) {
        self.engine.link.set_busy(false).await;
        self.engine.link.shutdown().await;

        let elapsed = Utc::now().signed_duration_since(self.stats.started_at);
        info!(
            "session over after {}s: {} cycles, {} engagements, {} loot, {} heals, {} stalls",
            elapsed.num_seconds(),
            self.stats.cycles,
            self.stats.engagements,
            self.stats.loot,
            self.stats.heals,
            self.stats.stalls
        );
    }
}
