//! Combat: per-target engagement from detection to loot.
//!
//! State machine per engagement:
//!
//! ```text
//! Scan ─(no target twice)→ Idle
//! Scan → Detected → EngageCheck ─(already engaged)→ AwaitResolution
//!                        └─(not engaged)→ Strike → script or wait → AwaitResolution
//! AwaitResolution → PostKill → LootPhase → Scan
//! ```
//!
//! Resolution is watched through the per-label battle indicator: a border
//! effect distinct from the target sprite. Disappearance after a
//! confirmed appearance means the exchange is over. If the appearance is
//! never confirmed, a fixed safety delay fires deterministically so the
//! loop cannot hang on a missed frame.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cavebot_core::error::AgentError;
use cavebot_core::config::StrikeScript;
use cavebot_core::model::{ClickKind, Detection, Label, Outcome, TaskKind};
use tracing::{debug, info, warn};

use crate::actions::Engine;
use crate::tasks::loot::strategy_for;
use crate::tasks::Task;

/// Pause between post-kill key presses.
const POST_KILL_PAUSE: Duration = Duration::from_millis(100);

/// How one resolution wait ended. Only used for logging; every variant
/// progresses the state machine.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Resolved,
    Fallback,
    TimedOut,
}

/// One combat activation: engages targets until the area scans clean.
pub struct CombatTask<'a> {
    engine: &'a Engine,
    pub engagements: u32,
    pub loot_collected: u32,
}

impl<'a> CombatTask<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            engagements: 0,
            loot_collected: 0,
        }
    }

    /// Single-shot scan for the highest-priority visible target.
    ///
    /// Labels are checked in descending per-label priority (stable
    /// configuration order breaks ties), so the first hit wins.
    async fn scan(&self) -> Option<Detection> {
        let cfg = &self.engine.cfg;
        for spec in cfg.combat.enemies_by_priority() {
            if let Some(pos) = self
                .engine
                .vision
                .locate_once(&spec.label, cfg.vision.interrupt_confidence, false)
                .await
            {
                return Some(Detection {
                    label: spec.label.clone(),
                    pos,
                    confidence: cfg.vision.interrupt_confidence,
                });
            }
        }
        None
    }

    /// Is any battle indicator currently visible?
    async fn any_battle_visible(&self) -> bool {
        let cfg = &self.engine.cfg;
        for spec in &cfg.combat.enemies {
            if self
                .engine
                .vision
                .locate_once(&spec.battle, cfg.combat.battle_confidence, false)
                .await
                .is_some()
            {
                return true;
            }
        }
        false
    }

    /// Run one engagement. Returns `false` when the target had to be
    /// abandoned (strike never landed).
    async fn engage(&mut self, det: Detection) -> bool {
        let combat = &self.engine.cfg.combat;
        let Some(spec) = self.engine.cfg.enemy(&det.label) else {
            warn!("scan produced unconfigured label '{}'", det.label);
            return false;
        };

        info!("target '{}' at {}", det.label, det.pos);

        if self.any_battle_visible().await {
            // Already engaged: only wait the exchange out.
            debug!("already engaged, awaiting resolution");
            self.await_resolution(&spec.battle, true).await;
        } else {
            let mut struck = false;
            for attempt in 1..=combat.strike_retries + 1 {
                if self.engine.click_at(det.pos, ClickKind::Left).await {
                    struck = true;
                    break;
                }
                warn!(
                    "strike on '{}' failed (attempt {}/{})",
                    det.label,
                    attempt,
                    combat.strike_retries + 1
                );
            }
            if !struck {
                warn!("abandoning '{}' for this cycle", det.label);
                return false;
            }
            self.engine.recenter().await;

            if let Some(script) = combat.overrides.get(det.label.as_str()) {
                self.run_script(&det.label, script).await;
            } else {
                self.await_resolution(&spec.battle, false).await;
            }
        }

        self.post_kill().await;

        let strategy = strategy_for(&self.engine.cfg.loot.mode);
        let picked = strategy.collect(self.engine).await;
        debug!("loot strategy '{}' picked {}", strategy.name(), picked);
        self.loot_collected += picked;

        true
    }

    /// Poll the battle indicator until the exchange resolves.
    ///
    /// `confirmed` starts true when the engage check already saw the
    /// indicator. An unconfirmed engagement gets one lowest-confidence
    /// re-check after the confirm window, then the fixed safety delay —
    /// the fallback fires deterministically to guarantee liveness.
    async fn await_resolution(&self, battle: &Label, mut confirmed: bool) -> Resolution {
        let combat = &self.engine.cfg.combat;
        let start = Instant::now();
        let deadline = start + Duration::from_millis(combat.resolve_timeout_ms);

        loop {
            let visible = self
                .engine
                .vision
                .locate_once(battle, combat.battle_confidence, false)
                .await
                .is_some();

            if visible && !confirmed {
                confirmed = true;
                debug!("engagement confirmed after {:?}", start.elapsed());
            } else if !visible && confirmed {
                debug!("engagement resolved after {:?}", start.elapsed());
                return Resolution::Resolved;
            } else if !visible
                && !confirmed
                && start.elapsed() >= Duration::from_millis(combat.confirm_window_ms)
            {
                if self
                    .engine
                    .vision
                    .locate_once(battle, combat.battle_floor_confidence, false)
                    .await
                    .is_some()
                {
                    confirmed = true;
                    continue;
                }
                warn!("{}", AgentError::liveness_fallback(battle.as_str()));
                tokio::time::sleep(Duration::from_millis(combat.fallback_delay_ms)).await;
                return Resolution::Fallback;
            }

            if Instant::now() >= deadline {
                warn!("resolution wait for '{}' hit the hard timeout", battle);
                return Resolution::TimedOut;
            }
            tokio::time::sleep(Duration::from_millis(combat.engage_poll_ms)).await;
        }
    }

    /// Scripted strike: timed repeated key presses instead of a passive
    /// wait, for labels that need an active special attack.
    async fn run_script(&self, label: &Label, script: &StrikeScript) {
        info!(
            "scripted strike for '{}': key '{}' every {}ms for {}ms",
            label, script.key, script.interval_ms, script.duration_ms
        );
        let start = Instant::now();
        let duration = Duration::from_millis(script.duration_ms);
        let interval = Duration::from_millis(script.interval_ms);

        loop {
            self.engine.press_key(&script.key).await;
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            tokio::time::sleep(interval.min(duration - elapsed)).await;
            if start.elapsed() >= duration {
                break;
            }
        }
    }

    /// Fixed post-kill key sequence. Not user-significant logic, but the
    /// trigger timing must be reproduced exactly.
    async fn post_kill(&self) {
        let combat = &self.engine.cfg.combat;
        for _ in 0..combat.post_kill_repeat {
            self.engine.press_key(&combat.post_kill_key).await;
            tokio::time::sleep(POST_KILL_PAUSE).await;
        }
    }
}

#[async_trait]
impl Task for CombatTask<'_> {
    fn kind(&self) -> TaskKind {
        TaskKind::Combat
    }

    fn attempts(&self) -> u32 {
        self.engagements
    }

    fn max_attempts(&self) -> u32 {
        self.engine.cfg.combat.max_engagements
    }

    async fn run(&mut self) -> Outcome {
        let combat = &self.engine.cfg.combat;
        let mut empty_scans = 0;

        loop {
            if self.engagements >= combat.max_engagements {
                info!("engagement cap reached ({})", combat.max_engagements);
                break;
            }

            match self.scan().await {
                Some(det) => {
                    empty_scans = 0;
                    if self.engage(det).await {
                        self.engagements += 1;
                    }
                }
                None => {
                    empty_scans += 1;
                    debug!("no targets ({}/{})", empty_scans, combat.idle_scans);
                    if empty_scans >= combat.idle_scans {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(combat.scan_gap_ms)).await;
                }
            }
        }

        info!("area clean, {} engagements", self.engagements);
        Outcome::Completed(self.engagements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{test_config, FakeWorld};
    use cavebot_core::config::{AgentConfig, EnemySpec, LootMode};
    use cavebot_core::geom::Position;

    fn combat_cfg() -> AgentConfig {
        let mut cfg = test_config();
        cfg.combat.enemies = vec![
            EnemySpec {
                label: Label::from("witch"),
                priority: 3,
                battle: Label::from("battle_witch"),
            },
            EnemySpec {
                label: Label::from("amazon"),
                priority: 1,
                battle: Label::from("battle_amazon"),
            },
        ];
        cfg
    }

    #[tokio::test]
    async fn test_idle_after_two_empty_scans() {
        let world = FakeWorld::new();
        let engine = world.engine(combat_cfg());

        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(0));
        assert!(world.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_full_engagement_strike_resolve_postkill() {
        let world = FakeWorld::new();
        world.set_battle_duration(Duration::from_millis(80));
        world.add_enemy("amazon", Position::new(300, 250), 0.9);
        let engine = world.engine(combat_cfg());

        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(1));

        // Struck with a left click on the target.
        let clicks = world.clicks();
        assert_eq!(clicks[0], (Position::new(300, 250), "CL".to_string()));
        // Post-kill key fired once.
        assert_eq!(world.keys(), vec!["9".to_string()]);
    }

    #[tokio::test]
    async fn test_higher_priority_target_struck_first() {
        let world = FakeWorld::new();
        world.set_battle_duration(Duration::from_millis(40));
        world.add_enemy("amazon", Position::new(100, 100), 0.9);
        world.add_enemy("witch", Position::new(400, 120), 0.9);
        let engine = world.engine(combat_cfg());

        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(2));
        assert_eq!(
            world.clicks()[0].0,
            Position::new(400, 120),
            "witch outranks amazon"
        );
    }

    #[tokio::test]
    async fn test_scripted_override_presses_special_key() {
        let world = FakeWorld::new();
        world.set_battle_duration(Duration::from_millis(40));
        world.add_enemy("witch", Position::new(200, 200), 0.9);

        let mut cfg = combat_cfg();
        cfg.combat.overrides.insert(
            "witch".to_string(),
            StrikeScript {
                key: "2".to_string(),
                interval_ms: 30,
                duration_ms: 100,
            },
        );
        let engine = world.engine(cfg);

        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(1));

        let keys = world.keys();
        let specials = keys.iter().filter(|k| *k == "2").count();
        assert_eq!(specials, 4, "key every 30ms across 100ms");
        assert!(keys.contains(&"9".to_string()), "post-kill still runs");
    }

    #[tokio::test]
    async fn test_liveness_fallback_fires_when_battle_never_confirms() {
        let world = FakeWorld::new();
        // Battle indicator never appears after the strike.
        world.set_battle_duration(Duration::ZERO);
        world.add_enemy("amazon", Position::new(150, 150), 0.9);
        let engine = world.engine(combat_cfg());

        let start = Instant::now();
        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(1));

        // confirm window + safety delay must both have elapsed: the
        // fallback is deterministic, not best-effort.
        assert!(start.elapsed() >= Duration::from_millis(150 + 100));
        assert_eq!(world.keys(), vec!["9".to_string()]);
    }

    #[tokio::test]
    async fn test_already_engaged_waits_before_striking_again() {
        let world = FakeWorld::new();
        world.set_battle_duration(Duration::from_millis(50));
        world.add_enemy("amazon", Position::new(220, 220), 0.9);
        world.force_battle("battle_amazon", Duration::from_millis(60), Position::new(220, 220));
        let engine = world.engine(combat_cfg());

        let mut task = CombatTask::new(&engine);
        let outcome = task.run().await;

        // First engagement is the pre-existing battle (no click), the
        // second strikes the still-alive target.
        assert_eq!(outcome, Outcome::Completed(2));
        let clicks = world.clicks();
        assert_eq!(clicks.len(), 1, "only the second engagement clicks");
    }

    #[tokio::test]
    async fn test_loot_phase_runs_after_each_kill() {
        let world = FakeWorld::new();
        world.set_battle_duration(Duration::from_millis(40));
        world.add_enemy("amazon", Position::new(100, 100), 0.9);
        world.add_entity("loot1", Position::new(110, 105), 0.9);

        let mut cfg = combat_cfg();
        cfg.loot.labels = vec![Label::from("loot1")];
        cfg.loot.mode = LootMode::FirstFound;
        let engine = world.engine(cfg);

        let mut task = CombatTask::new(&engine);
        assert_eq!(task.run().await, Outcome::Completed(1));
        assert_eq!(task.loot_collected, 1);

        let clicks = world.clicks();
        assert_eq!(clicks.len(), 2);
        assert_eq!(clicks[1].1, "CR", "loot pick is a right click");
    }
}
