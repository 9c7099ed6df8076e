//! Agent configuration.
//!
//! Everything tunable lives in one immutable [`AgentConfig`] deserialized
//! from a JSON file and injected into the orchestrator and tasks at
//! construction. There are no ambient globals: two game areas differ only
//! by the config file they load (route, label tables, per-label
//! overrides), never by code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;
use crate::error::AgentError;
use crate::geom::Region;
use crate::model::{HealthState, Label};
use crate::route::{Route, Waypoint};

/// Serial device settings and the acknowledgement retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Path to the serial device node.
    pub port: String,
    pub baud: u32,
    /// Window for the readiness sentinel after (re)connection.
    pub ready_timeout_ms: u64,
    /// Window for one acknowledgement.
    pub ack_timeout_ms: u64,
    /// Extra send attempts after the first (total writes = retries + 1).
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            ready_timeout_ms: 2_000,
            ack_timeout_ms: 1_200,
            retries: 2,
            retry_backoff_ms: 100,
        }
    }
}

/// One strictness level of the confidence cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeLevel {
    pub confidence: f32,
    #[serde(default)]
    pub grayscale: bool,
}

/// Matcher subprocess settings and detection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Matcher command line (argv). The process speaks the JSON-line
    /// protocol on stdin/stdout.
    pub command: Vec<String>,
    pub request_timeout_ms: u64,
    /// Strictness levels tried in order within one polling tick.
    pub cascade: Vec<CascadeLevel>,
    /// Single-shot confidence for live interrupt checks, which must stay
    /// cheap and never cascade.
    pub interrupt_confidence: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            command: vec!["cavebot-matcher".to_string()],
            request_timeout_ms: 2_000,
            cascade: vec![
                CascadeLevel {
                    confidence: 0.8,
                    grayscale: false,
                },
                CascadeLevel {
                    confidence: 0.7,
                    grayscale: false,
                },
                CascadeLevel {
                    confidence: 0.7,
                    grayscale: true,
                },
            ],
            interrupt_confidence: 0.6,
        }
    }
}

/// Closed-loop cursor movement tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    /// Maximum per-tick step magnitude. Absolute jumps are deliberately
    /// avoided; the device only ever receives bounded relative steps.
    pub step_cap: i32,
    /// Pause between steps.
    pub pause_ms: u64,
    /// Settle pause between reaching a target and clicking.
    pub settle_ms: u64,
    /// Deadline for one closed-loop move.
    pub move_timeout_ms: u64,
    /// Consecutive unchanged ticks before stuck recovery kicks in.
    pub stuck_ticks: u32,
    /// Park the cursor at screen center after significant clicks so it
    /// never occludes the next search.
    pub recenter_after_click: bool,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            step_cap: 12,
            pause_ms: 16,
            settle_ms: 50,
            move_timeout_ms: 6_000,
            stuck_ticks: 4,
            recenter_after_click: true,
        }
    }
}

/// One engageable target kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySpec {
    pub label: Label,
    /// Per-label rank; higher wins when several targets are visible.
    pub priority: u8,
    /// Battle indicator shown while engaged with this target kind.
    pub battle: Label,
}

/// Scripted strike override: timed repeated key presses instead of a
/// passive wait, for targets that need an active special attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeScript {
    pub key: String,
    pub interval_ms: u64,
    pub duration_ms: u64,
}

/// Combat task tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub enemies: Vec<EnemySpec>,
    /// Per-label strike overrides, keyed by enemy label.
    pub overrides: BTreeMap<String, StrikeScript>,
    /// Gap between empty scans while winding down.
    pub scan_gap_ms: u64,
    /// Consecutive empty scans before the task reports idle. Two scans
    /// debounce single-frame misses.
    pub idle_scans: u32,
    /// Bounded re-clicks before a target is abandoned for this cycle.
    pub strike_retries: u32,
    /// Battle indicator poll interval.
    pub engage_poll_ms: u64,
    /// Confidence for battle indicator polls. Indicators are noisy
    /// border effects, so this sits well below template confidence.
    pub battle_confidence: f32,
    /// Last-resort confidence for the one extra confirmation re-check.
    pub battle_floor_confidence: f32,
    /// Window for the engagement to become visually confirmed.
    pub confirm_window_ms: u64,
    /// Fixed safety delay when the engagement never confirms.
    pub fallback_delay_ms: u64,
    /// Hard cap on one resolution wait.
    pub resolve_timeout_ms: u64,
    pub post_kill_key: String,
    pub post_kill_repeat: u32,
    /// Upper bound on engagements per combat activation.
    pub max_engagements: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            enemies: Vec::new(),
            overrides: BTreeMap::new(),
            scan_gap_ms: 500,
            idle_scans: 2,
            strike_retries: 2,
            engage_poll_ms: 50,
            battle_confidence: 0.5,
            battle_floor_confidence: 0.4,
            confirm_window_ms: 2_000,
            fallback_delay_ms: 3_000,
            resolve_timeout_ms: 15_000,
            post_kill_key: "9".to_string(),
            post_kill_repeat: 1,
            max_engagements: 10,
        }
    }
}

impl CombatConfig {
    /// Enemy specs sorted by descending per-label priority. The sort is
    /// stable, so configuration order breaks ties.
    pub fn enemies_by_priority(&self) -> Vec<&EnemySpec> {
        let mut sorted: Vec<&EnemySpec> = self.enemies.iter().collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted
    }
}

/// Loot collection strategy. A configuration choice, not runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LootMode {
    /// Single pick of the first detection.
    FirstFound,
    /// Merge detections closer than `min_distance` pixels, one pick each.
    Clustered { min_distance: f64 },
    /// Fixed passes at a decreasing confidence schedule, collecting
    /// everything found per pass.
    Sweep { passes: Vec<f32> },
}

/// Loot phase tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootConfig {
    pub labels: Vec<Label>,
    pub mode: LootMode,
    /// Wait for loot markers to render after a kill.
    pub appear_delay_ms: u64,
    pub between_picks_ms: u64,
    pub confidence: f32,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            mode: LootMode::FirstFound,
            appear_delay_ms: 600,
            between_picks_ms: 250,
            confidence: 0.6,
        }
    }
}

/// One healing trigger: when the classifier reports `trigger`, press
/// `key`, then hold off for the cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingRule {
    pub trigger: HealthState,
    pub key: String,
    pub cooldown_ms: u64,
}

/// Health monitoring and healing actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub enabled: bool,
    /// Screen region of the health bar.
    pub region: Region,
    /// Rules checked in order; the first match with an elapsed cooldown
    /// fires, once per arbitration pass.
    pub rules: Vec<HealingRule>,
    pub classifier: ClassifierConfig,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            region: Region::new(9, 7, 497, 7),
            rules: vec![HealingRule {
                trigger: HealthState::Medium,
                key: "3".to_string(),
                cooldown_ms: 1_000,
            }],
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Navigation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Decreasing confidence schedule for waypoint search attempts.
    pub confidence_schedule: Vec<f32>,
    /// Attempt budget per waypoint step (search + dwell restarts).
    pub attempts: u32,
    /// Polling budget for one search attempt.
    pub search_timeout_ms: u64,
    pub search_poll_ms: u64,
    /// Fixed factor applied to every waypoint dwell.
    pub dwell_scale: f32,
    /// Interrupt-check interval inside the monitored dwell.
    pub dwell_tick_ms: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            confidence_schedule: vec![0.8, 0.7],
            attempts: 5,
            search_timeout_ms: 5_000,
            search_poll_ms: 150,
            dwell_scale: 0.55,
            dwell_tick_ms: 50,
        }
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub device: DeviceConfig,
    pub vision: VisionConfig,
    pub mouse: MouseConfig,
    pub combat: CombatConfig,
    pub loot: LootConfig,
    pub healing: HealingConfig,
    pub nav: NavConfig,
    pub route: Route,
}

impl AgentConfig {
    /// Parse a configuration document and validate it.
    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let cfg: AgentConfig = serde_json::from_str(json)
            .map_err(|e| AgentError::config(format!("invalid config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cross-field validation beyond what serde can express.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.route.validate()?;
        if self.vision.cascade.is_empty() {
            return Err(AgentError::config("vision.cascade must not be empty"));
        }
        if self.nav.confidence_schedule.is_empty() {
            return Err(AgentError::config(
                "nav.confidence_schedule must not be empty",
            ));
        }
        if self.mouse.step_cap < 1 {
            return Err(AgentError::config("mouse.step_cap must be at least 1"));
        }
        if let LootMode::Sweep { passes } = &self.loot.mode {
            if passes.is_empty() {
                return Err(AgentError::config("loot sweep needs at least one pass"));
            }
        }
        for spec in &self.combat.enemies {
            if spec.label.as_str().is_empty() {
                return Err(AgentError::config("enemy label must not be empty"));
            }
        }
        if self.healing.enabled && self.healing.rules.is_empty() {
            return Err(AgentError::config(
                "healing.enabled requires at least one rule",
            ));
        }
        Ok(())
    }

    /// A complete, runnable example configuration: three enemy kinds with
    /// one scripted override, clustered looting, and a short two-level
    /// route. Printed by `cavebot sample-config`.
    pub fn sample() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "witch".to_string(),
            StrikeScript {
                key: "2".to_string(),
                interval_ms: 2_200,
                duration_ms: 7_000,
            },
        );
        Self {
            combat: CombatConfig {
                enemies: vec![
                    EnemySpec {
                        label: Label::from("witch"),
                        priority: 3,
                        battle: Label::from("battle_witch"),
                    },
                    EnemySpec {
                        label: Label::from("valkyrie"),
                        priority: 2,
                        battle: Label::from("battle_valkyrie"),
                    },
                    EnemySpec {
                        label: Label::from("amazon"),
                        priority: 1,
                        battle: Label::from("battle_amazon"),
                    },
                ],
                overrides,
                ..CombatConfig::default()
            },
            loot: LootConfig {
                labels: vec![
                    Label::from("loot1"),
                    Label::from("loot2"),
                    Label::from("loot3"),
                ],
                mode: LootMode::Clustered { min_distance: 50.0 },
                ..LootConfig::default()
            },
            healing: HealingConfig {
                enabled: true,
                ..HealingConfig::default()
            },
            route: Route::new(vec![
                Waypoint::new("am_a1", 0.0),
                Waypoint::new("am_a2", 5.0),
                Waypoint::new("am_a3", 5.0),
                Waypoint::new("am_s1", 5.0),
                Waypoint::new("am_s2", 5.0),
                Waypoint::new("subida1", 5.0).with_click(crate::model::ClickKind::Right),
            ]),
            ..AgentConfig::default()
        }
    }

    /// Look up the enemy spec for a label.
    pub fn enemy(&self, label: &Label) -> Option<&EnemySpec> {
        self.combat.enemies.iter().find(|e| &e.label == label)
    }
}
