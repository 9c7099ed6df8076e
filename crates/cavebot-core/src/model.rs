//! Perception data model: labels, detections, priorities, and outcomes.

use serde::{Deserialize, Serialize};

use crate::geom::Position;

/// Opaque identifier for a perceivable entity (enemy kind, loot kind,
/// waypoint flag, battle indicator). Maps to a matcher template outside
/// the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A successful perception hit. Never cached beyond one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: Label,
    pub pos: Position,
    pub confidence: f32,
}

/// Fixed total priority order between task classes.
///
/// Declaration order is ascending so the derived `Ord` matches the
/// documented ranks: `Enemy(3) > Loot(2) > Healing(1) > Navigation(0)`.
/// Not configurable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Navigation,
    Healing,
    Loot,
    Enemy,
}

impl PriorityClass {
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// Health bucket produced by the color-ratio classifier. Recomputed each
/// poll; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Full,
    High,
    Medium,
    Low,
    Unknown,
}

/// The kind of a resumable unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Combat,
    Loot,
    Healing,
    Navigation,
}

impl TaskKind {
    pub fn priority(&self) -> PriorityClass {
        match self {
            TaskKind::Combat => PriorityClass::Enemy,
            TaskKind::Loot => PriorityClass::Loot,
            TaskKind::Healing => PriorityClass::Healing,
            TaskKind::Navigation => PriorityClass::Navigation,
        }
    }
}

/// Result of running a task to its next boundary.
///
/// `Completed` carries the number of effective actions (combats fought,
/// loot picked) for session accounting. `Interrupted` means a higher
/// priority condition fired and the task must be restarted from its
/// beginning on resumption. `Failed` is a non-fatal, logged dead end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(u32),
    Interrupted,
    Failed,
}

/// Mouse click variants supported by the injection device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickKind {
    #[default]
    Left,
    Right,
    Middle,
    Double,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_total_order() {
        use PriorityClass::*;
        assert!(Enemy > Loot);
        assert!(Loot > Healing);
        assert!(Healing > Navigation);
        // Transitivity spot checks for every pair.
        let all = [Navigation, Healing, Loot, Enemy];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j));
            }
        }
    }

    #[test]
    fn test_priority_ranks() {
        assert_eq!(PriorityClass::Navigation.rank(), 0);
        assert_eq!(PriorityClass::Healing.rank(), 1);
        assert_eq!(PriorityClass::Loot.rank(), 2);
        assert_eq!(PriorityClass::Enemy.rank(), 3);
    }

    #[test]
    fn test_task_kind_priority_mapping() {
        assert_eq!(TaskKind::Combat.priority(), PriorityClass::Enemy);
        assert_eq!(TaskKind::Navigation.priority(), PriorityClass::Navigation);
    }

    #[test]
    fn test_label_serializes_as_plain_string() {
        let label = Label::from("witch");
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"witch\"");
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }

    #[test]
    fn test_health_state_wire_names() {
        let json = serde_json::to_string(&HealthState::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
