//! Waypoints and ordered routes.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::model::{ClickKind, Label};

/// A named screen target plus a dwell duration.
///
/// Most waypoints are left-clicked map flags; ramps and stairs need a
/// right click, so the click kind is per waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub label: Label,
    /// Seconds to dwell after clicking, before any scaling.
    #[serde(default)]
    pub dwell_secs: f32,
    #[serde(default)]
    pub click: ClickKind,
}

impl Waypoint {
    pub fn new(label: impl Into<Label>, dwell_secs: f32) -> Self {
        Self {
            label: label.into(),
            dwell_secs,
            click: ClickKind::Left,
        }
    }

    pub fn with_click(mut self, click: ClickKind) -> Self {
        self.click = click;
        self
    }
}

/// An ordered sequence of waypoints. Order is significant and labels may
/// repeat (routes double back through the same flags).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    pub waypoints: Vec<Waypoint>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// A route must have at least one waypoint to drive the agent.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.is_empty() {
            return Err(AgentError::config("route must contain at least one waypoint"));
        }
        Ok(())
    }
}
