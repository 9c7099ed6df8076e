//! Protocol types for talking to the external matcher process.
//!
//! Template matching and screenshots are an external collaborator: a
//! matcher subprocess owns the capture pipeline and the template assets.
//! The agent speaks newline-delimited JSON to it — one request object per
//! line, one response object per line, correlated by id.

use serde::{Deserialize, Serialize};

use crate::geom::{Position, Region};

/// A request from the agent to the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRequest {
    pub id: String,
    pub query: VisionQuery,
}

/// Queries the matcher can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VisionQuery {
    /// Locate the best match for a template, or nothing.
    Locate {
        template: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        region: Option<Region>,
        confidence: f32,
        #[serde(default)]
        grayscale: bool,
    },
    /// Locate every match for a template.
    LocateAll {
        template: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        region: Option<Region>,
        confidence: f32,
    },
    /// Capture raw pixels from a screen region.
    Screenshot { region: Region },
    /// Current pointer position.
    Cursor,
    /// Full screen dimensions.
    ScreenSize,
}

/// A response from the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionResponse {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<VisionData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VisionResponse {
    pub fn success(id: impl Into<String>, data: VisionData) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Response payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisionData {
    /// Best template match. "Not found" is a normal payload, not an error.
    Match {
        #[serde(skip_serializing_if = "Option::is_none")]
        pos: Option<Position>,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    /// All matches for a template.
    Matches { points: Vec<Position> },
    /// Raw RGB pixels, row-major, three bytes per pixel.
    Pixels { width: u32, height: u32, rgb: Vec<u8> },
    /// Pointer position.
    Cursor { pos: Position },
    /// Screen dimensions.
    Size { width: u32, height: u32 },
}
