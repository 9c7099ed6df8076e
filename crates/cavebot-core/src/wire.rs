//! Device wire protocol: command frames and acknowledgement parsing.
//!
//! The input-injection device speaks an ASCII, newline-terminated line
//! protocol. The host writes one command frame per line and expects a
//! single-line acknowledgement (`OK` or `ERR:<reason>`) for every frame.
//! On (re)connection the device announces itself with a readiness
//! sentinel before accepting commands.
//!
//! Several verbs have device-side aliases (`M`/`R`, `C`/`CL`,
//! `K`/`KE`/`KT`); the host always emits one canonical spelling.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::geom::{clamp, Position};
use crate::model::ClickKind;

/// Relative move components are transported in a single signed byte.
pub const MOVE_STEP_LIMIT: i32 = 127;

/// A single command line sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    verb: &'static str,
    args: Vec<String>,
}

impl CommandFrame {
    /// Relative cursor move. Components are clamped to the one-byte wire
    /// limit; callers stepping further must issue multiple frames.
    pub fn move_rel(dx: i32, dy: i32) -> Self {
        Self {
            verb: "M",
            args: vec![
                clamp(dx, -MOVE_STEP_LIMIT, MOVE_STEP_LIMIT).to_string(),
                clamp(dy, -MOVE_STEP_LIMIT, MOVE_STEP_LIMIT).to_string(),
            ],
        }
    }

    /// Absolute cursor re-sync. The device does not perform this motion;
    /// it only updates its internal cursor estimate.
    pub fn move_abs(pos: Position) -> Self {
        Self {
            verb: "MA",
            args: vec![pos.x.to_string(), pos.y.to_string()],
        }
    }

    pub fn click(kind: ClickKind) -> Self {
        let verb = match kind {
            ClickKind::Left => "CL",
            ClickKind::Right => "CR",
            ClickKind::Middle => "CM",
            ClickKind::Double => "CD",
        };
        Self { verb, args: vec![] }
    }

    /// Press a named key (`ENTER`, `F1`, `3`, ...).
    pub fn key(key: &str) -> Result<Self, AgentError> {
        if key.is_empty() || key.chars().any(|c| c.is_whitespace()) {
            return Err(AgentError::invalid_input(format!(
                "key name '{}' must be a single non-empty token",
                key
            )));
        }
        Ok(Self {
            verb: "K",
            args: vec![key.to_string()],
        })
    }

    /// Press a modifier chord, e.g. `CTRL` + `a`.
    pub fn chord(mods: &str, key: &str) -> Result<Self, AgentError> {
        for part in [mods, key] {
            if part.is_empty() || part.chars().any(|c| c.is_whitespace()) {
                return Err(AgentError::invalid_input(format!(
                    "chord token '{}' must be a single non-empty token",
                    part
                )));
            }
        }
        Ok(Self {
            verb: "P",
            args: vec![mods.to_string(), key.to_string()],
        })
    }

    /// Type literal text. The wire is ASCII and line-framed, so the text
    /// must be printable ASCII with no line breaks.
    pub fn type_text(text: &str) -> Result<Self, AgentError> {
        if text.is_empty() {
            return Err(AgentError::invalid_input("text must not be empty"));
        }
        if !text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
            return Err(AgentError::invalid_input(
                "text must be printable ASCII without line breaks",
            ));
        }
        Ok(Self {
            verb: "T",
            args: vec![text.to_string()],
        })
    }

    /// Toggle the device busy/idle state indicator.
    pub fn busy(on: bool) -> Self {
        Self {
            verb: if on { "B1" } else { "B0" },
            args: vec![],
        }
    }

    pub fn verb(&self) -> &'static str {
        self.verb
    }

    /// Render the frame as a wire line, without the terminating newline.
    pub fn encode(&self) -> String {
        if self.args.is_empty() {
            self.verb.to_string()
        } else {
            format!("{} {}", self.verb, self.args.join(" "))
        }
    }
}

impl std::fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Device acknowledgement for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    Ok,
    Err(String),
    /// No recognized response arrived within the retry budget.
    Timeout,
}

impl Ack {
    /// Parse one response line. Returns `None` for unrecognized content,
    /// which the link treats like silence (retry the send).
    pub fn parse(line: &str) -> Option<Ack> {
        let line = line.trim();
        if line == "OK" {
            return Some(Ack::Ok);
        }
        if let Some(rest) = line.strip_prefix("ERR") {
            let reason = rest.trim_start_matches(':').trim();
            return Some(Ack::Err(if reason.is_empty() {
                "unspecified".to_string()
            } else {
                reason.to_string()
            }));
        }
        None
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }
}

/// Check a startup line for the readiness sentinel. Some device firmware
/// revisions answer `OK` instead of `READY`.
pub fn is_ready_token(line: &str) -> bool {
    matches!(line.trim(), "READY" | "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_rel_encoding() {
        assert_eq!(CommandFrame::move_rel(5, -10).encode(), "M 5 -10");
    }

    #[test]
    fn test_move_rel_clamps_to_wire_limit() {
        assert_eq!(CommandFrame::move_rel(300, -300).encode(), "M 127 -127");
        assert_eq!(CommandFrame::move_rel(127, -128).encode(), "M 127 -127");
    }

    #[test]
    fn test_move_abs_encoding() {
        let frame = CommandFrame::move_abs(Position::new(640, 360));
        assert_eq!(frame.encode(), "MA 640 360");
    }

    #[test]
    fn test_click_verbs() {
        assert_eq!(CommandFrame::click(ClickKind::Left).encode(), "CL");
        assert_eq!(CommandFrame::click(ClickKind::Right).encode(), "CR");
        assert_eq!(CommandFrame::click(ClickKind::Middle).encode(), "CM");
        assert_eq!(CommandFrame::click(ClickKind::Double).encode(), "CD");
    }

    #[test]
    fn test_key_and_chord() {
        assert_eq!(CommandFrame::key("F1").unwrap().encode(), "K F1");
        assert_eq!(
            CommandFrame::chord("CTRL", "a").unwrap().encode(),
            "P CTRL a"
        );
        assert!(CommandFrame::key("").is_err());
        assert!(CommandFrame::key("two words").is_err());
        assert!(CommandFrame::chord("CTRL", "bad key").is_err());
    }

    #[test]
    fn test_type_text() {
        assert_eq!(
            CommandFrame::type_text("hello world").unwrap().encode(),
            "T hello world"
        );
        assert!(CommandFrame::type_text("").is_err());
        assert!(CommandFrame::type_text("line\nbreak").is_err());
        assert!(CommandFrame::type_text("caf\u{e9}").is_err());
    }

    #[test]
    fn test_busy_toggle() {
        assert_eq!(CommandFrame::busy(true).encode(), "B1");
        assert_eq!(CommandFrame::busy(false).encode(), "B0");
    }

    #[test]
    fn test_ack_parse_ok() {
        assert_eq!(Ack::parse("OK"), Some(Ack::Ok));
        assert_eq!(Ack::parse("  OK \r"), Some(Ack::Ok));
    }

    #[test]
    fn test_ack_parse_err_with_reason() {
        assert_eq!(
            Ack::parse("ERR:bad args"),
            Some(Ack::Err("bad args".to_string()))
        );
        assert_eq!(
            Ack::parse("ERR overflow"),
            Some(Ack::Err("overflow".to_string()))
        );
    }

    #[test]
    fn test_ack_parse_err_without_reason() {
        assert_eq!(Ack::parse("ERR"), Some(Ack::Err("unspecified".to_string())));
    }

    #[test]
    fn test_ack_parse_unrecognized_is_none() {
        assert_eq!(Ack::parse(""), None);
        assert_eq!(Ack::parse("READY"), None);
        assert_eq!(Ack::parse("garbage 123"), None);
    }

    #[test]
    fn test_ready_token() {
        assert!(is_ready_token("READY"));
        assert!(is_ready_token("OK\r"));
        assert!(!is_ready_token("ERR:boot"));
        assert!(!is_ready_token(""));
    }
}
