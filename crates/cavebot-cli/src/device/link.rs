//! The command/acknowledgement protocol on top of the transport.
//!
//! One logical action is one frame, acknowledged by the device. A frame
//! is written at most `retries + 1` times: stale input is cleared, the
//! frame goes out, and the link waits up to the acknowledgement timeout
//! for a recognized response. An explicit `ERR` is a recognized answer
//! and aborts the action immediately; silence and unrecognized content
//! trigger a retry after a short backoff. An exhausted budget surfaces as
//! `Ack::Timeout` to the caller, never as a fatal condition.

use std::time::{Duration, Instant};

use cavebot_core::config::DeviceConfig;
use cavebot_core::error::AgentError;
use cavebot_core::geom::Position;
use cavebot_core::model::ClickKind;
use cavebot_core::wire::{is_ready_token, Ack, CommandFrame};
use tracing::{debug, info, warn};

use crate::device::transport::Transport;

/// Reliable command channel to the input-injection device. Holds no
/// business logic.
pub struct DeviceLink {
    transport: Box<dyn Transport>,
    cfg: DeviceConfig,
}

impl DeviceLink {
    pub fn new(transport: Box<dyn Transport>, cfg: DeviceConfig) -> Self {
        Self { transport, cfg }
    }

    /// Block until the device announces readiness after (re)connection.
    ///
    /// This is the startup gate: a device that never reports ready is the
    /// one condition the agent treats as fatal.
    pub async fn await_ready(&self) -> Result<(), AgentError> {
        let budget = Duration::from_millis(self.cfg.ready_timeout_ms);
        let deadline = Instant::now() + budget;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AgentError::device_unavailable(
                    &self.cfg.port,
                    format!("no readiness sentinel within {:?}", budget),
                ));
            }
            match self.transport.recv_line(remaining).await {
                Ok(Some(line)) if is_ready_token(&line) => {
                    info!("device ready on {}", self.cfg.port);
                    return Ok(());
                }
                Ok(Some(line)) => {
                    debug!("ignoring pre-ready line: {:?}", line);
                }
                Ok(None) => {} // deadline check handles it
                Err(e) => {
                    return Err(AgentError::device_unavailable(&self.cfg.port, e));
                }
            }
        }
    }

    /// Send one frame and wait for its acknowledgement.
    pub async fn send(&self, frame: &CommandFrame) -> Ack {
        let line = frame.encode();
        let attempts = self.cfg.retries + 1;

        for attempt in 1..=attempts {
            self.transport.clear_input().await;

            if let Err(e) = self.transport.send_line(&line).await {
                warn!("write failed for '{}': {}", line, e);
            } else if let Some(ack) = self.wait_for_ack(frame).await {
                return ack;
            }

            if attempt < attempts {
                debug!("no ack for '{}' (attempt {}/{}), retrying", line, attempt, attempts);
                tokio::time::sleep(Duration::from_millis(self.cfg.retry_backoff_ms)).await;
            }
        }

        warn!("{}", AgentError::device_timeout(frame.verb(), attempts));
        Ack::Timeout
    }

    /// Wait one acknowledgement window for a recognized response.
    ///
    /// Returns `None` when the window elapses with nothing recognized
    /// (the caller retries the whole send).
    async fn wait_for_ack(&self, frame: &CommandFrame) -> Option<Ack> {
        let deadline = Instant::now() + Duration::from_millis(self.cfg.ack_timeout_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.transport.recv_line(remaining).await {
                Ok(Some(resp)) => match Ack::parse(&resp) {
                    Some(Ack::Ok) => return Some(Ack::Ok),
                    Some(Ack::Err(reason)) => {
                        warn!("{}", AgentError::device_error(frame.verb(), &reason));
                        return Some(Ack::Err(reason));
                    }
                    _ => {
                        debug!("ignoring unrecognized device line: {:?}", resp);
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!("device channel failed mid-ack: {}", e);
                    return None;
                }
            }
        }
    }

    /// Relative cursor move, clamped to the one-byte wire range.
    pub async fn move_rel(&self, dx: i32, dy: i32) -> Ack {
        self.send(&CommandFrame::move_rel(dx, dy)).await
    }

    /// Re-sync the device's absolute cursor estimate (no motion).
    pub async fn move_abs_sync(&self, pos: Position) -> Ack {
        self.send(&CommandFrame::move_abs(pos)).await
    }

    pub async fn click(&self, kind: ClickKind) -> Ack {
        self.send(&CommandFrame::click(kind)).await
    }

    pub async fn press_key(&self, key: &str) -> Result<Ack, AgentError> {
        Ok(self.send(&CommandFrame::key(key)?).await)
    }

    pub async fn press_combo(&self, mods: &str, key: &str) -> Result<Ack, AgentError> {
        Ok(self.send(&CommandFrame::chord(mods, key)?).await)
    }

    pub async fn type_text(&self, text: &str) -> Result<Ack, AgentError> {
        Ok(self.send(&CommandFrame::type_text(text)?).await)
    }

    pub async fn set_busy(&self, on: bool) -> Ack {
        self.send(&CommandFrame::busy(on)).await
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}
