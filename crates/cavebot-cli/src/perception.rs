//! Perception port: the boundary to the external matcher, plus the
//! detection policy layered on top of it.
//!
//! The matcher (template matching, screenshots, pointer queries) is an
//! external collaborator reached as a subprocess speaking the JSON-line
//! protocol from `cavebot_core::vision`. The agent-side policy lives in
//! [`PerceptionPort`]: the confidence cascade for one-tick detections,
//! gap-spaced retry wrapping for slow-to-appear targets, and health
//! classification. "Not found" is a normal `None` return everywhere —
//! never an error path.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cavebot_core::classify::{classify, ClassifierConfig, PixelGrid};
use cavebot_core::config::VisionConfig;
use cavebot_core::error::AgentError;
use cavebot_core::geom::{Position, Region};
use cavebot_core::model::{Detection, HealthState, Label};
use cavebot_core::vision::{VisionData, VisionQuery, VisionRequest, VisionResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};
use uuid::Uuid;

/// Boundary the agent uses to read on-screen state.
///
/// Every method is a single query; retry and cascade policy belong to
/// [`PerceptionPort`], not to implementations.
#[async_trait]
pub trait Perception: Send + Sync {
    async fn locate(
        &self,
        template: &str,
        region: Option<Region>,
        confidence: f32,
        grayscale: bool,
    ) -> Option<Position>;

    async fn locate_all(
        &self,
        template: &str,
        region: Option<Region>,
        confidence: f32,
    ) -> Vec<Position>;

    async fn screenshot(&self, region: Region) -> Option<PixelGrid>;

    async fn cursor(&self) -> Option<Position>;

    async fn screen_size(&self) -> Option<(u32, u32)>;
}

/// Matcher subprocess client.
///
/// Requests are serialized one at a time (single in-flight request, the
/// control loop is single-threaded anyway) and correlated by id so a
/// stale response from an aborted wait cannot satisfy a later query.
pub struct VisionClient {
    io: tokio::sync::Mutex<ClientIo>,
    timeout: Duration,
}

struct ClientIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    _child: Child,
}

impl VisionClient {
    /// Spawn the matcher process. Failure here is fatal at startup.
    pub fn spawn(command: &[String], timeout: Duration) -> Result<Self, AgentError> {
        let Some((program, args)) = command.split_first() else {
            return Err(AgentError::vision_unavailable("empty matcher command"));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::vision_unavailable(format!("spawn '{}': {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::vision_unavailable("matcher stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::vision_unavailable("matcher stdout not piped"))?;

        Ok(Self {
            io: tokio::sync::Mutex::new(ClientIo {
                stdin,
                stdout: BufReader::new(stdout),
                _child: child,
            }),
            timeout,
        })
    }

    /// Send one query and wait for its correlated response.
    async fn request(&self, query: VisionQuery) -> Result<VisionData, AgentError> {
        let id = Uuid::new_v4().to_string();
        let request = VisionRequest {
            id: id.clone(),
            query,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| AgentError::vision_unavailable(format!("encode request: {}", e)))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::vision_unavailable(format!("matcher write: {}", e)))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| AgentError::vision_unavailable(format!("matcher flush: {}", e)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AgentError::vision_unavailable("matcher response timeout"));
            }

            let mut resp_line = String::new();
            let read = tokio::time::timeout(remaining, io.stdout.read_line(&mut resp_line)).await;
            match read {
                Ok(Ok(0)) => {
                    return Err(AgentError::vision_unavailable("matcher closed stdout"));
                }
                Ok(Ok(_)) => {
                    let resp: VisionResponse = match serde_json::from_str(resp_line.trim()) {
                        Ok(resp) => resp,
                        Err(e) => {
                            debug!("skipping undecodable matcher line: {}", e);
                            continue;
                        }
                    };
                    if resp.id != id {
                        debug!("skipping stale matcher response for id {}", resp.id);
                        continue;
                    }
                    if !resp.success {
                        return Err(AgentError::vision_unavailable(
                            resp.error.unwrap_or_else(|| "unspecified".to_string()),
                        ));
                    }
                    return resp
                        .data
                        .ok_or_else(|| AgentError::vision_unavailable("response without data"));
                }
                Ok(Err(e)) => {
                    return Err(AgentError::vision_unavailable(format!("matcher read: {}", e)));
                }
                Err(_) => {
                    return Err(AgentError::vision_unavailable("matcher response timeout"));
                }
            }
        }
    }
}

#[async_trait]
impl Perception for VisionClient {
    async fn locate(
        &self,
        template: &str,
        region: Option<Region>,
        confidence: f32,
        grayscale: bool,
    ) -> Option<Position> {
        let query = VisionQuery::Locate {
            template: template.to_string(),
            region,
            confidence,
            grayscale,
        };
        match self.request(query).await {
            Ok(VisionData::Match { pos, .. }) => pos,
            Ok(other) => {
                warn!("unexpected matcher payload for locate: {:?}", other);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn locate_all(
        &self,
        template: &str,
        region: Option<Region>,
        confidence: f32,
    ) -> Vec<Position> {
        let query = VisionQuery::LocateAll {
            template: template.to_string(),
            region,
            confidence,
        };
        match self.request(query).await {
            Ok(VisionData::Matches { points }) => points,
            Ok(other) => {
                warn!("unexpected matcher payload for locate_all: {:?}", other);
                Vec::new()
            }
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    async fn screenshot(&self, region: Region) -> Option<PixelGrid> {
        match self.request(VisionQuery::Screenshot { region }).await {
            Ok(VisionData::Pixels { width, height, rgb }) => {
                let grid = PixelGrid::new(width, height, rgb);
                if grid.is_none() {
                    warn!("matcher returned a malformed pixel buffer");
                }
                grid
            }
            Ok(other) => {
                warn!("unexpected matcher payload for screenshot: {:?}", other);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn cursor(&self) -> Option<Position> {
        match self.request(VisionQuery::Cursor).await {
            Ok(VisionData::Cursor { pos }) => Some(pos),
            Ok(other) => {
                warn!("unexpected matcher payload for cursor: {:?}", other);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn screen_size(&self) -> Option<(u32, u32)> {
        match self.request(VisionQuery::ScreenSize).await {
            Ok(VisionData::Size { width, height }) => Some((width, height)),
            Ok(other) => {
                warn!("unexpected matcher payload for screen_size: {:?}", other);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

/// Detection policy over a [`Perception`] backend.
pub struct PerceptionPort {
    backend: Arc<dyn Perception>,
    cfg: VisionConfig,
}

impl PerceptionPort {
    pub fn new(backend: Arc<dyn Perception>, cfg: VisionConfig) -> Self {
        Self { backend, cfg }
    }

    /// Single-shot query at an explicit confidence. Used for live
    /// interrupt checks, which must stay cheap and never cascade.
    pub async fn locate_once(
        &self,
        label: &Label,
        confidence: f32,
        grayscale: bool,
    ) -> Option<Position> {
        self.backend
            .locate(label.as_str(), None, confidence, grayscale)
            .await
    }

    /// One detection tick: try each cascade level in order, short-
    /// circuiting on the first match.
    pub async fn locate(&self, label: &Label) -> Option<Detection> {
        for level in &self.cfg.cascade {
            if let Some(pos) = self
                .backend
                .locate(label.as_str(), None, level.confidence, level.grayscale)
                .await
            {
                return Some(Detection {
                    label: label.clone(),
                    pos,
                    confidence: level.confidence,
                });
            }
        }
        None
    }

    /// Poll a single confidence level until the timeout elapses.
    pub async fn locate_timed(
        &self,
        label: &Label,
        confidence: f32,
        timeout: Duration,
        poll: Duration,
    ) -> Option<Position> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.locate_once(label, confidence, false).await {
                return Some(pos);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            tokio::time::sleep(poll.min(remaining)).await;
        }
    }

    /// Cascade detection with gap-spaced retries, for slow-to-appear
    /// targets. Not for live interrupt checks.
    pub async fn locate_with_retry(
        &self,
        label: &Label,
        retries: u32,
        gap: Duration,
    ) -> Option<Detection> {
        if let Some(det) = self.locate(label).await {
            return Some(det);
        }
        for attempt in 1..=retries {
            debug!("retry {}/{} for '{}' after {:?}", attempt, retries, label, gap);
            tokio::time::sleep(gap).await;
            if let Some(det) = self.locate(label).await {
                return Some(det);
            }
        }
        None
    }

    pub async fn locate_all(&self, label: &Label, confidence: f32) -> Vec<Position> {
        self.backend.locate_all(label.as_str(), None, confidence).await
    }

    /// Screenshot the health-bar region and classify it. Any capture
    /// failure degrades to `Unknown` rather than erroring.
    pub async fn health(&self, region: Region, classifier: &ClassifierConfig) -> HealthState {
        match self.backend.screenshot(region).await {
            Some(grid) => classify(&grid, classifier),
            None => HealthState::Unknown,
        }
    }

    pub async fn cursor(&self) -> Option<Position> {
        self.backend.cursor().await
    }

    pub async fn screen_size(&self) -> Option<(u32, u32)> {
        self.backend.screen_size().await
    }
}
