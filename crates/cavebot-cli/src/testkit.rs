//! Shared test fixtures: a scripted transport for link-level tests and a
//! small closed-loop world fake that implements both sides of the agent's
//! boundaries (device transport + perception) over shared state, so
//! relative move frames actually move the perceived cursor and clicks
//! have consequences.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cavebot_core::classify::PixelGrid;
use cavebot_core::config::{AgentConfig, DeviceConfig, NavConfig};
use cavebot_core::geom::{Position, Region};
use tokio::time::sleep;

use crate::actions::Engine;
use crate::device::transport::{LinkError, Transport};
use crate::device::DeviceLink;
use crate::perception::{Perception, PerceptionPort};

/// Granularity of fake blocking reads.
const POLL: Duration = Duration::from_millis(1);

/// A fast-timing configuration for tests. Routes, enemies, and loot
/// labels start empty; tests fill in what they exercise.
pub fn test_config() -> AgentConfig {
    let mut cfg = AgentConfig::default();
    cfg.device = DeviceConfig {
        port: "/dev/fake".to_string(),
        baud: 115_200,
        ready_timeout_ms: 200,
        ack_timeout_ms: 80,
        retries: 2,
        retry_backoff_ms: 2,
    };
    cfg.mouse.pause_ms = 1;
    cfg.mouse.settle_ms = 1;
    cfg.mouse.move_timeout_ms = 3_000;
    cfg.mouse.recenter_after_click = false;
    cfg.combat.scan_gap_ms = 20;
    cfg.combat.strike_retries = 1;
    cfg.combat.engage_poll_ms = 10;
    cfg.combat.confirm_window_ms = 150;
    cfg.combat.fallback_delay_ms = 100;
    cfg.combat.resolve_timeout_ms = 2_000;
    cfg.loot.appear_delay_ms = 10;
    cfg.loot.between_picks_ms = 5;
    cfg.nav = NavConfig {
        confidence_schedule: vec![0.8, 0.6],
        attempts: 3,
        search_timeout_ms: 60,
        search_poll_ms: 10,
        dwell_scale: 1.0,
        dwell_tick_ms: 10,
    };
    cfg
}

// ---------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------

type Responder = Box<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Transport whose responses are computed from the sent frame. Records
/// every frame for assertions.
pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    inbox: Mutex<VecDeque<String>>,
    responder: Responder,
    /// Number of leading sends to leave unanswered.
    silent_sends: Mutex<u32>,
}

impl ScriptedTransport {
    pub fn respond_with(responder: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            inbox: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            silent_sends: Mutex::new(0),
        }
    }

    /// A device that never answers anything.
    pub fn silent() -> Self {
        Self::respond_with(|_| Vec::new())
    }

    /// A device that ignores the first `n` sends, then acks normally.
    pub fn silent_for(n: u32) -> Self {
        let t = Self::respond_with(|_| vec!["OK".to_string()]);
        *t.silent_sends.lock().unwrap() = n;
        t
    }

    /// A transport with lines already waiting in its input buffer.
    pub fn with_pending(lines: Vec<String>) -> Self {
        let t = Self::silent();
        t.inbox.lock().unwrap().extend(lines);
        t
    }

    pub fn sent_frames(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_line(&self, line: &str) -> Result<(), LinkError> {
        self.sent.lock().unwrap().push(line.to_string());

        let mut silent = self.silent_sends.lock().unwrap();
        if *silent > 0 {
            *silent -= 1;
            return Ok(());
        }
        drop(silent);

        let responses = (self.responder)(line);
        self.inbox.lock().unwrap().extend(responses);
        Ok(())
    }

    async fn recv_line(&self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.inbox.lock().unwrap().pop_front() {
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL).await;
        }
    }

    async fn clear_input(&self) {
        self.inbox.lock().unwrap().clear();
    }

    async fn shutdown(&self) {}
}

// ---------------------------------------------------------------------
// Closed-loop world fake
// ---------------------------------------------------------------------

struct Entity {
    label: String,
    pos: Position,
    confidence: f32,
    appears_at: Option<Instant>,
    hostile: bool,
    alive: bool,
}

impl Entity {
    fn visible(&self) -> bool {
        self.alive && self.appears_at.map_or(true, |at| Instant::now() >= at)
    }
}

struct World {
    cursor: Position,
    screen: (u32, u32),
    entities: Vec<Entity>,
    battle_template: Option<String>,
    battle_pos: Option<Position>,
    battle_until: Option<Instant>,
    battle_duration: Duration,
    ignore_large_steps: bool,
    ignore_all_steps: bool,
    frames: Vec<String>,
    clicks: Vec<(Position, String)>,
    keys: Vec<String>,
    inbox: VecDeque<String>,
    health_grid: PixelGrid,
}

impl World {
    fn battle_active(&self) -> bool {
        self.battle_until.is_some_and(|until| Instant::now() < until)
    }
}

/// A shared-state fake of the whole outside world. Cloning shares state,
/// so the same instance can serve as device transport and perception
/// backend: `M` frames move the cursor the perception side reports, and
/// clicking a hostile entity kills it and raises its battle indicator.
#[derive(Clone)]
pub struct FakeWorld {
    state: Arc<Mutex<World>>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(World {
                cursor: Position::new(0, 0),
                screen: (1000, 700),
                entities: Vec::new(),
                battle_template: None,
                battle_pos: None,
                battle_until: None,
                battle_duration: Duration::from_millis(100),
                ignore_large_steps: false,
                ignore_all_steps: false,
                frames: Vec::new(),
                clicks: Vec::new(),
                keys: Vec::new(),
                inbox: VecDeque::new(),
                // Healthy full-green bar unless a test overrides it.
                health_grid: PixelGrid::new(4, 1, [30, 200, 30].repeat(4)).unwrap(),
            })),
        }
    }

    /// Build an engine whose device and perception are this world.
    pub fn engine(&self, cfg: AgentConfig) -> Engine {
        let link = DeviceLink::new(Box::new(self.clone()), cfg.device.clone());
        let vision = PerceptionPort::new(Arc::new(self.clone()), cfg.vision.clone());
        Engine::new(link, vision, cfg)
    }

    pub fn set_cursor(&self, pos: Position) {
        self.state.lock().unwrap().cursor = pos;
    }

    pub fn cursor(&self) -> Position {
        self.state.lock().unwrap().cursor
    }

    pub fn add_entity(&self, label: &str, pos: Position, confidence: f32) {
        self.push_entity(label, pos, confidence, None, false);
    }

    pub fn add_entity_appearing_in(&self, label: &str, pos: Position, confidence: f32, delay: Duration) {
        self.push_entity(label, pos, confidence, Some(Instant::now() + delay), false);
    }

    /// A hostile entity: clicking it kills it and starts a battle shown
    /// through the `battle_<label>` indicator.
    pub fn add_enemy(&self, label: &str, pos: Position, confidence: f32) {
        self.push_entity(label, pos, confidence, None, true);
    }

    pub fn add_enemy_appearing_in(&self, label: &str, pos: Position, confidence: f32, delay: Duration) {
        self.push_entity(label, pos, confidence, Some(Instant::now() + delay), true);
    }

    fn push_entity(
        &self,
        label: &str,
        pos: Position,
        confidence: f32,
        appears_at: Option<Instant>,
        hostile: bool,
    ) {
        self.state.lock().unwrap().entities.push(Entity {
            label: label.to_string(),
            pos,
            confidence,
            appears_at,
            hostile,
            alive: true,
        });
    }

    /// How long the battle indicator stays up after a kill click.
    pub fn set_battle_duration(&self, duration: Duration) {
        self.state.lock().unwrap().battle_duration = duration;
    }

    /// Raise a battle indicator directly (an engagement already underway).
    pub fn force_battle(&self, template: &str, duration: Duration, pos: Position) {
        let mut w = self.state.lock().unwrap();
        w.battle_template = Some(template.to_string());
        w.battle_pos = Some(pos);
        w.battle_until = Some(Instant::now() + duration);
    }

    /// Drop relative steps larger than one pixel (pointer acceleration
    /// artifact): only single-pixel steps land.
    pub fn ignore_large_steps(&self, on: bool) {
        self.state.lock().unwrap().ignore_large_steps = on;
    }

    /// Drop every relative step: the cursor is wedged.
    pub fn ignore_all_steps(&self, on: bool) {
        self.state.lock().unwrap().ignore_all_steps = on;
    }

    /// Health bar with a thin yellow sliver over dull foreground: the
    /// default classifier reads this as Medium.
    pub fn set_health_grid_medium(&self) {
        let mut rgb = Vec::new();
        for i in 0..200 {
            if i < 4 {
                rgb.extend_from_slice(&[200, 150, 30]);
            } else {
                rgb.extend_from_slice(&[70, 60, 60]);
            }
        }
        self.state.lock().unwrap().health_grid = PixelGrid::new(200, 1, rgb).unwrap();
    }

    pub fn frames(&self) -> Vec<String> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn clicks(&self) -> Vec<(Position, String)> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().keys.clone()
    }
}

#[async_trait]
impl Transport for FakeWorld {
    async fn send_line(&self, line: &str) -> Result<(), LinkError> {
        let mut w = self.state.lock().unwrap();
        let line = line.trim().to_string();
        w.frames.push(line.clone());

        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("") {
            "M" => {
                let dx: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let dy: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let large = dx.abs() > 1 || dy.abs() > 1;
                if !w.ignore_all_steps && !(w.ignore_large_steps && large) {
                    w.cursor.x += dx;
                    w.cursor.y += dy;
                }
            }
            verb @ ("CL" | "CR" | "CM" | "CD") => {
                let at = w.cursor;
                w.clicks.push((at, verb.to_string()));

                if let Some(idx) = w
                    .entities
                    .iter()
                    .position(|e| e.hostile && e.visible() && e.pos.distance_to(at) <= 8.0)
                {
                    w.entities[idx].alive = false;
                    let label = w.entities[idx].label.clone();
                    let pos = w.entities[idx].pos;
                    w.battle_template = Some(format!("battle_{}", label));
                    w.battle_pos = Some(pos);
                    w.battle_until = Some(Instant::now() + w.battle_duration);
                }
            }
            "K" => {
                w.keys.push(parts.next().unwrap_or("").to_string());
            }
            // MA, P, T, B0, B1 have no world-visible effect.
            _ => {}
        }

        w.inbox.push_back("OK".to_string());
        Ok(())
    }

    async fn recv_line(&self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.state.lock().unwrap().inbox.pop_front() {
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL).await;
        }
    }

    async fn clear_input(&self) {
        self.state.lock().unwrap().inbox.clear();
    }

    async fn shutdown(&self) {}
}

#[async_trait]
impl Perception for FakeWorld {
    async fn locate(
        &self,
        template: &str,
        _region: Option<Region>,
        confidence: f32,
        _grayscale: bool,
    ) -> Option<Position> {
        let w = self.state.lock().unwrap();

        if w.battle_active() && w.battle_template.as_deref() == Some(template) {
            return w.battle_pos;
        }

        w.entities
            .iter()
            .find(|e| e.label == template && e.visible() && confidence <= e.confidence)
            .map(|e| e.pos)
    }

    async fn locate_all(
        &self,
        template: &str,
        _region: Option<Region>,
        confidence: f32,
    ) -> Vec<Position> {
        let w = self.state.lock().unwrap();
        w.entities
            .iter()
            .filter(|e| e.label == template && e.visible() && confidence <= e.confidence)
            .map(|e| e.pos)
            .collect()
    }

    async fn screenshot(&self, _region: Region) -> Option<PixelGrid> {
        Some(self.state.lock().unwrap().health_grid.clone())
    }

    async fn cursor(&self) -> Option<Position> {
        Some(self.state.lock().unwrap().cursor)
    }

    async fn screen_size(&self) -> Option<(u32, u32)> {
        Some(self.state.lock().unwrap().screen)
    }
}
