//! Game session - owns the game loop and the connected clients, turns
//! inbound bytes into intents and delivers the outbox after each step

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::constants::tick;
use crate::game::dispatch::Actor;
use crate::game::game_loop::{GameLoop, TickReport};
use crate::game::performance::TickBudget;
use crate::game::state::{GameState, PlayerId};
use crate::metrics::Metrics;
use crate::net::dos_protection::ConnectionId;
use crate::net::gateway::{
    classify, sanitize_display_name, Channel, ClientSink, ConnectionRegistry, Outbound, Route,
};
use crate::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use crate::util::clock::{now_ms, Millis};

/// Whether the connection should stay open after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Close,
}

pub struct GameSession {
    game_loop: GameLoop,
    registry: ConnectionRegistry,
    budget: TickBudget,
    max_players: usize,
    metrics: Arc<Metrics>,
    last_report: TickReport,
}

impl GameSession {
    pub fn new(state: GameState, max_players: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            game_loop: GameLoop::new(state),
            registry: ConnectionRegistry::new(),
            budget: TickBudget::default(),
            max_players,
            metrics,
            last_report: TickReport::default(),
        }
    }

    pub fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    pub fn player_count(&self) -> usize {
        self.registry.joined_count()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a transport connection; it may join afterwards
    pub fn connect(&mut self, conn: ConnectionId, sink: ClientSink, datagram_limit: usize, now: Millis) {
        self.registry.open(conn, sink, datagram_limit, now);
        self.metrics
            .connections_active
            .store(self.registry.len() as u64, std::sync::atomic::Ordering::Relaxed);
    }

    /// Handle one inbound payload from `conn`
    pub fn receive(&mut self, conn: ConnectionId, payload: &[u8], channel: Channel, now: Millis) -> Control {
        self.metrics.record_received(payload.len());
        self.registry.record_inbound(conn, payload.len());

        let message: ClientMessage = match decode(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping undecodable {:?} message from conn {}: {}", channel, conn, e);
                return Control::Continue;
            }
        };

        let control = match classify(message, channel) {
            Route::Join(raw_name) => {
                self.join(conn, &raw_name, now);
                Control::Continue
            }
            Route::Intent(intent) => {
                self.apply(conn, intent, now);
                Control::Continue
            }
            Route::Leave => {
                self.disconnect(conn);
                Control::Close
            }
            Route::Ignore => Control::Continue,
        };
        self.flush();
        control
    }

    fn apply(&mut self, conn: ConnectionId, intent: ClientMessage, now: Millis) {
        let Some(entry) = self.registry.get(conn) else {
            return;
        };
        let (Some(id), Some(name)) = (entry.player, entry.name.as_deref()) else {
            debug!("Ignoring intent from conn {} before join", conn);
            return;
        };
        self.game_loop.handle(Actor { id, name }, intent, now);
    }

    fn join(&mut self, conn: ConnectionId, raw_name: &str, now: Millis) {
        if self.registry.player_of(conn).is_some() {
            debug!("Ignoring repeated join on conn {}", conn);
            return;
        }
        let Some(name) = sanitize_display_name(raw_name) else {
            self.reject(conn, "Invalid display name".to_string());
            return;
        };
        if self.player_count() >= self.max_players {
            let reason = format!("Server full ({} players). Please try again later.", self.player_count());
            self.reject(conn, reason);
            return;
        }
        if !self.budget.can_accept_players() {
            let reason = format!("Server under heavy load: {}", self.budget.status_message());
            self.reject(conn, reason);
            return;
        }

        let id: PlayerId = Uuid::new_v4();
        if self.registry.bind(conn, id, name.clone()) {
            self.game_loop.join(id, name, now);
        }
    }

    fn reject(&mut self, conn: ConnectionId, reason: String) {
        warn!("Rejecting join on conn {}: {}", conn, reason);
        self.metrics
            .joins_rejected
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let Some(entry) = self.registry.get(conn) else {
            return;
        };
        if let Some(bytes) = encode_shared(&ServerMessage::JoinRejected { reason }) {
            deliver(&self.metrics, &entry.sink, Outbound::Reliable(bytes));
        }
    }

    /// Forget a connection and purge its entity; safe to call twice
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let entry = self.registry.close(conn)?;
        self.metrics
            .connections_active
            .store(self.registry.len() as u64, std::sync::atomic::Ordering::Relaxed);

        let player = entry.player?;
        if self.game_loop.leave(player) {
            info!(
                "Player {} ({}) left after {} messages",
                entry.name.as_deref().unwrap_or("?"),
                player,
                entry.messages_in
            );
        }
        self.flush();
        Some(player)
    }

    /// Run one simulation step and deliver its output
    pub fn tick(&mut self, now: Millis) -> TickReport {
        self.budget.tick_start();
        let report = self.game_loop.tick(now);
        if let Some(elapsed) = self.budget.tick_end() {
            self.metrics.record_tick_time(elapsed);
        }
        self.metrics
            .record_world(&report, self.game_loop.state().masks.resident_count());
        self.metrics
            .record_load(self.budget.status(), self.budget.usage_ratio());
        self.last_report = report;
        self.flush();
        report
    }

    /// Encode everything queued and hand it to the writer tasks.
    /// Returns the number of messages queued for delivery.
    pub fn flush(&mut self) -> usize {
        let flush = self.game_loop.take_output();
        if flush.is_empty() {
            return 0;
        }
        let mut queued = 0;

        for message in &flush.best_effort {
            let Some(bytes) = encode_shared(message) else {
                continue;
            };
            for (_, entry) in self.registry.joined() {
                let outbound = if bytes.len() <= entry.datagram_limit {
                    Outbound::Datagram(bytes.clone())
                } else {
                    Outbound::Reliable(bytes.clone())
                };
                queued += deliver(&self.metrics, &entry.sink, outbound) as usize;
            }
        }

        for (recipient, message) in &flush.reliable {
            if matches!(message, ServerMessage::KillFeed(_)) {
                self.metrics
                    .kills_total
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            let Some(bytes) = encode_shared(message) else {
                continue;
            };
            for (player, entry) in self.registry.joined() {
                if recipient.includes(player) {
                    queued += deliver(&self.metrics, &entry.sink, Outbound::Reliable(bytes.clone())) as usize;
                }
            }
        }
        queued
    }

    pub fn status_line(&self) -> String {
        let r = &self.last_report;
        format!(
            "tick {}, {} players ({} alive), {} food, {} projectiles, {} connections | {}",
            r.tick,
            r.players,
            r.alive,
            r.food,
            r.projectiles,
            self.registry.len(),
            self.budget.status_message()
        )
    }
}

fn encode_shared(message: &ServerMessage) -> Option<Arc<Vec<u8>>> {
    match encode(message) {
        Ok(bytes) => Some(Arc::new(bytes)),
        Err(e) => {
            warn!("Failed to encode outbound message: {}", e);
            None
        }
    }
}

/// Queue on a client's writer; a closed channel means the connection is
/// already shutting down and will be cleaned up by its handler
fn deliver(metrics: &Metrics, sink: &ClientSink, outbound: Outbound) -> bool {
    let len = outbound.len();
    if sink.send(outbound).is_ok() {
        metrics.record_sent(len);
        true
    } else {
        false
    }
}

/// Start the fixed-rate tick task
pub fn start_game_loop(session: Arc<RwLock<GameSession>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(tick::TICK_DURATION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Game loop started at {} Hz", tick::TICK_RATE);
        let start = Instant::now();
        let status_every = tick::TICK_RATE as u64 * tick::STATUS_LOG_SECS;
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            let report = session.write().await.tick(now_ms());
            if report.repaired > 0 {
                warn!("Tick {} repaired {} corrupt values", report.tick, report.repaired);
            }

            if tick_count % status_every == 0 {
                let session = session.read().await;
                info!("Game: {}s, {}", start.elapsed().as_secs(), session.status_line());
            }
        }
    })
}
