//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::game_loop::TickReport;
use crate::game::performance::LoadStatus;

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the arena server
#[derive(Debug)]
pub struct Metrics {
    // World
    pub players: AtomicU64,
    pub alive_players: AtomicU64,
    pub food: AtomicU64,
    pub projectiles: AtomicU64,
    pub masks_resident: AtomicU64,
    pub kills_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // 0=comfortable, 1=busy, 2=overloaded
    pub load_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub joins_rejected: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            alive_players: AtomicU64::new(0),
            food: AtomicU64::new(0),
            projectiles: AtomicU64::new(0),
            masks_resident: AtomicU64::new(0),
            kills_total: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            load_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            joins_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let last = sorted.len() - 1;
            let p95 = ((sorted.len() as f32 * 0.95) as usize).min(last);
            let p99 = ((sorted.len() as f32 * 0.99) as usize).min(last);

            self.tick_time_p95_us.store(sorted[p95], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted[last], Ordering::Relaxed);
        }
    }

    /// Copy world counters out of a tick report
    pub fn record_world(&self, report: &TickReport, masks_resident: usize) {
        self.players.store(report.players as u64, Ordering::Relaxed);
        self.alive_players.store(report.alive as u64, Ordering::Relaxed);
        self.food.store(report.food as u64, Ordering::Relaxed);
        self.projectiles.store(report.projectiles as u64, Ordering::Relaxed);
        self.masks_resident.store(masks_resident as u64, Ordering::Relaxed);
    }

    pub fn record_load(&self, status: LoadStatus, usage_ratio: f32) {
        let code = match status {
            LoadStatus::Comfortable => 0,
            LoadStatus::Busy => 1,
            LoadStatus::Overloaded => 2,
        };
        self.load_status.store(code, Ordering::Relaxed);
        self.budget_usage_percent
            .store((usage_ratio * 100.0).max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn load_status_name(&self) -> &'static str {
        match self.load_status.load(Ordering::Relaxed) {
            0 => "comfortable",
            1 => "busy",
            _ => "overloaded",
        }
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("shoal_players", "Players in the world, dead or alive", "gauge",
            self.players.load(Ordering::Relaxed));
        metric!("shoal_players_alive", "Players currently alive", "gauge",
            self.alive_players.load(Ordering::Relaxed));
        metric!("shoal_food", "Food items in the world", "gauge",
            self.food.load(Ordering::Relaxed));
        metric!("shoal_projectiles", "Projectiles in flight", "gauge",
            self.projectiles.load(Ordering::Relaxed));
        metric!("shoal_masks_resident", "Collision masks loaded", "gauge",
            self.masks_resident.load(Ordering::Relaxed));
        metric!("shoal_kills_total", "Deaths resolved", "counter",
            self.kills_total.load(Ordering::Relaxed));

        metric!("shoal_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("shoal_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("shoal_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("shoal_tick_time_max_microseconds", "Maximum recent tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("shoal_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("shoal_load_status", "Load status (0=comfortable, 2=overloaded)", "gauge",
            self.load_status.load(Ordering::Relaxed));
        metric!("shoal_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP shoal_load_state Human-readable load state\n# TYPE shoal_load_state gauge\nshoal_load_state{{state=\"{}\"}} 1\n",
            self.load_status_name()
        ));

        metric!("shoal_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("shoal_joins_rejected_total", "Join requests refused", "counter",
            self.joins_rejected.load(Ordering::Relaxed));
        metric!("shoal_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("shoal_messages_received_total", "Total messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("shoal_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("shoal_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("shoal_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Same counters as JSON, for direct API access
    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        serde_json::json!({
            "world": {
                "players": load(&self.players),
                "alive": load(&self.alive_players),
                "food": load(&self.food),
                "projectiles": load(&self.projectiles),
                "masks_resident": load(&self.masks_resident),
                "kills": load(&self.kills_total),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "status": self.load_status_name(),
                "budget_percent": load(&self.budget_usage_percent),
            },
            "network": {
                "connections": load(&self.connections_active),
                "joins_rejected": load(&self.joins_rejected),
                "messages_sent": load(&self.messages_sent),
                "messages_received": load(&self.messages_received),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Route one request line to a response
fn respond(metrics: &Metrics, request: &str) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics") => http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus()),
        Some("/metrics/json") => http_response("200 OK", "application/json", &metrics.to_json()),
        Some("/health") | Some("/") => http_response("200 OK", "text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Serve the metrics endpoint until the listener fails
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to read from metrics socket {}: {}", peer, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        let p95 = metrics.tick_time_p95_us.load(Ordering::Relaxed);
        let p99 = metrics.tick_time_p99_us.load(Ordering::Relaxed);
        assert!(p95 > 0 && p95 <= p99);
    }

    #[test]
    fn test_record_world() {
        let metrics = Metrics::new();
        let report = TickReport {
            players: 4,
            alive: 3,
            food: 120,
            projectiles: 9,
            ..TickReport::default()
        };
        metrics.record_world(&report, 2);
        assert_eq!(metrics.alive_players.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.masks_resident.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.players.store(12, Ordering::Relaxed);
        metrics.record_load(LoadStatus::Busy, 0.625);

        let output = metrics.to_prometheus();
        assert!(output.contains("shoal_players 12"));
        assert!(output.contains("shoal_budget_usage_percent 62"));
        assert!(output.contains("shoal_load_state{state=\"busy\"} 1"));
        assert!(output.contains("# TYPE shoal_kills_total counter"));
    }

    #[test]
    fn test_json_is_valid() {
        let metrics = Metrics::new();
        metrics.record_received(30);
        metrics.record_sent(10);
        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["network"]["bytes_received"], 30);
        assert_eq!(value["network"]["messages_sent"], 1);
        assert_eq!(value["performance"]["status"], "comfortable");
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(respond(&metrics, "GET /metrics HTTP/1.1\r\n").contains("shoal_tick_count"));
        assert!(respond(&metrics, "GET /metrics/json HTTP/1.1\r\n").contains("application/json"));
        assert!(respond(&metrics, "GET /health HTTP/1.1\r\n").ends_with("OK"));
        assert!(respond(&metrics, "GET /nope HTTP/1.1\r\n").starts_with("HTTP/1.1 404"));
        assert!(respond(&metrics, "POST /metrics HTTP/1.1\r\n").starts_with("HTTP/1.1 404"));
    }
}
