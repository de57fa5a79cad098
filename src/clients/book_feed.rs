// L2 order book websocket client with fixed-delay reconnection

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::core::snapshot::OrderBookSnapshot;
use crate::error::{SimulatorError, SimulatorResult};
use crate::ingest::{FeedItem, SnapshotQueue};

const SHUTDOWN_REASON: &str = "shutdown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting { attempt: u32 },
    Connected { epoch: u64 },
    Disconnected { reason: String },
    /// Reconnect attempts exhausted
    GaveUp,
    Stopped,
}

#[derive(Debug, Default)]
pub struct FeedStats {
    pub messages: AtomicU64,
    pub snapshots: AtomicU64,
    pub rejected: AtomicU64,
    pub reconnects: AtomicU64,
}

impl FeedStats {
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots.load(Ordering::Relaxed)
    }
}

pub struct BookFeedClient {
    url: String,
    symbol: String,
    reconnect_delay: Duration,
    max_attempts: u32,
    queue: Arc<SnapshotQueue>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<FeedStats>,
    next_sequence: u64,
}

impl BookFeedClient {
    pub fn new(config: &FeedConfig, symbol: &str, queue: Arc<SnapshotQueue>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting { attempt: 0 });
        Self {
            url: config.ws_url_for(symbol),
            symbol: symbol.to_string(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            max_attempts: config.max_reconnect_attempts,
            queue,
            state_tx,
            stats: Arc::new(FeedStats::default()),
            next_sequence: 0,
        }
    }

    /// Receiver for connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    /// Stream books into the queue until shutdown or until reconnect attempts
    /// run out. The queue is closed on exit either way.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SimulatorResult<()> {
        let mut epoch = 0u64;
        let mut failures = 0u32;

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            self.state_tx.send_replace(ConnectionState::Connecting { attempt: failures + 1 });
            debug!(url = %self.url, "connecting to order book feed");

            let reason = match connect_async(self.url.as_str()).await {
                Ok((mut ws, _)) => {
                    failures = 0;
                    epoch += 1;
                    if epoch > 1 {
                        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    }
                    self.state_tx.send_replace(ConnectionState::Connected { epoch });
                    debug!(epoch, "connected to {} feed", self.symbol);

                    loop {
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    let _ = ws.close(None).await;
                                    break String::from(SHUTDOWN_REASON);
                                }
                            }
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Text(text))) => self.handle_text(&text, epoch),
                                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                                    Ok(text) => self.handle_text(text, epoch),
                                    Err(_) => debug!("ignoring non-UTF8 binary frame"),
                                },
                                Some(Ok(Message::Close(frame))) => {
                                    break format!("closed by server: {:?}", frame);
                                }
                                Some(Ok(_)) => {} // ping/pong keep-alive
                                Some(Err(e)) => break format!("stream error: {}", e),
                                None => break String::from("stream ended"),
                            }
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    format!("connect failed: {}", e)
                }
            };

            if reason == SHUTDOWN_REASON || *shutdown.borrow() {
                break Ok(());
            }

            debug!(%reason, "{} feed disconnected", self.symbol);
            self.state_tx.send_replace(ConnectionState::Disconnected { reason: reason.clone() });

            if self.max_attempts > 0 && failures >= self.max_attempts {
                self.state_tx.send_replace(ConnectionState::GaveUp);
                break Err(SimulatorError::Transport(format!(
                    "{}: giving up after {} attempts ({})",
                    self.symbol, failures, reason
                )));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        if result.is_ok() {
            self.state_tx.send_replace(ConnectionState::Stopped);
        }
        self.queue.close();
        result
    }

    fn handle_text(&mut self, text: &str, epoch: u64) {
        self.stats.messages.fetch_add(1, Ordering::Relaxed);

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "unparseable feed message");
                return;
            }
        };

        let fallback = self.next_sequence + 1;
        match parse_book_message(&value, &self.symbol, fallback) {
            Ok(Some(snapshot)) => {
                self.next_sequence = self.next_sequence.max(snapshot.sequence());
                self.stats.snapshots.fetch_add(1, Ordering::Relaxed);
                if self.queue.push(FeedItem { epoch, snapshot }) {
                    debug!(dropped = self.queue.dropped(), "snapshot queue full, dropped oldest");
                }
            }
            Ok(None) => handle_feed_event(&value),
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "rejected feed message");
            }
        }
    }
}

/// Build a validated snapshot from one feed message.
///
/// Returns `Ok(None)` for messages that are not books (subscription events,
/// heartbeats). Levels may be `[price, qty]` pairs of strings or numbers; the
/// timestamp may be RFC 3339 or epoch milliseconds. When the message carries
/// no sequence id, `fallback_sequence` is used.
pub fn parse_book_message(
    value: &Value,
    default_symbol: &str,
    fallback_sequence: u64,
) -> SimulatorResult<Option<OrderBookSnapshot>> {
    if value.get("event").is_some() {
        return Ok(None);
    }
    let (bids, asks) = match (value.get("bids"), value.get("asks")) {
        (Some(bids), Some(asks)) => (parse_levels(bids, "bids")?, parse_levels(asks, "asks")?),
        _ => return Ok(None),
    };

    let symbol = value
        .get("symbol")
        .and_then(|s| s.as_str())
        .unwrap_or(default_symbol);

    let timestamp = parse_timestamp(value.get("timestamp"))?;

    let sequence = ["seq", "sequence", "seqId"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|s| s.as_u64()))
        .unwrap_or(fallback_sequence);

    let snapshot = OrderBookSnapshot::new(symbol, bids, asks, timestamp, sequence);
    snapshot.validate()?;
    Ok(Some(snapshot))
}

fn parse_levels(value: &Value, side: &str) -> SimulatorResult<Vec<(f64, f64)>> {
    let levels = value
        .as_array()
        .ok_or_else(|| SimulatorError::InvalidSnapshot(format!("{} is not an array", side)))?;

    levels
        .iter()
        .map(|level| {
            let price = level.get(0).and_then(parse_number);
            let qty = level.get(1).and_then(parse_number);
            match (price, qty) {
                (Some(price), Some(qty)) => Ok((price, qty)),
                _ => Err(SimulatorError::InvalidSnapshot(format!(
                    "malformed {} level: {}",
                    side, level
                ))),
            }
        })
        .collect()
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>) -> SimulatorResult<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => Ok(Utc::now()),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .or_else(|_| {
                s.parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .ok_or(())
            })
            .map_err(|_| SimulatorError::InvalidSnapshot(format!("bad timestamp '{}'", s))),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| SimulatorError::InvalidSnapshot(format!("bad timestamp {}", n))),
        Some(other) => Err(SimulatorError::InvalidSnapshot(format!("bad timestamp {}", other))),
    }
}

pub fn handle_feed_event(data: &Value) {
    if let Some(event) = data.get("event").and_then(|e| e.as_str()) {
        match event {
            "subscribe" | "subscribed" => info!("📡 Feed subscription confirmed"),
            "error" => {
                let msg = data.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown");
                warn!("Feed reported error: {}", msg);
            }
            other => debug!(event = other, "feed event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_levels() {
        let msg = json!({
            "timestamp": "2025-05-04T10:39:13Z",
            "exchange": "OKX",
            "symbol": "BTC-USDT-SWAP",
            "asks": [["95445.5", "9.06"], ["95446.0", "0.1"]],
            "bids": [["95445.4", "1104.23"], ["95445.3", "0.02"]]
        });

        let snapshot = parse_book_message(&msg, "IGNORED", 7)
            .expect("valid")
            .expect("is a book");
        assert_eq!(snapshot.symbol(), "BTC-USDT-SWAP");
        assert_eq!(snapshot.sequence(), 7);
        assert_eq!(snapshot.best_ask(), Some(95445.5));
        assert_eq!(snapshot.best_bid(), Some(95445.4));
    }

    #[test]
    fn test_parse_numeric_levels_and_seq() {
        let msg = json!({
            "timestamp": 1_700_000_000_000i64,
            "seq": 42,
            "asks": [[101.0, 1.0]],
            "bids": [[100.0, 2.0]]
        });
        let snapshot = parse_book_message(&msg, "ETH-USDT", 1)
            .expect("valid")
            .expect("is a book");
        assert_eq!(snapshot.symbol(), "ETH-USDT");
        assert_eq!(snapshot.sequence(), 42);
        assert_eq!(snapshot.timestamp().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_events_are_not_books() {
        let msg = json!({"event": "subscribe", "arg": {"channel": "books"}});
        assert!(parse_book_message(&msg, "X", 1).expect("ok").is_none());
    }

    fn book_text(seq: Option<u64>) -> String {
        let mut msg = json!({
            "timestamp": "2025-05-04T10:39:13Z",
            "asks": [["100.5", "1"]],
            "bids": [["100.0", "1"]]
        });
        if let Some(seq) = seq {
            msg["seq"] = json!(seq);
        }
        msg.to_string()
    }

    #[test]
    fn test_missing_sequence_continues_from_last_seen() {
        let queue = Arc::new(SnapshotQueue::new(16));
        let mut client = BookFeedClient::new(&FeedConfig::default(), "BTC-USDT-SWAP", Arc::clone(&queue));

        client.handle_text(&book_text(None), 1);
        client.handle_text(&book_text(None), 1);
        client.handle_text(&book_text(Some(10)), 1);
        client.handle_text(&book_text(None), 2);
        client.handle_text("{not json", 2);
        client.handle_text(r#"{"event":"subscribe"}"#, 2);

        let items: Vec<(u64, u64)> = std::iter::from_fn(|| queue.try_pop())
            .map(|item| (item.epoch, item.snapshot.sequence()))
            .collect();
        assert_eq!(items, vec![(1, 1), (1, 2), (1, 10), (2, 11)]);

        let stats = client.stats();
        assert_eq!(stats.snapshots(), 4);
        assert_eq!(stats.rejected(), 1);
        assert_eq!(stats.messages.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_crossed_and_malformed_rejected() {
        let crossed = json!({"asks": [["100", "1"]], "bids": [["101", "1"]]});
        assert!(matches!(
            parse_book_message(&crossed, "X", 1),
            Err(SimulatorError::InvalidSnapshot(_))
        ));

        let malformed = json!({"asks": [["abc", "1"]], "bids": [["99", "1"]]});
        assert!(parse_book_message(&malformed, "X", 1).is_err());

        let empty = json!({"asks": [], "bids": [["99", "1"]]});
        assert!(parse_book_message(&empty, "X", 1).is_err());
    }
}
