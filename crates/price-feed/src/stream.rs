//! Polling price stream
//!
//! Each stream is a background task that batch-fetches its identifiers once
//! immediately and then on every interval tick, pushing events into a
//! channel. Cancellation is cooperative: a fetch already in flight finishes
//! and its results are dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use oracle_core::{StreamConfig, TokenIdentifier, TokenPriceData};

use crate::service::TokenPriceService;

/// Opaque stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(Uuid);

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stream output
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Current best price for one identifier
    Update {
        identifier: String,
        price: TokenPriceData,
    },
    /// No price this cycle; the stream keeps running
    Error {
        identifier: Option<String>,
        message: String,
    },
}

struct StreamTask {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Starts and stops polling streams over a shared price service
pub struct PriceStreamManager {
    service: Arc<TokenPriceService>,
    config: StreamConfig,
    streams: Mutex<HashMap<StreamHandle, StreamTask>>,
}

impl PriceStreamManager {
    pub fn new(service: Arc<TokenPriceService>, config: StreamConfig) -> Self {
        Self {
            service,
            config,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `identifiers` every `interval` (config default when
    /// `None`). The first fetch happens immediately.
    pub fn start_stream(
        &self,
        identifiers: Vec<TokenIdentifier>,
        interval: Option<Duration>,
    ) -> (StreamHandle, mpsc::Receiver<StreamEvent>) {
        let handle = StreamHandle(Uuid::new_v4());
        let period = interval
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.config.interval());
        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(
            stream = %handle,
            identifiers = identifiers.len(),
            interval_ms = period.as_millis() as u64,
            "Starting price stream"
        );

        let service = Arc::clone(&self.service);
        let task = tokio::spawn(async move {
            poll_loop(handle, service, identifiers, period, events_tx, cancel_rx).await;
        });

        self.streams.lock().insert(
            handle,
            StreamTask {
                cancel: cancel_tx,
                task,
            },
        );

        (handle, events_rx)
    }

    /// Stop one stream. `false` if the handle is unknown or already stopped.
    pub fn stop_stream(&self, handle: StreamHandle) -> bool {
        match self.streams.lock().remove(&handle) {
            Some(stream) => {
                let _ = stream.cancel.send(true);
                info!(stream = %handle, "Stopped price stream");
                true
            }
            None => false,
        }
    }

    /// Stop every running stream
    pub fn stop_all(&self) {
        let streams: Vec<(StreamHandle, StreamTask)> = self.streams.lock().drain().collect();
        if streams.is_empty() {
            return;
        }

        for (_, stream) in &streams {
            let _ = stream.cancel.send(true);
        }
        info!(count = streams.len(), "Stopped all price streams");
    }

    /// Registered and still polling
    pub fn is_active(&self, handle: StreamHandle) -> bool {
        self.streams
            .lock()
            .get(&handle)
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|s| !s.task.is_finished())
            .count()
    }
}

impl Drop for PriceStreamManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop(
    handle: StreamHandle,
    service: Arc<TokenPriceService>,
    identifiers: Vec<TokenIdentifier>,
    period: Duration,
    events: mpsc::Sender<StreamEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let prices = service.get_multiple_prices(&identifiers).await;

                if *cancel.borrow() {
                    debug!(stream = %handle, "Cancelled during fetch, discarding results");
                    break;
                }

                if !emit(&identifiers, prices, &events, &mut cancel).await {
                    break;
                }
            }
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
        }
    }

    debug!(stream = %handle, "Price stream loop exited");
}

/// Send one event per identifier. `false` once the stream should end.
///
/// A send blocked on a full channel gives way to cancellation.
async fn emit(
    identifiers: &[TokenIdentifier],
    mut prices: HashMap<String, TokenPriceData>,
    events: &mpsc::Sender<StreamEvent>,
    cancel: &mut watch::Receiver<bool>,
) -> bool {
    for id in identifiers {
        if *cancel.borrow() {
            return false;
        }

        let identifier = id.to_string();
        let event = match prices.remove(&identifier) {
            Some(price) => StreamEvent::Update { identifier, price },
            None => StreamEvent::Error {
                message: format!("No price available for {identifier}"),
                identifier: Some(identifier),
            },
        };

        tokio::select! {
            biased;
            _ = cancel.changed() => return false,
            sent = events.send(event) => {
                // Receiver dropped
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
    true
}
