//! Live mode: one feed client and one pipeline task per symbol.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clients::{BookFeedClient, ConnectionState};
use crate::config::Config;
use crate::core::checkpoint::CheckpointStore;
use crate::core::pipeline::{PipelineStats, SimulationPipeline};
use crate::error::{SimulatorError, SimulatorResult};
use crate::ingest::SnapshotQueue;
use crate::sink::EstimateSink;

/// Pipeline for `symbol`, seeded from a checkpoint when one is configured
pub fn build_pipeline(config: &Config, symbol: &str) -> SimulatorResult<SimulationPipeline> {
    let pipeline = SimulationPipeline::new(symbol, config);
    match &config.checkpoint.dir {
        Some(dir) => {
            let restored = CheckpointStore::new(dir).load(symbol)?;
            Ok(pipeline.with_models(config, restored.slippage, restored.classifier))
        }
        None => Ok(pipeline),
    }
}

pub fn save_checkpoint(config: &Config, pipeline: &SimulationPipeline) {
    if let Some(dir) = &config.checkpoint.dir {
        if let Err(e) = CheckpointStore::new(dir).save(pipeline) {
            warn!("⚠️  Failed to save {} checkpoint: {}", pipeline.symbol(), e);
        }
    }
}

/// Drain `queue` into `pipeline` until the queue closes.
///
/// A change of feed epoch means the connection was re-established, so the
/// window is reset before the first snapshot of the new connection.
pub async fn consume_queue(
    pipeline: &mut SimulationPipeline,
    queue: &SnapshotQueue,
    sink: &dyn EstimateSink,
) {
    let mut current_epoch: Option<u64> = None;

    while let Some(item) = queue.pop().await {
        if current_epoch != Some(item.epoch) {
            if current_epoch.is_some() {
                pipeline.reset();
            }
            current_epoch = Some(item.epoch);
        }

        if let Err(e) = pipeline.process(item.snapshot, sink) {
            match e {
                SimulatorError::InsufficientData { .. } => {}
                other => debug!(category = other.category(), error = %other, "snapshot skipped"),
            }
        }
    }

    sink.flush();
}

/// Log connection state changes until the feed client drops its sender.
/// Returns the number of disconnects observed.
pub async fn watch_connection(symbol: String, mut state: watch::Receiver<ConnectionState>) -> u64 {
    let mut disconnects = 0;
    while state.changed().await.is_ok() {
        let current = state.borrow_and_update().clone();
        match current {
            ConnectionState::Connecting { attempt } => debug!(attempt, "{} connecting", symbol),
            ConnectionState::Connected { epoch } => {
                info!("✅ Connected to {} feed (epoch {})", symbol, epoch)
            }
            ConnectionState::Disconnected { reason } => {
                disconnects += 1;
                warn!("🔌 {} feed disconnected: {}", symbol, reason);
            }
            ConnectionState::GaveUp => warn!("❌ {} feed gave up reconnecting", symbol),
            ConnectionState::Stopped => info!("🛑 {} feed stopped", symbol),
        }
    }
    disconnects
}

/// Run one symbol until shutdown or until its feed gives up.
pub async fn run_symbol(
    config: Arc<Config>,
    symbol: String,
    sink: Arc<dyn EstimateSink>,
    shutdown: watch::Receiver<bool>,
) -> SimulatorResult<PipelineStats> {
    let mut pipeline = build_pipeline(&config, &symbol)?;
    let queue = Arc::new(SnapshotQueue::new(config.feed.queue_capacity));

    let client = BookFeedClient::new(&config.feed, &symbol, Arc::clone(&queue));
    let feed_stats = client.stats();
    let watcher = tokio::spawn(watch_connection(symbol.clone(), client.subscribe_state()).in_current_span());
    let feed = tokio::spawn(client.run(shutdown).in_current_span());

    consume_queue(&mut pipeline, &queue, sink.as_ref()).await;

    let feed_result = match feed.await {
        Ok(result) => result,
        Err(e) => Err(SimulatorError::Transport(format!("feed task failed: {}", e))),
    };

    let disconnects = watcher.await.unwrap_or_default();
    save_checkpoint(&config, &pipeline);

    let stats = pipeline.stats();
    info!(
        "📊 {} done: {} books received, {} estimates, {} out-of-order, {} rejected by feed, {} dropped by queue, {} disconnects, median latency {}µs",
        symbol,
        feed_stats.snapshots(),
        stats.estimates_emitted,
        stats.out_of_order,
        feed_stats.rejected(),
        queue.dropped(),
        disconnects,
        stats.median_latency_us
    );

    feed_result.map(|_| stats)
}

/// Spawn every configured symbol and wait for all of them.
pub async fn run_all(
    config: Arc<Config>,
    sink: Arc<dyn EstimateSink>,
    shutdown: watch::Receiver<bool>,
) -> Vec<(String, SimulatorResult<PipelineStats>)> {
    let run_id = Uuid::new_v4();
    info!("🚀 Starting run {} for {} symbol(s)", run_id, config.feed.symbols.len());

    let handles: Vec<_> = config
        .feed
        .symbols
        .iter()
        .map(|symbol| {
            let span = info_span!("symbol", symbol = %symbol, run_id = %run_id);
            let task = run_symbol(
                Arc::clone(&config),
                symbol.clone(),
                Arc::clone(&sink),
                shutdown.clone(),
            );
            (symbol.clone(), tokio::spawn(task.instrument(span)))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (symbol, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SimulatorError::Transport(format!("{} task failed: {}", symbol, e))),
        };
        if let Err(e) = &result {
            warn!("❌ {} stopped: {}", symbol, e.user_message());
        }
        results.push((symbol, result));
    }

    results
}
