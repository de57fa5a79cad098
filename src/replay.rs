//! Offline replay of recorded order book messages.
//!
//! Input files hold one feed message per line, the same JSON the live feed
//! delivers. Each symbol in a file gets its own pipeline; files run in
//! parallel on the rayon pool.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use indicatif::MultiProgress;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::parse_book_message;
use crate::config::Config;
use crate::core::pipeline::{PipelineStats, SimulationPipeline};
use crate::error::{SimulatorError, SimulatorResult};
use crate::progress::ReplayProgress;
use crate::runner::{build_pipeline, save_checkpoint};
use crate::sink::EstimateSink;

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub path: PathBuf,
    pub lines: u64,
    pub invalid_lines: u64,
    pub non_book_lines: u64,
    /// Pipeline stats per symbol seen in the file
    pub symbols: BTreeMap<String, PipelineStats>,
}

impl ReplayReport {
    pub fn stats(&self, symbol: &str) -> Option<&PipelineStats> {
        self.symbols.get(symbol)
    }

    pub fn estimates(&self) -> u64 {
        self.symbols.values().map(|s| s.estimates_emitted).sum()
    }
}

/// Pipeline plus the sequence counter for books that carry no sequence id
struct SymbolLane {
    pipeline: SimulationPipeline,
    next_sequence: u64,
}

/// Symbol used when a message does not name one: the file stem
fn default_symbol(path: &Path, config: &Config) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .or_else(|| config.feed.symbols.first().cloned())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn count_lines(path: &Path) -> SimulatorResult<u64> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().count() as u64)
}

/// Replay one recording. Books are routed to one pipeline per symbol they
/// name, so a file interleaving several instruments never mixes windows.
pub fn replay_file(
    config: &Config,
    path: &Path,
    sink: &dyn EstimateSink,
    progress: &ReplayProgress,
) -> SimulatorResult<ReplayReport> {
    let fallback_symbol = default_symbol(path, config);
    let reader = BufReader::new(File::open(path)?);
    let mut lanes: BTreeMap<String, SymbolLane> = BTreeMap::new();

    let mut lines = 0u64;
    let mut invalid_lines = 0u64;
    let mut non_book_lines = 0u64;
    let mut estimates = 0u64;
    let mut last_net_cost = 0.0;

    for line in reader.lines() {
        let line = line?;
        lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                invalid_lines += 1;
                debug!(line = lines, error = %e, "skipping unparseable line");
                progress.tick(estimates, last_net_cost);
                continue;
            }
        };

        let symbol = value
            .get("symbol")
            .and_then(|s| s.as_str())
            .unwrap_or(fallback_symbol.as_str())
            .to_string();
        let fallback_sequence = lanes.get(&symbol).map_or(0, |lane| lane.next_sequence) + 1;

        match parse_book_message(&value, &symbol, fallback_sequence) {
            Ok(Some(snapshot)) => {
                let lane = match lanes.entry(symbol) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let pipeline = build_pipeline(config, entry.key())?;
                        entry.insert(SymbolLane { pipeline, next_sequence: 0 })
                    }
                };
                lane.next_sequence = lane.next_sequence.max(snapshot.sequence());
                match lane.pipeline.process(snapshot, sink) {
                    Ok(estimate) => {
                        estimates += 1;
                        last_net_cost = estimate.net_cost;
                    }
                    Err(SimulatorError::InsufficientData { .. }) => {}
                    Err(e) => debug!(line = lines, error = %e, "snapshot skipped"),
                }
            }
            Ok(None) => non_book_lines += 1,
            Err(e) => {
                invalid_lines += 1;
                debug!(line = lines, error = %e, "rejected book");
            }
        }

        progress.tick(estimates, last_net_cost);
    }

    sink.flush();
    for lane in lanes.values() {
        save_checkpoint(config, &lane.pipeline);
    }
    progress.finish(estimates);

    Ok(ReplayReport {
        path: path.to_path_buf(),
        lines,
        invalid_lines,
        non_book_lines,
        symbols: lanes
            .into_iter()
            .map(|(symbol, lane)| (symbol, lane.pipeline.stats()))
            .collect(),
    })
}

/// Replay every file in parallel, one pipeline per file and symbol.
pub fn replay_files(
    config: &Config,
    paths: &[PathBuf],
    sink: &dyn EstimateSink,
    show_progress: bool,
) -> Vec<SimulatorResult<ReplayReport>> {
    let multi = MultiProgress::new();
    info!("🎬 Replaying {} file(s)", paths.len());

    let reports: Vec<SimulatorResult<ReplayReport>> = paths
        .par_iter()
        .map(|path| {
            let label = path.display().to_string();
            let progress = if show_progress {
                let total = count_lines(path)?;
                ReplayProgress::attached(&multi, total, &label)
            } else {
                ReplayProgress::hidden()
            };

            let result = replay_file(config, path, sink, &progress);
            if let Err(e) = &result {
                progress.finish_with_error(&e.to_string());
                warn!("❌ Replay of {} failed: {}", label, e);
            }
            result
        })
        .collect();

    for report in reports.iter().flatten() {
        info!(
            "📈 {}: {} lines, {} estimates, {} invalid",
            report.path.display(),
            report.lines,
            report.estimates(),
            report.invalid_lines
        );
        for (symbol, stats) in &report.symbols {
            info!(
                "   {}: {} estimates, {} out-of-order, median latency {}µs",
                symbol, stats.estimates_emitted, stats.out_of_order, stats.median_latency_us
            );
        }
    }

    reports
}
