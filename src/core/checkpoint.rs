// JSON checkpoints of learned model parameters, one directory per symbol

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::classifier::ClassifierParams;
use crate::core::pipeline::SimulationPipeline;
use crate::core::slippage::SlippageParams;
use crate::error::{SimulatorError, SimulatorResult};

const SLIPPAGE_FILE: &str = "slippage.json";
const CLASSIFIER_FILE: &str = "maker_taker.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCheckpoint<P> {
    pub model: String,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub params: P,
}

/// Parameters recovered from disk; either may be missing
#[derive(Debug, Clone, Default)]
pub struct RestoredModels {
    pub slippage: Option<SlippageParams>,
    pub classifier: Option<ClassifierParams>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn symbol_dir(&self, symbol: &str) -> PathBuf {
        let safe: String = symbol
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(safe)
    }

    pub fn save(&self, pipeline: &SimulationPipeline) -> SimulatorResult<PathBuf> {
        let dir = self.symbol_dir(pipeline.symbol());
        fs::create_dir_all(&dir)?;

        let now = Utc::now();
        write_json(
            &dir.join(SLIPPAGE_FILE),
            &ModelCheckpoint {
                model: "slippage".to_string(),
                version: pipeline.slippage_model().state().version(),
                saved_at: now,
                params: *pipeline.slippage_params(),
            },
        )?;
        write_json(
            &dir.join(CLASSIFIER_FILE),
            &ModelCheckpoint {
                model: "maker_taker".to_string(),
                version: pipeline.classifier().state().version(),
                saved_at: now,
                params: *pipeline.classifier_params(),
            },
        )?;

        info!("💾 Saved {} model checkpoint to {}", pipeline.symbol(), dir.display());
        Ok(dir)
    }

    pub fn load(&self, symbol: &str) -> SimulatorResult<RestoredModels> {
        let dir = self.symbol_dir(symbol);
        let slippage = read_json::<ModelCheckpoint<SlippageParams>>(&dir.join(SLIPPAGE_FILE))?;
        let classifier = read_json::<ModelCheckpoint<ClassifierParams>>(&dir.join(CLASSIFIER_FILE))?;

        if slippage.is_some() || classifier.is_some() {
            info!("📂 Restored {} model checkpoint from {}", symbol, dir.display());
        }

        Ok(RestoredModels {
            slippage: slippage.map(|c| c.params),
            classifier: classifier.map(|c| c.params),
        })
    }
}

// Write to a sibling temp file and rename so readers never see a torn file
fn write_json<T: Serialize>(path: &Path, value: &T) -> SimulatorResult<()> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SimulatorResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SimulatorError::Checkpoint(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_symbol_dir_is_sanitized() {
        let store = CheckpointStore::new("/tmp/ckpt");
        assert_eq!(store.symbol_dir("BTC/USD:PERP"), PathBuf::from("/tmp/ckpt/BTC_USD_PERP"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path());
        let pipeline = SimulationPipeline::new("ETH-USDT-SWAP", &Config::default());

        store.save(&pipeline).expect("save");
        let restored = store.load("ETH-USDT-SWAP").expect("load");
        let slippage = restored.slippage.expect("slippage params");
        let classifier = restored.classifier.expect("classifier params");
        assert!((slippage.spread_pct - SlippageParams::default().spread_pct).abs() < 1e-12);
        assert!((classifier.bias - ClassifierParams::default().bias).abs() < 1e-12);
    }

    #[test]
    fn test_missing_checkpoint_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path());
        let restored = store.load("NOPE").expect("load");
        assert!(restored.slippage.is_none());
        assert!(restored.classifier.is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path());
        let symbol_dir = store.symbol_dir("BTC");
        fs::create_dir_all(&symbol_dir).expect("mkdir");
        fs::write(symbol_dir.join(SLIPPAGE_FILE), "{not json").expect("write");
        assert!(matches!(store.load("BTC"), Err(SimulatorError::Checkpoint(_))));
    }
}
