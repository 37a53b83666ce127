use std::path::{Path, PathBuf};

use anyhow::Context as _;
use gif_pipe::pipe::PipeConfig;
use serde::Deserialize;

/// Run settings, optionally seeded from a json file and overridden
/// field-by-field from the command line.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LapseConfig {
    pub workers: usize,
    pub delay_cs: u16,
    pub loop_count: u16,
    pub url_template: String,
    pub output: PathBuf,
    pub save_frames_dir: Option<PathBuf>,
}

impl Default for LapseConfig {
    fn default() -> Self {
        let defaults = PipeConfig::default();
        Self {
            workers: defaults.workers,
            delay_cs: defaults.delay_cs,
            loop_count: defaults.loop_count,
            url_template: defaults.url_template,
            output: defaults.output,
            save_frames_dir: defaults.save_frames_dir,
        }
    }
}

impl LapseConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file '{}'", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parse config file '{}'", path.display()))?;
        Ok(config)
    }
}

impl From<LapseConfig> for PipeConfig {
    fn from(config: LapseConfig) -> Self {
        PipeConfig {
            workers: config.workers,
            delay_cs: config.delay_cs,
            loop_count: config.loop_count,
            url_template: config.url_template,
            output: config.output,
            save_frames_dir: config.save_frames_dir,
        }
    }
}
