use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broadcast: Broadcast,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Broadcast {
    /// Baseline delay between two sends on one worker, before dividing by
    /// the worker count.
    pub cooldown_ms: u64,
    /// Extra per-recipient allowance, only used for the start estimate.
    pub member_cooldown_ms: u64,
    /// Display only; pacing is enforced through `cooldown_ms`.
    pub requests_per_second: u64,
    pub max_message_len: usize,
    pub preview_len: usize,
    /// Appended after a blank line to every delivered message. `{id}` is
    /// replaced with the recipient id; empty disables the suffix.
    pub mention_template: String,
}
impl Default for Broadcast {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            member_cooldown_ms: 100,
            requests_per_second: 1,
            max_message_len: 2000,
            preview_len: 200,
            mention_template: "<@{id}>".into(),
        }
    }
}

impl Broadcast {
    /// Delay after each send on a single worker. Shrinks as workers are
    /// added so aggregate throughput stays near the configured rate per
    /// worker.
    pub fn pacing_interval(&self, worker_count: usize) -> Duration {
        if worker_count == 0 {
            return Duration::from_millis(self.cooldown_ms);
        }
        Duration::from_millis(self.cooldown_ms) / worker_count as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub step_percent: u64,
    pub heartbeat_ms: u64,
}
impl Default for Progress {
    fn default() -> Self {
        Self {
            step_percent: 5,
            heartbeat_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    pub max_per_page: usize,
    pub max_pages: usize,
    pub reason_max_len: usize,
}
impl Default for Report {
    fn default() -> Self {
        Self {
            max_per_page: 30,
            max_pages: 5,
            reason_max_len: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub workers: usize,
    pub latency_ms: u64,
}
impl Default for Simulation {
    fn default() -> Self {
        Self {
            workers: 2,
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub out_dir: String,
    pub write_report_json: bool,
    pub report_filename: String,
    pub write_index_json: bool,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
            write_index_json: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
