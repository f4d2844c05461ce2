use std::fs::File;
use std::io::Read;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub log_level: String,
    pub scheduler: SchedulerConfig,
    pub demo: DemoConfig,
}

impl Default for RxConfig {
    fn default() -> Self {
        RxConfig {
            log_level: "info".to_string(),
            scheduler: SchedulerConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Smallest period a periodic task may use; zero periods are raised to it.
    pub resolution_ms: u64,
    /// Turns a virtual clock runs at one instant before giving up.
    pub max_turns_per_instant: usize,
    /// Longest the event loop blocks without a due timer.
    pub idle_timeout_ms: u64,
    pub command_capacity: usize,
}

impl SchedulerConfig {
    pub fn resolution(&self) -> Duration {
        Duration::from_millis(self.resolution_ms.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            resolution_ms: 1,
            max_turns_per_instant: 10_000,
            idle_timeout_ms: 1000,
            command_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Fixed seed for the random picks; a fresh one per run when absent.
    pub seed: Option<u64>,
    pub pokemon: Vec<String>,
    /// Interval ticks to print before unsubscribing.
    pub interval_ticks: u64,
    /// Divides every demo delay, so 10.0 runs the snippets ten times faster.
    pub time_scale: f64,
}

impl DemoConfig {
    pub fn scaled(&self, millis: u64) -> Duration {
        let scale = if self.time_scale > 0.0 { self.time_scale } else { 1.0 };
        Duration::from_secs_f64(millis as f64 / 1000.0 / scale)
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            seed: None,
            pokemon: ["Squirtle", "Charmander", "Bulbasaur", "Pikachu"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_ticks: 3,
            time_scale: 1.0,
        }
    }
}

pub fn parse_yaml(path: &str, contents: &str) -> Result<RxConfig, ConfigError> {
    serde_yaml::from_str(contents).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })
}

pub fn load_yaml_file(path: &str) -> Result<RxConfig, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_string(),
        source,
    };
    let mut file = File::open(path).map_err(io_error)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(io_error)?;
    let config = parse_yaml(path, &contents)?;
    info!("loaded config from {}", path);
    Ok(config)
}
