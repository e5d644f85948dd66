//! Configuration management for minigpu-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`MINIGPU_NUM_CORES`, etc.)
//! 2. Project-local config file (`./minigpu-emu.toml`)
//! 3. User config file (`~/.config/minigpu-emu/config.toml`)
//! 4. Built-in defaults
//!
//! Every field is optional; [`Config::gpu_config`] fills the gaps with the
//! defaults of [`GpuConfig`].
//!
//! # Config File Format
//!
//! ```toml
//! # minigpu-emu.toml
//!
//! num_cores = 4
//! num_simds = 2
//! wave_size = 32
//! lane_width = 16
//! memory_latency = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Project-local config file name.
const LOCAL_CONFIG: &str = "minigpu-emu.toml";

/// Invalid machine geometry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A size that must be non-zero is zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field name.
        field: &'static str,
    },

    /// A wave must split evenly over the physical lanes.
    #[error("wave_size {wave_size} is not a multiple of lane_width {lane_width}")]
    WaveNotMultipleOfLanes {
        /// Threads per wave.
        wave_size: u32,
        /// Lanes per SIMD engine.
        lane_width: u32,
    },
}

/// Resolved machine geometry and run limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuConfig {
    /// Compute units.
    pub num_cores: usize,
    /// SIMD engines per compute unit.
    pub num_simds: usize,
    /// Threads per wave.
    pub wave_size: u32,
    /// Physical lanes per SIMD engine.
    pub lane_width: u32,
    /// PC bank entries per SIMD engine.
    pub num_pc_contexts: usize,
    /// Program memory size in words.
    pub program_memory_words: usize,
    /// Data memory size in words.
    pub data_memory_words: usize,
    /// Handshake latency of the flat memory models.
    pub memory_latency: u32,
    /// Default cycle budget for a run.
    pub max_cycles: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            num_cores: 4,
            num_simds: 2,
            wave_size: 32,
            lane_width: 16,
            num_pc_contexts: 8,
            program_memory_words: 256,
            data_memory_words: 256,
            memory_latency: 1,
            max_cycles: 100_000,
        }
    }
}

impl GpuConfig {
    /// Check the geometry can be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("num_cores", self.num_cores as u64),
            ("num_simds", self.num_simds as u64),
            ("wave_size", self.wave_size as u64),
            ("lane_width", self.lane_width as u64),
            ("num_pc_contexts", self.num_pc_contexts as u64),
            ("memory_latency", self.memory_latency as u64),
        ];
        if let Some(&(field, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.wave_size % self.lane_width != 0 {
            return Err(ConfigError::WaveNotMultipleOfLanes {
                wave_size: self.wave_size,
                lane_width: self.lane_width,
            });
        }
        Ok(())
    }

    /// Wave cycles needed to run one wave over the physical lanes.
    pub fn wave_cycles(&self) -> u32 {
        self.wave_size.div_ceil(self.lane_width.max(1))
    }

    /// SIMD engines across all compute units.
    pub fn total_simds(&self) -> usize {
        self.num_cores * self.num_simds
    }
}

/// minigpu-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Compute units.
    pub num_cores: Option<usize>,

    /// SIMD engines per compute unit.
    pub num_simds: Option<usize>,

    /// Threads per wave.
    pub wave_size: Option<u32>,

    /// Physical lanes per SIMD engine.
    pub lane_width: Option<u32>,

    /// PC bank entries per SIMD engine.
    pub num_pc_contexts: Option<usize>,

    /// Program memory size in words.
    pub program_memory_words: Option<usize>,

    /// Data memory size in words.
    pub data_memory_words: Option<usize>,

    /// Cycles a memory request is held before it is acknowledged.
    pub memory_latency: Option<u32>,

    /// Cycle budget before a run is abandoned.
    pub max_cycles: Option<u64>,
}

impl Config {
    /// Defaults, then the user file, then the project file, then `MINIGPU_*` variables.
    pub fn load() -> Self {
        let mut config = Self::default();
        for layer in [Self::load_user_config(), Self::load_local_config()].into_iter().flatten() {
            config.merge(layer);
        }
        config.apply_env_overrides();
        config
    }

    /// Process-wide configuration, loaded on first use.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Resolve the machine geometry, falling back to defaults.
    pub fn gpu_config(&self) -> GpuConfig {
        let d = GpuConfig::default();
        GpuConfig {
            num_cores: self.num_cores.unwrap_or(d.num_cores),
            num_simds: self.num_simds.unwrap_or(d.num_simds),
            wave_size: self.wave_size.unwrap_or(d.wave_size),
            lane_width: self.lane_width.unwrap_or(d.lane_width),
            num_pc_contexts: self.num_pc_contexts.unwrap_or(d.num_pc_contexts),
            program_memory_words: self.program_memory_words.unwrap_or(d.program_memory_words),
            data_memory_words: self.data_memory_words.unwrap_or(d.data_memory_words),
            memory_latency: self.memory_latency.unwrap_or(d.memory_latency),
            max_cycles: self.max_cycles.unwrap_or(d.max_cycles),
        }
    }

    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// First `minigpu-emu.toml` found in the working directory or the package root.
    fn load_local_config() -> Option<Self> {
        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") {
            candidates.push(Path::new(&dir).join(LOCAL_CONFIG));
        }
        candidates.iter().find_map(|path| Self::load_from_file(path))
    }

    /// Parse one config file. Missing files are silent; broken ones are logged and skipped.
    fn load_from_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match toml::from_str(&content) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Overlay the fields `other` sets.
    fn merge(&mut self, other: Self) {
        fn take<T>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take(&mut self.num_cores, other.num_cores);
        take(&mut self.num_simds, other.num_simds);
        take(&mut self.wave_size, other.wave_size);
        take(&mut self.lane_width, other.lane_width);
        take(&mut self.num_pc_contexts, other.num_pc_contexts);
        take(&mut self.program_memory_words, other.program_memory_words);
        take(&mut self.data_memory_words, other.data_memory_words);
        take(&mut self.memory_latency, other.memory_latency);
        take(&mut self.max_cycles, other.max_cycles);
    }

    fn apply_env_overrides(&mut self) {
        env_override("MINIGPU_NUM_CORES", &mut self.num_cores);
        env_override("MINIGPU_NUM_SIMDS", &mut self.num_simds);
        env_override("MINIGPU_WAVE_SIZE", &mut self.wave_size);
        env_override("MINIGPU_LANE_WIDTH", &mut self.lane_width);
        env_override("MINIGPU_MEMORY_LATENCY", &mut self.memory_latency);
        env_override("MINIGPU_MAX_CYCLES", &mut self.max_cycles);
    }

    /// `~/.config/minigpu-emu/config.toml` on Linux.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("minigpu-emu").join("config.toml"))
    }

    /// Commented config file with the default geometry.
    pub fn sample_config() -> String {
        r#"# minigpu-emu configuration
# Place this file at ~/.config/minigpu-emu/config.toml or ./minigpu-emu.toml

# Machine geometry
num_cores = 4
num_simds = 2

# Threads per wave; must be a multiple of lane_width
wave_size = 32
lane_width = 16

# PC bank entries per SIMD engine
# num_pc_contexts = 8

# Memory sizes in 32-bit words
# program_memory_words = 256
# data_memory_words = 256

# Cycles a request is held before memory acknowledges it
memory_latency = 1

# Cycle budget before a run is abandoned
# max_cycles = 100000
"#
        .to_string()
    }
}

/// Parse `var` into `slot` if set. Unparseable values are logged and ignored.
fn env_override<T: FromStr + Copy + std::fmt::Display>(var: &str, slot: &mut Option<T>) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            log::info!("Using {} from environment: {}", var, value);
            *slot = Some(value);
        }
        Err(_) => log::warn!("Ignoring {}: '{}' is not a number", var, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let gpu = Config::default().gpu_config();
        assert_eq!(gpu, GpuConfig::default());
        assert_eq!(gpu.num_cores, 4);
        assert_eq!(gpu.wave_cycles(), 2);
        assert_eq!(gpu.total_simds(), 8);
        assert!(gpu.validate().is_ok());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            num_cores: Some(2),
            wave_size: Some(16),
            memory_latency: Some(3),
            ..Default::default()
        };

        let overlay = Config {
            num_cores: None,
            lane_width: Some(8),
            memory_latency: Some(1),
            ..Default::default()
        };

        base.merge(overlay);

        assert_eq!(base.num_cores, Some(2));
        assert_eq!(base.lane_width, Some(8));
        assert_eq!(base.memory_latency, Some(1));
        assert_eq!(base.wave_size, Some(16));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let zero = GpuConfig { num_simds: 0, ..Default::default() };
        assert_eq!(zero.validate(), Err(ConfigError::Zero { field: "num_simds" }));

        let uneven = GpuConfig { wave_size: 24, lane_width: 16, ..Default::default() };
        assert!(matches!(uneven.validate(), Err(ConfigError::WaveNotMultipleOfLanes { .. })));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.num_simds, Some(2));
        assert_eq!(config.num_pc_contexts, None);
        assert!(config.gpu_config().validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        assert_eq!(Config::load_from_file(Path::new("/nonexistent/minigpu-emu.toml")), None);
    }
}
