//! Bridge configuration: TOML file plus CLI overrides

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use continuo_core::{GridConfig, Result, SamplingConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// MIDI clock input port (the DAW is clock master).
    pub clock_port: String,
    /// Live performance input port.
    pub in_port: String,
    /// Generated continuation output port.
    pub out_port: String,
    pub grid: GridConfig,
    pub sampling: SamplingConfig,
    /// Resolution assumed for generated MIDI that does not declare one.
    pub ticks_per_beat: u16,
    /// External generation command line.
    pub model_command: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            clock_port: "CONTINUO_CLOCK".to_string(),
            in_port: "CONTINUO_IN".to_string(),
            out_port: "CONTINUO_OUT".to_string(),
            grid: GridConfig::default(),
            sampling: SamplingConfig::default(),
            ticks_per_beat: 480,
            model_command: None,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.sampling.validate()?;
        if self.ticks_per_beat == 0 {
            return Err(continuo_core::CoreError::InvalidConfig(
                "ticks_per_beat must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("continuo")
        .join("config.toml")
}

pub fn load_config(path: &std::path::Path) -> BridgeConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}
