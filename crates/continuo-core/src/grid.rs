//! Pulse arithmetic for the measure grid

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// MIDI clock pulses per quarter note.
pub const PPQN: u64 = 24;

/// Measure grid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Beats per measure (time signature numerator).
    pub beats_per_bar: u8,
    /// Measures of continuation generated per cycle.
    pub measures: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { beats_per_bar: 4, measures: 2 }
    }
}

impl GridConfig {
    pub fn pulses_per_bar(&self) -> u64 {
        self.beats_per_bar as u64 * PPQN
    }

    /// Width of the output window: `measures * pulses_per_bar`.
    pub fn window_pulses(&self) -> u64 {
        self.measures as u64 * self.pulses_per_bar()
    }

    pub fn validate(&self) -> Result<()> {
        if self.beats_per_bar == 0 {
            return Err(CoreError::InvalidConfig("beats_per_bar must be >= 1".into()));
        }
        if self.measures == 0 {
            return Err(CoreError::InvalidConfig("measures must be >= 1".into()));
        }
        Ok(())
    }
}

/// Model sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling temperature, in [0, 2].
    pub temperature: f32,
    /// Nucleus sampling threshold, in (0, 1].
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { temperature: 0.8, top_p: 0.9 }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CoreError::InvalidConfig(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "top_p {} outside (0, 1]",
                self.top_p
            )));
        }
        Ok(())
    }
}
