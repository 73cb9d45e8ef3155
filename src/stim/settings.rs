use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::stim::StimError;

/// Protocol parameters persisted next to a recording.
///
/// The six stimulation fields are optional so a partial or absent settings
/// file still loads; [`ExperimentSettings::protocol`] reports which one is
/// missing. Any other keys are kept verbatim in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nostim_pre_post_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nostim_interblock_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pamps: Option<Vec<f64>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExperimentSettings {
    /// Reads a JSON settings file. A missing file yields empty settings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StimError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(
                "no settings at {}; continuing with empty settings",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        debug!(
            "loaded settings from {} ({} extra keys)",
            path.display(),
            settings.extra.len()
        );
        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StimError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Extracts and validates the typed stimulation protocol.
    pub fn protocol(&self) -> Result<StimProtocol, StimError> {
        let protocol = StimProtocol {
            mod_frequency: require(self.mod_frequency, "mod_frequency")?,
            block_duration: require(self.block_duration, "block_duration")?,
            nostim_pre_post_duration: require(
                self.nostim_pre_post_duration,
                "nostim_pre_post_duration",
            )?,
            nostim_interblock_duration: require(
                self.nostim_interblock_duration,
                "nostim_interblock_duration",
            )?,
            phases: require(self.phases.clone(), "phases")?,
            pamps: require(self.pamps.clone(), "pamps")?,
        };
        protocol.validate()?;
        Ok(protocol)
    }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T, StimError> {
    value.ok_or(StimError::MissingProtocolParameter(name))
}

/// Fully specified block protocol: one pulse per block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimProtocol {
    /// Hz.
    pub mod_frequency: f64,
    /// Nominal block length in seconds, rounded up to whole modulation cycles.
    pub block_duration: f64,
    pub nostim_pre_post_duration: f64,
    pub nostim_interblock_duration: f64,
    /// Pulse phase in degrees within the last cycle of each block.
    pub phases: Vec<f64>,
    pub pamps: Vec<f64>,
}

impl StimProtocol {
    pub fn validate(&self) -> Result<(), StimError> {
        if !self.mod_frequency.is_finite() || self.mod_frequency <= 0.0 {
            return Err(StimError::DegenerateProtocol(format!(
                "mod_frequency must be positive, got {}",
                self.mod_frequency
            )));
        }
        if !self.block_duration.is_finite() || self.block_duration <= 0.0 {
            return Err(StimError::DegenerateProtocol(format!(
                "block_duration must be positive, got {}",
                self.block_duration
            )));
        }
        if self.phases.len() != self.pamps.len() {
            return Err(StimError::DegenerateProtocol(format!(
                "{} phases but {} pulse amplitudes",
                self.phases.len(),
                self.pamps.len()
            )));
        }
        Ok(())
    }

    pub fn num_blocks(&self) -> usize {
        self.phases.len()
    }

    pub fn mod_period(&self) -> f64 {
        1.0 / self.mod_frequency
    }

    /// Whole modulation cycles covering the nominal block duration.
    pub fn periods_per_block(&self) -> usize {
        (self.block_duration / self.mod_period()).ceil() as usize
    }
}
