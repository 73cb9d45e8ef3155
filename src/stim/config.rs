use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::stim::StimError;

/// Analog magnitude occupies the low bits of every word.
pub const DEFAULT_ANALOG_BITS: u8 = 12;
/// Digital line that pulses once per acquired imaging frame.
pub const DEFAULT_FRAME_MARKER_BIT: u8 = 13;

/// Bit layout of a multiplexed acquisition word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelLayout {
    pub analog_bits: u8,
    pub frame_marker_bit: u8,
}

impl ChannelLayout {
    pub fn validate(&self) -> Result<(), StimError> {
        if self.analog_bits == 0 || self.analog_bits > 16 {
            return Err(StimError::InvalidChannelLayout(format!(
                "analog width must be 1..=16 bits, got {}",
                self.analog_bits
            )));
        }
        if self.frame_marker_bit >= 16 {
            return Err(StimError::InvalidChannelLayout(format!(
                "frame marker bit {} does not fit a 16-bit word",
                self.frame_marker_bit
            )));
        }
        if self.frame_marker_bit < self.analog_bits {
            return Err(StimError::InvalidChannelLayout(format!(
                "frame marker bit {} overlaps the {}-bit analog field",
                self.frame_marker_bit, self.analog_bits
            )));
        }
        Ok(())
    }

    pub fn analog_mask(&self) -> u16 {
        ((1u32 << self.analog_bits) - 1) as u16
    }

    /// ADC code of zero volts, half of the analog range.
    pub fn analog_midscale(&self) -> f32 {
        (1u32 << (self.analog_bits - 1)) as f32
    }

    pub fn frame_marker(&self, word: u16) -> u8 {
        ((word >> self.frame_marker_bit) & 1) as u8
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            analog_bits: DEFAULT_ANALOG_BITS,
            frame_marker_bit: DEFAULT_FRAME_MARKER_BIT,
        }
    }
}

/// Acquisition and decoding parameters of a recording session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Keep every k-th sample; 0 and 1 disable decimation.
    pub subsampling_factor: usize,
    pub sampling_rate_hz: f64,
    /// Twice this many leading samples are discarded (hardware buffer flush).
    pub buffer_size: usize,
    pub electrode_spacing_m: f32,
    pub amplifier_gain_level: u8,
    pub vref_volts: f32,
    pub layout: ChannelLayout,
}

impl AnalysisConfig {
    /// Loads a JSON config; missing fields fall back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StimError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn trim_len(&self) -> usize {
        self.buffer_size * 2
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            subsampling_factor: 32,
            sampling_rate_hz: 400_000.0,
            buffer_size: 16_384,
            electrode_spacing_m: 10e-3,
            amplifier_gain_level: 1,
            vref_volts: 10.0,
            layout: ChannelLayout::default(),
        }
    }
}

/// Pre/post pulse span used when slicing response windows.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseWindow {
    pub pre_seconds: f64,
    pub post_seconds: f64,
}

impl ResponseWindow {
    pub fn new(pre_seconds: f64, post_seconds: f64) -> Self {
        Self {
            pre_seconds: pre_seconds.max(0.0),
            post_seconds: post_seconds.max(0.0),
        }
    }

    /// Frame counts `(pre, post)` at the given frame rate, rounded up.
    pub fn frames(&self, frame_rate: f64) -> (usize, usize) {
        (
            (self.pre_seconds * frame_rate).ceil() as usize,
            (self.post_seconds * frame_rate).ceil() as usize,
        )
    }
}

impl Default for ResponseWindow {
    fn default() -> Self {
        ResponseWindow {
            pre_seconds: 3.0,
            post_seconds: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_acquisition_board() {
        let layout = ChannelLayout::default();
        layout.validate().unwrap();
        assert_eq!(layout.analog_mask(), 4095);
        assert_eq!(layout.analog_midscale(), 2048.0);
        assert_eq!(layout.frame_marker(1 << 13), 1);
        assert_eq!(layout.frame_marker(4095 | (1 << 14)), 0);
    }

    #[test]
    fn overlapping_marker_bit_is_rejected() {
        let layout = ChannelLayout {
            analog_bits: 12,
            frame_marker_bit: 11,
        };
        assert!(matches!(
            layout.validate(),
            Err(StimError::InvalidChannelLayout(_))
        ));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "subsampling_factor": 4, "layout": { "frame_marker_bit": 14 } }"#)
                .unwrap();
        assert_eq!(config.subsampling_factor, 4);
        assert_eq!(config.sampling_rate_hz, 400_000.0);
        assert_eq!(config.layout.analog_bits, 12);
        assert_eq!(config.layout.frame_marker_bit, 14);
        assert_eq!(config.trim_len(), 32_768);
    }

    #[test]
    fn window_frames_round_up() {
        let window = ResponseWindow::new(3.0, 1.0);
        assert_eq!(window.frames(10.0), (30, 10));
        assert_eq!(window.frames(2.5), (8, 3));
    }
}
