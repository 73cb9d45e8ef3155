use log::{debug, info};

use crate::stim::config::{AnalysisConfig, ChannelLayout};
use crate::stim::source::RawSampleStream;
use crate::stim::StimError;

/// Amplifier multipliers indexed by gain level 1..=6.
pub const AMPLIFIER_GAINS: [f32; 6] = [1.0, 5.0, 10.0, 50.0, 100.0, 200.0];

pub fn amplifier_gain(level: u8) -> Result<f32, StimError> {
    match level {
        1..=6 => Ok(AMPLIFIER_GAINS[level as usize - 1]),
        _ => Err(StimError::InvalidGainLevel(level)),
    }
}

/// Converts one raw word to electric field units (V/m).
///
/// The ADC code is recentred on midscale, normalised to [-1, 1], scaled by
/// the reference voltage and negated to undo the board's inverting front end.
pub fn decode_analog(
    word: u16,
    layout: &ChannelLayout,
    vref_volts: f32,
    gain: f32,
    electrode_spacing_m: f32,
) -> f32 {
    let midscale = layout.analog_midscale();
    let code = (word & layout.analog_mask()) as f32;
    let volts = -(((code - midscale) / midscale) * vref_volts);
    (volts / gain) / electrode_spacing_m
}

/// Analog and digital channels demultiplexed from a raw recording.
#[derive(Clone, Debug)]
pub struct DecodedSignal {
    pub efield: Vec<f32>,
    pub efield_times: Vec<f32>,
    /// Frame-marker line, one 0/1 value per decoded sample.
    pub frame_marker: Vec<u8>,
    /// Effective rate after subsampling.
    pub sampling_rate_hz: f64,
}

impl DecodedSignal {
    pub fn len(&self) -> usize {
        self.efield.len()
    }

    pub fn is_empty(&self) -> bool {
        self.efield.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.efield.len() as f64 / self.sampling_rate_hz
    }
}

pub struct SignalDecoder {
    config: AnalysisConfig,
}

impl SignalDecoder {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Trims the buffer-flush prefix, decimates, and splits the channels.
    ///
    /// Decimation keeps every k-th word with no anti-alias filtering.
    pub fn decode(&self, stream: &RawSampleStream) -> Result<DecodedSignal, StimError> {
        let config = &self.config;
        if !config.sampling_rate_hz.is_finite() || config.sampling_rate_hz <= 0.0 {
            return Err(StimError::InvalidSampleRate(config.sampling_rate_hz));
        }
        config.layout.validate()?;
        let gain = amplifier_gain(config.amplifier_gain_level)?;

        let trim = config.trim_len();
        if stream.len() < trim {
            return Err(StimError::InsufficientSamples {
                required: trim,
                actual: stream.len(),
            });
        }
        let trimmed = &stream.samples()[trim..];

        let step = config.subsampling_factor.max(1);
        let sampling_rate_hz = config.sampling_rate_hz / step as f64;
        let words: Vec<u16> = trimmed.iter().step_by(step).copied().collect();
        debug!(
            "trimmed {} samples, kept {} of {} after subsampling by {}",
            trim,
            words.len(),
            trimmed.len(),
            step
        );

        let layout = &config.layout;
        let efield = words
            .iter()
            .map(|&w| {
                decode_analog(
                    w,
                    layout,
                    config.vref_volts,
                    gain,
                    config.electrode_spacing_m,
                )
            })
            .collect();
        let frame_marker = words.iter().map(|&w| layout.frame_marker(w)).collect();
        let rate = sampling_rate_hz as f32;
        let efield_times = (0..words.len()).map(|i| i as f32 / rate).collect();

        info!(
            "decoded {} samples at {} Hz",
            words.len(),
            sampling_rate_hz
        );
        Ok(DecodedSignal {
            efield,
            efield_times,
            frame_marker,
            sampling_rate_hz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stim::frames::FrameTimeline;

    fn config(subsampling_factor: usize, buffer_size: usize) -> AnalysisConfig {
        AnalysisConfig {
            subsampling_factor,
            sampling_rate_hz: 1000.0,
            buffer_size,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn analog_decode_matches_formula_for_every_gain() {
        let layout = ChannelLayout::default();
        let (vref, spacing) = (10.0f32, 10e-3f32);
        for level in 1..=6u8 {
            let gain = amplifier_gain(level).unwrap();
            for raw in [0u16, 1, 2047, 2048, 3000, 4095, 4095 | (1 << 13), 0xffff] {
                let expected =
                    -((((raw & 4095) as f32 - 2048.0) / 2048.0) * vref) / gain / spacing;
                assert_eq!(decode_analog(raw, &layout, vref, gain, spacing), expected);
            }
        }
    }

    #[test]
    fn gain_level_outside_table_is_rejected() {
        assert!(matches!(amplifier_gain(0), Err(StimError::InvalidGainLevel(0))));
        assert!(matches!(amplifier_gain(7), Err(StimError::InvalidGainLevel(7))));
        let decoder = SignalDecoder::new(AnalysisConfig {
            amplifier_gain_level: 7,
            ..config(1, 0)
        });
        let err = decoder.decode(&RawSampleStream::new(vec![0; 4])).unwrap_err();
        assert!(matches!(err, StimError::InvalidGainLevel(7)));
    }

    #[test]
    fn midscale_decodes_to_zero_field() {
        let decoder = SignalDecoder::new(config(1, 0));
        let signal = decoder.decode(&RawSampleStream::new(vec![2048; 3])).unwrap();
        assert!(signal.efield.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn short_stream_fails_trim() {
        let decoder = SignalDecoder::new(config(1, 4));
        let err = decoder.decode(&RawSampleStream::new(vec![0; 7])).unwrap_err();
        assert!(matches!(
            err,
            StimError::InsufficientSamples {
                required: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn subsampling_keeps_every_kth_sample() {
        let raw: Vec<u16> = (0..4 + 10).map(|v| v as u16).collect();
        for k in 1..=5usize {
            let decoder = SignalDecoder::new(config(k, 2));
            let signal = decoder.decode(&RawSampleStream::new(raw.clone())).unwrap();
            assert_eq!(signal.len(), (10 + k - 1) / k);
            assert_eq!(signal.efield_times.len(), signal.len());
            assert_eq!(signal.sampling_rate_hz, 1000.0 / k as f64);
        }
        let decoder = SignalDecoder::new(config(3, 2));
        let signal = decoder.decode(&RawSampleStream::new(raw)).unwrap();
        let layout = ChannelLayout::default();
        let first_kept = decode_analog(4, &layout, 10.0, 1.0, 10e-3);
        let second_kept = decode_analog(7, &layout, 10.0, 1.0, 10e-3);
        assert_eq!(signal.efield[0], first_kept);
        assert_eq!(signal.efield[1], second_kept);
    }

    #[test]
    fn time_base_is_uniform() {
        let decoder = SignalDecoder::new(config(4, 0));
        let signal = decoder.decode(&RawSampleStream::new(vec![0; 40])).unwrap();
        assert_eq!(signal.sampling_rate_hz, 250.0);
        for (i, t) in signal.efield_times.iter().enumerate() {
            assert_eq!(*t, i as f32 / 250.0);
        }
        assert!(signal.efield_times.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn frame_marker_bit_is_extracted() {
        let decoder = SignalDecoder::new(config(1, 0));
        let words = vec![0, 1 << 13, (1 << 13) | 4095, 1 << 14];
        let signal = decoder.decode(&RawSampleStream::new(words)).unwrap();
        assert_eq!(signal.frame_marker, vec![0, 1, 1, 0]);
    }

    #[test]
    fn relocated_marker_bit_drives_frame_timing() {
        let decoder = SignalDecoder::new(AnalysisConfig {
            layout: ChannelLayout {
                analog_bits: 12,
                frame_marker_bit: 14,
            },
            ..config(1, 0)
        });
        // Bit 13 toggles every other word and must not read as a marker.
        let words: Vec<u16> = (0..30u16)
            .map(|i| {
                let noise = if i % 2 == 0 { 1 << 13 } else { 0 };
                let marker = if i % 10 == 1 { 1 << 14 } else { 0 };
                2048 | noise | marker
            })
            .collect();
        let signal = decoder.decode(&RawSampleStream::new(words)).unwrap();
        let expected: Vec<u8> = (0..30).map(|i| u8::from(i % 10 == 1)).collect();
        assert_eq!(signal.frame_marker, expected);
        assert!(signal.efield.iter().all(|&v| v == 0.0));

        let timeline = FrameTimeline::from_signal(&signal).unwrap();
        assert_eq!(
            timeline.frame_times,
            vec![0.0, 10.0 / 1000.0, 20.0 / 1000.0]
        );
        assert!((timeline.frame_rate - 100.0).abs() < 1e-3);
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let decoder = SignalDecoder::new(AnalysisConfig {
            sampling_rate_hz: 0.0,
            ..config(1, 0)
        });
        let err = decoder.decode(&RawSampleStream::new(vec![0; 4])).unwrap_err();
        assert!(matches!(err, StimError::InvalidSampleRate(_)));
    }
}
