//! Frame timing and stimulation pulse alignment for kHz stimulation imaging
//! experiments.
//!
//! A raw acquisition stream multiplexes a 12-bit electric field channel with
//! a digital frame-marker line. [`stim::StimAnalysis`] decodes it, timestamps
//! every imaging frame, computes when each stimulation pulse was delivered
//! and maps the pulses onto frames. Activity traces from an imaging pipeline
//! can then be cut into pulse-aligned windows and averaged per phase.
//!
//! ```rust
//! use khzstim::stim::{AnalysisConfig, ExperimentSettings, ManualSource, StimAnalysis};
//!
//! // 100 Hz recording with a frame marker every 10 samples.
//! let words: Vec<u16> = (0..400)
//!     .map(|i| if i % 10 == 1 { 2048 | (1 << 13) } else { 2048 })
//!     .collect();
//! let settings = ExperimentSettings {
//!     mod_frequency: Some(10.0),
//!     block_duration: Some(1.0),
//!     nostim_pre_post_duration: Some(0.5),
//!     nostim_interblock_duration: Some(0.2),
//!     phases: Some(vec![0.0]),
//!     pamps: Some(vec![1.0]),
//!     ..ExperimentSettings::default()
//! };
//! let config = AnalysisConfig {
//!     subsampling_factor: 1,
//!     sampling_rate_hz: 100.0,
//!     buffer_size: 0,
//!     ..AnalysisConfig::default()
//! };
//! let analysis = StimAnalysis::from_source(&mut ManualSource::new(words), settings, config).unwrap();
//! assert_eq!(analysis.pulse_frames(), &[14]);
//! ```
pub mod render;
pub mod stim;
