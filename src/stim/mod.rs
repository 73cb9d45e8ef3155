// src/stim/mod.rs
// Decoding, frame timing and pulse alignment for kHz stimulation recordings.
pub mod analysis;
pub mod config;
pub mod decoder;
pub mod error;
pub mod frames;
pub mod response;
pub mod schedule;
pub mod settings;
pub mod source;
// Re-export the types callers work with.
pub use analysis::{trial_dir_for_stats_file, StimAnalysis, SAMPLE_FILE, SETTINGS_FILE};
pub use config::{AnalysisConfig, ChannelLayout, ResponseWindow};
pub use decoder::{amplifier_gain, decode_analog, DecodedSignal, SignalDecoder};
pub use error::{Stage, StimError};
pub use frames::FrameTimeline;
pub use response::{PhaseAverage, PulseGroup, ResponseWindowSet};
pub use schedule::{pulse_times, PulseMarker, PulseSchedule};
pub use settings::{ExperimentSettings, StimProtocol};
pub use source::{FileSource, ManualSource, RawSampleStream, SampleSource};
