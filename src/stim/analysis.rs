use std::io;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::ArrayView2;

use crate::stim::config::{AnalysisConfig, ResponseWindow};
use crate::stim::decoder::{DecodedSignal, SignalDecoder};
use crate::stim::error::Stage;
use crate::stim::frames::FrameTimeline;
use crate::stim::response::ResponseWindowSet;
use crate::stim::schedule::{PulseMarker, PulseSchedule};
use crate::stim::settings::ExperimentSettings;
use crate::stim::source::{FileSource, RawSampleStream, SampleSource};
use crate::stim::StimError;

/// Raw recording inside a trial directory.
pub const SAMPLE_FILE: &str = "sample.bin";
/// Protocol settings inside a trial directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Trial directory owning an imaging pipeline output file.
///
/// Pipeline outputs live at `<trial>/<pipeline>/<plane>/<file>`, so the
/// trial is three levels above the file.
pub fn trial_dir_for_stats_file(stats_file: &Path) -> Result<PathBuf, StimError> {
    stats_file
        .ancestors()
        .nth(3)
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            StimError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is not nested three levels inside a trial directory",
                    stats_file.display()
                ),
            ))
        })
}

/// One recording session: decoded signal, frame timeline and pulse schedule.
///
/// Everything is computed eagerly on construction and never changes after.
#[derive(Debug)]
pub struct StimAnalysis {
    trial_dir: Option<PathBuf>,
    config: AnalysisConfig,
    settings: ExperimentSettings,
    signal: DecodedSignal,
    timeline: FrameTimeline,
    schedule: PulseSchedule,
}

impl StimAnalysis {
    pub fn from_stats_file<P: AsRef<Path>>(
        stats_file: P,
        config: AnalysisConfig,
    ) -> Result<Self, StimError> {
        let trial_dir = trial_dir_for_stats_file(stats_file.as_ref())
            .map_err(|e| e.in_stage(Stage::Load))?;
        Self::from_trial_dir(trial_dir, config)
    }

    pub fn from_trial_dir<P: AsRef<Path>>(
        trial_dir: P,
        config: AnalysisConfig,
    ) -> Result<Self, StimError> {
        let trial_dir = trial_dir.as_ref();
        info!("loading stimulation data from {}", trial_dir.display());
        let settings = ExperimentSettings::load(trial_dir.join(SETTINGS_FILE))
            .map_err(|e| e.in_stage(Stage::Load))?;
        let mut source = FileSource::new(trial_dir.join(SAMPLE_FILE));
        let mut analysis = Self::from_source(&mut source, settings, config)?;
        analysis.trial_dir = Some(trial_dir.to_path_buf());
        Ok(analysis)
    }

    pub fn from_source<S: SampleSource>(
        source: &mut S,
        settings: ExperimentSettings,
        config: AnalysisConfig,
    ) -> Result<Self, StimError> {
        let stream = source
            .read_stream()
            .map_err(|e| e.in_stage(Stage::Load))?;
        Self::from_parts(&stream, settings, config)
    }

    /// Runs decode, frame timing and pulse alignment in order.
    pub fn from_parts(
        stream: &RawSampleStream,
        settings: ExperimentSettings,
        config: AnalysisConfig,
    ) -> Result<Self, StimError> {
        let signal = SignalDecoder::new(config.clone())
            .decode(stream)
            .map_err(|e| e.in_stage(Stage::Decode))?;
        let timeline =
            FrameTimeline::from_signal(&signal).map_err(|e| e.in_stage(Stage::FrameTiming))?;
        let schedule = settings
            .protocol()
            .and_then(|protocol| PulseSchedule::align(&protocol, &timeline))
            .map_err(|e| e.in_stage(Stage::PulseSchedule))?;
        info!(
            "session ready: {} frames at {:.3} Hz, {} pulses",
            timeline.len(),
            timeline.frame_rate,
            schedule.len()
        );
        Ok(Self {
            trial_dir: None,
            config,
            settings,
            signal,
            timeline,
            schedule,
        })
    }

    pub fn trial_dir(&self) -> Option<&Path> {
        self.trial_dir.as_deref()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn settings(&self) -> &ExperimentSettings {
        &self.settings
    }

    pub fn signal(&self) -> &DecodedSignal {
        &self.signal
    }

    pub fn timeline(&self) -> &FrameTimeline {
        &self.timeline
    }

    pub fn schedule(&self) -> &PulseSchedule {
        &self.schedule
    }

    pub fn frame_rate(&self) -> f64 {
        self.timeline.frame_rate
    }

    pub fn pulse_frames(&self) -> &[usize] {
        &self.schedule.pulse_frames
    }

    pub fn pulse_markers(&self) -> Vec<PulseMarker> {
        self.schedule.markers()
    }

    /// Slices pulse-aligned windows from an activity matrix (cells x frames).
    pub fn response_windows(
        &self,
        activity: ArrayView2<f32>,
        cells: &[usize],
        window: ResponseWindow,
    ) -> Result<ResponseWindowSet, StimError> {
        ResponseWindowSet::extract_for_window(
            activity,
            cells,
            &self.schedule,
            window,
            self.timeline.frame_rate,
        )
    }
}
