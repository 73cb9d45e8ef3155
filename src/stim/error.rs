use std::fmt;
use thiserror::Error;

/// Construction stage a failure was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Load,
    Decode,
    FrameTiming,
    PulseSchedule,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Decode => "decode",
            Stage::FrameTiming => "frame timing",
            Stage::PulseSchedule => "pulse schedule",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StimError {
    #[error("raw stream has {actual} samples, at least {required} are needed to trim the buffer flush")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("amplifier gain level {0} is outside 1..=6")]
    InvalidGainLevel(u8),
    #[error("invalid channel layout: {0}")]
    InvalidChannelLayout(String),
    #[error("sample rate must be finite and greater than zero, got {0}")]
    InvalidSampleRate(f64),
    #[error("found {found} frame marker rising edges, at least 2 are needed")]
    InsufficientFrameMarkers { found: usize },
    #[error("degenerate stimulation protocol: {0}")]
    DegenerateProtocol(String),
    #[error("settings are missing protocol parameter `{0}`")]
    MissingProtocolParameter(&'static str),
    #[error("window [{start}, {end}) around pulse {pulse} (frame {frame}) exceeds activity bounds [0, {num_frames})")]
    WindowOutOfBounds {
        pulse: usize,
        frame: usize,
        start: isize,
        end: usize,
        num_frames: usize,
    },
    #[error("cell index {cell} is out of range for an activity matrix with {num_cells} cells")]
    InvalidCellIndex { cell: usize, num_cells: usize },
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<StimError>,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}

impl StimError {
    /// Tags this error with the construction stage it came from.
    pub fn in_stage(self, stage: Stage) -> Self {
        StimError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any stage wrappers peeled off.
    pub fn root_cause(&self) -> &StimError {
        match self {
            StimError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StimError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for StimError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        StimError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for StimError {
    fn from(value: image::ImageError) -> Self {
        StimError::Plot(value.to_string())
    }
}
