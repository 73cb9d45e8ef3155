use log::{info, warn};

use crate::stim::decoder::DecodedSignal;
use crate::stim::StimError;

/// Timestamps of acquired imaging frames on the recording's own clock.
#[derive(Clone, Debug)]
pub struct FrameTimeline {
    pub frame_times: Vec<f32>,
    pub frame_rate: f64,
}

impl FrameTimeline {
    /// Detects frame-marker rising edges and estimates the frame rate.
    ///
    /// An edge at index `i` means `marker[i + 1] - marker[i] == 1`; the frame
    /// is stamped with `times[i]`. The rate is the reciprocal of the median
    /// inter-frame interval, which tolerates a few dropped or spurious edges
    /// but not drift.
    pub fn reconstruct(frame_marker: &[u8], times: &[f32]) -> Result<Self, StimError> {
        debug_assert_eq!(frame_marker.len(), times.len());
        let edges = rising_edges(frame_marker);
        if edges.len() < 2 {
            return Err(StimError::InsufficientFrameMarkers { found: edges.len() });
        }
        let frame_times: Vec<f32> = edges.iter().map(|&i| times[i]).collect();
        let intervals: Vec<f32> = frame_times.windows(2).map(|w| w[1] - w[0]).collect();
        let frame_rate = 1.0 / median(&intervals) as f64;

        let (min, max) = intervals
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        if max > 1.5 * min {
            warn!(
                "frame intervals range from {min} s to {max} s; markers may have been dropped"
            );
        }
        info!(
            "reconstructed {} frames at {:.3} Hz",
            frame_times.len(),
            frame_rate
        );
        Ok(Self {
            frame_times,
            frame_rate,
        })
    }

    pub fn from_signal(signal: &DecodedSignal) -> Result<Self, StimError> {
        Self::reconstruct(&signal.frame_marker, &signal.efield_times)
    }

    pub fn len(&self) -> usize {
        self.frame_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_times.is_empty()
    }

    /// Index of the frame closest to `t`; ties go to the earlier frame.
    ///
    /// Times outside the recorded span clamp to the first or last frame.
    pub fn nearest_frame(&self, t: f64) -> usize {
        let times = &self.frame_times;
        let upper = times.partition_point(|&ft| (ft as f64) < t);
        if upper == 0 {
            return 0;
        }
        if upper == times.len() {
            return times.len() - 1;
        }
        let below = t - times[upper - 1] as f64;
        let above = times[upper] as f64 - t;
        if above < below {
            upper
        } else {
            upper - 1
        }
    }

    /// Whether `t` lies within the first and last frame timestamps.
    pub fn covers(&self, t: f64) -> bool {
        match (self.frame_times.first(), self.frame_times.last()) {
            (Some(&first), Some(&last)) => t >= first as f64 && t <= last as f64,
            _ => false,
        }
    }
}

fn rising_edges(channel: &[u8]) -> Vec<usize> {
    channel
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] == 0 && pair[1] == 1)
        .map(|(i, _)| i)
        .collect()
}

/// Median of a non-empty slice; even lengths average the middle pair.
fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
