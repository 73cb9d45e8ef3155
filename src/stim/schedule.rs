use log::{debug, warn};
use serde::Serialize;

use crate::stim::frames::FrameTimeline;
use crate::stim::settings::StimProtocol;
use crate::stim::StimError;

/// Overlay marker for one delivered pulse.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PulseMarker {
    pub frame: usize,
    pub phase: f64,
    pub amplitude: f64,
}

/// Intended pulse times and the frames they landed on, in block order.
#[derive(Clone, Debug, PartialEq)]
pub struct PulseSchedule {
    pub pulse_times: Vec<f64>,
    pub pulse_frames: Vec<usize>,
    pub phases: Vec<f64>,
    pub pamps: Vec<f64>,
}

/// Closed-form pulse times: one pulse in the last modulation cycle of each
/// block, offset by the block's phase.
pub fn pulse_times(protocol: &StimProtocol) -> Result<Vec<f64>, StimError> {
    protocol.validate()?;
    let mod_period = protocol.mod_period();
    let periods = protocol.periods_per_block();
    let block_span = periods as f64 * mod_period;

    let mut cursor = protocol.nostim_pre_post_duration;
    let mut times = Vec::with_capacity(protocol.num_blocks());
    for &phase in &protocol.phases {
        let t_pulse =
            cursor + (periods as f64 - 1.0) * mod_period + mod_period * phase / 360.0;
        times.push(t_pulse);
        cursor += block_span + protocol.nostim_interblock_duration;
    }
    Ok(times)
}

impl PulseSchedule {
    /// Computes pulse times and aligns each one to its nearest frame.
    pub fn align(protocol: &StimProtocol, timeline: &FrameTimeline) -> Result<Self, StimError> {
        let pulse_times = pulse_times(protocol)?;
        let pulse_frames: Vec<usize> = pulse_times
            .iter()
            .map(|&t| timeline.nearest_frame(t))
            .collect();

        let outside = pulse_times.iter().filter(|&&t| !timeline.covers(t)).count();
        if outside > 0 {
            warn!(
                "{outside} of {} pulses fall outside the recorded frames and were clamped to the nearest end",
                pulse_times.len()
            );
        }
        debug!("pulse frames: {:?}", pulse_frames);

        Ok(Self {
            pulse_times,
            pulse_frames,
            phases: protocol.phases.clone(),
            pamps: protocol.pamps.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.pulse_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulse_times.is_empty()
    }

    pub fn markers(&self) -> Vec<PulseMarker> {
        self.pulse_frames
            .iter()
            .zip(&self.phases)
            .zip(&self.pamps)
            .map(|((&frame, &phase), &amplitude)| PulseMarker {
                frame,
                phase,
                amplitude,
            })
            .collect()
    }

    /// Distinct phases, ascending.
    pub fn unique_phases(&self) -> Vec<f64> {
        sorted_unique(&self.phases)
    }

    /// Distinct pulse amplitudes, ascending.
    pub fn unique_amplitudes(&self) -> Vec<f64> {
        sorted_unique(&self.pamps)
    }
}

pub(crate) fn sorted_unique(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}
