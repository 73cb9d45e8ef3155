use log::{debug, warn};
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::Serialize;

use crate::stim::config::ResponseWindow;
use crate::stim::schedule::{sorted_unique, PulseSchedule};
use crate::stim::StimError;

/// Pulse-aligned activity windows, shaped `[pulse, cell, offset]`.
#[derive(Debug)]
pub struct ResponseWindowSet {
    pub windows: Array3<f32>,
    /// Schedule index of each kept pulse, parallel to axis 0 of `windows`.
    pub pulses: Vec<usize>,
    pub phases: Vec<f64>,
    pub pamps: Vec<f64>,
    pub cells: Vec<usize>,
    pub pre_frames: usize,
    pub post_frames: usize,
    /// Largest amplitude in the schedule, kept or not.
    pub scheduled_max_amplitude: Option<f64>,
    /// One `WindowOutOfBounds` per pulse that could not be sliced.
    pub skipped: Vec<StimError>,
}

/// Pulses sharing one `(phase, amplitude)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct PulseGroup {
    pub phase: f64,
    pub amplitude: f64,
    /// Rows of [`ResponseWindowSet::windows`].
    pub members: Vec<usize>,
}

/// Mean response to every pulse of one phase at a fixed amplitude.
#[derive(Clone, Debug, Serialize)]
pub struct PhaseAverage {
    pub phase: f64,
    pub amplitude: f64,
    pub pulse_count: usize,
    /// `[cell, offset]`.
    pub mean: Array2<f32>,
}

impl PhaseAverage {
    /// Phase relative to the modulation peak, as shown in plot legends.
    pub fn phase_from_peak(&self) -> f64 {
        180.0 - self.phase
    }
}

impl ResponseWindowSet {
    /// Slices `activity[cell, f - pre_frames .. f + post_frames]` for every
    /// pulse frame `f` and selected cell.
    ///
    /// Pulses whose window leaves `[0, num_frames)` are skipped and recorded
    /// in `skipped`; an unknown cell index fails the whole extraction.
    pub fn extract(
        activity: ArrayView2<f32>,
        cells: &[usize],
        schedule: &PulseSchedule,
        pre_frames: usize,
        post_frames: usize,
    ) -> Result<Self, StimError> {
        let (num_cells, num_frames) = activity.dim();
        if let Some(&cell) = cells.iter().find(|&&c| c >= num_cells) {
            return Err(StimError::InvalidCellIndex { cell, num_cells });
        }

        let mut pulses = Vec::new();
        let mut skipped = Vec::new();
        for (pulse, &frame) in schedule.pulse_frames.iter().enumerate() {
            let start = isize::try_from(pre_frames)
                .ok()
                .and_then(|pre| (frame as isize).checked_sub(pre));
            let end = frame.checked_add(post_frames);
            match (start, end) {
                (Some(start), Some(end)) if start >= 0 && end <= num_frames => {
                    pulses.push(pulse);
                }
                _ => {
                    // Unrepresentable bounds saturate; they lie outside the activity either way.
                    let err = StimError::WindowOutOfBounds {
                        pulse,
                        frame,
                        start: start.unwrap_or(isize::MIN),
                        end: end.unwrap_or(usize::MAX),
                        num_frames,
                    };
                    warn!("skipping pulse: {err}");
                    skipped.push(err);
                }
            }
        }

        // Any kept window fits inside the activity, so only an all-skipped set is capped here.
        let width = pre_frames.saturating_add(post_frames).min(num_frames);
        let mut windows = Array3::<f32>::zeros((pulses.len(), cells.len(), width));
        for (row, &pulse) in pulses.iter().enumerate() {
            let start = schedule.pulse_frames[pulse] - pre_frames;
            for (col, &cell) in cells.iter().enumerate() {
                windows
                    .slice_mut(s![row, col, ..])
                    .assign(&activity.slice(s![cell, start..start + width]));
            }
        }
        debug!(
            "extracted {} windows of {} frames for {} cells ({} skipped)",
            pulses.len(),
            width,
            cells.len(),
            skipped.len()
        );

        let phases = pulses.iter().map(|&p| schedule.phases[p]).collect();
        let pamps = pulses.iter().map(|&p| schedule.pamps[p]).collect();
        Ok(Self {
            windows,
            pulses,
            phases,
            pamps,
            cells: cells.to_vec(),
            pre_frames,
            post_frames,
            scheduled_max_amplitude: schedule.unique_amplitudes().last().copied(),
            skipped,
        })
    }

    /// Same as [`ResponseWindowSet::extract`] with durations in seconds.
    pub fn extract_for_window(
        activity: ArrayView2<f32>,
        cells: &[usize],
        schedule: &PulseSchedule,
        window: ResponseWindow,
        frame_rate: f64,
    ) -> Result<Self, StimError> {
        let (pre_frames, post_frames) = window.frames(frame_rate);
        Self::extract(activity, cells, schedule, pre_frames, post_frames)
    }

    pub fn num_pulses(&self) -> usize {
        self.pulses.len()
    }

    pub fn window_len(&self) -> usize {
        self.pre_frames.saturating_add(self.post_frames)
    }

    /// Time of each window sample relative to the pulse, in seconds.
    pub fn time_axis(&self, frame_rate: f64) -> Vec<f64> {
        (0..self.window_len())
            .map(|k| (k as f64 - self.pre_frames as f64) / frame_rate)
            .collect()
    }

    /// Kept pulses grouped by `(phase, amplitude)`, ordered by phase then amplitude.
    pub fn groups(&self) -> Vec<PulseGroup> {
        let mut groups: Vec<PulseGroup> = Vec::new();
        for (row, (&phase, &amplitude)) in self.phases.iter().zip(&self.pamps).enumerate() {
            match groups
                .iter_mut()
                .find(|g| g.phase == phase && g.amplitude == amplitude)
            {
                Some(group) => group.members.push(row),
                None => groups.push(PulseGroup {
                    phase,
                    amplitude,
                    members: vec![row],
                }),
            }
        }
        groups.sort_by(|a, b| {
            a.phase
                .total_cmp(&b.phase)
                .then(a.amplitude.total_cmp(&b.amplitude))
        });
        groups
    }

    /// Per-phase mean window at `amplitude`, phases ascending.
    ///
    /// Phases with no kept pulse at that amplitude are left out.
    pub fn phase_averages(&self, amplitude: f64) -> Vec<PhaseAverage> {
        self.groups()
            .into_iter()
            .filter(|g| g.amplitude == amplitude)
            .filter_map(|g| {
                let mean = self
                    .windows
                    .select(Axis(0), &g.members)
                    .mean_axis(Axis(0))?;
                Some(PhaseAverage {
                    phase: g.phase,
                    amplitude,
                    pulse_count: g.members.len(),
                    mean,
                })
            })
            .collect()
    }

    /// Per-phase means at the largest amplitude among the kept pulses.
    ///
    /// Logs a warning when every pulse at the schedule's top amplitude was
    /// skipped and a lower amplitude is averaged instead.
    pub fn phase_averages_at_max_amplitude(&self) -> Vec<PhaseAverage> {
        let Some(&amplitude) = sorted_unique(&self.pamps).last() else {
            return Vec::new();
        };
        if let Some(scheduled) = self.scheduled_max_amplitude {
            if scheduled != amplitude {
                warn!(
                    "no kept pulse at amplitude {scheduled}; averaging amplitude {amplitude} instead"
                );
            }
        }
        self.phase_averages(amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array};

    fn schedule(frames: Vec<usize>, phases: Vec<f64>, pamps: Vec<f64>) -> PulseSchedule {
        PulseSchedule {
            pulse_times: frames.iter().map(|&f| f as f64).collect(),
            pulse_frames: frames,
            phases,
            pamps,
        }
    }

    fn ramp(cells: usize, frames: usize) -> Array2<f32> {
        Array::from_shape_fn((cells, frames), |(c, f)| (c * 100 + f) as f32)
    }

    #[test]
    fn window_past_the_start_is_out_of_bounds() {
        let activity = ramp(1, 10);
        let sched = schedule(vec![1], vec![0.0], vec![1.0]);
        let set = ResponseWindowSet::extract(activity.view(), &[0], &sched, 2, 3).unwrap();
        assert_eq!(set.num_pulses(), 0);
        assert_eq!(set.skipped.len(), 1);
        assert!(matches!(
            set.skipped[0],
            StimError::WindowOutOfBounds {
                pulse: 0,
                frame: 1,
                start: -1,
                end: 4,
                num_frames: 10
            }
        ));
    }

    #[test]
    fn boundary_pulses_are_skipped_and_others_kept() {
        let activity = ramp(2, 10);
        let sched = schedule(vec![1, 4, 8], vec![0.0; 3], vec![1.0; 3]);
        let set = ResponseWindowSet::extract(activity.view(), &[1, 0], &sched, 2, 3).unwrap();
        assert_eq!(set.pulses, vec![1]);
        assert_eq!(set.skipped.len(), 2);
        assert_eq!(set.windows.dim(), (1, 2, 5));
        assert_eq!(
            set.windows.slice(s![0, 0, ..]),
            arr1(&[102.0f32, 103.0, 104.0, 105.0, 106.0])
        );
        assert_eq!(
            set.windows.slice(s![0, 1, ..]),
            arr1(&[2.0f32, 3.0, 4.0, 5.0, 6.0])
        );
    }

    #[test]
    fn window_ending_at_last_frame_fits() {
        let activity = ramp(1, 10);
        let sched = schedule(vec![7], vec![0.0], vec![1.0]);
        let set = ResponseWindowSet::extract(activity.view(), &[0], &sched, 2, 3).unwrap();
        assert_eq!(set.pulses, vec![0]);
        assert_eq!(set.windows[[0, 0, 4]], 9.0);
    }

    #[test]
    fn unknown_cell_fails_extraction() {
        let activity = ramp(2, 10);
        let sched = schedule(vec![5], vec![0.0], vec![1.0]);
        let err = ResponseWindowSet::extract(activity.view(), &[0, 2], &sched, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            StimError::InvalidCellIndex {
                cell: 2,
                num_cells: 2
            }
        ));
    }

    #[test]
    fn same_phase_average_is_elementwise_mean() {
        let activity = Array::from_shape_fn((1, 20), |(_, f)| (f as f32 * 0.37).sin() * 3.1);
        let sched = schedule(vec![4, 12], vec![90.0, 90.0], vec![1.0, 1.0]);
        let set = ResponseWindowSet::extract(activity.view(), &[0], &sched, 2, 2).unwrap();
        let averages = set.phase_averages(1.0);
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].pulse_count, 2);
        let first = set.windows.slice(s![0, .., ..]);
        let second = set.windows.slice(s![1, .., ..]);
        let expected = (&first + &second) / 2.0;
        assert_eq!(averages[0].mean, expected);
    }

    #[test]
    fn averages_split_by_phase_at_selected_amplitude() {
        let activity = ramp(1, 40);
        let sched = schedule(
            vec![5, 10, 15, 20, 25],
            vec![180.0, 0.0, 180.0, 0.0, 0.0],
            vec![2.0, 2.0, 2.0, 2.0, 1.0],
        );
        let set = ResponseWindowSet::extract(activity.view(), &[0], &sched, 1, 1).unwrap();
        let groups = set.groups();
        assert_eq!(groups.len(), 3);
        assert_eq!((groups[0].phase, groups[0].amplitude), (0.0, 1.0));
        assert_eq!(groups[1].members, vec![1, 3]);

        let averages = set.phase_averages_at_max_amplitude();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].phase, 0.0);
        assert_eq!(averages[0].mean, ndarray::arr2(&[[14.0f32, 15.0]]));
        assert_eq!(averages[1].phase, 180.0);
        assert_eq!(averages[1].phase_from_peak(), 0.0);
        assert_eq!(averages[1].mean, ndarray::arr2(&[[9.0f32, 10.0]]));
    }

    #[test]
    fn unbounded_windows_are_reported_not_sliced() {
        let activity = ramp(1, 10);
        let sched = schedule(vec![5], vec![0.0], vec![1.0]);
        for window in [
            ResponseWindow::new(0.0, f64::INFINITY),
            ResponseWindow::new(0.0, 1e300),
            ResponseWindow::new(f64::INFINITY, 0.0),
        ] {
            let set =
                ResponseWindowSet::extract_for_window(activity.view(), &[0], &sched, window, 10.0)
                    .unwrap();
            assert_eq!(set.num_pulses(), 0);
            assert_eq!(set.skipped.len(), 1);
            assert!(matches!(
                set.skipped[0],
                StimError::WindowOutOfBounds {
                    pulse: 0,
                    frame: 5,
                    num_frames: 10,
                    ..
                }
            ));
            assert_eq!(set.windows.dim().0, 0);
        }
    }

    #[test]
    fn skipped_top_amplitude_falls_back_to_kept_maximum() {
        let activity = ramp(1, 20);
        let sched = schedule(vec![0, 8, 12], vec![0.0, 0.0, 90.0], vec![2.0, 1.0, 1.0]);
        let set = ResponseWindowSet::extract(activity.view(), &[0], &sched, 1, 1).unwrap();
        assert_eq!(set.pulses, vec![1, 2]);
        assert_eq!(set.scheduled_max_amplitude, Some(2.0));
        let averages = set.phase_averages_at_max_amplitude();
        assert_eq!(averages.len(), 2);
        assert!(averages.iter().all(|a| a.amplitude == 1.0));
    }

    #[test]
    fn window_durations_convert_to_frames() {
        let activity = ramp(1, 100);
        let sched = schedule(vec![50], vec![0.0], vec![1.0]);
        let window = ResponseWindow::new(0.25, 0.5);
        let set =
            ResponseWindowSet::extract_for_window(activity.view(), &[0], &sched, window, 10.0)
                .unwrap();
        assert_eq!((set.pre_frames, set.post_frames), (3, 5));
        let axis = set.time_axis(10.0);
        assert_eq!(axis.len(), 8);
        assert!((axis[0] + 0.3).abs() < 1e-12);
        assert_eq!(axis[3], 0.0);
    }
}
