// src/main.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use ndarray::Array2;

use khzstim::render::{render_phase_averages_png, render_trace_png, PlotStyle};
use khzstim::stim::{AnalysisConfig, ResponseWindow, StimAnalysis};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Align kHz stimulation pulses to imaging frames",
    arg_required_else_help = true
)]
struct Args {
    /// Trial directory, or an imaging pipeline output file inside it (e.g. suite2p/plane0/stat.npy)
    path: PathBuf,

    /// JSON file overriding the acquisition defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Activity matrix as a JSON array of per-cell rows (cells x frames)
    #[arg(long)]
    activity: Option<PathBuf>,

    /// Cells to average, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    cells: Vec<usize>,

    /// Window before each pulse (seconds)
    #[arg(long, default_value_t = 3.0)]
    pre: f64,

    /// Window after each pulse (seconds)
    #[arg(long, default_value_t = 3.0)]
    post: f64,

    /// Pulse amplitude to average at (default: the largest one)
    #[arg(long)]
    amplitude: Option<f64>,

    /// Output directory (default: the trial directory)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn load_activity(path: &Path) -> Result<Array2<f32>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read activity matrix {}", path.display()))?;
    let rows: Vec<Vec<f32>> = serde_json::from_str(&text)
        .with_context(|| format!("activity matrix {} is not a list of rows", path.display()))?;
    let num_cells = rows.len();
    let num_frames = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != num_frames) {
        bail!("activity rows in {} have unequal lengths", path.display());
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((num_cells, num_frames), flat)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let loaded = if args.path.is_dir() {
        StimAnalysis::from_trial_dir(&args.path, config)
    } else {
        StimAnalysis::from_stats_file(&args.path, config)
    };
    let analysis =
        loaded.with_context(|| format!("failed to analyse {}", args.path.display()))?;

    let signal = analysis.signal();
    info!(
        "{} samples at {} Hz ({:.1} s), {} frames at {:.3} Hz, {} pulses",
        signal.len(),
        signal.sampling_rate_hz,
        signal.duration_seconds(),
        analysis.timeline().len(),
        analysis.frame_rate(),
        analysis.schedule().len()
    );

    let out_dir = match (&args.out, analysis.trial_dir()) {
        (Some(out), _) => out.clone(),
        (None, Some(trial)) => trial.to_path_buf(),
        (None, None) => PathBuf::from("."),
    };
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let markers = analysis.pulse_markers();
    write_json(&out_dir.join("pulses.json"), &markers)?;

    let Some(activity_path) = &args.activity else {
        return Ok(());
    };
    let activity = load_activity(activity_path)?;
    let cells: Vec<usize> = if args.cells.is_empty() {
        (0..activity.nrows()).collect()
    } else {
        args.cells.clone()
    };
    if cells.is_empty() {
        bail!("activity matrix {} has no cells", activity_path.display());
    }
    let window = ResponseWindow::new(args.pre, args.post);
    let set = analysis.response_windows(activity.view(), &cells, window)?;
    if !set.skipped.is_empty() {
        warn!(
            "{} of {} pulses skipped near the recording boundary",
            set.skipped.len(),
            analysis.schedule().len()
        );
    }
    let averages = match args.amplitude {
        Some(amplitude) => set.phase_averages(amplitude),
        None => set.phase_averages_at_max_amplitude(),
    };
    if averages.is_empty() {
        bail!("no pulses left to average at the requested amplitude");
    }
    write_json(&out_dir.join("phase_averages.json"), &averages)?;

    let time_axis = set.time_axis(analysis.frame_rate());
    let png = render_phase_averages_png(&averages, &time_axis, &cells, PlotStyle::default())?;
    fs::write(out_dir.join("phase_averages.png"), png)?;

    let trace = activity.row(cells[0]).to_vec();
    let png = render_trace_png(&trace, &markers, PlotStyle::default())?;
    fs::write(out_dir.join("trace.png"), png)?;
    info!("rendered plots into {}", out_dir.display());
    Ok(())
}
