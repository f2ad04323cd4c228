use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use audio2mel::audio::{read_wav_mono, resample_linear_mono_f32, truncate_seconds, write_wav_mono};
use audio2mel::filters::mel_frequencies;
use audio2mel::{MelParams, MelTransform, audio_to_mel};
use clap::{Parser, Subcommand};
use ndarray::{Array2, Array3, Axis};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "audio2mel")]
#[command(about = "Log-mel, frame energy and Griffin-Lim diagnostics", long_about = None)]
struct Args {
    /// JSON parameter file (`fft_size`, `hop_length`, `window_length`, ...).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named parameter preset (`default`, `portrait`).
    #[arg(long, global = true, conflicts_with = "config")]
    preset: Option<String>,

    #[arg(long, global = true)]
    fft_size: Option<usize>,

    #[arg(long, global = true)]
    hop_length: Option<usize>,

    #[arg(long, global = true)]
    window_length: Option<usize>,

    #[arg(long, global = true)]
    sample_rate: Option<u32>,

    #[arg(long, global = true)]
    mel_channels: Option<usize>,

    #[arg(long, global = true)]
    mel_fmin: Option<f32>,

    #[arg(long, global = true)]
    mel_fmax: Option<f32>,

    /// Keep at most this many seconds of input audio (0 keeps everything).
    #[arg(long, global = true, default_value_t = 0.0)]
    max_seconds: f32,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the log-mel spectrogram of a WAV file.
    Mel {
        #[arg(long)]
        audio: PathBuf,

        /// Write `{shape, params, normalized, data}` JSON here.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Skip the [0, 1] normalisation.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Compute per-frame log energy of a WAV file.
    Energy {
        #[arg(long)]
        audio: PathBuf,

        /// Estimate energy from the mel spectrogram instead of the waveform.
        #[arg(long, default_value_t = false)]
        from_mel: bool,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Round-trip a WAV file through the mel spectrogram and Griffin-Lim.
    Invert {
        #[arg(long)]
        audio: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
    /// Describe the mel filterbank for the current parameters.
    Filters,
}

/// JSON layout of `--output`: the feature matrix plus the parameters that produced it.
#[derive(Debug, Serialize)]
struct FeatureDump<'a> {
    shape: Vec<usize>,
    params: &'a MelParams,
    normalized: bool,
    data: Vec<Vec<f32>>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if args.verbose { "debug" } else { "info" }))
        .context("build log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let params = resolve_params(&args)?;
    debug!(?params, "resolved mel parameters");

    match &args.command {
        Command::Mel { audio, output, raw } => {
            run_mel(&params, audio, output.as_deref(), !raw, args.max_seconds)
        }
        Command::Energy {
            audio,
            from_mel,
            output,
            raw,
        } => run_energy(
            &params,
            audio,
            *from_mel,
            output.as_deref(),
            !raw,
            args.max_seconds,
        ),
        Command::Invert { audio, output } => run_invert(&params, audio, output, args.max_seconds),
        Command::Filters => run_filters(&params),
    }
}

fn resolve_params(args: &Args) -> Result<MelParams> {
    let mut params = if let Some(path) = &args.config {
        MelParams::from_path(path).with_context(|| format!("load config {}", path.display()))?
    } else if let Some(name) = &args.preset {
        MelParams::from_preset(name).with_context(|| format!("unknown preset {name:?}"))?
    } else {
        MelParams::default()
    };

    if let Some(v) = args.fft_size {
        params.fft_size = v;
    }
    if let Some(v) = args.hop_length {
        params.hop_length = v;
    }
    if let Some(v) = args.window_length {
        params.window_length = v;
    }
    if let Some(v) = args.sample_rate {
        params.sample_rate = v;
    }
    if let Some(v) = args.mel_channels {
        params.mel_channels = v;
    }
    if let Some(v) = args.mel_fmin {
        params.mel_fmin = v;
    }
    if let Some(v) = args.mel_fmax {
        params.mel_fmax = v;
    }

    params.validate().context("invalid mel parameters")?;
    Ok(params)
}

fn load_audio(path: &Path, sample_rate: u32, max_seconds: f32) -> Result<Vec<f32>> {
    let wav = read_wav_mono(path).with_context(|| format!("read wav {}", path.display()))?;
    info!(
        "loaded {}: sample_rate={} channels={} duration={:.2}s",
        path.display(),
        wav.sample_rate_hz,
        wav.channels,
        wav.duration_secs()
    );

    let mut samples = if wav.sample_rate_hz == sample_rate {
        wav.samples_mono
    } else {
        debug!(from = wav.sample_rate_hz, to = sample_rate, "resampling");
        resample_linear_mono_f32(&wav.samples_mono, wav.sample_rate_hz, sample_rate)
    };
    truncate_seconds(&mut samples, sample_rate, max_seconds);
    Ok(samples)
}

fn as_batch(samples: Vec<f32>) -> Result<Array3<f32>> {
    let len = samples.len();
    Array3::from_shape_vec((1, 1, len), samples).context("build audio batch")
}

fn value_range(values: impl IntoIterator<Item = f32>) -> (f32, f32) {
    values
        .into_iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

fn write_dump(path: &Path, params: &MelParams, normalized: bool, data: &Array2<f32>) -> Result<()> {
    let dump = FeatureDump {
        shape: data.shape().to_vec(),
        params,
        normalized,
        data: data.outer_iter().map(|row| row.to_vec()).collect(),
    };
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &dump)
        .with_context(|| format!("write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn run_mel(
    params: &MelParams,
    audio: &Path,
    output: Option<&Path>,
    normalize: bool,
    max_seconds: f32,
) -> Result<()> {
    let samples = load_audio(audio, params.sample_rate, max_seconds)?;
    let signal = ndarray::Array1::from(samples);
    let mel = audio_to_mel(signal.view().into_dyn(), params, normalize).context("compute mel")?;

    let (lo, hi) = value_range(mel.iter().copied());
    println!(
        "mel: channels={} frames={} min={lo:.4} max={hi:.4}",
        mel.nrows(),
        mel.ncols()
    );

    if let Some(path) = output {
        write_dump(path, params, normalize, &mel)?;
    }
    Ok(())
}

fn run_energy(
    params: &MelParams,
    audio: &Path,
    from_mel: bool,
    output: Option<&Path>,
    normalize: bool,
    max_seconds: f32,
) -> Result<()> {
    let transform = MelTransform::new(params.clone()).context("build mel transform")?;
    let batch = as_batch(load_audio(audio, params.sample_rate, max_seconds)?)?;

    let energy = if from_mel {
        let mel = transform
            .forward(batch.view(), normalize)
            .context("compute mel")?;
        transform
            .get_energy_mel(mel.view(), normalize)
            .context("energy from mel")?
    } else {
        transform
            .get_energy(batch.view(), normalize)
            .context("energy from waveform")?
    };

    let (lo, hi) = value_range(energy.iter().copied());
    println!(
        "energy: frames={} source={} min={lo:.4} max={hi:.4}",
        energy.len_of(Axis(1)),
        if from_mel { "mel" } else { "waveform" }
    );

    if let Some(path) = output {
        write_dump(path, params, normalize && !from_mel, &energy)?;
    }
    Ok(())
}

fn run_invert(params: &MelParams, audio: &Path, output: &Path, max_seconds: f32) -> Result<()> {
    let transform = MelTransform::new(params.clone()).context("build mel transform")?;
    let batch = as_batch(load_audio(audio, params.sample_rate, max_seconds)?)?;

    let mel = transform.forward(batch.view(), true).context("compute mel")?;
    info!("running Griffin-Lim on {} frames", mel.len_of(Axis(2)));
    let wave = transform
        .mel_to_audio(mel.view().into_dyn())
        .context("invert mel")?;

    write_wav_mono(output, &wave.to_vec(), params.sample_rate)
        .with_context(|| format!("write wav {}", output.display()))?;
    println!(
        "reconstructed {} samples ({:.2}s) -> {}",
        wave.len(),
        wave.len() as f32 / params.sample_rate as f32,
        output.display()
    );
    Ok(())
}

fn run_filters(params: &MelParams) -> Result<()> {
    let transform = MelTransform::new(params.clone()).context("build mel transform")?;
    let fb = transform.filterbank();
    let edges = mel_frequencies(
        params.mel_channels + 2,
        f64::from(params.mel_fmin),
        f64::from(params.mel_fmax),
    );

    println!(
        "filterbank: {} x {} (sample_rate={} fft_size={})",
        fb.nrows(),
        fb.ncols(),
        params.sample_rate,
        params.fft_size
    );
    for (m, row) in fb.outer_iter().enumerate() {
        let bins = row.iter().filter(|&&v| v > 0.0).count();
        println!(
            "{m:>3}: {:>8.1} {:>8.1} {:>8.1} Hz  bins={bins:<3} sum={:.5}",
            edges[m],
            edges[m + 1],
            edges[m + 2],
            row.sum()
        );
    }
    Ok(())
}
