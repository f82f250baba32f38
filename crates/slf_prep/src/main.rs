use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;
use surface_field::checkpoint::{epoch_file_name, resume_or_build};
use surface_field::{BasisConfig, ImageSize, Manifest, SpectralSampler, TargetSize};

/// Frequency encoding used by the regression network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Model {
    /// Gaussian Fourier features, `[sin(2πBx), cos(2πBx)]`.
    Ffm,
    /// Importance-sampled positional + directional features.
    Gffm,
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Model::Ffm => "ffm",
            Model::Gffm => "gffm",
        };

        f.write_str(s)
    }
}

#[derive(Parser, Debug)]
#[command(name = "slf_prep", version, about = "Prepare surface light field training runs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a frequency basis, or resume the latest one from the run's checkpoints.
    Basis(BasisArgs),
    /// Check a dataset manifest: images, cameras and resolution.
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
struct BasisArgs {
    /// Root for run output.
    #[arg(long, default_value = "./logs/default")]
    logdir: PathBuf,

    #[arg(long, default_value = "test")]
    expname: String,

    #[arg(long, value_enum, default_value_t = Model::Gffm)]
    model: Model,

    /// Rows of the Gaussian basis.
    #[arg(long, default_value_t = 1024)]
    ffm_map_size: usize,

    /// Standard deviation of the Gaussian basis.
    #[arg(long, default_value_t = 10.0)]
    ffm_map_scale: f32,

    /// Rows of the importance-sampled basis.
    #[arg(long, default_value_t = 4096)]
    gffm_map_size: usize,

    /// Positional bandwidth of the importance-sampled basis.
    #[arg(long, default_value_t = 1000.0)]
    gffm_pos: f32,

    /// Directional bandwidth of the importance-sampled basis.
    #[arg(long, default_value_t = 6.0)]
    gffm_dir: f32,

    #[arg(long)]
    seed: Option<u64>,

    /// Ignore existing checkpoints.
    #[arg(long, default_value_t = false)]
    restart: bool,
}

impl BasisArgs {
    fn basis_config(&self) -> BasisConfig {
        match self.model {
            Model::Ffm => BasisConfig::Gaussian {
                map_size: self.ffm_map_size,
                scale: self.ffm_map_scale,
            },
            Model::Gffm => BasisConfig::Importance {
                map_size: self.gffm_map_size,
                pos_scale: self.gffm_pos,
                dir_scale: self.gffm_dir,
            },
        }
    }
}

#[derive(clap::Args, Debug)]
struct InspectArgs {
    #[arg(long)]
    data_dir: PathBuf,

    /// Profile file, relative to the data directory.
    #[arg(long, default_value = "profile.txt")]
    profile: PathBuf,

    /// Target resolution as `WIDTHxHEIGHT`; defaults to the native size.
    #[arg(long, value_parser = parse_size)]
    dsize: Option<ImageSize>,

    /// Identifiers to check, in order.
    #[arg(required = true)]
    ids: Vec<String>,
}

fn parse_size(s: &str) -> Result<ImageSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width: usize = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let height: usize = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    if width == 0 || height == 0 {
        return Err(format!("size must be positive, got {width}x{height}"));
    }
    Ok(ImageSize::new(width, height))
}

fn run_basis(args: &BasisArgs) -> Result<()> {
    let start = Instant::now();
    let config = args.basis_config();
    let checkpoints = args.logdir.join(&args.expname).join("checkpoints");

    let (ckpt, resumed_from) = resume_or_build(&checkpoints, args.restart, config.kind(), || {
        config.build(&SpectralSampler, args.seed)
    })
    .with_context(|| format!("preparing {} basis in {}", args.model, checkpoints.display()))?;

    if ckpt.basis.rows() != config.map_size() {
        warn!(
            "checkpoint basis has {} rows, {} requested; keeping the checkpoint",
            ckpt.basis.rows(),
            config.map_size()
        );
    }

    if resumed_from.is_none() {
        let path = checkpoints.join(epoch_file_name(0));
        ckpt.save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    info!(
        "{} basis: {}x{}, step {}, {} encoded features, {:.2?}",
        args.model,
        ckpt.basis.rows(),
        ckpt.basis.cols(),
        ckpt.step,
        ckpt.basis.encoded_len(),
        start.elapsed()
    );
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let manifest = Manifest::open(&args.data_dir, &args.profile)
        .with_context(|| format!("reading manifest in {}", args.data_dir.display()))?;

    let Some(first) = args.ids.first() else {
        bail!("no identifiers given");
    };
    let native = manifest.probe_size(first)?;
    let size = TargetSize {
        native,
        target: args.dsize.unwrap_or(native),
    };
    info!("native {}, target {}", size.native, size.target);

    for id in &args.ids {
        let path = manifest.image_path(id)?;
        let camera = manifest.camera(id, &size)?;
        let k = camera.intrinsic;
        let o = camera.origin();

        info!(
            "{}: {} origin ({:.3}, {:.3}, {:.3}) focal ({:.2}, {:.2}) centre ({:.2}, {:.2})",
            id,
            path.display(),
            o.x,
            o.y,
            o.z,
            k.x_axis.x,
            k.y_axis.y,
            k.z_axis.x,
            k.z_axis.y
        );
    }

    info!("{} identifiers OK", args.ids.len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match &args.command {
        Command::Basis(a) => run_basis(a),
        Command::Inspect(a) => run_inspect(a),
    }
}
