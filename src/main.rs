use std::error::Error as StdError;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ferrite_train::{Result, RunConfig};

#[derive(Parser)]
#[command(name = "ferrite-train", about = "Train segmentation and image-to-vector models from a JSON run config")]
struct Cli {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Overrides `saved_model_directory`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Pretrained parameters; paths mentioning "imagenet" load as a backbone.
    #[arg(long)]
    model_path: Option<PathBuf>,
}

impl Cli {
    fn apply(self, mut cfg: RunConfig) -> RunConfig {
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.lr = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.output_dir {
            cfg.saved_model_directory = v;
        }
        if let Some(v) = self.model_path {
            cfg.model_path = Some(v);
        }
        cfg
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = RunConfig::load_json(&cli.config)?;
    let cfg = cli.apply(cfg);
    let mut trainer = cfg.build_trainer()?;
    let summary = trainer.start_train()?;
    for (metric, best) in &summary.best {
        info!(
            metric = %metric,
            value = best.value,
            path = ?best.path,
            "best checkpoint"
        );
    }
    info!(run_dir = %summary.run_dir.display(), "training finished");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            let mut source = StdError::source(&e);
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
