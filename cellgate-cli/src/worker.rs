// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::PathBuf;

use clap::Args;

use cellgate_engine::{DispatchError, Envelope, ModelFamily, SegmentParams};

use crate::engine::EngineArgs;
use crate::logging::init_logger;

#[derive(Debug, Args)]
#[command(about = "Segment one image and print a single JSON status line.")]
pub struct WorkerArgs {
    #[arg(long, help = "Image to segment.", required = true)]
    pub image: PathBuf,

    #[arg(long = "model_type", help = "Model family (Cellpose3.1 or CellposeSAM).")]
    pub model_type: ModelFamily,

    #[arg(long = "model_name", help = "Built-in or custom model name.")]
    pub model_name: String,

    #[arg(long, default_value_t = 0.0, help = "Expected object diameter, 0 to estimate.")]
    pub diameter: f32,

    #[arg(long, default_value = "0,0", help = "Comma-separated channel indices.")]
    pub channels: String,

    #[arg(long = "use_gpu", help = "Enable GPU usage.")]
    pub use_gpu: bool,

    #[arg(long = "batch_size", default_value_t = 64, help = "Batch size for processing.")]
    pub batch_size: u32,

    #[arg(long, help = "Run dynamics at original image size.")]
    pub resample: bool,

    #[arg(long = "no_normalize", help = "Disable normalization.")]
    pub no_normalize: bool,

    #[arg(long = "flow_threshold", default_value_t = 0.4, help = "Flow error threshold.")]
    pub flow_threshold: f32,

    #[arg(long = "cellprob_threshold", default_value_t = 0.0, help = "Cell probability threshold.")]
    pub cellprob_threshold: f32,

    #[arg(long = "percentile_low", default_value_t = 1.0, help = "Lower normalization percentile.")]
    pub percentile_low: f32,

    #[arg(long = "percentile_high", default_value_t = 99.0, help = "Upper normalization percentile.")]
    pub percentile_high: f32,

    #[arg(long = "tile_norm", default_value_t = 0, help = "Tile normalization block size.")]
    pub tile_norm: u32,

    #[arg(short = 'v', long, help = "Verbose logging on stderr.")]
    pub verbose: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

impl WorkerArgs {
    pub fn params(&self) -> SegmentParams {
        SegmentParams {
            model_type: self.model_type,
            model_name: self.model_name.clone(),
            diameter: self.diameter,
            channels: self.channels.clone(),
            use_gpu: self.use_gpu,
            batch_size: self.batch_size,
            resample: self.resample,
            normalize: !self.no_normalize,
            flow_threshold: self.flow_threshold,
            cellprob_threshold: self.cellprob_threshold,
            percentile_low: self.percentile_low,
            percentile_high: self.percentile_high,
            tile_norm: self.tile_norm,
        }
    }
}

/// Runs one dispatch and reports the outcome as an envelope on stdout
///
/// Failures are part of the envelope, so the exit code stays zero.
pub fn worker(args: &WorkerArgs) {
    init_logger(args.verbose);

    let envelope = Envelope::from(run(args));
    println!("{}", envelope.to_line());
}

#[tokio::main]
async fn run(args: &WorkerArgs) -> Result<String, DispatchError> {
    args.engine
        .dispatcher()
        .run(&args.image, &args.params())
        .await
}
