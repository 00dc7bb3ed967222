// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use clap::Args;

use cellgate_core::ut::track::progress_log;
use cellgate_engine::{Dispatcher, ModelFamily};

use crate::engine::EngineArgs;
use crate::logging::init_logger;

#[derive(Debug, Args)]
#[command(about = "Download the built-in model weights of each environment.")]
pub struct DownloadArgs {
    #[arg(long = "model_type", help = "Only download weights for this family.")]
    pub model_type: Option<ModelFamily>,

    #[arg(short = 'v', long, help = "Verbose output.")]
    pub verbose: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub fn download(args: &DownloadArgs) {
    init_logger(args.verbose);

    let dispatcher = args.engine.dispatcher();

    let families: Vec<ModelFamily> = match args.model_type {
        Some(family) => vec![family],
        None => dispatcher.environments().iter().map(|(family, _)| family).collect(),
    };

    if families.is_empty() {
        eprintln!(
            "[cellgate::download] ERROR: No environments were found. Check --base-dir or pass --python-v3/--python-sam."
        );
        std::process::exit(1);
    }

    let failed = download_families(&dispatcher, &families);

    if failed > 0 {
        eprintln!(
            "[cellgate::download] ERROR: {} of {} downloads failed.",
            failed,
            families.len()
        );
        std::process::exit(1);
    }

    progress_log("Complete", true);
}

#[tokio::main]
async fn download_families(dispatcher: &Dispatcher, families: &[ModelFamily]) -> usize {
    let mut failed = 0;

    for &family in families {
        progress_log(
            &format!("Downloading {} weights for {}", family.builtin(), family),
            true,
        );

        if let Err(err) = dispatcher.download(family).await {
            eprintln!("[cellgate::download] ERROR: {}: {}", family, err);
            failed += 1;
        }
    }

    failed
}
