// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use clap::{Parser, Subcommand};
use cellgate_cli::{download, models, segment, serve, utils, worker};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Serve(serve::ServeArgs),
    Worker(worker::WorkerArgs),
    Segment(segment::SegmentArgs),
    Models(models::ModelsArgs),
    Download(download::DownloadArgs),
    Utils(utils::UtilsArgs),
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Serve(serve_args)) => serve::serve(serve_args),
        Some(Commands::Worker(worker_args)) => worker::worker(worker_args),
        Some(Commands::Segment(segment_args)) => segment::segment(segment_args),
        Some(Commands::Models(models_args)) => models::models(models_args),
        Some(Commands::Download(download_args)) => download::download(download_args),
        Some(Commands::Utils(utils_args)) => utils::utils(utils_args),
        None => {}
    }
}
