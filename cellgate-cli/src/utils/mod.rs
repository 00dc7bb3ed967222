// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use clap::{Args, Subcommand};

mod mask2outlines;

use mask2outlines::{Mask2outlinesArgs, utils_mask2outlines};

#[derive(Debug, Args)]
#[command(about = "General utilities for converting masks and outlines.")]
#[command(args_conflicts_with_subcommands = true)]
#[command(arg_required_else_help = true)]
#[command(flatten_help = true)]
pub struct UtilsArgs {
    #[command(subcommand)]
    command: Option<UtilsCommands>,
}

#[derive(Debug, Subcommand)]
enum UtilsCommands {
    Mask2outlines(Mask2outlinesArgs),
}

pub fn utils(args: &UtilsArgs) {
    match args.command.as_ref() {
        Some(UtilsCommands::Mask2outlines(mask2outlines_args)) => {
            utils_mask2outlines(mask2outlines_args)
        }
        None => {
            eprintln!("[cellgate::utils] ERROR: A utility subcommand is required.");
            std::process::exit(1);
        }
    }
}
