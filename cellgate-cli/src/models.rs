// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;

use clap::Args;
use colored::Colorize;

use cellgate_engine::{ModelFamily, list_models};

use crate::engine::EngineArgs;

#[derive(Debug, Args)]
#[command(about = "List the custom models available to each family.")]
pub struct ModelsArgs {
    #[arg(long, help = "Print the listing as JSON.")]
    pub json: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

pub fn models(args: &ModelsArgs) {
    let listing = list_models(&args.engine.models_dir());

    if args.json {
        match serde_json::to_string_pretty(&listing) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("[cellgate::models] ERROR: {}", err);
                std::process::exit(1);
            }
        }
        return;
    }

    print_models(&listing);
}

fn print_models(listing: &BTreeMap<ModelFamily, Vec<String>>) {
    println!();
    println!("| {:-^58} |", "");
    println!("| {:^58} |", "cellgate".truecolor(86, 156, 214).bold());
    println!("| {:^58} |", "Available segmentation models");
    println!("| {:-^18} | {:-^26} | {:-^10} |", "", "", "");
    println!(
        "| {:^18} | {:^26} | {:^10} |",
        "family".bold(),
        "model".bold(),
        "kind".bold()
    );
    println!("| {:-^18} | {:-^26} | {:-^10} |", "", "", "");

    for (family, names) in listing {
        println!(
            "| {:^18} | {:^26} | {:^10} |",
            family.as_str(),
            family.builtin(),
            "built-in"
        );

        for name in names {
            println!("| {:^18} | {:^26} | {:^10} |", family.as_str(), name, "custom");
        }
    }

    println!("| {:-^18} | {:-^26} | {:-^10} |", "", "", "");
    println!();
}
