// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Args;
use kdam::TqdmParallelIterator;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use cellgate_core::constant;
use cellgate_core::error::CellgateError;
use cellgate_core::im;
use cellgate_core::io::write_roi_zip;
use cellgate_core::ut;

#[derive(Debug, Args)]
#[command(about = "Convert integer-labeled masks to outline text or polygon json.")]
pub struct Mask2outlinesArgs {
    #[arg(short = 'i', long, help = "Mask or mask directory.", required = true)]
    pub mask: Option<String>,

    #[arg(short = 'o', long, help = "Output outlines file (.txt or .json) or directory.", required = true)]
    pub output: Option<String>,

    #[arg(short = 'f', long, default_value = "txt", help = "Output format for directories (txt or json).")]
    pub format: String,

    #[arg(long, help = "Also write an ImageJ roi zip next to each outlines file.")]
    pub rois: bool,

    #[arg(short = 'v', long, help = "Verbose output.")]
    pub verbose: bool,

    #[arg(long, help = "Substring specifying masks (e.g. _mask).")]
    pub mask_substring: Option<String>,

    #[arg(short = 't', long, help = "Number of threads.")]
    pub threads: Option<usize>,
}

pub fn utils_mask2outlines(args: &Mask2outlinesArgs) {
    if let Some(threads) = args.threads {
        if threads < 1 {
            eprintln!(
                "[cellgate::utils::mask2outlines] ERROR: Threads must be set to a positive integer if provided."
            );
            std::process::exit(1);
        }

        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .unwrap_or_else(|err| {
                eprintln!("[cellgate::utils::mask2outlines] ERROR: {}", err);
                std::process::exit(1);
            });
    }

    let (Some(mask_path), Some(output)) = (args.mask.as_deref(), args.output.as_deref()) else {
        eprintln!("[cellgate::utils::mask2outlines] ERROR: Both --mask and --output are required.");
        std::process::exit(1);
    };

    let mut output = PathBuf::from(output);

    let mask_extension = extension(Path::new(mask_path));
    let output_extension = extension(&output);

    let is_mask_dir = if let Some(ext) = mask_extension {
        if !constant::SUPPORTED_MASK_FORMATS.contains(&ext.as_str()) {
            eprintln!(
                "[cellgate::utils::mask2outlines] ERROR: Invalid mask extension {}. Must be one of: {:?}.",
                ext,
                constant::SUPPORTED_MASK_FORMATS
            );
            std::process::exit(1);
        }
        false
    } else {
        true
    };

    if let Some(ext) = output_extension {
        if is_mask_dir {
            eprintln!(
                "[cellgate::utils::mask2outlines] ERROR: If mask input is a directory then output must be a directory."
            );
            std::process::exit(1);
        }

        if !constant::SUPPORTED_OUTLINE_FORMATS.contains(&ext.as_str()) {
            eprintln!(
                "[cellgate::utils::mask2outlines] ERROR: Invalid file extension. Must be one of: {:?}.",
                constant::SUPPORTED_OUTLINE_FORMATS
            );
            std::process::exit(1);
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                eprintln!(
                    "[cellgate::utils::mask2outlines] ERROR: Invalid file path. Parent directory of output file path does not exist."
                );
                std::process::exit(1);
            }
        }

        mask2outlines(Path::new(mask_path), &output, args.rois).unwrap_or_else(|err| {
            eprintln!(
                "[cellgate::utils::mask2outlines] ERROR: Failed to convert mask to outlines. {}",
                err
            );
            std::process::exit(1);
        });

        return;
    }

    if !is_mask_dir {
        eprintln!(
            "[cellgate::utils::mask2outlines] ERROR: If output is a directory then mask input must be a directory."
        );
        std::process::exit(1);
    }

    let format = args.format.to_lowercase();

    if !constant::SUPPORTED_OUTLINE_FORMATS.contains(&format.as_str()) {
        eprintln!(
            "[cellgate::utils::mask2outlines] ERROR: Invalid --format {}. Must be one of: {:?}.",
            format,
            constant::SUPPORTED_OUTLINE_FORMATS
        );
        std::process::exit(1);
    }

    let mask_files = ut::path::collect_file_paths(
        mask_path,
        constant::SUPPORTED_MASK_FORMATS.as_slice(),
        args.mask_substring.as_deref(),
    )
    .unwrap_or_else(|err| {
        eprintln!("{}", err);
        std::process::exit(1);
    });

    if mask_files.is_empty() {
        eprintln!(
            "[cellgate::utils::mask2outlines] ERROR: No mask files were detected. Please check your path and/or substring identifier."
        );
        std::process::exit(1);
    }

    ut::track::progress_log(
        &format!(
            "Detected {} masks.",
            ut::track::thousands_format(mask_files.len())
        ),
        args.verbose,
    );

    output = ut::path::create_directory(&output).unwrap_or_else(|_| {
        eprintln!("[cellgate::utils::mask2outlines] ERROR: Could not create directory.");
        std::process::exit(1);
    });

    let pb = ut::track::progress_bar(
        mask_files.len(),
        "Converting masks to outlines",
        args.verbose,
    );

    let error: Mutex<Vec<usize>> = Mutex::new(Vec::with_capacity(mask_files.len()));

    (0..mask_files.len())
        .into_par_iter()
        .tqdm_with_bar(pb)
        .for_each(|idx| {
            let mask_file = &mask_files[idx];
            let result = ut::path::file_stem(mask_file).and_then(|stem| {
                let target = output.join(format!("{}.{}", stem, format));
                mask2outlines(mask_file, &target, args.rois)
            });

            if result.is_err() {
                if let Ok(mut error) = error.lock() {
                    error.push(idx);
                }
            }
        });

    let error = error.into_inner().unwrap_or_default();

    if args.verbose {
        println!()
    }

    let message = if !error.is_empty() {
        format!(
            "Complete. {} masks succesfully converted to outlines. {} masks failed.",
            ut::track::thousands_format(mask_files.len() - error.len()),
            ut::track::thousands_format(error.len())
        )
    } else {
        format!(
            "Complete. {} masks converted to outlines.",
            ut::track::thousands_format(mask_files.len()),
        )
    };

    ut::track::progress_log(&message, args.verbose);
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// Convert an input mask to outlines, optionally with a roi archive
fn mask2outlines(mask_path: &Path, output_path: &Path, rois: bool) -> Result<(), CellgateError> {
    let mask = im::CellMask::open(mask_path)?;

    let (_, outlines) = mask.outlines();

    outlines.save(output_path)?;

    if rois {
        let stem = ut::path::file_stem(output_path)?;
        write_roi_zip(
            output_path.with_file_name(format!("{}_rois.zip", stem)),
            &outlines.to_rois(),
        )?;
    }

    Ok(())
}
