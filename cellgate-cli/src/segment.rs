// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use kdam::BarExt;

use cellgate_client::{DEFAULT_API_URL, SegmentClient, Target};
use cellgate_core::constant::BATCH_IMAGE_FORMATS;
use cellgate_core::im::{CellImage, CellMask, parse_roi_lines};
use cellgate_core::io::{is_pickled_numpy, write_overlay_tiff, write_roi_zip};
use cellgate_core::ut::path::{collect_file_paths, ensure_directory, file_stem};
use cellgate_core::ut::track::{progress_bar, progress_log, thousands_format};
use cellgate_engine::{Dispatcher, SegmentParams};

use crate::engine::EngineArgs;

#[derive(Debug, Args)]
#[command(about = "Segment a directory of images with several models through a running gateway.")]
pub struct SegmentArgs {
    #[arg(
        short = 'i',
        long,
        help = "Directory of .tif/.tiff images.",
        required_unless_present = "image",
        conflicts_with = "image"
    )]
    pub input: Option<PathBuf>,

    #[arg(long, help = "Segment a single image instead of a directory.")]
    pub image: Option<PathBuf>,

    #[arg(short = 'o', long, default_value = "outputs", help = "Output directory.")]
    pub output: PathBuf,

    #[arg(long, default_value = DEFAULT_API_URL, help = "Gateway base url.")]
    pub api_url: String,

    #[arg(
        short = 't',
        long = "target",
        help = "Output folder and model as folder=ModelType:model_name. Repeatable. Defaults to sam=CellposeSAM:cpsam and cyto3=Cellpose3.1:cyto3."
    )]
    pub targets: Vec<Target>,

    #[arg(long, default_value_t = 0.0, help = "Expected object diameter, 0 to estimate.")]
    pub diameter: f32,

    #[arg(long, default_value = "0,0", help = "Comma-separated channel indices.")]
    pub channels: String,

    #[arg(long, help = "Request GPU inference.")]
    pub use_gpu: bool,

    #[arg(long, default_value_t = 64, help = "Batch size for processing.")]
    pub batch_size: u32,

    #[arg(long, help = "Run dynamics at original image size.")]
    pub resample: bool,

    #[arg(long, help = "Skip <stem>_seg.npy ground truth conversion.")]
    pub no_groundtruth: bool,

    #[arg(long, help = "Wait up to this many seconds for the gateway to become ready.")]
    pub wait_ready: Option<f32>,

    #[arg(short = 'v', long, help = "Verbose output.")]
    pub verbose: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

impl SegmentArgs {
    fn params(&self, target: &Target) -> SegmentParams {
        let mut params = SegmentParams::new(target.model_type, target.model_name.clone());
        params.diameter = self.diameter;
        params.channels = self.channels.clone();
        params.use_gpu = self.use_gpu;
        params.batch_size = self.batch_size;
        params.resample = self.resample;
        params
    }
}

pub fn segment(args: &SegmentArgs) {
    let images = match (&args.image, &args.input) {
        (Some(image), _) => {
            if !image.is_file() {
                eprintln!(
                    "[cellgate::segment] ERROR: Image not found: {}",
                    image.display()
                );
                std::process::exit(1);
            }
            vec![image.clone()]
        }
        (None, Some(input)) => collect_file_paths(input, BATCH_IMAGE_FORMATS.as_slice(), None)
            .unwrap_or_else(|err| {
                eprintln!("{}", err);
                std::process::exit(1);
            }),
        (None, None) => Vec::new(),
    };

    if images.is_empty() {
        eprintln!("[cellgate::segment] ERROR: No .tif/.tiff images were detected.");
        std::process::exit(1);
    }

    let targets = if args.targets.is_empty() {
        Target::defaults()
    } else {
        args.targets.clone()
    };

    let client = SegmentClient::new(&args.api_url).unwrap_or_else(|err| {
        eprintln!("[cellgate::segment] ERROR: {:#}", err);
        std::process::exit(1);
    });

    progress_log(
        &format!(
            "Detected {} images and {} targets.",
            thousands_format(images.len()),
            targets.len()
        ),
        args.verbose,
    );

    // Pickled ground truth files are unpickled by the engine script
    let dispatcher = args.engine.dispatcher();

    match run_batch(&client, &dispatcher, &images, &targets, args) {
        Ok(0) => progress_log(
            &format!("Complete. {} images segmented.", thousands_format(images.len())),
            args.verbose,
        ),
        Ok(failed) => {
            eprintln!(
                "[cellgate::segment] ERROR: {} of {} images failed.",
                failed,
                images.len()
            );
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("[cellgate::segment] ERROR: {:#}", err);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn run_batch(
    client: &SegmentClient,
    dispatcher: &Dispatcher,
    images: &[PathBuf],
    targets: &[Target],
    args: &SegmentArgs,
) -> Result<usize> {
    if let Some(seconds) = args.wait_ready {
        progress_log(
            &format!("Waiting for gateway at {}", client.base_url()),
            args.verbose,
        );
        client
            .wait_until_ready(ready_timeout(seconds))
            .await?;
    }

    let mut pb = progress_bar(images.len(), "Segmenting images", args.verbose);
    let mut failed = 0;

    for image in images {
        if let Err(err) = segment_image(client, dispatcher, image, targets, args).await {
            eprintln!(
                "[cellgate::segment] ERROR: {}: {:#}",
                image.display(),
                err
            );
            failed += 1;
        }

        let _ = pb.update(1);
    }

    if args.verbose {
        println!();
    }

    Ok(failed)
}

/// Readiness timeout for `--wait-ready`, saturating at `Duration::MAX`
fn ready_timeout(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

async fn segment_image(
    client: &SegmentClient,
    dispatcher: &Dispatcher,
    image: &Path,
    targets: &[Target],
    args: &SegmentArgs,
) -> Result<()> {
    let stem = file_stem(image)?;
    let pixels = CellImage::open(image)
        .with_context(|| format!("Failed to decode {}", image.display()))?;
    let image_dir = prepare_image_dirs(&args.output, image, targets)?;

    for target in targets {
        let text = client.segment(image, &args.params(target)).await?;
        let count =
            write_target_outputs(&image_dir.join(&target.folder), image, &pixels, &text)?;

        progress_log(
            &format!("{} | {} | {} rois", stem, target.folder, thousands_format(count)),
            args.verbose,
        );
    }

    if !args.no_groundtruth {
        match write_groundtruth(image, &pixels, &image_dir, dispatcher).await {
            Ok(Some(count)) => progress_log(
                &format!("{} | groundtruth | {} rois", stem, thousands_format(count)),
                args.verbose,
            ),
            Ok(None) => {}
            Err(err) => eprintln!(
                "[cellgate::segment] WARNING: Skipping ground truth for {}: {:#}",
                stem, err
            ),
        }
    }

    Ok(())
}

/// Create `<output>/<stem>/{targets..., original}` and copy the image into `original`
pub fn prepare_image_dirs(output: &Path, image: &Path, targets: &[Target]) -> Result<PathBuf> {
    let stem = file_stem(image)?;
    let image_dir = output.join(&stem);

    for folder in targets
        .iter()
        .map(|target| target.folder.as_str())
        .chain(["original"])
    {
        ensure_directory(image_dir.join(folder))?;
    }

    let name = image
        .file_name()
        .with_context(|| format!("No file name in {}", image.display()))?;

    std::fs::copy(image, image_dir.join("original").join(name))
        .with_context(|| format!("Failed to copy {}", image.display()))?;

    Ok(image_dir)
}

/// Write the outline text, the roi zip and the overlay tiff of one target
///
/// The outputs are `<stem>_outlines.txt`, `<stem>_rois.zip` and a copy of the
/// image under its own file name with the regions as an ImageJ overlay.
/// Returns the roi count.
pub fn write_target_outputs(
    directory: &Path,
    image: &Path,
    pixels: &CellImage,
    text: &str,
) -> Result<usize> {
    let stem = file_stem(image)?;

    let outlines = directory.join(format!("{}_outlines.txt", stem));
    std::fs::write(&outlines, text)
        .with_context(|| format!("Failed to write {}", outlines.display()))?;

    let rois = parse_roi_lines(text);
    write_roi_zip(directory.join(format!("{}_rois.zip", stem)), &rois)?;

    let name = image
        .file_name()
        .with_context(|| format!("No file name in {}", image.display()))?;
    write_overlay_tiff(directory.join(name), pixels, &rois)?;

    Ok(rois.len())
}

/// Convert a `<stem>_seg.npy` file next to the image, if there is one
///
/// Plain label arrays are read directly. Cellpose's own `_seg.npy` files are
/// pickled dictionaries and their masks are extracted by the engine.
pub async fn write_groundtruth(
    image: &Path,
    pixels: &CellImage,
    image_dir: &Path,
    dispatcher: &Dispatcher,
) -> Result<Option<usize>> {
    let stem = file_stem(image)?;
    let seg = image.with_file_name(format!("{}_seg.npy", stem));

    if !seg.is_file() {
        return Ok(None);
    }

    let mask = load_groundtruth(&seg, dispatcher).await?;
    let (_, outlines) = mask.outlines();
    let text = outlines.to_text();

    let directory = ensure_directory(image_dir.join("groundtruths"))?;
    std::fs::write(directory.join(format!("{}_groundtruth.txt", stem)), &text)?;

    let rois = parse_roi_lines(&text);
    write_roi_zip(
        directory.join(format!("{}_groundtruth_rois.zip", stem)),
        &rois,
    )?;
    write_overlay_tiff(
        directory.join(format!("{}_groundtruth.tif", stem)),
        pixels,
        &rois,
    )?;

    Ok(Some(rois.len()))
}

async fn load_groundtruth(seg: &Path, dispatcher: &Dispatcher) -> Result<CellMask> {
    let bytes = std::fs::read(seg).with_context(|| format!("Failed to read {}", seg.display()))?;

    if is_pickled_numpy(&bytes) {
        return dispatcher
            .extract_masks(seg)
            .await
            .with_context(|| format!("Failed to extract masks from {}", seg.display()));
    }

    CellMask::open(seg).with_context(|| format!("{} is not a label array", seg.display()))
}

#[cfg(test)]
mod test {

    use super::*;
    use cellgate_core::im::CellBuffer;
    use cellgate_core::io::{read_overlay_tiff, read_roi_zip, write_numpy};
    use cellgate_engine::{Environments, ModelFamily};

    fn pixels() -> CellImage {
        CellImage::U16(CellBuffer::new(10, 10, 1, vec![100u16; 100]).unwrap())
    }

    fn square_labels(label: u32) -> Vec<u32> {
        let mut labels = vec![0u32; 25];
        for y in 1..4 {
            for x in 1..4 {
                labels[y * 5 + x] = label;
            }
        }
        labels
    }

    // Object array header followed by a pickle stream, as saved by cellpose
    fn pickled_seg(path: &Path) {
        let header = b"{'descr': '|O', 'fortran_order': False, 'shape': (), }";
        let padding = 64 - (10 + header.len() + 1) % 64;

        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&((header.len() + padding + 1) as u16).to_le_bytes());
        bytes.extend_from_slice(header);
        bytes.extend(std::iter::repeat_n(b' ', padding));
        bytes.push(b'\n');
        bytes.extend_from_slice(b"\x80\x04\x95\x10\x00\x00\x00}\x94\x8c\x05masks\x94N\x86.");
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_prepare_image_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cells.tif");
        std::fs::write(&image, b"tiff").unwrap();

        let output = dir.path().join("outputs");
        let image_dir = prepare_image_dirs(&output, &image, &Target::defaults()).unwrap();

        assert_eq!(image_dir, output.join("cells"));
        assert!(image_dir.join("sam").is_dir());
        assert!(image_dir.join("cyto3").is_dir());
        assert!(image_dir.join("original").join("cells.tif").is_file());
    }

    #[test]
    fn test_write_target_outputs_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let text = "1,1,4,1,4,4\n2,2,3\n5,5,8,5,8,8";

        let image = dir.path().join("cells.tif");
        let count = write_target_outputs(dir.path(), &image, &pixels(), text).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("cells_outlines.txt")).unwrap(),
            text
        );

        let rois = read_roi_zip(dir.path().join("cells_rois.zip")).unwrap();
        let names: Vec<&str> = rois.iter().map(|roi| roi.name.as_str()).collect();
        assert_eq!(names, vec!["roi_0001", "roi_0003"]);

        let overlay = read_overlay_tiff(dir.path().join("cells.tif")).unwrap();
        assert_eq!(overlay, rois);
    }

    #[test]
    fn test_write_target_outputs_empty_text() {
        let dir = tempfile::tempdir().unwrap();

        let image = dir.path().join("blank.tif");

        assert_eq!(write_target_outputs(dir.path(), &image, &pixels(), "").unwrap(), 0);
        assert!(dir.path().join("blank_outlines.txt").is_file());
        assert!(!dir.path().join("blank_rois.zip").exists());
        assert!(read_overlay_tiff(&image).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_groundtruth() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cells.tif");
        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");

        let missing = write_groundtruth(&image, &pixels(), dir.path(), &dispatcher).await;
        assert!(missing.unwrap().is_none());

        let labels: Vec<u16> = square_labels(3).into_iter().map(|label| label as u16).collect();
        write_numpy(dir.path().join("cells_seg.npy"), labels, vec![5, 5]).unwrap();

        let count = write_groundtruth(&image, &pixels(), dir.path(), &dispatcher).await;
        assert_eq!(count.unwrap(), Some(1));

        let groundtruths = dir.path().join("groundtruths");
        assert!(groundtruths.join("cells_groundtruth.txt").is_file());
        assert!(groundtruths.join("cells_groundtruth_rois.zip").is_file());

        let overlay = read_overlay_tiff(groundtruths.join("cells_groundtruth.tif")).unwrap();
        assert_eq!(overlay.len(), 1);
    }

    #[tokio::test]
    async fn test_pickled_groundtruth_without_environment() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cells.tif");
        pickled_seg(&dir.path().join("cells_seg.npy"));

        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");
        let err = write_groundtruth(&image, &pixels(), dir.path(), &dispatcher)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("No environment configured"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pickled_groundtruth_extracted_by_engine() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cells.tif");
        pickled_seg(&dir.path().join("cells_seg.npy"));

        let unpickled = dir.path().join("unpickled.npy");
        write_numpy(&unpickled, square_labels(7), vec![5, 5]).unwrap();

        let engine = dir.path().join("engine.sh");
        std::fs::write(
            &engine,
            format!(
                "if [ \"$1\" = \"--groundtruth\" ]; then cp '{}' \"$5\"; fi\n\
                 echo '{{\"status\": \"success\"}}'\n",
                unpickled.display()
            ),
        )
        .unwrap();

        let environments =
            Environments::default().with_interpreter(ModelFamily::CellposeSam, "/bin/sh");
        let dispatcher = Dispatcher::new(environments, dir.path(), engine);

        let count = write_groundtruth(&image, &pixels(), dir.path(), &dispatcher).await;
        assert_eq!(count.unwrap(), Some(1));

        let text =
            std::fs::read_to_string(dir.path().join("groundtruths").join("cells_groundtruth.txt"))
                .unwrap();
        assert!(text.starts_with("1,1,"));
    }

    #[test]
    fn test_ready_timeout_saturates() {
        assert_eq!(ready_timeout(1.5), Duration::from_millis(1500));
        assert_eq!(ready_timeout(-3.0), Duration::ZERO);
        assert_eq!(ready_timeout(1e30), Duration::MAX);
        assert_eq!(ready_timeout(f32::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_params_from_target() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: SegmentArgs,
        }

        let wrapper = Wrapper::parse_from([
            "segment",
            "--image",
            "cells.tif",
            "--diameter",
            "85",
            "--use-gpu",
            "-t",
            "ddq=Cellpose3.1:ddq_model",
        ]);

        let params = wrapper.args.params(&wrapper.args.targets[0]);

        assert_eq!(params.model_type, ModelFamily::Cellpose3);
        assert_eq!(params.model_name, "ddq_model");
        assert_eq!(params.diameter, 85.0);
        assert!(params.use_gpu);
        assert!(params.normalize);
    }
}
