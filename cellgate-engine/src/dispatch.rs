// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use cellgate_core::im::{CellImage, CellMask};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::channels::{parse_channels, remap};
use crate::envelope::Envelope;
use crate::environment::Environments;
use crate::error::DispatchError;
use crate::family::ModelFamily;
use crate::params::SegmentParams;
use crate::registry::{list_models, resolve};
use crate::{DEFAULT_TIMEOUT_SECS, MODELS_PATH_ENV};

/// Runs segmentation requests in the environment of the requested family
///
/// Each run prepares the image in a private working directory, executes the
/// engine script with the family's interpreter and converts the returned
/// label mask into outline text.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    environments: Environments,
    models_dir: PathBuf,
    engine_script: PathBuf,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new<P, Q>(environments: Environments, models_dir: P, engine_script: Q) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            environments,
            models_dir: models_dir.into(),
            engine_script: engine_script.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn environments(&self) -> &Environments {
        &self.environments
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn engine_script(&self) -> &Path {
        &self.engine_script
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Custom models available to each family
    pub fn list_models(&self) -> BTreeMap<ModelFamily, Vec<String>> {
        list_models(&self.models_dir)
    }

    /// Segment an image and return its outline text
    ///
    /// # Arguments
    ///
    /// * `image` - Path to the uploaded image, decoded by content
    /// * `params` - Model selection and engine options
    pub async fn run(&self, image: &Path, params: &SegmentParams) -> Result<String, DispatchError> {
        let family = params.model_type;

        let interpreter = self
            .environments
            .get(family)
            .ok_or(DispatchError::Misconfigured(family))?
            .to_path_buf();

        let source = resolve(&self.models_dir, family, &params.model_name)?;

        let workdir = tempfile::Builder::new().prefix("cellgate-").tempdir()?;
        let input = workdir.path().join("input.npy");
        let output = workdir.path().join("output.npy");

        let channels = parse_channels(&params.channels);
        let image_path = image.to_path_buf();
        let input_path = input.clone();

        let channel_arg = tokio::task::spawn_blocking(move || {
            let image = CellImage::open(&image_path)?;
            debug!(shape = ?image.shape(), "Decoded input image");

            let remapped = remap(family, image, &channels);
            remapped.image.save_as_numpy(&input_path)?;

            Ok::<_, DispatchError>(remapped.channel_arg)
        })
        .await??;

        let args = params.engine_args(&input, &output, &source, channel_arg);

        info!(%family, model = %params.model_name, "Dispatching segmentation job");

        match self.execute(&interpreter, args).await? {
            Envelope::Error { message } => {
                warn!(%family, %message, "Engine reported an error");
                Err(DispatchError::Engine(message))
            }
            Envelope::Success { data } => {
                let text = tokio::task::spawn_blocking(move || {
                    if !output.exists() {
                        // Engines that reply with outline text directly
                        return if data.is_empty() {
                            Err(DispatchError::Engine(
                                "Engine reported success but wrote no mask".to_string(),
                            ))
                        } else {
                            Ok(data)
                        };
                    }

                    let mask = CellMask::open(&output)?;
                    let (labels, outlines) = mask.outlines();
                    debug!(objects = labels.len(), "Traced mask outlines");

                    Ok::<_, DispatchError>(outlines.to_text())
                })
                .await??;

                info!(%family, "Segmentation complete");
                drop(workdir);
                Ok(text)
            }
        }
    }

    /// Fetch the built-in weights of a family into the models directory
    pub async fn download(&self, family: ModelFamily) -> Result<(), DispatchError> {
        let interpreter = self
            .environments
            .get(family)
            .ok_or(DispatchError::Misconfigured(family))?
            .to_path_buf();

        let args: Vec<OsString> = vec![
            "--download".into(),
            "--model_type".into(),
            family.as_str().into(),
        ];

        info!(%family, "Downloading built-in model");

        match self.execute(&interpreter, args).await? {
            Envelope::Error { message } => Err(DispatchError::Engine(message)),
            Envelope::Success { .. } => Ok(()),
        }
    }

    /// Extract the label mask stored in a pickled cellpose `_seg.npy` file
    ///
    /// The masks live inside a python dictionary, so the file is unpickled by
    /// the engine script in the first configured environment.
    pub async fn extract_masks(&self, seg: &Path) -> Result<CellMask, DispatchError> {
        let (family, interpreter) = self
            .environments
            .iter()
            .next()
            .ok_or(DispatchError::NoEnvironment)?;

        let workdir = tempfile::Builder::new().prefix("cellgate-").tempdir()?;
        let output = workdir.path().join("masks.npy");

        let args: Vec<OsString> = vec![
            "--groundtruth".into(),
            "--input".into(),
            seg.into(),
            "--output".into(),
            output.clone().into(),
            "--model_type".into(),
            family.as_str().into(),
        ];

        debug!(%family, seg = %seg.display(), "Extracting ground truth masks");

        match self.execute(interpreter, args).await? {
            Envelope::Error { message } => Err(DispatchError::Engine(message)),
            Envelope::Success { .. } => {
                let mask = tokio::task::spawn_blocking(move || CellMask::open(&output)).await??;
                drop(workdir);
                Ok(mask)
            }
        }
    }

    async fn execute(
        &self,
        interpreter: &Path,
        args: Vec<OsString>,
    ) -> Result<Envelope, DispatchError> {
        let child = Command::new(interpreter)
            .arg(&self.engine_script)
            .args(&args)
            .env(MODELS_PATH_ENV, &self.models_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                error!(timeout = ?self.timeout, "Engine timed out and was killed");
                return Err(DispatchError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            error!(code = ?output.status.code(), "Engine crashed");
            return Err(DispatchError::Crashed(output.status.code()));
        }

        Envelope::from_stdout(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use cellgate_core::io::write_numpy;

    #[tokio::test]
    async fn test_missing_environment_is_misconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");

        let params = SegmentParams::new(ModelFamily::CellposeSam, "cpsam");
        let err = dispatcher
            .run(&dir.path().join("image.png"), &params)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Misconfigured(ModelFamily::CellposeSam)));
        assert_eq!(err.to_string(), "Server Error: Model misconfigured.");
    }

    #[tokio::test]
    async fn test_extract_masks_needs_an_environment() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(Environments::default(), dir.path(), "engine.py");

        let err = dispatcher
            .extract_masks(&dir.path().join("cells_seg.npy"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::NoEnvironment));
    }

    #[tokio::test]
    async fn test_missing_custom_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let environments =
            Environments::default().with_interpreter(ModelFamily::Cellpose3, "/bin/sh");
        let dispatcher = Dispatcher::new(environments, dir.path(), "engine.py");

        let params = SegmentParams::new(ModelFamily::Cellpose3, "ghost");
        let err = dispatcher
            .run(&dir.path().join("image.png"), &params)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Model file missing: "));
        assert_eq!(err.status_code(), 500);
    }

    #[cfg(unix)]
    mod engine {

        use super::*;

        struct Fixture {
            dir: tempfile::TempDir,
            image: PathBuf,
        }

        fn fixture() -> Fixture {
            let dir = tempfile::tempdir().unwrap();
            let image = dir.path().join("image.npy");
            write_numpy(&image, vec![0u8, 50, 100, 150, 200, 250], vec![2, 3]).unwrap();
            Fixture { dir, image }
        }

        fn dispatcher(fixture: &Fixture, script: &str, timeout: Duration) -> Dispatcher {
            let engine = fixture.dir.path().join("engine.sh");
            std::fs::write(&engine, script).unwrap();

            let environments =
                Environments::default().with_interpreter(ModelFamily::CellposeSam, "/bin/sh");

            Dispatcher::new(environments, fixture.dir.path(), engine).with_timeout(timeout)
        }

        fn params() -> SegmentParams {
            SegmentParams::new(ModelFamily::CellposeSam, "cpsam")
        }

        #[tokio::test]
        async fn test_success_traces_mask() {
            let fixture = fixture();
            let mask = fixture.dir.path().join("mask.npy");

            let mut labels = vec![0u32; 36];
            for y in 1..4 {
                for x in 1..4 {
                    labels[y * 6 + x] = 1;
                }
            }
            write_numpy(&mask, labels, vec![6, 6]).unwrap();

            let script = format!(
                "while [ $# -gt 0 ]; do\n\
                   if [ \"$1\" = \"--output\" ]; then cp '{}' \"$2\"; fi\n\
                   shift\n\
                 done\n\
                 echo 'loading weights'\n\
                 echo '{{\"status\": \"success\"}}'\n",
                mask.display()
            );

            let dispatcher = dispatcher(&fixture, &script, Duration::from_secs(30));
            let text = dispatcher.run(&fixture.image, &params()).await.unwrap();

            assert_eq!(text.lines().count(), 1);
            assert!(text.starts_with("1,1,"));
        }

        #[tokio::test]
        async fn test_engine_receives_model_env() {
            let fixture = fixture();
            let script = format!(
                "if [ \"$CELLPOSE_LOCAL_MODELS_PATH\" = '{}' ]; then\n\
                   echo '{{\"status\": \"success\", \"data\": \"0,0,1,0,1,1\"}}'\n\
                 else\n\
                   echo '{{\"status\": \"error\", \"message\": \"wrong models path\"}}'\n\
                 fi\n",
                fixture.dir.path().display()
            );

            let dispatcher = dispatcher(&fixture, &script, Duration::from_secs(30));
            let text = dispatcher.run(&fixture.image, &params()).await.unwrap();

            assert_eq!(text, "0,0,1,0,1,1");
        }

        #[tokio::test]
        async fn test_error_envelope_surfaces_message() {
            let fixture = fixture();
            let dispatcher = dispatcher(
                &fixture,
                "echo '{\"status\": \"error\", \"message\": \"boom\"}'\n",
                Duration::from_secs(30),
            );

            let err = dispatcher.run(&fixture.image, &params()).await.unwrap_err();

            assert!(matches!(&err, DispatchError::Engine(message) if message == "boom"));
            assert_eq!(err.status_code(), 500);
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_crash() {
            let fixture = fixture();
            let dispatcher = dispatcher(&fixture, "exit 3\n", Duration::from_secs(30));

            let err = dispatcher.run(&fixture.image, &params()).await.unwrap_err();

            assert!(matches!(err, DispatchError::Crashed(Some(3))));
            assert_eq!(err.to_string(), "Internal Worker Error");
        }

        #[tokio::test]
        async fn test_slow_engine_times_out() {
            let fixture = fixture();
            let dispatcher = dispatcher(&fixture, "sleep 5\n", Duration::from_millis(200));

            let err = dispatcher.run(&fixture.image, &params()).await.unwrap_err();

            assert!(matches!(err, DispatchError::Timeout(_)));
            assert_eq!(err.status_code(), 504);
        }

        #[tokio::test]
        async fn test_undecodable_image() {
            let fixture = fixture();
            let garbage = fixture.dir.path().join("garbage.png");
            std::fs::write(&garbage, b"not an image").unwrap();

            let dispatcher = dispatcher(&fixture, "exit 0\n", Duration::from_secs(30));
            let err = dispatcher.run(&garbage, &params()).await.unwrap_err();

            assert!(matches!(err, DispatchError::Image(_)));
        }

        #[tokio::test]
        async fn test_download_passes_family() {
            let fixture = fixture();
            let dispatcher = dispatcher(
                &fixture,
                "if [ \"$1\" = \"--download\" ] && [ \"$3\" = \"CellposeSAM\" ]; then\n\
                   echo '{\"status\": \"success\"}'\n\
                 else\n\
                   exit 1\n\
                 fi\n",
                Duration::from_secs(30),
            );

            dispatcher.download(ModelFamily::CellposeSam).await.unwrap();
            assert!(dispatcher.download(ModelFamily::Cellpose3).await.is_err());
        }

        #[tokio::test]
        async fn test_extract_masks_reads_engine_output() {
            let fixture = fixture();
            let seg = fixture.dir.path().join("cells_seg.npy");
            std::fs::write(&seg, b"pickled").unwrap();

            let mask = fixture.dir.path().join("mask.npy");
            write_numpy(&mask, vec![0u32, 2, 2, 0, 2, 2], vec![2, 3]).unwrap();

            let script = format!(
                "if [ \"$1\" = \"--groundtruth\" ] && [ \"$3\" = '{}' ]; then\n\
                   cp '{}' \"$5\"\n\
                   echo '{{\"status\": \"success\"}}'\n\
                 else\n\
                   echo '{{\"status\": \"error\", \"message\": \"no masks\"}}'\n\
                 fi\n",
                seg.display(),
                mask.display()
            );

            let dispatcher = dispatcher(&fixture, &script, Duration::from_secs(30));

            let extracted = dispatcher.extract_masks(&seg).await.unwrap();
            assert_eq!(extracted.labels(), vec![2]);

            let err = dispatcher
                .extract_masks(&fixture.dir.path().join("other_seg.npy"))
                .await
                .unwrap_err();
            assert!(matches!(&err, DispatchError::Engine(message) if message == "no masks"));
        }
    }
}
