// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::family::ModelFamily;
use crate::registry::ModelSource;

/// Segmentation request parameters
///
/// Field names match the `/segment` query parameters and, prefixed with
/// `--`, the engine's command-line flags.
///
/// # Examples
///
/// ```
/// use cellgate_engine::{ModelFamily, SegmentParams};
///
/// let params: SegmentParams = serde_json::from_str(
///     r#"{"model_type": "CellposeSAM", "model_name": "cpsam", "use_gpu": "True"}"#
/// ).unwrap();
///
/// assert_eq!(params.model_type, ModelFamily::CellposeSam);
/// assert!(params.use_gpu);
/// assert_eq!(params.batch_size, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentParams {
    pub model_type: ModelFamily,
    pub model_name: String,
    #[serde(default)]
    pub diameter: f32,
    #[serde(default = "default_channels")]
    pub channels: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub use_gpu: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub resample: bool,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub normalize: bool,
    #[serde(default = "default_flow_threshold")]
    pub flow_threshold: f32,
    #[serde(default)]
    pub cellprob_threshold: f32,
    #[serde(default = "default_percentile_low")]
    pub percentile_low: f32,
    #[serde(default = "default_percentile_high")]
    pub percentile_high: f32,
    #[serde(default)]
    pub tile_norm: u32,
}

fn default_channels() -> String {
    "0,0".to_string()
}

fn default_batch_size() -> u32 {
    64
}

fn default_true() -> bool {
    true
}

fn default_flow_threshold() -> f32 {
    0.4
}

fn default_percentile_low() -> f32 {
    1.0
}

fn default_percentile_high() -> f32 {
    99.0
}

impl SegmentParams {
    /// Parameters for a model with every option at its default
    pub fn new<S: Into<String>>(model_type: ModelFamily, model_name: S) -> Self {
        Self {
            model_type,
            model_name: model_name.into(),
            diameter: 0.0,
            channels: default_channels(),
            use_gpu: false,
            batch_size: default_batch_size(),
            resample: false,
            normalize: true,
            flow_threshold: default_flow_threshold(),
            cellprob_threshold: 0.0,
            percentile_low: default_percentile_low(),
            percentile_high: default_percentile_high(),
            tile_norm: 0,
        }
    }

    /// Build the engine argument list following the script path
    ///
    /// # Arguments
    ///
    /// * `input` - Prepared (H, W, C) numpy image
    /// * `output` - Where the engine writes its (H, W) label mask
    /// * `source` - Resolved model weights
    /// * `channels` - The `[cyto, nucleus]` pair for families that take one
    pub fn engine_args(
        &self,
        input: &Path,
        output: &Path,
        source: &ModelSource,
        channels: Option<[usize; 2]>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--input".into(),
            input.into(),
            "--output".into(),
            output.into(),
            "--model_type".into(),
            self.model_type.as_str().into(),
        ];

        match source {
            ModelSource::Builtin(name) => {
                args.push("--model_name".into());
                args.push((*name).into());
            }
            ModelSource::Custom(path) => {
                args.push("--pretrained_model".into());
                args.push(path.into());
            }
        }

        let mut push = |flag: &str, value: String| {
            args.push(flag.into());
            args.push(value.into());
        };

        push("--diameter", self.diameter.to_string());
        push("--batch_size", self.batch_size.to_string());
        push("--flow_threshold", self.flow_threshold.to_string());
        push("--cellprob_threshold", self.cellprob_threshold.to_string());

        if let Some([cyto, nucleus]) = channels {
            push("--channels", format!("{},{}", cyto, nucleus));
        }

        if self.use_gpu {
            args.push("--use_gpu".into());
        }

        if self.resample {
            args.push("--resample".into());
        }

        if self.normalize {
            args.push("--percentile_low".into());
            args.push(self.percentile_low.to_string().into());
            args.push("--percentile_high".into());
            args.push(self.percentile_high.to_string().into());
            args.push("--tile_norm".into());
            args.push(self.tile_norm.to_string().into());
        } else {
            args.push("--no_normalize".into());
        }

        args
    }
}

/// Parse a boolean from a native bool, an integer, or a string such as
/// `True`, `0`, `yes` or `OFF`
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct LenientBool;

    impl Visitor<'_> for LenientBool {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean such as true, false, 1, 0, yes, no, on or off")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(value), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(value), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            parse_bool(value).ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_any(LenientBool)
}
