// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use cellgate_core::im::CellImage;
use tracing::warn;

use crate::family::ModelFamily;

/// An image prepared for a family together with its channel argument
#[derive(Debug, Clone)]
pub struct Remapped {
    pub image: CellImage,
    /// `[cyto, nucleus]` for families that select channels themselves
    pub channel_arg: Option<[usize; 2]>,
}

/// Parse a comma separated channel list such as `"0,2"`
///
/// Tokens are trimmed and anything that is not a plain non-negative
/// integer is dropped.
///
/// # Examples
///
/// ```
/// use cellgate_engine::channels::parse_channels;
///
/// assert_eq!(parse_channels("2, 1"), vec![2, 1]);
/// assert_eq!(parse_channels("0,x,-1,,3"), vec![0, 3]);
/// assert!(parse_channels("").is_empty());
/// ```
pub fn parse_channels(text: &str) -> Vec<usize> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Arrange an image the way a model family expects its channels
///
/// The SAM family has no channel argument, so the requested planes are
/// packed to the front of the image. Cellpose 3.1 receives the image as is
/// plus a two-value channel argument padded with zeros.
pub fn remap(family: ModelFamily, image: CellImage, channels: &[usize]) -> Remapped {
    let available = image.channels() as usize;

    match family {
        ModelFamily::CellposeSam => {
            if channels.iter().any(|&c| c >= available) {
                warn!(
                    ?channels,
                    available, "Some requested channels are out of bounds and were dropped"
                );
            }

            Remapped {
                image: image.pack_channels(channels),
                channel_arg: None,
            }
        }
        ModelFamily::Cellpose3 => {
            // 0 selects grayscale, 1..=C select a colour plane
            if channels.iter().any(|&c| c > available) {
                warn!(
                    ?channels,
                    available, "Some requested channels exceed the image channel count"
                );
            }

            let mut pair = [0usize; 2];
            for (slot, &channel) in pair.iter_mut().zip(channels) {
                *slot = channel;
            }

            Remapped {
                image,
                channel_arg: Some(pair),
            }
        }
    }
}
