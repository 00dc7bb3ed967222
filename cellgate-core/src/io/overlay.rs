// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::Decoder;
use tiff::decoder::ifd::Value;
use tiff::encoder::{TiffEncoder, TiffValue, colortype};
use tiff::tags::Tag;

use crate::constant::{
    IJ_METADATA_BYTE_COUNTS_TAG, IJ_METADATA_MAGIC, IJ_METADATA_TAG, IJ_OVERLAY_TYPE,
};
use crate::error::CellgateError;
use crate::im::CellImage;
use crate::io::Roi;

/// Write an ImageJ tiff with the regions embedded as its overlay
///
/// Each channel is written as its own grayscale page, described as an
/// ImageJ hyperstack when there is more than one. The encoded regions are
/// stored in the first page's ImageJ metadata tags, which ImageJ and Fiji
/// show as an overlay on open.
///
/// # Arguments
///
/// * `path` - Output `.tif` path
/// * `image` - Pixels of the segmented image
/// * `rois` - Regions to embed, possibly empty
///
/// # Examples
///
/// ```no_run
/// use cellgate_core::im::CellImage;
/// use cellgate_core::io::{Roi, write_overlay_tiff};
///
/// let image = CellImage::open("cells.tif").unwrap();
/// let rois = vec![Roi::new("roi_0001", vec![[1., 1.], [6., 1.], [6., 4.]])];
///
/// write_overlay_tiff("cells_overlay.tif", &image, &rois).unwrap();
/// ```
pub fn write_overlay_tiff<P: AsRef<Path>>(
    path: P,
    image: &CellImage,
    rois: &[Roi],
) -> Result<(), CellgateError> {
    let (width, height, channels) = (image.width(), image.height(), image.channels());

    let description = image_description(channels);
    let metadata = overlay_metadata(rois)?;

    let file = File::create(path).map_err(|err| CellgateError::OverlayWriteError(err.to_string()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|err| CellgateError::OverlayWriteError(err.to_string()))?;

    for channel in 0..channels as usize {
        let first = (channel == 0).then_some((description.as_str(), metadata.as_ref()));

        let result = match image {
            CellImage::U8(buffer) => write_page::<_, colortype::Gray8>(
                &mut encoder,
                width,
                height,
                &plane(buffer.as_raw(), channels as usize, channel),
                first,
            ),
            CellImage::U16(buffer) => write_page::<_, colortype::Gray16>(
                &mut encoder,
                width,
                height,
                &plane(buffer.as_raw(), channels as usize, channel),
                first,
            ),
            CellImage::F32(buffer) => write_page::<_, colortype::Gray32Float>(
                &mut encoder,
                width,
                height,
                &plane(buffer.as_raw(), channels as usize, channel),
                first,
            ),
        };

        result.map_err(|err| CellgateError::OverlayWriteError(err.to_string()))?;
    }

    Ok(())
}

/// Read the overlay regions embedded in an ImageJ tiff
///
/// A tiff without ImageJ metadata has no overlay and yields no regions.
pub fn read_overlay_tiff<P: AsRef<Path>>(path: P) -> Result<Vec<Roi>, CellgateError> {
    let file = File::open(path).map_err(|err| CellgateError::NoFileError(err.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|err| CellgateError::OverlayReadError(err.to_string()))?;

    let counts = decoder
        .find_tag_unsigned_vec::<u32>(Tag::Unknown(IJ_METADATA_BYTE_COUNTS_TAG))
        .map_err(|err| CellgateError::OverlayReadError(err.to_string()))?;

    let metadata = decoder
        .find_tag(Tag::Unknown(IJ_METADATA_TAG))
        .map_err(|err| CellgateError::OverlayReadError(err.to_string()))?;

    match (counts, metadata) {
        (Some(counts), Some(metadata)) => {
            let blob = value_bytes(metadata).ok_or_else(|| {
                CellgateError::OverlayReadError("ImageJ metadata is not a byte array".to_string())
            })?;
            parse_overlay_metadata(&blob, &counts)
        }
        _ => Ok(Vec::new()),
    }
}

type PageTags<'a> = Option<(&'a str, Option<&'a (Vec<u32>, Vec<u8>)>)>;

fn write_page<W, C>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[C::Inner],
    tags: PageTags,
) -> tiff::TiffResult<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut page = encoder.new_image::<C>(width, height)?;

    if let Some((description, metadata)) = tags {
        page.encoder().write_tag(Tag::ImageDescription, description)?;

        if let Some((counts, blob)) = metadata {
            page.encoder()
                .write_tag(Tag::Unknown(IJ_METADATA_BYTE_COUNTS_TAG), &counts[..])?;
            page.encoder()
                .write_tag(Tag::Unknown(IJ_METADATA_TAG), &blob[..])?;
        }
    }

    page.write_data(data)
}

fn plane<T: Copy>(raw: &[T], channels: usize, channel: usize) -> Vec<T> {
    raw.iter().skip(channel).step_by(channels).copied().collect()
}

fn image_description(channels: u32) -> String {
    if channels > 1 {
        format!(
            "ImageJ=1.11a\nimages={}\nchannels={}\nhyperstack=true\nmode=grayscale\n",
            channels, channels
        )
    } else {
        "ImageJ=1.11a\n".to_string()
    }
}

// The metadata blob is a header of (type, count) entries followed by the
// records, with every record length listed in the byte counts tag
fn overlay_metadata(rois: &[Roi]) -> Result<Option<(Vec<u32>, Vec<u8>)>, CellgateError> {
    if rois.is_empty() {
        return Ok(None);
    }

    let mut blob = Vec::new();
    blob.extend_from_slice(IJ_METADATA_MAGIC);
    blob.extend_from_slice(IJ_OVERLAY_TYPE);
    blob.extend_from_slice(&(rois.len() as u32).to_be_bytes());

    let mut counts = Vec::with_capacity(rois.len() + 1);
    counts.push(blob.len() as u32);

    for roi in rois {
        let bytes = roi.to_bytes()?;
        counts.push(bytes.len() as u32);
        blob.extend_from_slice(&bytes);
    }

    Ok(Some((counts, blob)))
}

fn parse_overlay_metadata(blob: &[u8], counts: &[u32]) -> Result<Vec<Roi>, CellgateError> {
    let invalid = |message: &str| CellgateError::OverlayReadError(message.to_string());

    let header_len = *counts.first().ok_or_else(|| invalid("Empty byte counts"))? as usize;

    if blob.get(..4) != Some(&IJ_METADATA_MAGIC[..]) || header_len < 4 || header_len > blob.len() {
        return Err(invalid("Missing ImageJ metadata header"));
    }

    let mut rois = Vec::new();
    let mut offset = header_len;
    let mut records = counts[1..].iter();

    for entry in blob[4..header_len].chunks_exact(8) {
        let kind = &entry[..4];
        let n = u32::from_be_bytes([entry[4], entry[5], entry[6], entry[7]]);

        for _ in 0..n {
            let len = *records.next().ok_or_else(|| invalid("Missing record length"))? as usize;
            let record = blob
                .get(offset..offset + len)
                .ok_or_else(|| invalid("Record extends past metadata"))?;
            offset += len;

            if kind == IJ_OVERLAY_TYPE {
                rois.push(Roi::from_bytes(record)?);
            }
        }
    }

    Ok(rois)
}

fn value_bytes(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::Byte(byte) => Some(vec![byte]),
        Value::List(values) => values
            .into_iter()
            .map(|value| match value {
                Value::Byte(byte) => Some(byte),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::im::CellBuffer;

    fn gray_image() -> CellImage {
        CellImage::U16(CellBuffer::new(8, 6, 1, (0..48u16).collect()).unwrap())
    }

    fn rois() -> Vec<Roi> {
        vec![
            Roi::new("roi_0001", vec![[1., 1.], [4., 1.], [4., 4.], [1., 4.], [1., 2.]]),
            Roi::new("roi_0003", vec![[5.5, 2.], [7., 2.], [7., 5.]]),
        ]
    }

    #[test]
    fn test_overlay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.tif");

        write_overlay_tiff(&path, &gray_image(), &rois()).unwrap();

        let decoded = read_overlay_tiff(&path).unwrap();
        assert_eq!(decoded, rois());
        assert_eq!(decoded[0].len(), 5);

        let pixels = CellImage::open(&path).unwrap();
        assert_eq!(pixels.shape(), (6, 8, 1));
    }

    #[test]
    fn test_overlay_without_rois() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.tif");

        write_overlay_tiff(&path, &gray_image(), &[]).unwrap();

        assert!(path.is_file());
        assert!(read_overlay_tiff(&path).unwrap().is_empty());
    }

    #[test]
    fn test_overlay_multichannel_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");

        let rgb = CellImage::U8(CellBuffer::new(2, 2, 3, (0..12u8).collect()).unwrap());
        write_overlay_tiff(&path, &rgb, &rois()[..1]).unwrap();

        let mut decoder = Decoder::new(BufReader::new(File::open(&path).unwrap())).unwrap();
        let description = decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap();

        assert!(description.contains("channels=3"));
        assert!(decoder.more_images());

        assert_eq!(read_overlay_tiff(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_metadata_layout() {
        let (counts, blob) = overlay_metadata(&rois()).unwrap().unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0], 12);
        assert_eq!(&blob[..8], b"IJIJover");
        assert_eq!(&blob[8..12], &2u32.to_be_bytes());
        assert_eq!(blob.len() as u32, counts.iter().sum::<u32>());
        assert_eq!(&blob[12..16], b"Iout");
    }

    #[test]
    fn test_parse_rejects_truncated_metadata() {
        let (counts, blob) = overlay_metadata(&rois()).unwrap().unwrap();

        assert!(parse_overlay_metadata(&blob[..40], &counts).is_err());
        assert!(parse_overlay_metadata(b"XXXX", &[4]).is_err());
    }
}
