// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use serde_json::Value;

use crate::constant::POLYGON_JSON_VALID_KEYS;
use crate::error::CellgateError;
use crate::io::Roi;

/// A container for storing traced object outlines
///
/// Outlines are stored in (N, K, 2) format where N is the number of
/// objects and K is the number of xy points in each outline. The outlines
/// can be ragged so K varies per object.
///
/// # Examples
///
/// ```
/// use cellgate_core::im::Outlines;
///
/// let outlines = Outlines::new(vec![
///     vec![[0., 1.], [1., 1.], [1., 2.]],
///     vec![[2.5, 3.], [4., 3.], [4., 5.]],
/// ]);
///
/// assert_eq!(outlines.to_text(), "0,1,1,1,1,2\n2.5,3,4,3,4,5");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outlines {
    data: Vec<Vec<[f32; 2]>>,
}

impl Outlines {
    pub fn new(data: Vec<Vec<[f32; 2]>>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_points(&self) -> &[Vec<[f32; 2]>] {
        &self.data
    }

    pub fn to_points(self) -> Vec<Vec<[f32; 2]>> {
        self.data
    }

    /// Format as one comma-separated `x1,y1,x2,y2,...` line per outline
    pub fn to_text(&self) -> String {
        self.data
            .iter()
            .map(|outline| format_outline(outline))
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// Parse outline text, silently skipping malformed lines
    pub fn from_text(text: &str) -> Self {
        Self::new(
            parse_roi_lines(text)
                .into_iter()
                .map(|roi| roi.points)
                .collect(),
        )
    }

    /// Convert each outline into a region named by its 1-based position
    ///
    /// Empty outlines produce no region but still take up a position.
    pub fn to_rois(&self) -> Vec<Roi> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, outline)| !outline.is_empty())
            .map(|(idx, outline)| Roi::new(roi_name(idx + 1), outline.clone()))
            .collect()
    }
}

// >>> I/O METHODS

impl Outlines {
    /// Open outlines from the provided path
    ///
    /// # Arguments
    ///
    /// * `path` - A path to a `.txt` outline file or a `.json` polygon file
    ///
    /// ```no_run
    /// use cellgate_core::im::Outlines;
    /// let outlines = Outlines::open("image_outlines.txt");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Outlines, CellgateError> {
        match extension(path.as_ref()).as_deref() {
            Some("txt") => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| CellgateError::NoFileError(err.to_string()))?;
                Ok(Outlines::from_text(&text))
            }
            Some("json") => read_outlines_json(path),
            _ => Err(CellgateError::OutlinesReadError),
        }
    }

    /// Save outlines at the provided path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save outlines with a `.txt` or `.json` extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CellgateError> {
        match extension(path.as_ref()).as_deref() {
            Some("txt") => std::fs::write(path, self.to_text())
                .map_err(|_| CellgateError::OutlinesWriteError),
            Some("json") => write_outlines_json(path, &self.data),
            _ => Err(CellgateError::OutlinesWriteError),
        }
    }
}

// <<< I/O METHODS

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn roi_name(line: usize) -> String {
    format!("roi_{:04}", line)
}

/// Format a single outline as `x1,y1,x2,y2,...`
pub fn format_outline(points: &[[f32; 2]]) -> String {
    points
        .iter()
        .flat_map(|[x, y]| [x.to_string(), y.to_string()])
        .collect::<Vec<String>>()
        .join(",")
}

/// Parse outline text into named polygon regions
///
/// Every line holds the flat coordinate list of one polygon. Lines that are
/// empty, have fewer than two points, an odd number of values, or any value
/// that is not a number are skipped. Regions are named `roi_NNNN` after the
/// 1-based line number they came from, so skipped lines leave gaps.
///
/// # Arguments
///
/// * `text` - Outline text as produced by [`Outlines::to_text`]
///
/// # Examples
///
/// ```
/// use cellgate_core::im::parse_roi_lines;
///
/// let rois = parse_roi_lines("0,0,4,0,4,4\n1,2,3\n\n5, 5, 6, 5, 6, 6,");
///
/// assert_eq!(rois.len(), 2);
/// assert_eq!(rois[0].name, "roi_0001");
/// assert_eq!(rois[1].name, "roi_0004");
/// assert_eq!(rois[1].points, vec![[5., 5.], [6., 5.], [6., 6.]]);
/// ```
pub fn parse_roi_lines(text: &str) -> Vec<Roi> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let tokens: Vec<&str> = line
                .trim()
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect();

            if tokens.len() < 4 || tokens.len() % 2 != 0 {
                return None;
            }

            let values = tokens
                .iter()
                .map(|token| token.parse::<f32>().ok().filter(|v| v.is_finite()))
                .collect::<Option<Vec<f32>>>()?;

            let points = values
                .chunks_exact(2)
                .map(|xy| [xy[0], xy[1]])
                .collect();

            Some(Roi::new(roi_name(idx + 1), points))
        })
        .collect()
}

/// Read outlines from a json file storing polygons under a known key
pub fn read_outlines_json<P: AsRef<Path>>(path: P) -> Result<Outlines, CellgateError> {
    let mut contents = String::new();

    File::open(path)
        .map_err(|err| CellgateError::NoFileError(err.to_string()))?
        .read_to_string(&mut contents)
        .map_err(|err| CellgateError::NoFileError(err.to_string()))?;

    let data: Value =
        serde_json::from_str(&contents).map_err(|_| CellgateError::OutlinesReadError)?;

    fn to_f32(value: &Value) -> Result<f32, CellgateError> {
        value
            .as_f64()
            .map(|n| n as f32)
            .ok_or(CellgateError::OutlinesReadError)
    }

    for key in &POLYGON_JSON_VALID_KEYS {
        if let Some(polygons) = data.get(key).and_then(|v| v.as_array()) {
            let polygons: Result<Vec<Vec<[f32; 2]>>, _> = polygons
                .iter()
                .filter_map(Value::as_array)
                .map(|polygon| {
                    polygon
                        .iter()
                        .filter_map(Value::as_array)
                        .map(|p| {
                            if p.len() == 2 {
                                Ok([to_f32(&p[0])?, to_f32(&p[1])?])
                            } else {
                                Err(CellgateError::OutlinesReadError)
                            }
                        })
                        .collect::<Result<Vec<[f32; 2]>, _>>()
                })
                .collect();

            if let Ok(polygons) = polygons {
                return Ok(Outlines::new(polygons));
            }
        }
    }

    Err(CellgateError::OutlinesReadError)
}

/// Write outlines to a json file under the `polygons` key
pub fn write_outlines_json<P: AsRef<Path>>(
    path: P,
    outlines: &[Vec<[f32; 2]>],
) -> Result<(), CellgateError> {
    let file = File::create(path).map_err(|_| CellgateError::OutlinesWriteError)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer(writer, &serde_json::json!({ "polygons": outlines }))
        .map_err(|_| CellgateError::OutlinesWriteError)?;

    Ok(())
}
