// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::collections::{BTreeMap, VecDeque};

// Scan order for the 8-neighbourhood, clockwise starting from the west
const NEIGHBOURS: [[i32; 2]; 8] = [
    [-1, 0],  // West
    [-1, -1], // Northwest
    [0, -1],  // North
    [1, -1],  // Northeast
    [1, 0],   // East
    [1, 1],   // Southeast
    [0, 1],   // South
    [-1, 1],  // Southwest
];

/// Trace the outer borders of foreground regions using 8-connectivity
///
/// Border following after Suzuki & Abe (1985). Hole borders are followed so
/// that their pixels are marked, but only outer borders are returned.
///
/// # Arguments
///
/// * `width` - Width of mask
/// * `height` - Height of mask
/// * `pixels` - A row-major mask buffer
/// * `is_foreground` - Predicate selecting the pixels that belong to regions
///
/// # References
///
/// Adapted/modified from: https://github.com/image-rs/imageproc
///
/// # Examples
///
/// ```
/// use cellgate_core::cv::find_contours;
///
/// let buffer: Vec<u32> = vec![12, 12, 0, 12, 12, 0, 0, 0, 0];
/// let contours = find_contours(3, 3, &buffer, |v| v > 0);
///
/// assert_eq!(contours, [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]])
/// ```
pub fn find_contours<F>(
    width: u32,
    height: u32,
    pixels: &[u32],
    is_foreground: F,
) -> Vec<Vec<[f32; 2]>>
where
    F: Fn(u32) -> bool,
{
    let width = width as usize;
    let height = height as usize;
    let grid_width = width + 2;
    let grid_height = height + 2;

    let at = |x: usize, y: usize| x + grid_width * y;

    // Zero padding keeps every neighbour lookup of a foreground pixel in bounds
    let mut grid = vec![0i32; grid_width * grid_height];

    for y in 0..height {
        for x in 0..width {
            if is_foreground(pixels[y * width + x]) {
                grid[at(x + 1, y + 1)] = 1;
            }
        }
    }

    let is_set = |grid: &[i32], (x, y): (i32, i32)| {
        x >= 0
            && y >= 0
            && (x as usize) < grid_width
            && (y as usize) < grid_height
            && grid[at(x as usize, y as usize)] != 0
    };

    let mut diffs = VecDeque::from(NEIGHBOURS.to_vec());
    let mut outer: Vec<Vec<[f32; 2]>> = Vec::new();
    let mut border: i32 = 1;

    for y in 1..=height {
        for x in 1..=width {
            let value = grid[at(x, y)];

            if value == 0 {
                continue;
            }

            let start = (x as i32, y as i32);

            let (is_outer, adjacent) = if value == 1 && grid[at(x - 1, y)] == 0 {
                (true, (start.0 - 1, start.1))
            } else if value > 0 && grid[at(x + 1, y)] == 0 {
                (false, (start.0 + 1, start.1))
            } else {
                continue;
            };

            border += 1;

            let mut points: Vec<[f32; 2]> = Vec::new();
            rotate_to_value(&mut diffs, [adjacent.0 - start.0, adjacent.1 - start.1]);

            let first = diffs.iter().find_map(|&[dx, dy]| {
                let next = (start.0 + dx, start.1 + dy);
                is_set(&grid, next).then_some(next)
            });

            match first {
                Some(pos1) => {
                    let mut pos2 = pos1;
                    let mut pos3 = start;

                    loop {
                        points.push([pos3.0 as f32 - 1.0, pos3.1 as f32 - 1.0]);
                        rotate_to_value(&mut diffs, [pos2.0 - pos3.0, pos2.1 - pos3.1]);

                        // pos2 is always set, so the reverse scan terminates at the latest there
                        let Some(pos4) = diffs.iter().rev().find_map(|&[dx, dy]| {
                            let next = (pos3.0 + dx, pos3.1 + dy);
                            is_set(&grid, next).then_some(next)
                        }) else {
                            break;
                        };

                        let step = [pos4.0 - pos3.0, pos4.1 - pos3.1];
                        let east_examined = diffs
                            .iter()
                            .rev()
                            .take_while(|&&diff| diff != step)
                            .any(|&diff| diff == [1, 0]);

                        let idx = at(pos3.0 as usize, pos3.1 as usize);
                        if pos3.0 as usize + 1 == grid_width || east_examined {
                            grid[idx] = -border;
                        } else if grid[idx] == 1 {
                            grid[idx] = border;
                        }

                        if pos4 == start && pos3 == pos1 {
                            break;
                        }

                        pos2 = pos3;
                        pos3 = pos4;
                    }
                }
                None => {
                    points.push([x as f32 - 1.0, y as f32 - 1.0]);
                    grid[at(x, y)] = -border;
                }
            }

            if is_outer {
                outer.push(points);
            }
        }
    }

    outer
}

fn rotate_to_value(values: &mut VecDeque<[i32; 2]>, value: [i32; 2]) {
    if let Some(pos) = values.iter().position(|&v| v == value) {
        values.rotate_left(pos);
    }
}

/// Inclusive (min_x, min_y, max_x, max_y) bounds of every non-zero label
pub fn label_bounds(width: u32, height: u32, pixels: &[u32]) -> BTreeMap<u32, [usize; 4]> {
    let width = width as usize;
    let mut bounds: BTreeMap<u32, [usize; 4]> = BTreeMap::new();

    for (idx, &label) in pixels.iter().enumerate().take(width * height as usize) {
        if label == 0 {
            continue;
        }

        let (x, y) = (idx % width, idx / width);
        bounds
            .entry(label)
            .and_modify(|b| {
                b[0] = b[0].min(x);
                b[1] = b[1].min(y);
                b[2] = b[2].max(x);
                b[3] = b[3].max(y);
            })
            .or_insert([x, y, x, y]);
    }

    bounds
}

/// Find the outline of each object denoted by a unique non-zero integer
///
/// Each label is traced inside its own bounding box and the longest outer
/// border is kept. Labels whose outline has fewer than three points, or
/// that do not occur in the mask, are dropped from the returned labels.
///
/// # Arguments
///
/// * `width` - Width of mask
/// * `height` - Height of mask
/// * `pixels` - A row-major mask buffer
/// * `labels` - Positive non-zero integers specifying unique segmented objects
///
/// # Examples
///
/// ```
/// use cellgate_core::cv::find_labeled_contours;
///
/// let buffer: Vec<u32> = vec![12, 12, 0, 12, 0, 10, 0, 10, 10];
/// let (labels, contours) = find_labeled_contours(3, 3, &buffer, &[10u32, 12u32]);
///
/// assert_eq!(labels, vec![10, 12]);
/// assert_eq!(contours, [[[2.0, 1.0], [1.0, 2.0], [2.0, 2.0]], [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]]]);
/// ```
pub fn find_labeled_contours(
    width: u32,
    height: u32,
    pixels: &[u32],
    labels: &[u32],
) -> (Vec<u32>, Vec<Vec<[f32; 2]>>) {
    let bounds = label_bounds(width, height, pixels);
    let full_width = width as usize;

    let mut contours = Vec::with_capacity(labels.len());
    let mut retained = Vec::with_capacity(labels.len());

    for &label in labels {
        let Some(&[min_x, min_y, max_x, max_y]) = bounds.get(&label) else {
            continue;
        };

        let crop_width = max_x - min_x + 1;
        let crop_height = max_y - min_y + 1;

        let mut crop = Vec::with_capacity(crop_width * crop_height);
        for y in min_y..=max_y {
            let row = y * full_width;
            crop.extend(
                pixels[row + min_x..=row + max_x]
                    .iter()
                    .map(|&v| u32::from(v == label)),
            );
        }

        let contour = find_contours(crop_width as u32, crop_height as u32, &crop, |v| v != 0)
            .into_iter()
            .max_by_key(|contour| contour.len());

        if let Some(contour) = contour {
            if contour.len() > 2 {
                contours.push(
                    contour
                        .into_iter()
                        .map(|[x, y]| [x + min_x as f32, y + min_y as f32])
                        .collect(),
                );
                retained.push(label);
            }
        }
    }

    (retained, contours)
}
