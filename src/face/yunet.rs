//! YuNet post-processing.
//!
//! YuNet is anchor-free. For each stride it emits, per grid cell, a class
//! score (`cls_{s}`), an objectness score (`obj_{s}`) and box deltas
//! (`bbox_{s}`: dx, dy, log w, log h in stride units). Landmark outputs
//! (`kps_{s}`) are ignored here; the 68-point model supplies landmarks.

use std::collections::HashMap;

use anyhow::{bail, Result};

use super::FaceBox;

pub const STRIDES: [usize; 3] = [8, 16, 32];

fn output<'a>(outputs: &'a HashMap<String, Vec<f32>>, name: &str, len: usize) -> Result<&'a [f32]> {
    match outputs.get(name) {
        Some(data) if data.len() == len => Ok(data),
        Some(data) => bail!("output {name} has {} values, expected {len}", data.len()),
        None => bail!("missing output {name}"),
    }
}

/// Boxes above `score_threshold`, in pixels of the square `input_size` model input.
pub fn decode(
    outputs: &HashMap<String, Vec<f32>>,
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<FaceBox>> {
    let mut faces = Vec::new();

    for stride in STRIDES {
        let cols = input_size / stride;
        let cells = cols * cols;
        let cls = output(outputs, &format!("cls_{stride}"), cells)?;
        let obj = output(outputs, &format!("obj_{stride}"), cells)?;
        let bbox = output(outputs, &format!("bbox_{stride}"), cells * 4)?;

        for idx in 0..cells {
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            if score < score_threshold {
                continue;
            }
            let (row, col) = (idx / cols, idx % cols);
            let s = stride as f32;
            let delta = &bbox[idx * 4..idx * 4 + 4];

            let cx = (col as f32 + delta[0]) * s;
            let cy = (row as f32 + delta[1]) * s;
            let width = delta[2].exp() * s;
            let height = delta[3].exp() * s;

            faces.push(FaceBox {
                x: cx - width / 2.0,
                y: cy - height / 2.0,
                width,
                height,
                score,
            });
        }
    }

    Ok(faces)
}

/// Greedy non-maximum suppression, best score first.
pub fn nms(mut faces: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if keep.iter().all(|kept| kept.iou(&face) <= iou_threshold) {
            keep.push(face);
        }
    }
    keep
}
