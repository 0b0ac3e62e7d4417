//! ONNX Runtime backends for the face models.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};

use super::{yunet, FaceBox, FaceDetector, LandmarkPredictor, Landmarks, Point, LANDMARK_COUNT};

const DETECTOR_INPUT: u32 = 640;
const SCORE_THRESHOLD: f32 = 0.6;
const NMS_THRESHOLD: f32 = 0.3;
/// Landmark crop side relative to the larger face box side.
const CROP_MARGIN: f32 = 1.2;

fn load_session(path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("load model {}", path.display()))
}

/// Planar `[1, 3, h, w]` tensor data from an RGB image.
fn planar(img: &image::RgbImage, bgr: bool, scale: f32) -> Vec<f32> {
    let pixel_count = (img.width() * img.height()) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    for (i, px) in img.pixels().enumerate() {
        let [r, g, b] = px.0;
        let (c0, c2) = if bgr { (b, r) } else { (r, b) };
        data[i] = c0 as f32 * scale;
        data[pixel_count + i] = g as f32 * scale;
        data[2 * pixel_count + i] = c2 as f32 * scale;
    }
    data
}

/// YuNet face detector (`face_detection_yunet_2023mar.onnx`).
pub struct OnnxFaceDetector {
    session: Session,
}

impl OnnxFaceDetector {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            session: load_session(path)?,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        // Letterbox into the top-left corner of the square input
        let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
        let new_width = ((width as f32 * scale) as u32).clamp(1, DETECTOR_INPUT);
        let new_height = ((height as f32 * scale) as u32).clamp(1, DETECTOR_INPUT);
        let resized = image.resize_exact(new_width, new_height, FilterType::Triangle);
        let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
        image::imageops::overlay(&mut canvas, &resized, 0, 0);

        let side = DETECTOR_INPUT as usize;
        let input = Array4::from_shape_vec((1, 3, side, side), planar(&canvas.to_rgb8(), true, 1.0))?;
        let input_tensor = Value::from_array(input)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let mut named: HashMap<String, Vec<f32>> = HashMap::new();
        for (name, output) in outputs.iter() {
            let (_shape, data) = output.try_extract_tensor::<f32>()?;
            named.insert(name.to_string(), data.to_vec());
        }

        let faces = yunet::decode(&named, side, SCORE_THRESHOLD)?;
        Ok(yunet::nms(faces, NMS_THRESHOLD)
            .into_iter()
            .map(|face| face.scaled(1.0 / scale))
            .collect())
    }
}

/// 68-point landmark regressor over a square face crop (PFLD-style: RGB in 0..1,
/// 136 outputs normalised to the crop).
pub struct OnnxLandmarkPredictor {
    session: Session,
    input_size: u32,
}

impl OnnxLandmarkPredictor {
    pub fn load(path: &Path, input_size: u32) -> Result<Self> {
        if input_size == 0 {
            bail!("landmark input size must be positive");
        }
        Ok(Self {
            session: load_session(path)?,
            input_size,
        })
    }
}

impl LandmarkPredictor for OnnxLandmarkPredictor {
    fn predict(&mut self, image: &DynamicImage, face: &FaceBox) -> Result<Landmarks> {
        let (img_w, img_h) = image.dimensions();
        let half = face.width.max(face.height) * CROP_MARGIN / 2.0;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;

        let left = (cx - half).max(0.0).floor() as u32;
        let top = (cy - half).max(0.0).floor() as u32;
        let right = ((cx + half).min(img_w as f32).ceil() as u32).min(img_w);
        let bottom = ((cy + half).min(img_h as f32).ceil() as u32).min(img_h);
        if right <= left || bottom <= top {
            bail!("face box lies outside the image");
        }
        let (crop_w, crop_h) = (right - left, bottom - top);

        let side = self.input_size;
        let crop = image
            .crop_imm(left, top, crop_w, crop_h)
            .resize_exact(side, side, FilterType::Triangle)
            .to_rgb8();
        let input = Array4::from_shape_vec(
            (1, 3, side as usize, side as usize),
            planar(&crop, false, 1.0 / 255.0),
        )?;
        let input_tensor = Value::from_array(input)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let mut coords = None;
        for (_name, output) in outputs.iter() {
            let (_shape, data) = output.try_extract_tensor::<f32>()?;
            if data.len() == LANDMARK_COUNT * 2 {
                coords = Some(data.to_vec());
                break;
            }
        }
        let Some(coords) = coords else {
            bail!("landmark model produced no {}-value output", LANDMARK_COUNT * 2);
        };

        let points = coords
            .chunks_exact(2)
            .map(|xy| {
                Point::new(
                    left as f32 + xy[0] * crop_w as f32,
                    top as f32 + xy[1] * crop_h as f32,
                )
            })
            .collect();
        Landmarks::new(points)
    }
}
