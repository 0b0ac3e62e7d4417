//! Face-shape classification and hairstyle recommendations.
//!
//! A detector finds the face box, a 68-point landmark model locates the
//! jawline, and a handful of distances plus one angle pick the shape.

use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::VisionConfig;

pub mod onnx;
pub mod yunet;

pub const LANDMARK_COUNT: usize = 68;
pub const NO_FACE: &str = "No face detected";

/// Width difference (px) under which the face counts as evenly proportioned.
const WIDTH_TOLERANCE: f32 = 10.0;
/// Jaw angle (degrees) at or above which the jawline counts as soft.
const SOFT_JAW_ANGLE: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Face bounding box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            score: self.score,
        }
    }

    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let inter = (x2 - x1) * (y2 - y1);
        inter / (self.width * self.height + other.width * other.height - inter)
    }
}

/// The 68-point iBUG layout: 0-16 jawline, 8 the chin.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    points: Vec<Point>,
}

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() != LANDMARK_COUNT {
            bail!("expected {LANDMARK_COUNT} landmarks, got {}", points.len());
        }
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Point {
        self.points[index]
    }
}

pub trait FaceDetector: Send {
    /// Faces in the image, best first.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

pub trait LandmarkPredictor: Send {
    fn predict(&mut self, image: &DynamicImage, face: &FaceBox) -> Result<Landmarks>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaceShape {
    Square,
    Round,
    Triangle,
    Diamond,
    Rectangular,
    Oblong,
    Unknown,
}

impl FaceShape {
    pub fn name(&self) -> &'static str {
        match self {
            FaceShape::Square => "Square",
            FaceShape::Round => "Round",
            FaceShape::Triangle => "Triangle",
            FaceShape::Diamond => "Diamond",
            FaceShape::Rectangular => "Rectangular",
            FaceShape::Oblong => "Oblong",
            FaceShape::Unknown => "Unknown",
        }
    }

    pub fn hairstyles(&self) -> &'static [&'static str] {
        match self {
            FaceShape::Square => &["Short Pompadour", "Side Part", "Undercut"],
            FaceShape::Round => &["Angular Fringe", "High Volume Top", "Flat Top"],
            FaceShape::Triangle => &["Buzz Cut", "Textured Crop", "Side-Swept"],
            FaceShape::Diamond => &["Comb Over", "Faux Hawk", "Quiff"],
            FaceShape::Rectangular => &["Crew Cut", "Pompadour", "Short Textured"],
            FaceShape::Oblong => &["Side Part", "Fringe", "Layered Top"],
            FaceShape::Unknown => &["Consult a stylist for a custom recommendation."],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMeasurements {
    /// Detector box width.
    pub forehead_width: f32,
    /// Landmarks 1 to 15.
    pub cheek_width: f32,
    /// Landmarks 3 to 13.
    pub jaw_width: f32,
    /// Box top to chin (landmark 8).
    pub face_length: f32,
    /// Slope of the jaw from landmark 3 to 5, in degrees.
    pub jaw_angle: f32,
}

pub fn measure(face: &FaceBox, landmarks: &Landmarks) -> FaceMeasurements {
    let p = |i| landmarks.point(i);
    let jaw_angle = (p(5).y - p(3).y).atan2(p(5).x - p(3).x).to_degrees().abs();
    FaceMeasurements {
        forehead_width: face.width,
        cheek_width: p(15).distance(&p(1)),
        jaw_width: p(13).distance(&p(3)),
        face_length: (p(8).y - face.y).abs(),
        jaw_angle,
    }
}

pub fn classify(m: &FaceMeasurements) -> FaceShape {
    let sharp = m.jaw_angle < SOFT_JAW_ANGLE;
    if (m.forehead_width - m.cheek_width).abs() < WIDTH_TOLERANCE {
        if sharp {
            FaceShape::Square
        } else {
            FaceShape::Round
        }
    } else if m.jaw_width > m.forehead_width {
        if sharp {
            FaceShape::Triangle
        } else {
            FaceShape::Diamond
        }
    } else if m.face_length > m.cheek_width {
        if sharp {
            FaceShape::Rectangular
        } else {
            FaceShape::Oblong
        }
    } else {
        FaceShape::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub face_shape: String,
    pub recommendations: Vec<String>,
}

impl Recommendation {
    pub fn no_face() -> Self {
        Self {
            face_shape: NO_FACE.to_string(),
            recommendations: Vec::new(),
        }
    }

    pub fn for_shape(shape: FaceShape) -> Self {
        Self {
            face_shape: shape.name().to_string(),
            recommendations: shape.hairstyles().iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Owns the two models. Each sits behind a mutex since inference needs exclusive access.
pub struct FaceAnalyzer {
    detector: Mutex<Box<dyn FaceDetector>>,
    predictor: Mutex<Box<dyn LandmarkPredictor>>,
}

impl FaceAnalyzer {
    pub fn new(detector: Box<dyn FaceDetector>, predictor: Box<dyn LandmarkPredictor>) -> Self {
        Self {
            detector: Mutex::new(detector),
            predictor: Mutex::new(predictor),
        }
    }

    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let detector = onnx::OnnxFaceDetector::load(&config.detector_model)
            .with_context(|| format!("load face detector {}", config.detector_model.display()))?;
        let predictor =
            onnx::OnnxLandmarkPredictor::load(&config.landmark_model, config.landmark_input_size)
                .with_context(|| {
                    format!("load landmark model {}", config.landmark_model.display())
                })?;
        info!("Face models loaded");
        Ok(Self::new(Box::new(detector), Box::new(predictor)))
    }

    /// Decodes an uploaded image and recommends for the first face found.
    pub fn recommend_bytes(&self, bytes: &[u8]) -> Result<Recommendation> {
        let image = image::load_from_memory(bytes).context("decode image")?;
        self.recommend(&image)
    }

    pub fn recommend(&self, image: &DynamicImage) -> Result<Recommendation> {
        let faces = self
            .detector
            .lock()
            .map_err(|_| anyhow!("face detector lock poisoned"))?
            .detect(image)?;
        let Some(face) = faces.first() else {
            debug!("No face detected");
            return Ok(Recommendation::no_face());
        };

        let landmarks = self
            .predictor
            .lock()
            .map_err(|_| anyhow!("landmark predictor lock poisoned"))?
            .predict(image, face)?;
        let measurements = measure(face, &landmarks);
        let shape = classify(&measurements);
        debug!(?measurements, shape = shape.name(), "Classified face");
        Ok(Recommendation::for_shape(shape))
    }
}
