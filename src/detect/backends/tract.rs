#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Grey used for the letterbox padding.
const PAD_VALUE: f32 = 114.0 / 255.0;
/// Scores below this never reach NMS.
const MIN_SCORE: f32 = 0.25;

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Tract-based YOLOv8 detector.
///
/// Loads an exported YOLOv8 ONNX model (`[1,3,S,S]` input, `[1,4+C,N]` output),
/// letterboxes each frame to the model size, decodes boxes and runs
/// class-agnostic NMS. Coordinates are mapped back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    iou_threshold: f32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.45,
            labels: COCO_LABELS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    /// Letterbox into the top-left corner; returns the tensor and scale ratio.
    fn build_input(&self, frame: &Frame) -> Result<(Tensor, f32)> {
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);
        if w0 == 0.0 || h0 == 0.0 {
            return Err(anyhow!("empty frame"));
        }
        let size = self.input_size as f32;
        let ratio = (size / w0).min(size / h0);
        let nw = ((w0 * ratio).round() as u32).clamp(1, self.input_size);
        let nh = ((h0 * ratio).round() as u32).clamp(1, self.input_size);
        let resized = imageops::resize(frame.image(), nw, nh, FilterType::Triangle);

        let s = self.input_size as usize;
        let mut input = tract_ndarray::Array4::<f32>::from_elem((1, 3, s, s), PAD_VALUE);
        for (x, y, px) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                input[[0, c, y, x]] = px.0[c] as f32 / 255.0;
            }
        }
        Ok((input.into_tensor(), ratio))
    }

    fn decode(&self, output: &Tensor, ratio: f32, frame: &Frame) -> Result<Vec<Detection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;
        let (channels, anchors) = (shape[1], shape[2]);
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);

        let mut candidates: Vec<(BoundingBox, usize, f32)> = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (4..channels)
                .map(|c| (c - 4, view[[0, c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
            if score < MIN_SCORE {
                continue;
            }
            let cx = view[[0, 0, i]] / ratio;
            let cy = view[[0, 1, i]] / ratio;
            let w = view[[0, 2, i]] / ratio;
            let h = view[[0, 3, i]] / ratio;
            let x1 = (cx - w / 2.0).clamp(0.0, fw);
            let y1 = (cy - h / 2.0).clamp(0.0, fh);
            let x2 = (cx + w / 2.0).clamp(0.0, fw);
            let y2 = (cy + h / 2.0).clamp(0.0, fh);
            // Boxes that collapse after clamping are dropped.
            if let Ok(bbox) = BoundingBox::from_xyxy(x1, y1, x2, y2) {
                candidates.push((bbox, class_id, score));
            }
        }

        non_max_suppression(&mut candidates, self.iou_threshold);

        Ok(candidates
            .into_iter()
            .map(|(bbox, class_id, score)| {
                let label = self
                    .labels
                    .get(class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{class_id}"));
                Detection::new(label, score, bbox)
            })
            .collect())
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0) as f32;
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0) as f32;
    let inter = ix * iy;
    let union = a.area() as f32 + b.area() as f32 - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy NMS; keeps the highest score of each overlapping cluster.
fn non_max_suppression(xs: &mut Vec<(BoundingBox, usize, f32)>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.2.total_cmp(&a.2));
    let mut kept = 0;
    for index in 0..xs.len() {
        let suppressed = (0..kept).any(|prev| iou(&xs[prev].0, &xs[index].0) > iou_threshold);
        if !suppressed {
            xs.swap(kept, index);
            kept += 1;
        }
    }
    xs.truncate(kept);
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, ratio) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        self.decode(output, ratio, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let s = self.input_size as usize;
        let blank = tract_ndarray::Array4::<f32>::from_elem((1, 3, s, s), PAD_VALUE);
        self.model
            .run(tvec!(blank.into_tensor().into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}
