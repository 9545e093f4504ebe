//! YOLOv8 output decoding.
//!
//! Kept separate from the ONNX session so the tensor layout, the box
//! conversion and NMS can be tested without a model file.

use std::path::Path;

use mpp_models::{BoundingBox, RawDetection};
use ndarray::ArrayView2;

use crate::error::{VisionError, VisionResult};

/// Parameters of the YOLOv8 post-processing step.
#[derive(Debug, Clone)]
pub struct YoloDecodeConfig {
    /// Square model input size the boxes are expressed in
    pub input_size: u32,
    /// IoU threshold for per-class NMS
    pub nms_threshold: f32,
    /// Candidates scoring below this are dropped before NMS
    pub score_floor: f32,
    /// Maximum detections kept after NMS
    pub max_detections: usize,
}

impl Default for YoloDecodeConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            nms_threshold: 0.45,
            score_floor: 0.01,
            max_detections: 300,
        }
    }
}

/// Load the class label list, one label per line, line index = class id.
///
/// Blank lines are skipped; the file must contain at least one label.
pub fn load_labels(path: &Path) -> VisionResult<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VisionError::model_unavailable(format!(
            "Failed to read labels file {}: {}",
            path.display(),
            e
        ))
    })?;

    let labels: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(VisionError::model_unavailable(format!(
            "Labels file {} is empty",
            path.display()
        )));
    }

    Ok(labels)
}

/// Decode a flattened `[1, 4 + C, N]` YOLOv8 output tensor.
///
/// Each column holds `cx, cy, w, h` in model input pixels followed by one
/// score per class. Boxes are mapped back onto the original image and
/// returned in pixel coordinates.
pub fn decode_output(
    output: &[f32],
    labels: &[String],
    image_width: u32,
    image_height: u32,
    config: &YoloDecodeConfig,
) -> VisionResult<Vec<RawDetection>> {
    let num_classes = labels.len();
    let num_features = 4 + num_classes;

    if num_classes == 0 {
        return Err(VisionError::inference("No class labels configured"));
    }
    if output.is_empty() || output.len() % num_features != 0 {
        return Err(VisionError::inference(format!(
            "Unexpected output size {} for {} classes",
            output.len(),
            num_classes
        )));
    }

    let num_boxes = output.len() / num_features;
    let view = ArrayView2::from_shape((num_features, num_boxes), output)
        .map_err(|e| VisionError::inference(format!("Failed to reshape output: {}", e)))?;
    let rows = view.t(); // [N, 4 + C]

    let input_size = config.input_size as f32;
    let mut candidates = Vec::new();

    for row in rows.outer_iter() {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..num_classes {
            let score = row[4 + c];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if !best_score.is_finite() || best_score < config.score_floor {
            continue;
        }

        let bbox = BoundingBox::from_normalized_center(
            row[0] / input_size,
            row[1] / input_size,
            row[2] / input_size,
            row[3] / input_size,
            image_width,
            image_height,
        );
        if bbox.area() <= 0.0 {
            continue;
        }

        candidates.push(
            RawDetection::new(labels[best_class].clone(), best_score.min(1.0), bbox)
                .with_class_id(best_class as u32),
        );
    }

    let mut kept = non_maximum_suppression(candidates, config.nms_threshold);
    kept.truncate(config.max_detections);
    Ok(kept)
}

/// Per-class NMS. Output is in rank order.
pub fn non_maximum_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| a.rank(b));

    let mut suppressed = vec![false; detections.len()];
    let mut keep = Vec::new();

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
        keep.push(i);
    }

    let mut kept = Vec::with_capacity(keep.len());
    for (i, detection) in detections.into_iter().enumerate() {
        if keep.binary_search(&i).is_ok() {
            kept.push(detection);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels() -> Vec<String> {
        vec!["Clear plastic bottle".to_string(), "Drink can".to_string()]
    }

    /// Build a `[6, N]` tensor from `(cx, cy, w, h, score0, score1)` columns.
    fn tensor(columns: &[[f32; 6]]) -> Vec<f32> {
        let n = columns.len();
        let mut data = vec![0.0; 6 * n];
        for (i, col) in columns.iter().enumerate() {
            for (f, value) in col.iter().enumerate() {
                data[f * n + i] = *value;
            }
        }
        data
    }

    #[test]
    fn test_load_labels() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Clear plastic bottle\n\nDrink can\n").unwrap();

        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["Clear plastic bottle", "Drink can"]);
    }

    #[test]
    fn test_load_labels_missing_or_empty() {
        assert!(matches!(
            load_labels(Path::new("/nonexistent/labels.txt")),
            Err(VisionError::ModelUnavailable(_))
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_labels(file.path()).is_err());
    }

    #[test]
    fn test_decode_maps_boxes_to_image_pixels() {
        // Box centred in the 640 input, 320x160 wide
        let output = tensor(&[[320.0, 320.0, 320.0, 160.0, 0.87, 0.1]]);
        let detections =
            decode_output(&output, &labels(), 1280, 960, &YoloDecodeConfig::default()).unwrap();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.label, "Clear plastic bottle");
        assert_eq!(det.class_id, Some(0));
        assert!((det.confidence - 0.87).abs() < 1e-6);
        assert!((det.bbox.x - 320.0).abs() < 1e-3);
        assert!((det.bbox.y - 360.0).abs() < 1e-3);
        assert!((det.bbox.width - 640.0).abs() < 1e-3);
        assert!((det.bbox.height - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_picks_best_class_and_drops_low_scores() {
        let output = tensor(&[
            [100.0, 100.0, 50.0, 50.0, 0.2, 0.7],
            [400.0, 400.0, 50.0, 50.0, 0.001, 0.002],
        ]);
        let detections =
            decode_output(&output, &labels(), 640, 640, &YoloDecodeConfig::default()).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "Drink can");
        assert_eq!(detections[0].class_id, Some(1));
    }

    #[test]
    fn test_decode_rejects_mismatched_tensor() {
        let err = decode_output(&[0.0; 7], &labels(), 640, 640, &YoloDecodeConfig::default())
            .unwrap_err();
        assert!(matches!(err, VisionError::Inference(_)));
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let output = tensor(&[
            [100.0, 100.0, 80.0, 80.0, 0.9, 0.0],
            [102.0, 101.0, 80.0, 80.0, 0.8, 0.0],
            [101.0, 100.0, 80.0, 80.0, 0.0, 0.6],
        ]);
        let detections =
            decode_output(&output, &labels(), 640, 640, &YoloDecodeConfig::default()).unwrap();

        let summary: Vec<_> = detections
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
            .collect();
        assert_eq!(
            summary,
            vec![("Clear plastic bottle", 0.9), ("Drink can", 0.6)]
        );
    }

    #[test]
    fn test_decode_truncates_to_max_detections() {
        let columns: Vec<[f32; 6]> = (0..10)
            .map(|i| [30.0 + 60.0 * i as f32, 30.0, 20.0, 20.0, 0.5, 0.0])
            .collect();
        let config = YoloDecodeConfig {
            max_detections: 3,
            ..YoloDecodeConfig::default()
        };
        let detections = decode_output(&tensor(&columns), &labels(), 640, 640, &config).unwrap();
        assert_eq!(detections.len(), 3);
    }
}
