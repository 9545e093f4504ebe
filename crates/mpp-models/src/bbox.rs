use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An axis-aligned box in pixel coordinates of the original image.
///
/// The origin is the top-left corner of the image; `x`/`y` locate the
/// top-left corner of the box (COCO convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner, in pixels
    pub x: f32,
    /// Y coordinate of the top-left corner, in pixels
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert a normalized centre-format box (`cx, cy, w, h` in [0, 1], as
    /// emitted by YOLO models) into pixel coordinates of an image of the
    /// given size. The result is clipped to the image.
    pub fn from_normalized_center(
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let img_w = image_width as f32;
        let img_h = image_height as f32;

        let x = (cx - w / 2.0) * img_w;
        let y = (cy - h / 2.0) * img_h;

        Self::new(x, y, w * img_w, h * img_h).clamp_to(image_width, image_height)
    }

    /// Clip the box so it lies entirely inside a `width` x `height` image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let img_w = image_width as f32;
        let img_h = image_height as f32;

        let x1 = self.x.clamp(0.0, img_w);
        let y1 = self.y.clamp(0.0, img_h);
        let x2 = (self.x + self.width).clamp(0.0, img_w);
        let y2 = (self.y + self.height).clamp(0.0, img_h);

        Self::new(x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0))
    }

    /// The same box expressed as fractions of the image size.
    pub fn normalized(&self, image_width: u32, image_height: u32) -> Self {
        let img_w = image_width.max(1) as f32;
        let img_h = image_height.max(1) as f32;
        Self::new(
            self.x / img_w,
            self.y / img_h,
            self.width / img_w,
            self.height / img_h,
        )
    }

    /// Right edge (exclusive).
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Get the center point.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_from_normalized_center() {
        // Centre of a 200x100 image, half its size
        let bbox = BoundingBox::from_normalized_center(0.5, 0.5, 0.5, 0.5, 200, 100);
        assert!(approx(bbox.x, 50.0));
        assert!(approx(bbox.y, 25.0));
        assert!(approx(bbox.width, 100.0));
        assert!(approx(bbox.height, 50.0));
    }

    #[test]
    fn test_from_normalized_center_is_clipped() {
        let bbox = BoundingBox::from_normalized_center(0.0, 0.0, 0.4, 0.4, 100, 100);
        assert!(approx(bbox.x, 0.0));
        assert!(approx(bbox.y, 0.0));
        assert!(approx(bbox.width, 20.0));
        assert!(approx(bbox.height, 20.0));
    }

    #[test]
    fn test_normalized() {
        let bbox = BoundingBox::new(50.0, 25.0, 100.0, 50.0);
        let n = bbox.normalized(200, 100);
        assert!(approx(n.x, 0.25));
        assert!(approx(n.y, 0.25));
        assert!(approx(n.width, 0.5));
        assert!(approx(n.height, 0.5));
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        let c = BoundingBox::new(20.0, 20.0, 5.0, 5.0);

        assert!(approx(a.iou(&a), 1.0));
        // 50 / (100 + 100 - 50)
        assert!(approx(a.iou(&b), 1.0 / 3.0));
        assert!(approx(a.iou(&c), 0.0));
    }

    #[test]
    fn test_center_and_area() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(bbox.center(), (25.0, 40.0));
        assert!(approx(bbox.area(), 1200.0));
    }
}
