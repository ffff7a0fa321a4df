use anyhow::{anyhow, Result};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box, rejecting degenerate or inverted corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "bounding box must satisfy x1 < x2 and y1 < y2 (got {},{},{},{})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Convert detector float corners, truncating toward zero.
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }

    /// Box center using floor integer division.
    ///
    /// Detector coordinates are non-negative, where this matches truncation.
    pub fn center(&self) -> (i32, i32) {
        (midpoint(self.x1, self.x2), midpoint(self.y1, self.y2))
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn coords(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    // The mean of two i32 values always fits back into i32.
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

/// One detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// 0..=1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_integer_midpoint() {
        let bbox = BoundingBox::new(300, 200, 351, 251).unwrap();
        assert_eq!(bbox.center(), (325, 225));
    }

    #[test]
    fn center_of_extreme_box_does_not_overflow() {
        let bbox = BoundingBox::new(i32::MAX - 4, i32::MIN, i32::MAX, i32::MAX).unwrap();
        assert_eq!(bbox.center(), (i32::MAX - 2, -1));
    }

    #[test]
    fn rejects_inverted_corners() {
        assert!(BoundingBox::new(10, 10, 10, 20).is_err());
        assert!(BoundingBox::new(10, 30, 20, 20).is_err());
    }

    #[test]
    fn float_corners_truncate() {
        let bbox = BoundingBox::from_xyxy(10.9, 20.2, 30.7, 40.99).unwrap();
        assert_eq!(bbox.coords(), [10, 20, 30, 40]);
    }
}
