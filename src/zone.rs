//! Red-zone geometry and the per-frame zone filter.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, Detection};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Monitored rectangle in frame pixel coordinates.
///
/// Containment is edge-inclusive: a point on any border is inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Zone {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        let zone = Self { x1, y1, x2, y2 };
        zone.validate()?;
        Ok(zone)
    }

    pub fn validate(&self) -> Result<()> {
        if self.x1 >= self.x2 || self.y1 >= self.y2 {
            return Err(anyhow!(
                "zone must satisfy x1 < x2 and y1 < y2 (got {},{},{},{})",
                self.x1,
                self.y1,
                self.x2,
                self.y2
            ));
        }
        Ok(())
    }

    /// Parse `x1,y1,x2,y2`.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<i32> = value
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| anyhow!("zone must be four integers x1,y1,x2,y2 (got {:?})", value))?;
        match parts.as_slice() {
            [x1, y1, x2, y2] => Self::new(*x1, *y1, *x2, *y2),
            _ => Err(anyhow!(
                "zone must be four integers x1,y1,x2,y2 (got {:?})",
                value
            )),
        }
    }

    pub fn contains(&self, (x, y): (i32, i32)) -> bool {
        (self.x1..=self.x2).contains(&x) && (self.y1..=self.y2).contains(&y)
    }

    pub fn contains_center(&self, bbox: &BoundingBox) -> bool {
        self.contains(bbox.center())
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            x1: 200,
            y1: 150,
            x2: 450,
            y2: 350,
        }
    }
}

/// Select the qualifying detections of one frame.
///
/// A detection qualifies when its confidence is not below `confidence_threshold`
/// and its box center lies inside `zone`. Input order is preserved.
pub fn classify(
    detections: &[Detection],
    zone: &Zone,
    confidence_threshold: f32,
) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .filter(|d| zone.contains_center(&d.bbox))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32, x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(x1, y1, x2, y2).unwrap())
    }

    /// Box of size 2x2 centered on (cx, cy).
    fn centered(confidence: f32, cx: i32, cy: i32) -> Detection {
        det("person", confidence, cx - 1, cy - 1, cx + 1, cy + 1)
    }

    #[test]
    fn confident_detection_inside_zone_qualifies() {
        let zone = Zone::default();
        let person = det("person", 0.9, 300, 200, 350, 250);
        let out = classify(&[person.clone()], &zone, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(out, vec![person]);
    }

    #[test]
    fn low_confidence_is_excluded_regardless_of_position() {
        let zone = Zone::default();
        let weak = det("person", 0.4, 300, 200, 350, 250);
        assert!(classify(&[weak], &zone, DEFAULT_CONFIDENCE_THRESHOLD).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let zone = Zone::default();
        let exact = centered(0.6, 300, 200);
        assert_eq!(classify(&[exact], &zone, 0.6).len(), 1);
    }

    #[test]
    fn zone_edges_and_corners_count_as_inside() {
        let zone = Zone::default();
        for (cx, cy) in [
            (200, 150),
            (450, 350),
            (200, 350),
            (450, 150),
            (200, 250),
            (450, 250),
            (300, 150),
            (300, 350),
        ] {
            let out = classify(&[centered(0.9, cx, cy)], &zone, 0.6);
            assert_eq!(out.len(), 1, "center ({cx},{cy}) should be inside");
        }
    }

    #[test]
    fn one_pixel_outside_is_excluded() {
        let zone = Zone::default();
        for (cx, cy) in [(199, 250), (451, 250), (300, 149), (300, 351)] {
            let out = classify(&[centered(0.9, cx, cy)], &zone, 0.6);
            assert!(out.is_empty(), "center ({cx},{cy}) should be outside");
        }
    }

    #[test]
    fn preserves_input_order_of_survivors() {
        let zone = Zone::default();
        let a = det("person", 0.7, 300, 200, 350, 250);
        let b = det("boat", 0.95, 0, 0, 20, 20);
        let c = det("dog", 0.8, 210, 160, 230, 180);
        let out = classify(&[a.clone(), b, c.clone()], &zone, 0.6);
        assert_eq!(out, vec![a, c]);
    }

    #[test]
    fn parse_accepts_csv_and_rejects_bad_input() {
        assert_eq!(Zone::parse("200, 150,450,350").unwrap(), Zone::default());
        assert!(Zone::parse("1,2,3").is_err());
        assert!(Zone::parse("a,b,c,d").is_err());
        assert!(Zone::parse("450,150,200,350").is_err());
    }
}
