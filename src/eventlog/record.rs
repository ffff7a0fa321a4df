use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::occupancy::{ZoneEvent, ZoneEventKind};

/// Wall-clock format of the `timestamp` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTag {
    #[serde(rename = "Object ENTERED red zone")]
    Entered,
    #[serde(rename = "Object LEFT red zone")]
    Left,
}

/// One line of the event log.
///
/// ENTER lines carry `objects`; LEAVE lines omit the field entirely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub event: EventTag,
    #[serde(with = "wall_clock")]
    pub timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<LoggedObject>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggedObject {
    pub name: String,
    /// Rounded to two decimals.
    pub confidence: f64,
    pub coords: [i32; 4],
}

impl LogRecord {
    pub fn from_event(event: &ZoneEvent) -> Self {
        let timestamp = event.timestamp();
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        match event {
            ZoneEvent::Enter { detections, .. } => Self {
                event: EventTag::Entered,
                timestamp,
                objects: Some(
                    detections
                        .iter()
                        .map(|d| LoggedObject {
                            name: d.label.clone(),
                            confidence: round_confidence(d.confidence),
                            coords: d.bbox.coords(),
                        })
                        .collect(),
                ),
            },
            ZoneEvent::Leave { .. } => Self {
                event: EventTag::Left,
                timestamp,
                objects: None,
            },
        }
    }

    pub fn kind(&self) -> ZoneEventKind {
        match self.event {
            EventTag::Entered => ZoneEventKind::Enter,
            EventTag::Left => ZoneEventKind::Leave,
        }
    }

    /// Serialize as a single JSON line without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn parse_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Round to two decimals, going through f64 so the logged value prints cleanly.
///
/// Exact ties go to the even digit: 0.625 logs as 0.62.
pub fn round_confidence(confidence: f32) -> f64 {
    (f64::from(confidence) * 100.0).round_ties_even() / 100.0
}

mod wall_clock {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_nano_opt(9, 5, 7, 250_000_000)
            .unwrap()
    }

    #[test]
    fn enter_line_matches_wire_format() {
        let event = ZoneEvent::Enter {
            timestamp: at(),
            detections: vec![Detection::new(
                "person",
                0.9134,
                BoundingBox::new(300, 200, 350, 250).unwrap(),
            )],
        };
        let line = LogRecord::from_event(&event).to_line().unwrap();
        assert_eq!(
            line,
            r#"{"event":"Object ENTERED red zone","timestamp":"2024-05-01 09:05:07","objects":[{"name":"person","confidence":0.91,"coords":[300,200,350,250]}]}"#
        );
    }

    #[test]
    fn leave_line_has_no_objects() {
        let event = ZoneEvent::Leave { timestamp: at() };
        let line = LogRecord::from_event(&event).to_line().unwrap();
        assert_eq!(
            line,
            r#"{"event":"Object LEFT red zone","timestamp":"2024-05-01 09:05:07"}"#
        );
    }

    #[test]
    fn parsed_enter_reproduces_objects() {
        let detections = vec![
            Detection::new("boat", 0.666, BoundingBox::new(210, 160, 260, 220).unwrap()),
            Detection::new("person", 0.6, BoundingBox::new(400, 300, 440, 340).unwrap()),
            Detection::new("kite", 0.625, BoundingBox::new(220, 170, 240, 190).unwrap()),
            Detection::new("bird", 0.125, BoundingBox::new(300, 160, 310, 170).unwrap()),
        ];
        let event = ZoneEvent::Enter {
            timestamp: at(),
            detections: detections.clone(),
        };
        let line = LogRecord::from_event(&event).to_line().unwrap();
        let parsed = LogRecord::parse_line(&line).unwrap();

        assert_eq!(parsed.kind(), ZoneEventKind::Enter);
        let objects = parsed.objects.expect("objects");
        assert_eq!(objects.len(), 4);
        for (obj, det) in objects.iter().zip(&detections) {
            assert_eq!(obj.name, det.label);
            assert_eq!(obj.confidence, round_confidence(det.confidence));
            assert_eq!(obj.coords, det.bbox.coords());
        }
        assert_eq!(objects[0].confidence, 0.67);
        assert_eq!(objects[1].confidence, 0.6);
        assert_eq!(objects[2].confidence, 0.62);
        assert_eq!(objects[3].confidence, 0.12);
    }

    #[test]
    fn rejects_unknown_event_tag() {
        let line = r#"{"event":"Object WANDERED","timestamp":"2024-05-01 09:05:07"}"#;
        assert!(LogRecord::parse_line(line).is_err());
    }
}
