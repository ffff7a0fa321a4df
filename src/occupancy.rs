//! Zone occupancy tracking.
//!
//! The tracker is a two-state machine evaluated once per successfully
//! detected frame. It emits `ZoneEvent::Enter` on the EMPTY -> OCCUPIED edge and
//! `ZoneEvent::Leave` on the OCCUPIED -> EMPTY edge, and nothing otherwise, so
//! continued occupancy never produces repeated alerts.

use chrono::NaiveDateTime;

use crate::detect::Detection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OccupancyState {
    #[default]
    Empty,
    Occupied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneEventKind {
    Enter,
    Leave,
}

/// Transition emitted by the tracker.
#[derive(Clone, Debug, PartialEq)]
pub enum ZoneEvent {
    Enter {
        timestamp: NaiveDateTime,
        /// Qualifying detections of the frame that caused the entry.
        detections: Vec<Detection>,
    },
    Leave {
        timestamp: NaiveDateTime,
    },
}

impl ZoneEvent {
    pub fn kind(&self) -> ZoneEventKind {
        match self {
            ZoneEvent::Enter { .. } => ZoneEventKind::Enter,
            ZoneEvent::Leave { .. } => ZoneEventKind::Leave,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            ZoneEvent::Enter { timestamp, .. } | ZoneEvent::Leave { timestamp } => *timestamp,
        }
    }
}

#[derive(Debug, Default)]
pub struct OccupancyTracker {
    state: OccupancyState,
    entries: u64,
    exits: u64,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OccupancyState {
        self.state
    }

    pub fn is_occupied(&self) -> bool {
        self.state == OccupancyState::Occupied
    }

    /// Number of ENTER events emitted so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Number of LEAVE events emitted so far.
    pub fn exits(&self) -> u64 {
        self.exits
    }

    /// Advance the state machine with one frame's qualifying detections.
    pub fn evaluate(
        &mut self,
        qualifying: Vec<Detection>,
        timestamp: NaiveDateTime,
    ) -> Option<ZoneEvent> {
        match (self.state, qualifying.is_empty()) {
            (OccupancyState::Empty, false) => {
                self.state = OccupancyState::Occupied;
                self.entries += 1;
                Some(ZoneEvent::Enter {
                    timestamp,
                    detections: qualifying,
                })
            }
            (OccupancyState::Occupied, true) => {
                self.state = OccupancyState::Empty;
                self.exits += 1;
                Some(ZoneEvent::Leave { timestamp })
            }
            (OccupancyState::Occupied, false) | (OccupancyState::Empty, true) => None,
        }
    }
}
