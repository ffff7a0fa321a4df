use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for tests and dry runs.
///
/// Each `detect` call consumes the next scripted response. Once the script is
/// exhausted (or when none was given) every frame yields no detections.
#[derive(Debug, Default)]
pub struct StubBackend {
    script: VecDeque<Result<Vec<Detection>, String>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the detections returned for the next unscripted frame.
    pub fn then_detect(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(Ok(detections));
        self
    }

    /// Queue `count` frames without detections.
    pub fn then_idle(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.script.push_back(Ok(Vec::new()));
        }
        self
    }

    /// Queue a failed detector call.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.push_back(Err(message.to_string()));
        self
    }

    /// Number of frames this backend has been asked about.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!("stub detector failure: {}", message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn replays_script_then_goes_idle() {
        let frame = Frame::from_rgb(vec![0u8; 12], 2, 2, 1).unwrap();
        let person = Detection::new("person", 0.9, BoundingBox::new(1, 1, 5, 5).unwrap());
        let mut backend = StubBackend::new()
            .then_detect(vec![person.clone()])
            .then_fail("boom")
            .then_idle(1);

        assert_eq!(backend.detect(&frame).unwrap(), vec![person]);
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.calls(), 4);
    }
}
