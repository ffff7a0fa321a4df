use anyhow::Result;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Scoped ownership of a connected source.
///
/// The source is released exactly once: explicitly through `release`, or on
/// drop when the frame loop returns early or unwinds.
pub struct CaptureGuard<'a> {
    source: &'a mut dyn FrameSource,
    released: bool,
}

impl<'a> CaptureGuard<'a> {
    /// Connect `source` and take responsibility for releasing it.
    pub fn connect(source: &'a mut dyn FrameSource) -> Result<Self> {
        source.connect()?;
        Ok(Self {
            source,
            released: false,
        })
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.source.next_frame()
    }

    pub fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    pub fn stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        let stats = self.source.stats();
        log::info!(
            "released {} after {} frames",
            stats.source,
            stats.frames_captured
        );
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct CountingSource {
        connected: bool,
        releases: u32,
        fail_connect: bool,
    }

    impl FrameSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn connect(&mut self) -> Result<()> {
            if self.fail_connect {
                return Err(anyhow!("no device"));
            }
            self.connected = true;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            Err(anyhow!("unused"))
        }

        fn is_healthy(&self) -> bool {
            self.connected
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: 0,
                source: self.describe(),
            }
        }

        fn release(&mut self) {
            self.connected = false;
            self.releases += 1;
        }
    }

    #[test]
    fn releases_once_on_drop_after_explicit_release() -> Result<()> {
        let mut source = CountingSource::default();
        {
            let mut guard = CaptureGuard::connect(&mut source)?;
            assert!(guard.is_healthy());
            guard.release();
            guard.release();
        }
        assert_eq!(source.releases, 1);
        assert!(!source.connected);
        Ok(())
    }

    #[test]
    fn releases_on_drop() -> Result<()> {
        let mut source = CountingSource::default();
        drop(CaptureGuard::connect(&mut source)?);
        assert_eq!(source.releases, 1);
        Ok(())
    }

    #[test]
    fn failed_connect_does_not_release() {
        let mut source = CountingSource {
            fail_connect: true,
            ..CountingSource::default()
        };
        assert!(CaptureGuard::connect(&mut source).is_err());
        assert_eq!(source.releases, 0);
    }
}
