use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BacklightError {
    #[error("backlight level {level} outside 0..={max}")]
    OutOfRange { level: i32, max: i32 },
}

/// Display backlight owned directly by the dispatcher.
///
/// The in-memory level is authoritative; the sysfs write is best-effort so
/// a missing panel never fails the command.
#[derive(Debug)]
pub struct Backlight {
    path: PathBuf,
    max: i32,
    level: AtomicI32,
}

impl Backlight {
    pub fn new(path: impl Into<PathBuf>, max: i32, initial: i32) -> Self {
        Self {
            path: path.into(),
            max,
            level: AtomicI32::new(initial.clamp(0, max.max(0))),
        }
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn get(&self) -> i32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set(&self, level: i32) -> Result<(), BacklightError> {
        if !(0..=self.max).contains(&level) {
            return Err(BacklightError::OutOfRange {
                level,
                max: self.max,
            });
        }
        self.level.store(level, Ordering::Relaxed);
        match std::fs::write(&self.path, level.to_string()) {
            Ok(()) => debug!(level, "backlight level applied"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to write backlight level"),
        }
        Ok(())
    }
}
