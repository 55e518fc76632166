use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::record::{KeyPath, Recorder};

/// Top-level record field holding all timestamp pairs.
pub const TIMES_KEY: &str = "times";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// UTC wall clock strings.
    Absolute,
    /// Seconds since the run clock started.
    #[default]
    Relative,
}

/// UTC wall-clock time with microsecond resolution, e.g. `2024-03-01 12:00:00.000123`.
pub fn abs_timestamp_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Writes enter/exit stamps at `times ++ dkey ++ [0|1]`.
#[derive(Debug, Clone)]
pub struct TimestampRecorder {
    mode: TimestampMode,
    clock: Option<Instant>,
}

impl TimestampRecorder {
    pub fn new(mode: TimestampMode) -> Self {
        Self { mode, clock: None }
    }

    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    /// Starts (or restarts) the relative clock.
    pub fn start_clock(&mut self) {
        self.clock = Some(Instant::now());
    }

    /// Seconds on the relative clock, if it has been started.
    pub fn elapsed(&self) -> Option<f64> {
        self.clock.map(|c| c.elapsed().as_secs_f64())
    }

    pub fn begin(&mut self, rec: &mut Recorder, dkey: &KeyPath) -> Result<()> {
        self.stamp(rec, dkey, 0)
    }

    pub fn end(&mut self, rec: &mut Recorder, dkey: &KeyPath) -> Result<()> {
        self.stamp(rec, dkey, 1)
    }

    fn stamp(&mut self, rec: &mut Recorder, dkey: &KeyPath, slot: usize) -> Result<()> {
        let value = match self.mode {
            TimestampMode::Absolute => Value::from(abs_timestamp_str()),
            TimestampMode::Relative => {
                let clock = *self.clock.get_or_insert_with(Instant::now);
                Value::from(clock.elapsed().as_secs_f64())
            }
        };

        rec.enter_scope(TIMES_KEY);
        let saved = rec.save(dkey.child(slot), value);
        rec.exit_scope();
        saved
    }
}
