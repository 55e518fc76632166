#[path = "core/config.rs"]
pub mod config;

#[path = "core/controls.rs"]
pub mod controls;

#[path = "core/dialog.rs"]
pub mod dialog;

#[path = "core/draw.rs"]
pub mod draw;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/input.rs"]
pub mod input;

#[path = "core/paths.rs"]
pub mod paths;

#[path = "core/record.rs"]
pub mod record;

#[path = "core/screens.rs"]
pub mod screens;

#[path = "core/task.rs"]
pub mod task;

#[path = "core/timestamps.rs"]
pub mod timestamps;

#[path = "core/trigger.rs"]
pub mod trigger;

#[cfg(test)]
#[path = "core/testing.rs"]
mod testing;

pub use config::{AbortPolicy, TaskConfig, TriggerConfig};
pub use error::{Error, Result};
pub use record::{KeyPath, Segment};
pub use task::{Backend, Task};
