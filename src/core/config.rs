use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::draw::TextStyle;
use crate::error::{Error, Result};
use crate::timestamps::TimestampMode;

fn default_pause_ms() -> u64 {
    100
}

fn default_code_delay_ms() -> u64 {
    50
}

fn default_port_address() -> u64 {
    0x378
}

fn default_bg_color() -> String {
    "white".to_string()
}

fn default_button_radius() -> f32 {
    0.1
}

fn default_okay_button_pos() -> (f32, f32) {
    (0.0, -0.5)
}

fn default_fixation_cross_length() -> f32 {
    50.0
}

fn default_fixation_cross_thickness() -> f32 {
    5.0
}

fn default_black() -> String {
    "black".to_string()
}

fn default_string_entry_box_y() -> f32 {
    -0.4
}

fn default_approx_dialog_box_width() -> u32 {
    200
}

fn default_font_name() -> String {
    "Verdana".to_string()
}

fn default_text_height() -> f32 {
    0.075
}

/// What the cancel key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Stop the trigger worker, release the screen and exit the process.
    #[default]
    Exit,
    /// Return `Error::UserAbort` to the caller.
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Port device to write codes to. Without one codes are only logged.
    #[serde(default)]
    pub port: Option<PathBuf>,
    /// Byte offset of the data register within `port`.
    #[serde(default = "default_port_address")]
    pub address: u64,
    /// How long a code (and then the reset level) is held.
    #[serde(default = "default_code_delay_ms")]
    pub code_delay_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            port: None,
            address: default_port_address(),
            code_delay_ms: default_code_delay_ms(),
        }
    }
}

impl TriggerConfig {
    pub fn code_delay(&self) -> Duration {
        Duration::from_millis(self.code_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub timestamps: TimestampMode,
    /// Hardware triggering is enabled when present.
    #[serde(default)]
    pub triggers: Option<TriggerConfig>,
    /// Settle delay after each screen.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Directory for the line-by-line debug log.
    #[serde(default)]
    pub debug_log_dir: Option<PathBuf>,
    /// Draw every frame twice before presenting it.
    #[serde(default)]
    pub double_draw: bool,
    /// Use a surface slightly smaller than the screen.
    #[serde(default)]
    pub shrink_screen: bool,
    #[serde(default = "default_bg_color")]
    pub bg_color: String,
    #[serde(default = "default_button_radius")]
    pub button_radius: f32,
    #[serde(default = "default_okay_button_pos")]
    pub okay_button_pos: (f32, f32),
    #[serde(default = "default_fixation_cross_length")]
    pub fixation_cross_length: f32,
    #[serde(default = "default_fixation_cross_thickness")]
    pub fixation_cross_thickness: f32,
    #[serde(default = "default_black")]
    pub fixation_cross_color: String,
    #[serde(default = "default_string_entry_box_y")]
    pub string_entry_box_y: f32,
    /// Estimated width of dialogs as they appear, used to position them.
    #[serde(default = "default_approx_dialog_box_width")]
    pub approx_dialog_box_width: u32,
    #[serde(default = "default_font_name")]
    pub font_name: String,
    #[serde(default = "default_text_height")]
    pub text_height: f32,
    #[serde(default = "default_black")]
    pub text_color: String,
    #[serde(default)]
    pub abort: AbortPolicy,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timestamps: TimestampMode::default(),
            triggers: None,
            pause_ms: default_pause_ms(),
            debug_log_dir: None,
            double_draw: false,
            shrink_screen: false,
            bg_color: default_bg_color(),
            button_radius: default_button_radius(),
            okay_button_pos: default_okay_button_pos(),
            fixation_cross_length: default_fixation_cross_length(),
            fixation_cross_thickness: default_fixation_cross_thickness(),
            fixation_cross_color: default_black(),
            string_entry_box_y: default_string_entry_box_y(),
            approx_dialog_box_width: default_approx_dialog_box_width(),
            font_name: default_font_name(),
            text_height: default_text_height(),
            text_color: default_black(),
            abort: AbortPolicy::default(),
        }
    }
}

impl TaskConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: TaskConfig = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.button_radius > 0.0) {
            return Err(Error::Config(format!(
                "button_radius must be positive, got {}",
                self.button_radius
            )));
        }
        if !(self.text_height > 0.0) {
            return Err(Error::Config(format!(
                "text_height must be positive, got {}",
                self.text_height
            )));
        }
        if let Some(t) = &self.triggers {
            if t.code_delay_ms == 0 {
                return Err(Error::Config("triggers.code_delay_ms must be at least 1".to_string()));
            }
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font: self.font_name.clone(),
            height: self.text_height,
            color: self.text_color.clone(),
        }
    }
}
