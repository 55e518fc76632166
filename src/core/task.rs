//! The per-run context: record, clock, implicit draw set, trigger worker and
//! backend, all owned by one [`Task`] and handed to every screen.

use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::{AbortPolicy, TaskConfig};
use crate::controls::{Button, RatingScale};
use crate::dialog::Dialog;
use crate::draw::{HAlign, ImplicitDrawSet, RectStim, Screen, StimRef, Stimulus, TextStim, Units, VAlign};
use crate::error::{Error, Result};
use crate::input::Input;
use crate::path;
use crate::record::{KeyPath, Recorder};
use crate::timestamps::{abs_timestamp_str, TimestampRecorder};
use crate::trigger::{LogSink, PortSink, TriggerCode, TriggerDispatcher, START_LISTENING, STOP_LISTENING};

/// Everything a task needs from the outside world.
pub trait Backend: Screen + Input + Dialog {}

impl<T: Screen + Input + Dialog> Backend for T {}

/// Layout options for text stimuli.
#[derive(Debug, Clone, Default)]
pub struct TextOptions {
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub wrap: Option<f32>,
    pub color: Option<String>,
}

impl TextOptions {
    pub fn top() -> Self {
        Self {
            v_align: VAlign::Top,
            ..Self::default()
        }
    }

    pub fn wrap(mut self, width: f32) -> Self {
        self.wrap = Some(width);
        self
    }
}

#[derive(Debug, Clone)]
pub struct LikertOptions {
    pub x: f32,
    pub y: f32,
    pub scale_points: i64,
    pub anchors: (String, String),
    pub stretch: f32,
}

impl Default for LikertOptions {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: -0.7,
            scale_points: 7,
            anchors: ("min".to_string(), "max".to_string()),
            stretch: 1.75,
        }
    }
}

/// Unstretched rating scale length in norm units.
const SCALE_BASE_WIDTH: f32 = 0.6;

pub struct Task<B: Backend> {
    pub(crate) config: TaskConfig,
    pub(crate) backend: B,
    pub(crate) rec: Recorder,
    pub(crate) stamps: TimestampRecorder,
    pub(crate) drawn: ImplicitDrawSet,
    pub(crate) triggers: TriggerDispatcher,
    screen_size: (u32, u32),
    fixation_cross: StimRef,
}

impl<B: Backend> Task<B> {
    /// Starts a run, spawning the trigger worker if the configuration asks for one.
    pub fn new(config: TaskConfig, backend: B) -> Result<Self> {
        let triggers = match &config.triggers {
            Some(t) => match &t.port {
                Some(device) => {
                    let sink = PortSink::open(device, t.address)?;
                    info!("Trigger codes go to {} @ {:#x}", device.display(), t.address);
                    TriggerDispatcher::spawn(sink, t.code_delay())?
                }
                None => {
                    warn!("Triggers enabled without a port; codes are only logged");
                    TriggerDispatcher::spawn(LogSink, t.code_delay())?
                }
            },
            None => TriggerDispatcher::disabled(),
        };
        Self::with_dispatcher(config, backend, triggers)
    }

    /// Starts a run with a caller-provided trigger dispatcher.
    pub fn with_dispatcher(config: TaskConfig, mut backend: B, triggers: TriggerDispatcher) -> Result<Self> {
        config.validate()?;

        let rec = match &config.debug_log_dir {
            Some(dir) => Recorder::with_debug_log(dir)?,
            None => Recorder::new(),
        };

        backend.set_background(&config.bg_color);
        let (mut width, mut height) = backend.size();
        if config.shrink_screen {
            width = width.saturating_sub(5);
            height = height.saturating_sub(5);
            backend.set_size(width, height);
        }

        let cross_color = config.fixation_cross_color.clone();
        let bar = |w: f32, h: f32| {
            Stimulus::Rect(RectStim {
                pos: (0.0, 0.0),
                width: w,
                height: h,
                units: Units::Pix,
                fill: cross_color.clone(),
                line: cross_color.clone(),
            })
        };
        let fixation_cross = Stimulus::Group(vec![
            bar(config.fixation_cross_length, config.fixation_cross_thickness),
            bar(config.fixation_cross_thickness, config.fixation_cross_length),
        ])
        .into_ref();

        let mut task = Self {
            stamps: TimestampRecorder::new(config.timestamps),
            config,
            backend,
            rec,
            drawn: ImplicitDrawSet::new(),
            triggers,
            screen_size: (width, height),
            fixation_cross,
        };

        if let Some(worker) = task.triggers.worker_id() {
            task.save(path!["sys", "trigger_worker"], worker)?;
            task.trigger(START_LISTENING)?;
        }

        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        task.save(path!["sys", "hostname"], host)?;
        task.save(path!["sys", "resolution"], json!([width, height]))?;
        task.save(path!["sys", "pid"], std::process::id())?;
        task.save(path!["overall_timing", "started"], abs_timestamp_str())?;

        info!("Task started ({}x{})", width, height);
        Ok(task)
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn record(&self) -> &Recorder {
        &self.rec
    }

    pub fn data(&self) -> &Value {
        self.rec.store().root()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen_size
    }

    pub fn fixation_cross(&self) -> StimRef {
        self.fixation_cross.clone()
    }

    pub fn implicit_draw_set(&self) -> &ImplicitDrawSet {
        &self.drawn
    }

    /// Saves under the active prefixes; see [`Recorder::save`].
    pub fn save(&mut self, path: impl Into<KeyPath>, value: impl Into<Value>) -> Result<()> {
        self.rec.save(path, value)
    }

    /// Queues a trigger pulse. A no-op when triggering is disabled.
    pub fn trigger(&mut self, code: TriggerCode) -> Result<()> {
        self.triggers.send(code)
    }

    pub fn start_clock(&mut self) {
        self.stamps.start_clock();
    }

    pub fn pause(&self) {
        thread::sleep(self.config.pause());
    }

    /// Draws the implicit set and `stimuli`, then presents the frame.
    pub fn draw(&mut self, stimuli: &[StimRef]) -> Result<()> {
        self.drawn.frame(&mut self.backend, stimuli, self.config.double_draw)
    }

    /// Prefixes every save in the guard's extent with `prefix`.
    pub fn prefix(&mut self, prefix: impl Into<KeyPath>) -> Scope<'_, B> {
        self.rec.enter_scope(prefix);
        Scope::new(self, Restore::Prefix)
    }

    /// Writes an enter stamp for `dkey` now and an exit stamp when the guard
    /// finishes or is dropped.
    pub fn timestamps(&mut self, dkey: impl Into<KeyPath>) -> Result<Scope<'_, B>> {
        let dkey = dkey.into();
        self.stamps.begin(&mut self.rec, &dkey)?;
        Ok(Scope::new(self, Restore::Stamp(dkey)))
    }

    /// Draws `stimuli` on every frame within the guard's extent.
    pub fn showing(&mut self, stimuli: &[StimRef]) -> Scope<'_, B> {
        let snapshot = self.drawn.show(stimuli);
        Scope::new(self, Restore::DrawSet(snapshot))
    }

    /// Suppresses implicitly drawn `stimuli` within the guard's extent.
    pub fn hiding(&mut self, stimuli: &[StimRef]) -> Result<Scope<'_, B>> {
        let snapshot = self.drawn.hide(stimuli)?;
        Ok(Scope::new(self, Restore::DrawSet(snapshot)))
    }

    pub fn text(&self, x: f32, y: f32, text: impl Into<String>) -> StimRef {
        self.text_with(x, y, text, TextOptions::default())
    }

    pub fn text_with(&self, x: f32, y: f32, text: impl Into<String>, opts: TextOptions) -> StimRef {
        let mut style = self.config.text_style();
        if let Some(color) = opts.color {
            style.color = color;
        }
        Stimulus::Text(TextStim {
            pos: (x, y),
            text: text.into(),
            style,
            h_align: opts.h_align,
            v_align: opts.v_align,
            wrap: opts.wrap,
        })
        .into_ref()
    }

    pub fn button(&self, x: f32, y: f32, label: impl Into<String>) -> Button {
        Button::new((x, y), label, self.config.button_radius, &self.config.text_style())
    }

    pub fn rating_scale(&self, pos: (f32, f32), low: i64, high: i64, anchors: (String, String), stretch: f32) -> RatingScale {
        RatingScale::new(pos, low, high, anchors, SCALE_BASE_WIDTH * stretch, &self.config.text_style())
    }

    pub fn likert_scale(&self, opts: LikertOptions) -> RatingScale {
        self.rating_scale((opts.x, opts.y), 1, opts.scale_points, opts.anchors, opts.stretch)
    }

    /// Where entry dialogs are placed, in screen pixels.
    pub(crate) fn dialog_position(&self) -> (i32, i32) {
        let (w, h) = (self.screen_size.0 as f32, self.screen_size.1 as f32);
        let x = w / 2.0 - self.config.approx_dialog_box_width as f32;
        let y = h / 2.0 - self.config.string_entry_box_y * h / 2.0;
        (x as i32, y as i32)
    }

    /// Reacts to the cancel key according to the configured policy.
    pub(crate) fn abort(&mut self) -> Error {
        warn!("Cancel key pressed; aborting run");
        match self.config.abort {
            AbortPolicy::Propagate => Error::UserAbort,
            AbortPolicy::Exit => {
                if let Err(e) = self.triggers.shutdown() {
                    error!("Trigger worker shutdown failed: {}", e);
                }
                self.backend.close();
                std::process::exit(1)
            }
        }
    }

    /// Ends the run: stops the trigger worker, stamps the overall timing and
    /// writes the record to `write_path` as sorted, indented JSON.
    pub fn done(mut self, write_path: &Path) -> Result<()> {
        if self.triggers.is_enabled() {
            self.trigger(STOP_LISTENING)?;
        }
        self.triggers.shutdown()?;

        // Written straight into the store so open prefixes do not apply.
        let elapsed = self.stamps.elapsed();
        let timing = self.rec.store_mut().top_level_mut("overall_timing");
        if let Some(secs) = elapsed {
            timing["clock_duration"] = Value::from(secs);
        }
        timing["done"] = Value::from(abs_timestamp_str());

        if let Some(parent) = write_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(File::create(write_path)?);
        serde_json::to_writer_pretty(&mut out, self.rec.store().root())?;
        writeln!(out)?;
        out.flush()?;

        info!("Record written to {}", write_path.display());
        Ok(())
    }

    pub(crate) fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

pub(crate) enum Restore {
    Prefix,
    DrawSet(Vec<StimRef>),
    Stamp(KeyPath),
}

/// Guard returned by the scoping methods of [`Task`]. Dereferences to the
/// task; the scope ends when the guard is dropped or finished.
pub struct Scope<'a, B: Backend> {
    task: &'a mut Task<B>,
    restore: Option<Restore>,
}

impl<'a, B: Backend> Scope<'a, B> {
    fn new(task: &'a mut Task<B>, restore: Restore) -> Self {
        Self {
            task,
            restore: Some(restore),
        }
    }

    /// Ends the scope now, reporting a failed exit stamp instead of logging it.
    pub fn finish(mut self) -> Result<()> {
        match self.restore.take() {
            Some(restore) => undo(self.task, restore),
            None => Ok(()),
        }
    }
}

fn undo<B: Backend>(task: &mut Task<B>, restore: Restore) -> Result<()> {
    match restore {
        Restore::Prefix => {
            task.rec.exit_scope();
            Ok(())
        }
        Restore::DrawSet(snapshot) => {
            task.drawn.restore(snapshot);
            Ok(())
        }
        Restore::Stamp(dkey) => task.stamps.end(&mut task.rec, &dkey),
    }
}

impl<B: Backend> Deref for Scope<'_, B> {
    type Target = Task<B>;

    fn deref(&self) -> &Task<B> {
        self.task
    }
}

impl<B: Backend> DerefMut for Scope<'_, B> {
    fn deref_mut(&mut self) -> &mut Task<B> {
        self.task
    }
}

impl<B: Backend> Drop for Scope<'_, B> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            if let Err(e) = undo(self.task, restore) {
                error!("Failed to close scope: {}", e);
            }
        }
    }
}
