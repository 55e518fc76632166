//! In-memory backend driven by scripted input, for unit tests.

use std::collections::VecDeque;
use std::io;

use crate::config::{AbortPolicy, TaskConfig};
use crate::dialog::{Dialog, Form, Questionnaire, RawValue};
use crate::draw::{Screen, Stimulus};
use crate::input::{Input, Pointer};

/// Frames beyond this mean a screen never completes.
const MAX_FLIPS: usize = 1000;

pub(crate) fn test_config() -> TaskConfig {
    TaskConfig {
        pause_ms: 0,
        abort: AbortPolicy::Propagate,
        ..TaskConfig::default()
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedBackend {
    pub size: (u32, u32),
    /// Labels drawn since the last flip.
    pub current: Vec<String>,
    /// One entry per flip.
    pub frames: Vec<Vec<String>>,
    /// One batch per `keys()` call; empty once exhausted.
    pub key_script: VecDeque<Vec<String>>,
    /// One state per `pointer()` call; idle once exhausted.
    pub pointer_script: VecDeque<Pointer>,
    /// Answers to `form()`; cancels once exhausted.
    pub forms: VecDeque<Option<Vec<RawValue>>>,
    pub questionnaires: VecDeque<Option<Vec<Option<usize>>>>,
    pub shown_forms: Vec<Form>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            size: (800, 600),
            current: Vec::new(),
            frames: Vec::new(),
            key_script: VecDeque::new(),
            pointer_script: VecDeque::new(),
            forms: VecDeque::new(),
            questionnaires: VecDeque::new(),
            shown_forms: Vec::new(),
        }
    }
}

fn labels(stimulus: &Stimulus, out: &mut Vec<String>) {
    match stimulus {
        Stimulus::Text(t) => out.push(t.text.clone()),
        Stimulus::Rect(_) => out.push("rect".to_string()),
        Stimulus::Circle(_) => out.push("circle".to_string()),
        Stimulus::Line(_) => out.push("line".to_string()),
        Stimulus::Group(parts) => parts.iter().for_each(|p| labels(p, out)),
    }
}

impl Screen for ScriptedBackend {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn draw(&mut self, stimulus: &Stimulus) -> io::Result<()> {
        labels(stimulus, &mut self.current);
        Ok(())
    }

    fn flip(&mut self) -> io::Result<()> {
        assert!(self.frames.len() < MAX_FLIPS, "screen never completed");
        self.frames.push(std::mem::take(&mut self.current));
        Ok(())
    }
}

impl Input for ScriptedBackend {
    fn keys(&mut self) -> Vec<String> {
        self.key_script.pop_front().unwrap_or_default()
    }

    fn clear_events(&mut self) {}

    fn pointer(&mut self) -> Pointer {
        self.pointer_script.pop_front().unwrap_or_default()
    }
}

impl Dialog for ScriptedBackend {
    fn form(&mut self, form: &Form) -> Option<Vec<RawValue>> {
        self.shown_forms.push(form.clone());
        self.forms.pop_front().flatten()
    }

    fn questionnaire(&mut self, _questionnaire: &Questionnaire) -> Option<Vec<Option<usize>>> {
        self.questionnaires.pop_front().flatten()
    }
}
