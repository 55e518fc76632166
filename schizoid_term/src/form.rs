//! Modal dialogs drawn over the current frame.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::event::KeyCode;
use crossterm::queue;
use crossterm::style::{Attribute, Print, ResetColor, SetAttribute};
use crossterm::terminal::{Clear, ClearType};
use tracing::error;

use schizoid::dialog::{Dialog, FieldKind, Form, FormRow, Questionnaire, RawValue, ScalarKind};

use crate::terminal::{Terminal, CELL_H, CELL_W};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldInput {
    Text(String),
    Bool(bool),
}

/// Editing state of a form: one input per field and the focused field.
#[derive(Debug, Clone)]
pub struct FormState {
    inputs: Vec<FieldInput>,
    focus: usize,
}

impl FormState {
    pub fn new(form: &Form) -> Self {
        let inputs = form
            .fields()
            .map(|f| match f.kind {
                FieldKind::Scalar(ScalarKind::Bool) => {
                    FieldInput::Bool(matches!(f.initial.trim(), "true" | "yes" | "1"))
                }
                _ => FieldInput::Text(f.initial.clone()),
            })
            .collect();
        Self { inputs, focus: 0 }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn handle(&mut self, key: KeyCode) -> Outcome {
        let n = self.inputs.len();
        match key {
            KeyCode::Esc => return Outcome::Cancelled,
            KeyCode::Enter => return Outcome::Confirmed,
            KeyCode::Tab | KeyCode::Down if n > 0 => self.focus = (self.focus + 1) % n,
            KeyCode::BackTab | KeyCode::Up if n > 0 => self.focus = (self.focus + n - 1) % n,
            KeyCode::Backspace => {
                if let Some(FieldInput::Text(s)) = self.inputs.get_mut(self.focus) {
                    s.pop();
                }
            }
            KeyCode::Char(c) => match self.inputs.get_mut(self.focus) {
                Some(FieldInput::Text(s)) => s.push(c),
                Some(FieldInput::Bool(b)) => match c {
                    ' ' => *b = !*b,
                    'y' | 'Y' => *b = true,
                    'n' | 'N' => *b = false,
                    _ => {}
                },
                None => {}
            },
            _ => {}
        }
        Outcome::Pending
    }

    pub fn values(&self) -> Vec<RawValue> {
        self.inputs
            .iter()
            .map(|input| match input {
                FieldInput::Text(s) => RawValue::Text(s.clone()),
                FieldInput::Bool(b) => RawValue::Bool(*b),
            })
            .collect()
    }

    fn display(&self, i: usize) -> String {
        match &self.inputs[i] {
            FieldInput::Text(s) => s.clone(),
            FieldInput::Bool(true) => "[x]".to_string(),
            FieldInput::Bool(false) => "[ ]".to_string(),
        }
    }
}

/// Answer state of a paged questionnaire.
#[derive(Debug, Clone)]
pub struct QuestionnaireState {
    answers: Vec<Option<usize>>,
    levels: usize,
    per_page: usize,
    page: usize,
    focus: usize,
}

impl QuestionnaireState {
    pub fn new(q: &Questionnaire) -> Self {
        Self {
            answers: vec![None; q.questions.len()],
            levels: q.scale_levels.len(),
            per_page: q.per_page.max(1),
            page: 0,
            focus: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    fn pages(&self) -> usize {
        self.answers.len().div_ceil(self.per_page).max(1)
    }

    fn page_range(&self) -> std::ops::Range<usize> {
        let start = self.page * self.per_page;
        start..(start + self.per_page).min(self.answers.len())
    }

    fn turn(&mut self, page: usize) {
        self.page = page;
        self.focus = self.page_range().start;
    }

    pub fn handle(&mut self, key: KeyCode) -> Outcome {
        let range = self.page_range();
        match key {
            KeyCode::Esc => return Outcome::Cancelled,
            KeyCode::Enter if self.page + 1 >= self.pages() => return Outcome::Confirmed,
            KeyCode::Enter | KeyCode::PageDown | KeyCode::Tab => {
                if self.page + 1 < self.pages() {
                    self.turn(self.page + 1);
                }
            }
            KeyCode::PageUp | KeyCode::BackTab => {
                if self.page > 0 {
                    self.turn(self.page - 1);
                }
            }
            KeyCode::Down if self.focus + 1 < range.end => self.focus += 1,
            KeyCode::Up if self.focus > range.start => self.focus -= 1,
            KeyCode::Left | KeyCode::Right if self.levels > 0 && !range.is_empty() => {
                let next = match (self.answers[self.focus], key) {
                    (None, KeyCode::Left) => 0,
                    (None, _) => self.levels - 1,
                    (Some(l), KeyCode::Left) => l.saturating_sub(1),
                    (Some(l), _) => (l + 1).min(self.levels - 1),
                };
                self.answers[self.focus] = Some(next);
            }
            KeyCode::Char(c) if !range.is_empty() => {
                if let Some(d) = c.to_digit(10) {
                    let d = d as usize;
                    if (1..=self.levels).contains(&d) {
                        self.answers[self.focus] = Some(d - 1);
                    }
                }
            }
            _ => {}
        }
        Outcome::Pending
    }

    pub fn answers(&self) -> Vec<Option<usize>> {
        self.answers.clone()
    }
}

fn origin(term: &Terminal, form: &Form, height: usize) -> (u16, u16) {
    let grid = term.grid();
    match form.position {
        Some((x, y)) => (
            ((x.max(0) as f32 / CELL_W) as u16).min(grid.cols.saturating_sub(1)),
            ((y.max(0) as f32 / CELL_H) as u16).min(grid.rows.saturating_sub(height as u16)),
        ),
        None => (grid.cols / 4, grid.rows.saturating_sub(height as u16) / 2),
    }
}

fn render_form(term: &mut Terminal, form: &Form, state: &FormState) -> io::Result<()> {
    let height = form.rows.len() + 3;
    let (x, y) = origin(term, form, height);
    let out = term.out();
    queue!(out, ResetColor, Clear(ClearType::All))?;
    queue!(out, MoveTo(x, y), SetAttribute(Attribute::Bold), Print(&form.title), SetAttribute(Attribute::Reset))?;

    let mut field = 0;
    for (i, row) in form.rows.iter().enumerate() {
        let line = match row {
            FormRow::Text(text) => text.clone(),
            FormRow::Field(f) => {
                let marker = if field == state.focus() { '>' } else { ' ' };
                let line = format!("{} {} {}", marker, f.label, state.display(field));
                field += 1;
                line
            }
        };
        queue!(out, MoveTo(x, y + 2 + i as u16), Print(line))?;
    }
    queue!(out, MoveTo(x, y + height as u16), Print("Enter: OK"))?;
    out.flush()
}

fn render_questionnaire(term: &mut Terminal, q: &Questionnaire, state: &QuestionnaireState) -> io::Result<()> {
    let width = q.column_width as usize / CELL_W as usize;
    let out = term.out();
    queue!(out, ResetColor, Clear(ClearType::All), MoveTo(1, 0), Print(&q.title))?;

    let header: String = q.scale_levels.iter().map(|l| format!("{:^w$}", l, w = width.max(4))).collect();
    queue!(out, MoveTo(40, 1), Print(header))?;

    for (row, i) in state.page_range().enumerate() {
        let marker = if i == state.focus { '>' } else { ' ' };
        let boxes: String = (0..state.levels)
            .map(|l| {
                let mark = if state.answers[i] == Some(l) { "(x)" } else { "( )" };
                format!("{:^w$}", mark, w = width.max(4))
            })
            .collect();
        let text: String = q.questions[i].text.chars().take(36).collect();
        queue!(
            out,
            MoveTo(1, 3 + row as u16),
            Print(format!("{} {:<36}", marker, text)),
            MoveTo(40, 3 + row as u16),
            Print(boxes)
        )?;
    }

    let footer = format!(
        "page {}/{}  arrows or digits answer, Enter continues",
        state.page + 1,
        state.pages()
    );
    queue!(out, MoveTo(1, 4 + state.per_page as u16), Print(footer))?;
    out.flush()
}

fn run_form(term: &mut Terminal, form: &Form) -> io::Result<Option<Vec<RawValue>>> {
    let mut state = FormState::new(form);
    loop {
        render_form(term, form, &state)?;
        let key = term.read_key()?;
        match state.handle(key.code) {
            Outcome::Pending => {}
            Outcome::Confirmed => return Ok(Some(state.values())),
            Outcome::Cancelled => return Ok(None),
        }
    }
}

fn run_questionnaire(term: &mut Terminal, q: &Questionnaire) -> io::Result<Option<Vec<Option<usize>>>> {
    let mut state = QuestionnaireState::new(q);
    loop {
        render_questionnaire(term, q, &state)?;
        let key = term.read_key()?;
        match state.handle(key.code) {
            Outcome::Pending => {}
            Outcome::Confirmed => return Ok(Some(state.answers())),
            Outcome::Cancelled => return Ok(None),
        }
    }
}

impl Dialog for Terminal {
    fn form(&mut self, form: &Form) -> Option<Vec<RawValue>> {
        run_form(self, form).unwrap_or_else(|e| {
            error!("Dialog failed: {}", e);
            None
        })
    }

    fn questionnaire(&mut self, questionnaire: &Questionnaire) -> Option<Vec<Option<usize>>> {
        run_questionnaire(self, questionnaire).unwrap_or_else(|e| {
            error!("Questionnaire failed: {}", e);
            None
        })
    }
}
