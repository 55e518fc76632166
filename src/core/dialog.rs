//! Modal dialog seam and typed field parsing.
//!
//! Field text is never evaluated; every kind has an explicit parser that
//! rejects malformed input so the entry loops can re-prompt.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::record::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Text,
    Integer,
    Float,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Comma separated, optionally wrapped in `[]` or `()`.
    List(ScalarKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub kind: FieldKind,
    pub initial: String,
    /// Input box width in pixels.
    pub width: Option<u32>,
    pub tip: String,
}

impl Field {
    pub fn new(label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            label: label.into(),
            kind,
            initial: String::new(),
            width: None,
            tip: String::new(),
        }
    }

    pub fn text(label: impl Into<String>) -> Self {
        Self::new(label, FieldKind::Scalar(ScalarKind::Text))
    }

    pub fn initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = initial.into();
        self
    }

    pub fn width(mut self, width: Option<u32>) -> Self {
        self.width = width;
        self
    }

    pub fn tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = tip.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormRow {
    Text(String),
    Field(Field),
}

/// A dialog with text rows, input fields and a single confirm action.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub title: String,
    /// Top-left corner in screen pixels.
    pub position: Option<(i32, i32)>,
    pub rows: Vec<FormRow>,
}

impl Form {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            position: None,
            rows: Vec::new(),
        }
    }

    pub fn at(mut self, position: (i32, i32)) -> Self {
        self.position = Some(position);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.rows.push(FormRow::Text(text.into()));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.rows.push(FormRow::Field(field));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.rows.iter().filter_map(|row| match row {
            FormRow::Field(f) => Some(f),
            FormRow::Text(_) => None,
        })
    }
}

/// What the toolkit hands back for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    /// Checkbox state.
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: Segment,
    pub text: String,
}

/// Pages of questions answered on a shared scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Questionnaire {
    pub title: String,
    pub scale_levels: Vec<String>,
    pub questions: Vec<Question>,
    pub per_page: usize,
    pub font_size: Option<u16>,
    pub column_width: u32,
}

impl Questionnaire {
    /// Questions identified by their position.
    pub fn numbered<S: Into<String>>(
        scale_levels: Vec<String>,
        questions: impl IntoIterator<Item = S>,
    ) -> Self {
        let questions = questions
            .into_iter()
            .enumerate()
            .map(|(i, text)| Question {
                id: Segment::Index(i),
                text: text.into(),
            })
            .collect();
        Self {
            title: String::new(),
            scale_levels,
            questions,
            per_page: 8,
            font_size: None,
            column_width: 100,
        }
    }

    pub fn page_count(&self) -> usize {
        self.questions.len().div_ceil(self.per_page.max(1))
    }
}

/// Modal dialog seam.
pub trait Dialog {
    /// Shows `form` until confirmed. `None` means the subject cancelled.
    fn form(&mut self, form: &Form) -> Option<Vec<RawValue>>;

    /// One entry per question: the selected level index, if any.
    /// `None` means the subject cancelled.
    fn questionnaire(&mut self, questionnaire: &Questionnaire) -> Option<Vec<Option<usize>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{label}: expected {expected}, got {input:?}")]
    Malformed {
        label: String,
        expected: &'static str,
        input: String,
    },
    #[error("{label}: no value")]
    Missing { label: String },
}

fn expected(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Text => "text",
        ScalarKind::Integer => "a whole number",
        ScalarKind::Float => "a number",
        ScalarKind::Bool => "yes or no",
    }
}

pub fn parse_scalar(kind: ScalarKind, input: &str) -> Option<Value> {
    let s = input.trim();
    match kind {
        ScalarKind::Text => Some(Value::String(input.to_string())),
        ScalarKind::Integer => s.parse::<i64>().ok().map(Value::from),
        ScalarKind::Float => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ScalarKind::Bool => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "n" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

pub fn parse_list(kind: ScalarKind, input: &str) -> Option<Value> {
    let s = input.trim();
    let inner = s
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|r| r.strip_suffix(')')))
        .unwrap_or(s)
        .trim();
    if inner.is_empty() {
        return Some(Value::Array(Vec::new()));
    }

    let mut items: Vec<&str> = inner.split(',').map(str::trim).collect();
    if items.last() == Some(&"") {
        items.pop();
    }
    items
        .into_iter()
        .map(|item| {
            if item.is_empty() {
                None
            } else {
                parse_scalar(kind, item)
            }
        })
        .collect::<Option<Vec<Value>>>()
        .map(Value::Array)
}

pub fn parse_field(field: &Field, raw: &RawValue) -> Result<Value, FieldError> {
    let malformed = |expected: &'static str, input: String| FieldError::Malformed {
        label: field.label.clone(),
        expected,
        input,
    };
    match (field.kind, raw) {
        (FieldKind::Scalar(ScalarKind::Bool), RawValue::Bool(b)) => Ok(Value::Bool(*b)),
        (_, RawValue::Bool(b)) => Err(malformed("text input", b.to_string())),
        (FieldKind::Scalar(kind), RawValue::Text(s)) => {
            parse_scalar(kind, s).ok_or_else(|| malformed(expected(kind), s.clone()))
        }
        (FieldKind::List(kind), RawValue::Text(s)) => {
            parse_list(kind, s).ok_or_else(|| malformed("a comma-separated list", s.clone()))
        }
    }
}

/// Parses every field of `form` from the toolkit's answers.
pub fn parse_form(form: &Form, raw: &[RawValue]) -> Result<Vec<Value>, FieldError> {
    form.fields()
        .enumerate()
        .map(|(i, field)| match raw.get(i) {
            Some(value) => parse_field(field, value),
            None => Err(FieldError::Missing {
                label: field.label.clone(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(parse_scalar(ScalarKind::Integer, " 42 "), Some(json!(42)));
        assert_eq!(parse_scalar(ScalarKind::Integer, "4.2"), None);
        assert_eq!(parse_scalar(ScalarKind::Integer, "__import__('os')"), None);
        assert_eq!(parse_scalar(ScalarKind::Float, "-0.5"), Some(json!(-0.5)));
        assert_eq!(parse_scalar(ScalarKind::Float, "NaN"), None);
        assert_eq!(parse_scalar(ScalarKind::Bool, "Yes"), Some(json!(true)));
        assert_eq!(parse_scalar(ScalarKind::Bool, "maybe"), None);
        assert_eq!(parse_scalar(ScalarKind::Text, " keep "), Some(json!(" keep ")));
    }

    #[test]
    fn lists() {
        assert_eq!(parse_list(ScalarKind::Integer, "[1, 2, 3]"), Some(json!([1, 2, 3])));
        assert_eq!(parse_list(ScalarKind::Float, "(0.5,1.5,)"), Some(json!([0.5, 1.5])));
        assert_eq!(parse_list(ScalarKind::Integer, "4,5"), Some(json!([4, 5])));
        assert_eq!(parse_list(ScalarKind::Integer, "[]"), Some(json!([])));
        assert_eq!(parse_list(ScalarKind::Text, "a, b"), Some(json!(["a", "b"])));
        assert_eq!(parse_list(ScalarKind::Integer, "1,,2"), None);
        assert_eq!(parse_list(ScalarKind::Integer, "[1, x]"), None);
    }

    #[test]
    fn forms_parse_field_by_field() {
        let form = Form::new("Setup")
            .text("Session parameters")
            .field(Field::new("Block count:", FieldKind::Scalar(ScalarKind::Integer)))
            .field(Field::new("Practice:", FieldKind::Scalar(ScalarKind::Bool)))
            .field(Field::new("Offsets:", FieldKind::List(ScalarKind::Float)));

        let raw = vec![
            RawValue::Text("3".into()),
            RawValue::Bool(true),
            RawValue::Text("[0.1, 0.2]".into()),
        ];
        assert_eq!(
            parse_form(&form, &raw).unwrap(),
            vec![json!(3), json!(true), json!([0.1, 0.2])]
        );

        let bad = vec![RawValue::Text("three".into()), RawValue::Bool(false)];
        let err = parse_form(&form, &bad).unwrap_err();
        assert!(matches!(err, FieldError::Malformed { ref label, .. } if label == "Block count:"));

        let short = vec![RawValue::Text("3".into()), RawValue::Bool(false)];
        assert!(matches!(
            parse_form(&form, &short),
            Err(FieldError::Missing { .. })
        ));
    }

    #[test]
    fn questionnaire_pages() {
        let levels = vec!["never".to_string(), "always".to_string()];
        let mut q = Questionnaire::numbered(levels, (0..17).map(|i| format!("Q{i}")));
        assert_eq!(q.page_count(), 3);
        q.per_page = 20;
        assert_eq!(q.page_count(), 1);
        assert_eq!(q.questions[3].id, Segment::Index(3));
    }
}
