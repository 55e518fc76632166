//! Interaction loops. Every polling screen checks the cancel key first, then
//! clears buffered events, draws the frame and finally evaluates its
//! completion condition. Results are saved under the active prefixes after
//! the exit timestamp, then the task pauses for its settle delay.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::controls::{Button, CountdownTimer, RatingScale};
use crate::dialog::{parse_form, Field, Form, Questionnaire, RawValue};
use crate::draw::StimRef;
use crate::error::{Error, Result};
use crate::input::{KeyChoice, KeyResponse, CANCEL_KEY};
use crate::record::KeyPath;
use crate::task::{Backend, LikertOptions, Task, TextOptions};

/// Wording and input rules of a single-field entry dialog.
#[derive(Debug, Clone)]
pub struct EntryPrompt {
    pub label: String,
    pub hint: String,
    /// Shown instead of `hint` after a rejected answer.
    pub error: String,
    pub trim: bool,
    pub accept_blank: bool,
    pub width: Option<u32>,
}

impl EntryPrompt {
    pub fn new(label: impl Into<String>, hint: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            hint: hint.into(),
            error: error.into(),
            trim: true,
            accept_blank: false,
            width: None,
        }
    }
}

impl<B: Backend> Task<B> {
    /// Returns the pressed keys, or the abort outcome if one of them is the
    /// cancel key.
    pub(crate) fn poll_keys(&mut self) -> Result<Vec<String>> {
        let keys = self.backend.keys();
        if keys.iter().any(|k| k == CANCEL_KEY) {
            return Err(self.abort());
        }
        Ok(keys)
    }

    /// Shows `stimuli` plus `buttons` until one button is pressed and returns
    /// its label. The label is saved at `dkey` only when there was a choice.
    pub fn button_screen(
        &mut self,
        dkey: impl Into<KeyPath>,
        stimuli: &[StimRef],
        buttons: &mut [Button],
    ) -> Result<String> {
        if buttons.is_empty() {
            return Err(Error::NoControls("button"));
        }
        let dkey = dkey.into();
        let mut frame = stimuli.to_vec();
        frame.extend(buttons.iter().map(Button::stimulus));

        let mut scope = self.timestamps(&dkey)?;
        while !buttons.iter().any(Button::activated) {
            scope.poll_keys()?;
            scope.backend.clear_events();
            scope.draw(&frame)?;

            let pointer = scope.backend.pointer();
            for button in buttons.iter_mut() {
                if button.update(&pointer) {
                    if let Some(code) = button.trigger_code() {
                        scope.trigger(code)?;
                    }
                }
            }
        }
        scope.finish()?;

        let label = buttons
            .iter()
            .find(|b| b.activated())
            .map(|b| b.label().to_string())
            .unwrap_or_default();
        if buttons.len() > 1 {
            self.save(dkey, label.clone())?;
        }
        self.pause();
        Ok(label)
    }

    /// Shows `stimuli` plus `scales` until every scale has a response.
    /// Saves and returns a single rating for one scale, a list otherwise.
    pub fn scale_screen(
        &mut self,
        dkey: impl Into<KeyPath>,
        stimuli: &[StimRef],
        scales: &mut [RatingScale],
    ) -> Result<Value> {
        if scales.is_empty() {
            return Err(Error::NoControls("scale"));
        }
        let dkey = dkey.into();
        self.backend.clear_events();

        let mut scope = self.timestamps(&dkey)?;
        while !scales.iter().all(RatingScale::has_response) {
            let keys = scope.poll_keys()?;
            scope.backend.clear_events();
            let mut frame = stimuli.to_vec();
            frame.extend(scales.iter().map(RatingScale::stimulus));
            scope.draw(&frame)?;

            let pointer = scope.backend.pointer();
            for scale in scales.iter_mut() {
                scale.update(&pointer, &keys);
            }
        }
        scope.finish()?;

        let mut ratings: Vec<Value> = scales
            .iter()
            .filter_map(RatingScale::response)
            .map(Value::from)
            .collect();
        let value = if ratings.len() == 1 {
            ratings.remove(0)
        } else {
            Value::Array(ratings)
        };
        self.save(dkey, value.clone())?;
        self.pause();
        Ok(value)
    }

    /// Shows `stimuli` until exactly one allowed key is pressed in a poll.
    /// With a [`KeyChoice::Map`] the mapped value is saved and returned.
    pub fn keypress_screen(
        &mut self,
        dkey: impl Into<KeyPath>,
        choice: &KeyChoice,
        stimuli: &[StimRef],
    ) -> Result<KeyResponse> {
        let dkey = dkey.into();
        self.backend.clear_events();

        let mut scope = self.timestamps(&dkey)?;
        let key = loop {
            let keys = scope.poll_keys()?;
            scope.backend.clear_events();
            scope.draw(stimuli)?;

            let mut allowed: Vec<String> = keys.into_iter().filter(|k| choice.allows(k)).collect();
            match allowed.len() {
                1 => break allowed.remove(0),
                0 => {}
                n => debug!("Ignoring {} simultaneous keys", n),
            }
        };
        scope.finish()?;

        let value = choice.value_of(&key);
        if let Some(v) = &value {
            self.save(dkey, v.clone())?;
        }
        self.pause();
        Ok(KeyResponse { key, value })
    }

    /// Asks for a single string in a dialog below `prompt` until `extractor`
    /// accepts it, then saves and returns the extracted value.
    pub fn string_entry_screen<F>(
        &mut self,
        dkey: impl Into<KeyPath>,
        prompt: &str,
        entry: &EntryPrompt,
        mut extractor: F,
    ) -> Result<Value>
    where
        F: FnMut(&str) -> Option<Value>,
    {
        let dkey = dkey.into();
        let prompt = self.text_with(0.0, 0.8, prompt, TextOptions::top());
        self.draw(&[prompt])?;

        let position = self.dialog_position();
        let mut scope = self.timestamps(&dkey)?;
        let mut trying_again = false;
        let value = loop {
            let form = Form::new("Entry")
                .at(position)
                .text(" ".repeat(45))
                .field(Field::text(&entry.label).width(entry.width))
                .text(if trying_again { &entry.error } else { &entry.hint });
            let answer = match scope.backend.form(&form) {
                Some(raw) => raw,
                None => return Err(scope.abort()),
            };
            trying_again = true;

            let mut input = match answer.into_iter().next() {
                Some(RawValue::Text(s)) => s,
                other => {
                    warn!("Entry dialog returned {:?} instead of text", other);
                    continue;
                }
            };
            if entry.trim {
                input = input.trim().to_string();
            }
            if !entry.accept_blank && input.trim().is_empty() {
                continue;
            }
            match extractor(&input) {
                Some(value) => break value,
                None => debug!("Rejected entry {:?}", input),
            }
        };
        scope.finish()?;

        self.save(dkey, value.clone())?;
        self.pause();
        Ok(value)
    }

    pub fn text_entry_screen(&mut self, dkey: impl Into<KeyPath>, prompt: &str, accept_blank: bool) -> Result<String> {
        let entry = EntryPrompt {
            accept_blank,
            width: Some(200),
            ..EntryPrompt::new("Text:", "Type some text.", "Type some text.")
        };
        let value = self.string_entry_screen(dkey, prompt, &entry, |s| Some(Value::from(s)))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Accepts only plain decimal digits up to `u64::MAX`. The number is
    /// saved as an integer.
    pub fn nonneg_int_entry_screen(&mut self, dkey: impl Into<KeyPath>, prompt: &str) -> Result<u64> {
        let entry = EntryPrompt::new(
            "Number:",
            "Enter a number.",
            format!("Invalid number; enter digits only, at most {}.", u64::MAX),
        );
        let value = self.string_entry_screen(dkey, prompt, &entry, |s| {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<u64>().ok().map(Value::from)
        })?;
        Ok(value.as_u64().unwrap_or_default())
    }

    /// Shows `form` until every field parses, re-presenting it with the
    /// parse error appended otherwise. Cancelling the dialog aborts.
    pub fn form_screen(&mut self, form: &Form) -> Result<Vec<Value>> {
        let mut shown = form.clone();
        loop {
            let raw = match self.backend.form(&shown) {
                Some(raw) => raw,
                None => return Err(self.abort()),
            };
            match parse_form(form, &raw) {
                Ok(values) => return Ok(values),
                Err(e) => {
                    warn!("{}", e);
                    shown = form.clone().text(e.to_string());
                }
            }
        }
    }

    /// Asks for the subject identifier and saves it at `subject`.
    pub fn get_subject_id(&mut self, title: &str) -> Result<String> {
        let form = Form::new(title).field(Field::text("Subject ID:").initial("test"));
        let id = self
            .form_screen(&form)?
            .into_iter()
            .next()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.save("subject", id.clone())?;
        Ok(id)
    }

    /// Presents `questionnaire` until every question is answered. Each
    /// answer is saved as a 1-based level at `dkey ++ [question id]`.
    pub fn questionnaire_screen(
        &mut self,
        dkey: impl Into<KeyPath>,
        prompt: &str,
        questionnaire: &Questionnaire,
    ) -> Result<Vec<usize>> {
        let dkey = dkey.into();
        let prompt = self.text_with(0.0, 0.9, prompt, TextOptions::top().wrap(1.5));
        let error = Form::new("Error")
            .text("")
            .text("Please answer all of the questions")
            .text("");

        let mut scope = self.timestamps(&dkey)?;
        let levels = loop {
            scope.draw(&[prompt.clone()])?;
            let answers = match scope.backend.questionnaire(questionnaire) {
                Some(answers) => answers,
                None => return Err(scope.abort()),
            };
            let complete = answers.len() == questionnaire.questions.len();
            if let Some(levels) = answers.into_iter().collect::<Option<Vec<usize>>>().filter(|_| complete) {
                break levels;
            }

            scope.draw(&[prompt.clone()])?;
            if scope.backend.form(&error).is_none() {
                return Err(scope.abort());
            }
        };

        scope.finish()?;

        let mut responses = Vec::with_capacity(levels.len());
        for (question, level) in questionnaire.questions.iter().zip(levels) {
            self.save(dkey.child(question.id.clone()), level + 1)?;
            responses.push(level + 1);
        }
        Ok(responses)
    }

    /// A button screen with a single "Next" button.
    pub fn okay_screen(&mut self, dkey: impl Into<KeyPath>, stimuli: &[StimRef]) -> Result<()> {
        let (x, y) = self.config.okay_button_pos;
        let mut next = [self.button(x, y, "Next")];
        self.button_screen(dkey, stimuli, &mut next)?;
        Ok(())
    }

    pub fn instructions(&mut self, dkey: impl Into<KeyPath>, text: &str) -> Result<()> {
        let text = self.text_with(0.0, 0.8, text, TextOptions::top());
        self.okay_screen(dkey, &[text])
    }

    pub fn discrete_rating_screen(
        &mut self,
        dkey: impl Into<KeyPath>,
        text: &str,
        opts: LikertOptions,
    ) -> Result<Value> {
        let prompt = self.text(0.0, 0.3, text);
        let mut scale = [self.likert_scale(opts)];
        self.scale_screen(dkey, &[prompt], &mut scale)
    }

    /// Draws `stimuli` once and blocks for `duration`.
    pub fn wait_screen(&mut self, duration: Duration, stimuli: &[StimRef]) -> Result<()> {
        self.draw(stimuli)?;
        self.wait(duration);
        Ok(())
    }

    /// Draws `stimuli` and blocks until `timer` runs out. Does nothing if it
    /// already has.
    pub fn wait_screen_till(&mut self, timer: &CountdownTimer, stimuli: &[StimRef]) -> Result<()> {
        if timer.remaining().is_zero() {
            return Ok(());
        }
        self.draw(stimuli)?;
        self.wait(timer.remaining());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{FieldKind, ScalarKind};
    use crate::input::Pointer;
    use crate::path;
    use crate::testing::{test_config, ScriptedBackend};
    use serde_json::json;

    fn task_with(backend: ScriptedBackend) -> Task<ScriptedBackend> {
        Task::new(test_config(), backend).unwrap()
    }

    fn keys(batch: &[&str]) -> Vec<String> {
        batch.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn two_button_screen_saves_choice_and_timestamps() {
        let mut backend = ScriptedBackend::new();
        backend.pointer_script.push_back(Pointer::at(0.0, 0.0));
        backend.pointer_script.push_back(Pointer::pressed_at(-0.5, -0.5));
        let mut t = task_with(backend);

        let prompt = t.text(0.0, 0.5, "Continue?");
        let mut buttons = [t.button(-0.5, -0.5, "Yes"), t.button(0.5, -0.5, "No")];
        let choice = t.button_screen("q", &[prompt], &mut buttons).unwrap();

        assert_eq!(choice, "Yes");
        assert_eq!(t.data()["q"], json!("Yes"));
        let t0 = t.data()["times"]["q"][0].as_f64().unwrap();
        let t1 = t.data()["times"]["q"][1].as_f64().unwrap();
        assert!(t1 >= t0);
        assert_eq!(t.backend().frames.len(), 2);
        assert_eq!(t.backend().frames[0], vec!["Continue?", "circle", "Yes", "circle", "No"]);
    }

    #[test]
    fn single_button_is_not_saved_but_fires_its_trigger() {
        let mut backend = ScriptedBackend::new();
        backend.pointer_script.push_back(Pointer::pressed_at(0.0, -0.5));
        let mut t = task_with(backend);
        t.instructions("intro", "Read this.").unwrap();

        assert!(t.data().get("intro").is_none());
        assert!(t.record().get(path!["times", "intro", 1]).is_some());
        assert_eq!(t.backend().frames[0], vec!["Read this.", "circle", "Next"]);

        let mut backend = ScriptedBackend::new();
        backend.pointer_script.push_back(Pointer::pressed_at(0.0, 0.0));
        let mut t = task_with(backend);
        let mut go = [t.button(0.0, 0.0, "Go").with_trigger(9)];
        assert_eq!(t.button_screen("go", &[], &mut go).unwrap(), "Go");
    }

    #[test]
    fn button_screen_needs_a_button() {
        let mut t = task_with(ScriptedBackend::new());
        assert!(matches!(t.button_screen("x", &[], &mut []), Err(Error::NoControls("button"))));
    }

    #[test]
    fn keypress_ignores_multi_key_polls() {
        let mut backend = ScriptedBackend::new();
        backend.key_script.push_back(keys(&["y", "n"]));
        backend.key_script.push_back(keys(&["q"]));
        backend.key_script.push_back(keys(&["y"]));
        let mut t = task_with(backend);

        let choice = KeyChoice::map([("y", 1), ("n", 0)]);
        let response = t.keypress_screen("yn", &choice, &[]).unwrap();

        assert_eq!(response.key, "y");
        assert_eq!(response.value, Some(json!(1)));
        assert_eq!(t.data()["yn"], json!(1));
        assert_eq!(t.backend().frames.len(), 3);
    }

    #[test]
    fn keypress_without_map_saves_nothing() {
        let mut backend = ScriptedBackend::new();
        backend.key_script.push_back(keys(&["space"]));
        let mut t = task_with(backend);
        let response = t.keypress_screen("go", &KeyChoice::Any, &[]).unwrap();
        assert_eq!(response.key, "space");
        assert!(t.data().get("go").is_none());
        assert!(t.record().get(path!["times", "go", 0]).is_some());
    }

    #[test]
    fn cancel_key_propagates_and_closes_scopes() {
        let mut backend = ScriptedBackend::new();
        backend.key_script.push_back(keys(&["y", CANCEL_KEY]));
        let mut t = task_with(backend);

        let mut block = t.prefix("block");
        let result = block.keypress_screen("k", &KeyChoice::Any, &[]);
        drop(block);
        assert!(matches!(result, Err(Error::UserAbort)));
        assert!(t.record().prefix().current().is_empty());
        assert!(t.record().get(path!["times", "block", "k", 1]).is_some());
        // Cancel is checked before anything is drawn.
        assert!(t.backend().frames.is_empty());
    }

    #[test]
    fn discrete_rating_saves_single_value() {
        let mut backend = ScriptedBackend::new();
        backend.key_script.push_back(Vec::new());
        backend.key_script.push_back(keys(&["6"]));
        let mut t = task_with(backend);

        let rating = t
            .discrete_rating_screen("mood", "How do you feel?", LikertOptions::default())
            .unwrap();
        assert_eq!(rating, json!(6));
        assert_eq!(t.data()["mood"], json!(6));
    }

    #[test]
    fn two_scales_save_a_list() {
        let mut backend = ScriptedBackend::new();
        backend.pointer_script.push_back(Pointer::pressed_at(0.0, 0.5));
        backend.pointer_script.push_back(Pointer::pressed_at(0.0, -0.5));
        let mut t = task_with(backend);

        let anchors = || ("lo".to_string(), "hi".to_string());
        let mut scales = [
            t.rating_scale((0.0, 0.5), 1, 5, anchors(), 1.0),
            t.rating_scale((0.0, -0.5), 1, 5, anchors(), 1.0),
        ];
        let ratings = t.scale_screen("pair", &[], &mut scales).unwrap();
        assert_eq!(ratings, json!([3, 3]));
        assert_eq!(t.data()["pair"], json!([3, 3]));
        assert_eq!(t.backend().frames.len(), 2);
    }

    #[test]
    fn number_entry_retries_until_valid() {
        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Text("   ".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text("-3".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text(" 42 ".into())]));
        let mut t = task_with(backend);

        let n = t.nonneg_int_entry_screen("age", "How old are you?").unwrap();
        assert_eq!(n, 42);
        assert_eq!(t.data()["age"], json!(42));

        let shown = &t.backend().shown_forms;
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[0].rows.last(), Some(&crate::dialog::FormRow::Text("Enter a number.".into())));
        assert_eq!(
            shown[2].rows.last(),
            Some(&crate::dialog::FormRow::Text(
                "Invalid number; enter digits only, at most 18446744073709551615.".into()
            ))
        );
        assert_eq!(t.backend().frames[0], vec!["How old are you?"]);
    }

    #[test]
    fn number_entry_rejects_overflow_with_limit_hint() {
        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Text("18446744073709551616".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text("18446744073709551615".into())]));
        let mut t = task_with(backend);

        let n = t.nonneg_int_entry_screen("count", "How many?").unwrap();
        assert_eq!(n, u64::MAX);
        assert_eq!(t.data()["count"], json!(u64::MAX));

        let shown = &t.backend().shown_forms;
        assert_eq!(shown.len(), 2);
        let hint = match shown[1].rows.last() {
            Some(crate::dialog::FormRow::Text(text)) => text.clone(),
            other => panic!("unexpected last row {:?}", other),
        };
        assert!(hint.contains(&u64::MAX.to_string()));
    }

    #[test]
    fn entry_skips_non_text_answers() {
        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Bool(true)]));
        backend.forms.push_back(Some(vec![]));
        backend.forms.push_back(Some(vec![RawValue::Text("ok".into())]));
        let mut t = task_with(backend);

        assert_eq!(t.text_entry_screen("note", "Anything?", false).unwrap(), "ok");
        assert_eq!(t.backend().shown_forms.len(), 3);
    }

    #[test]
    fn text_entry_honours_accept_blank() {
        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Text("  ".into())]));
        let mut t = task_with(backend);
        assert_eq!(t.text_entry_screen("note", "Anything?", true).unwrap(), "");
        assert_eq!(t.data()["note"], json!(""));

        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Text("".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text(" hi ".into())]));
        let mut t = task_with(backend);
        assert_eq!(t.text_entry_screen("note", "Anything?", false).unwrap(), "hi");
    }

    #[test]
    fn cancelled_dialog_aborts() {
        let mut t = task_with(ScriptedBackend::new());
        assert!(matches!(t.get_subject_id("Study"), Err(Error::UserAbort)));
        assert!(t.data().get("subject").is_none());
    }

    #[test]
    fn subject_id_and_typed_forms() {
        let mut backend = ScriptedBackend::new();
        backend.forms.push_back(Some(vec![RawValue::Text("s07".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text("two".into())]));
        backend.forms.push_back(Some(vec![RawValue::Text("2".into())]));
        let mut t = task_with(backend);

        assert_eq!(t.get_subject_id("Study").unwrap(), "s07");
        assert_eq!(t.data()["subject"], json!("s07"));

        let form = Form::new("Setup").field(Field::new("Blocks:", FieldKind::Scalar(ScalarKind::Integer)));
        assert_eq!(t.form_screen(&form).unwrap(), vec![json!(2)]);
        let shown = &t.backend().shown_forms;
        assert_eq!(shown[0].fields().next().map(|f| f.initial.as_str()), Some("test"));
        assert_eq!(shown[2].rows.len(), 2);
    }

    #[test]
    fn questionnaire_reasks_until_complete() {
        let mut backend = ScriptedBackend::new();
        backend.questionnaires.push_back(Some(vec![Some(0), None]));
        backend.forms.push_back(Some(Vec::new()));
        backend.questionnaires.push_back(Some(vec![Some(0), Some(3)]));
        let mut t = task_with(backend);

        let levels = vec!["never".to_string(), "rarely".to_string(), "often".to_string(), "always".to_string()];
        let q = Questionnaire::numbered(levels, ["I sleep well", "I worry"]);
        let responses = t.questionnaire_screen("psqi", "Answer all", &q).unwrap();

        assert_eq!(responses, vec![1, 4]);
        assert_eq!(t.data()["psqi"], json!([1, 4]));
        assert_eq!(t.backend().shown_forms[0].title, "Error");
        assert!(t.record().get(path!["times", "psqi", 1]).is_some());
    }

    #[test]
    fn expired_timer_draws_nothing() {
        let mut t = task_with(ScriptedBackend::new());
        let timer = CountdownTimer::new(Duration::ZERO);
        t.wait_screen_till(&timer, &[]).unwrap();
        assert!(t.backend().frames.is_empty());

        let cross = t.fixation_cross();
        t.wait_screen(Duration::from_millis(1), &[cross]).unwrap();
        assert_eq!(t.backend().frames, vec![vec!["rect".to_string(), "rect".to_string()]]);
    }
}
