//! Response controls used by the polling screens.

use std::time::{Duration, Instant};

use crate::draw::{CircleStim, HAlign, LineStim, StimRef, Stimulus, TextStim, TextStyle, VAlign};
use crate::input::Pointer;
use crate::trigger::TriggerCode;

/// A labelled circle the subject clicks.
#[derive(Debug, Clone)]
pub struct Button {
    label: String,
    circle: CircleStim,
    face: StimRef,
    trigger_code: Option<TriggerCode>,
    pressed: bool,
}

impl Button {
    pub fn new(pos: (f32, f32), label: impl Into<String>, radius: f32, style: &TextStyle) -> Self {
        let label = label.into();
        let circle = CircleStim {
            pos,
            radius,
            fill: "lightgray".to_string(),
            line: "black".to_string(),
            line_width: 3.0,
        };
        let face = Stimulus::Group(vec![
            Stimulus::Circle(circle.clone()),
            Stimulus::text(pos, label.clone(), style),
        ])
        .into_ref();
        Self {
            label,
            circle,
            face,
            trigger_code: None,
            pressed: false,
        }
    }

    /// Sends `code` on the trigger line when the button is first pressed.
    pub fn with_trigger(mut self, code: TriggerCode) -> Self {
        self.trigger_code = Some(code);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn trigger_code(&self) -> Option<TriggerCode> {
        self.trigger_code
    }

    pub fn stimulus(&self) -> StimRef {
        self.face.clone()
    }

    /// Sticky: stays true once a press registered.
    pub fn activated(&self) -> bool {
        self.pressed
    }

    /// Registers a press if a pointer button is down inside the circle.
    /// Returns true only for the poll that registered it.
    pub fn update(&mut self, pointer: &Pointer) -> bool {
        if self.pressed {
            return false;
        }
        if pointer.any_pressed() && self.circle.contains(pointer.pos) {
            self.pressed = true;
            return true;
        }
        false
    }
}

/// Vertical distance (norm units) from the scale line that still counts as a click on it.
const SCALE_HIT_TOLERANCE: f32 = 0.08;

/// Discrete rating scale answered with a single click or a digit key.
#[derive(Debug, Clone)]
pub struct RatingScale {
    pub pos: (f32, f32),
    pub low: i64,
    pub high: i64,
    pub anchors: (String, String),
    /// Line length in norm units.
    pub width: f32,
    style: TextStyle,
    response: Option<i64>,
}

impl RatingScale {
    pub fn new(
        pos: (f32, f32),
        low: i64,
        high: i64,
        anchors: (String, String),
        width: f32,
        style: &TextStyle,
    ) -> Self {
        Self {
            pos,
            low,
            high: high.max(low),
            anchors,
            width,
            style: style.clone(),
            response: None,
        }
    }

    pub fn response(&self) -> Option<i64> {
        self.response
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    fn tick_x(&self, value: i64) -> f32 {
        if self.high == self.low {
            return self.pos.0;
        }
        let t = (value - self.low) as f32 / (self.high - self.low) as f32;
        self.pos.0 - self.width / 2.0 + t * self.width
    }

    fn nearest_tick(&self, x: f32) -> Option<i64> {
        let points = self.high - self.low;
        let step = if points == 0 { self.width } else { self.width / points as f32 };
        let left = self.pos.0 - self.width / 2.0;
        if x < left - step / 2.0 || x > left + self.width + step / 2.0 {
            return None;
        }
        let offset = if points == 0 { 0 } else { ((x - left) / step).round() as i64 };
        Some((self.low + offset).clamp(self.low, self.high))
    }

    /// Takes the first response offered by a click on the line or a digit key.
    /// Returns true when a response was registered by this call.
    pub fn update(&mut self, pointer: &Pointer, keys: &[String]) -> bool {
        if self.response.is_some() {
            return false;
        }
        if pointer.any_pressed() && (pointer.pos.1 - self.pos.1).abs() <= SCALE_HIT_TOLERANCE {
            self.response = self.nearest_tick(pointer.pos.0);
        }
        if self.response.is_none() {
            self.response = keys
                .iter()
                .filter_map(|k| k.parse::<i64>().ok())
                .find(|v| (self.low..=self.high).contains(v));
        }
        self.response.is_some()
    }

    pub fn stimulus(&self) -> StimRef {
        let (x, y) = self.pos;
        let half = self.width / 2.0;
        let mut parts = vec![Stimulus::Line(LineStim {
            from: (x - half, y),
            to: (x + half, y),
            color: "black".to_string(),
        })];
        for value in self.low..=self.high {
            let tx = self.tick_x(value);
            parts.push(Stimulus::Line(LineStim {
                from: (tx, y - 0.02),
                to: (tx, y + 0.02),
                color: "black".to_string(),
            }));
        }
        for (text, ax) in [(&self.anchors.0, x - half), (&self.anchors.1, x + half)] {
            parts.push(Stimulus::Text(TextStim {
                pos: (ax, y - 0.08),
                text: text.clone(),
                style: self.style.clone(),
                h_align: HAlign::Center,
                v_align: VAlign::Top,
                wrap: None,
            }));
        }
        if let Some(value) = self.response {
            parts.push(Stimulus::Circle(CircleStim {
                pos: (self.tick_x(value), y),
                radius: 0.02,
                fill: "darkgreen".to_string(),
                line: "darkgreen".to_string(),
                line_width: 1.0,
            }));
        }
        Stimulus::Group(parts).into_ref()
    }
}

/// Counts down from a duration; never goes below zero.
#[derive(Debug, Clone, Copy)]
pub struct CountdownTimer {
    deadline: Instant,
}

impl CountdownTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn add(&mut self, extra: Duration) {
        self.deadline += extra;
    }

    pub fn reset(&mut self, duration: Duration) {
        self.deadline = Instant::now() + duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> TextStyle {
        TextStyle {
            font: "Verdana".to_string(),
            height: 0.075,
            color: "black".to_string(),
        }
    }

    #[test]
    fn button_press_is_sticky() {
        let mut b = Button::new((0.0, -0.5), "Next", 0.1, &style());
        assert!(!b.update(&Pointer::at(0.0, -0.5)));
        assert!(!b.update(&Pointer::pressed_at(0.5, 0.5)));
        assert!(!b.activated());

        assert!(b.update(&Pointer::pressed_at(0.05, -0.5)));
        assert!(b.activated());
        // Moving away (or pressing again) does not undo or repeat the press.
        assert!(!b.update(&Pointer::at(0.9, 0.9)));
        assert!(!b.update(&Pointer::pressed_at(0.0, -0.5)));
        assert!(b.activated());
    }

    #[test]
    fn scale_click_selects_nearest_tick() {
        let anchors = ("min".to_string(), "max".to_string());
        let mut s = RatingScale::new((0.0, -0.7), 1, 7, anchors, 1.2, &style());
        assert!(!s.update(&Pointer::pressed_at(0.0, 0.5), &[]));
        assert!(!s.has_response());

        assert!(s.update(&Pointer::pressed_at(0.21, -0.68), &[]));
        assert_eq!(s.response(), Some(5));

        // Single click: later input is ignored.
        assert!(!s.update(&Pointer::pressed_at(-0.6, -0.7), &["1".to_string()]));
        assert_eq!(s.response(), Some(5));
    }

    #[test]
    fn scale_accepts_digit_keys_in_range() {
        let anchors = ("no".to_string(), "yes".to_string());
        let mut s = RatingScale::new((0.0, 0.0), 1, 4, anchors, 1.0, &style());
        assert!(!s.update(&Pointer::default(), &["9".to_string(), "x".to_string()]));
        assert!(s.update(&Pointer::default(), &["3".to_string()]));
        assert_eq!(s.response(), Some(3));
    }

    #[test]
    fn countdown_never_goes_negative() {
        let mut t = CountdownTimer::new(Duration::ZERO);
        assert_eq!(t.remaining(), Duration::ZERO);
        t.add(Duration::from_secs(60));
        assert!(t.remaining() > Duration::from_secs(50));
        t.reset(Duration::from_millis(0));
        assert_eq!(t.remaining(), Duration::ZERO);
    }
}
