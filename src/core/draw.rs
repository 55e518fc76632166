//! Stimulus descriptions, the render seam and the implicit draw set.

use std::io;
use std::rc::Rc;

use crate::error::{Error, Result};

/// Coordinate system of a stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    /// `-1..1` on both axes, origin at the centre, y up.
    #[default]
    Norm,
    /// Pixels from the centre, y up.
    Pix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: String,
    pub height: f32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStim {
    pub pos: (f32, f32),
    pub text: String,
    pub style: TextStyle,
    pub h_align: HAlign,
    pub v_align: VAlign,
    /// Wrap width in norm units.
    pub wrap: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectStim {
    pub pos: (f32, f32),
    pub width: f32,
    pub height: f32,
    pub units: Units,
    pub fill: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircleStim {
    pub pos: (f32, f32),
    pub radius: f32,
    pub fill: String,
    pub line: String,
    pub line_width: f32,
}

impl CircleStim {
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let dx = point.0 - self.pos.0;
        let dy = point.1 - self.pos.1;
        (dx * dx + dy * dy).sqrt() <= self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStim {
    pub from: (f32, f32),
    pub to: (f32, f32),
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    Text(TextStim),
    Rect(RectStim),
    Circle(CircleStim),
    Line(LineStim),
    /// Drawn in order.
    Group(Vec<Stimulus>),
}

impl Stimulus {
    pub fn text(pos: (f32, f32), text: impl Into<String>, style: &TextStyle) -> Self {
        Stimulus::Text(TextStim {
            pos,
            text: text.into(),
            style: style.clone(),
            h_align: HAlign::Center,
            v_align: VAlign::Center,
            wrap: None,
        })
    }

    pub fn into_ref(self) -> StimRef {
        Rc::new(self)
    }
}

/// Shared handle to a stimulus. Identity (not equality) is what the
/// implicit draw set tracks.
pub type StimRef = Rc<Stimulus>;

/// Render backend seam.
pub trait Screen {
    /// Surface size in pixels.
    fn size(&self) -> (u32, u32);

    /// Requests a different surface size; backends that cannot resize ignore it.
    fn set_size(&mut self, _width: u32, _height: u32) {}

    /// Colour the surface is cleared to before each frame.
    fn set_background(&mut self, _color: &str) {}

    fn draw(&mut self, stimulus: &Stimulus) -> io::Result<()>;

    /// Presents everything drawn since the previous flip.
    fn flip(&mut self) -> io::Result<()>;

    /// Releases the surface before an abrupt process exit.
    fn close(&mut self) {}
}

/// Stimuli drawn on every frame before the explicitly requested ones.
#[derive(Debug, Clone, Default)]
pub struct ImplicitDrawSet {
    items: Vec<StimRef>,
}

impl ImplicitDrawSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StimRef> {
        self.items.iter()
    }

    pub fn contains(&self, stimulus: &StimRef) -> bool {
        self.items.iter().any(|s| Rc::ptr_eq(s, stimulus))
    }

    /// Appends `stimuli`, returning the set as it was before.
    pub fn show(&mut self, stimuli: &[StimRef]) -> Vec<StimRef> {
        let snapshot = self.items.clone();
        self.items.extend(stimuli.iter().cloned());
        snapshot
    }

    /// Removes one occurrence of each of `stimuli`, returning the set as it
    /// was before. Fails without touching the set if any is missing.
    pub fn hide(&mut self, stimuli: &[StimRef]) -> Result<Vec<StimRef>> {
        let mut remaining = self.items.clone();
        for stimulus in stimuli {
            let idx = remaining
                .iter()
                .position(|s| Rc::ptr_eq(s, stimulus))
                .ok_or(Error::NotDrawn)?;
            remaining.remove(idx);
        }
        Ok(std::mem::replace(&mut self.items, remaining))
    }

    pub fn restore(&mut self, snapshot: Vec<StimRef>) {
        self.items = snapshot;
    }

    /// Draws the implicit set then `explicit` (twice if `double_draw`) and flips.
    pub fn frame<S: Screen + ?Sized>(
        &self,
        screen: &mut S,
        explicit: &[StimRef],
        double_draw: bool,
    ) -> Result<()> {
        let passes = if double_draw { 2 } else { 1 };
        for _ in 0..passes {
            for stimulus in self.items.iter().chain(explicit) {
                screen.draw(stimulus)?;
            }
        }
        screen.flip()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;

    fn label(text: &str) -> StimRef {
        let style = TextStyle {
            font: "Verdana".to_string(),
            height: 0.075,
            color: "black".to_string(),
        };
        Stimulus::text((0.0, 0.0), text, &style).into_ref()
    }

    #[test]
    fn hide_after_show_draws_remaining_plus_explicit() {
        let (a, b, x) = (label("a"), label("b"), label("x"));
        let mut set = ImplicitDrawSet::new();
        let mut screen = ScriptedBackend::new();

        let before_show = set.show(&[a.clone(), b.clone()]);
        let before_hide = set.hide(&[a.clone()]).unwrap();
        set.frame(&mut screen, &[x.clone()], false).unwrap();
        assert_eq!(screen.frames, vec![vec!["b".to_string(), "x".to_string()]]);

        set.restore(before_hide);
        assert!(set.contains(&a) && set.contains(&b));
        set.restore(before_show);
        assert!(set.is_empty());
    }

    #[test]
    fn restore_ignores_foreign_mutation() {
        let (a, b, c) = (label("a"), label("b"), label("c"));
        let mut set = ImplicitDrawSet::new();
        set.show(&[c.clone()]);

        let outer = set.show(&[a.clone(), b.clone()]);
        // Someone else hides c and adds another a while the scope is open.
        set.hide(&[c.clone()]).unwrap();
        set.show(&[a.clone()]);
        set.restore(outer);

        let kept: Vec<&StimRef> = set.iter().collect();
        assert_eq!(kept.len(), 1);
        assert!(Rc::ptr_eq(kept[0], &c));
    }

    #[test]
    fn hiding_missing_stimulus_fails_and_changes_nothing() {
        let (a, b) = (label("a"), label("b"));
        let mut set = ImplicitDrawSet::new();
        set.show(&[a.clone()]);

        assert!(matches!(set.hide(&[a.clone(), b.clone()]), Err(Error::NotDrawn)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&a));

        // Equal content is not the same stimulus.
        assert!(set.hide(&[label("a")]).is_err());
    }

    #[test]
    fn double_draw_repeats_before_one_flip() {
        let (a, x) = (label("a"), label("x"));
        let mut set = ImplicitDrawSet::new();
        set.show(&[a]);
        let mut screen = ScriptedBackend::new();
        set.frame(&mut screen, &[x], true).unwrap();
        assert_eq!(screen.frames.len(), 1);
        assert_eq!(screen.frames[0], vec!["a", "x", "a", "x"]);
    }

    #[test]
    fn circle_hit_test() {
        let circle = CircleStim {
            pos: (0.5, -0.5),
            radius: 0.1,
            fill: "lightgray".to_string(),
            line: "black".to_string(),
            line_width: 3.0,
        };
        assert!(circle.contains((0.55, -0.45)));
        assert!(!circle.contains((0.7, -0.5)));
    }
}
