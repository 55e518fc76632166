use std::collections::BTreeMap;

use serde_json::Value;

/// Key name that aborts the run from any polling screen.
pub const CANCEL_KEY: &str = "escape";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pointer {
    /// Left, middle, right.
    pub buttons: [bool; 3],
    /// Norm units.
    pub pos: (f32, f32),
}

impl Pointer {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            buttons: [false; 3],
            pos: (x, y),
        }
    }

    pub fn pressed_at(x: f32, y: f32) -> Self {
        Self {
            buttons: [true, false, false],
            pos: (x, y),
        }
    }

    pub fn any_pressed(&self) -> bool {
        self.buttons.iter().any(|b| *b)
    }
}

/// Low-level input seam.
pub trait Input {
    /// Names of keys pressed since the previous call (lowercase, e.g. `"y"`,
    /// `"space"`, `"escape"`). The query consumes them.
    fn keys(&mut self) -> Vec<String>;

    /// Drops buffered key presses.
    fn clear_events(&mut self);

    fn pointer(&mut self) -> Pointer;
}

/// Which keys end a keypress screen.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChoice {
    Any,
    One(String),
    Set(Vec<String>),
    /// The mapped value is saved and returned.
    Map(BTreeMap<String, Value>),
}

impl KeyChoice {
    pub fn set<K: Into<String>>(keys: impl IntoIterator<Item = K>) -> Self {
        KeyChoice::Set(keys.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        KeyChoice::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn allows(&self, key: &str) -> bool {
        if key == CANCEL_KEY {
            return false;
        }
        match self {
            KeyChoice::Any => true,
            KeyChoice::One(k) => k == key,
            KeyChoice::Set(keys) => keys.iter().any(|k| k == key),
            KeyChoice::Map(map) => map.contains_key(key),
        }
    }

    pub fn value_of(&self, key: &str) -> Option<Value> {
        match self {
            KeyChoice::Map(map) => map.get(key).cloned(),
            _ => None,
        }
    }
}

/// Result of a keypress screen.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyResponse {
    pub key: String,
    pub value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_choices() {
        let yn = KeyChoice::map([("y", 1), ("n", 0)]);
        assert!(yn.allows("y"));
        assert!(!yn.allows("q"));
        assert_eq!(yn.value_of("n"), Some(json!(0)));

        assert!(KeyChoice::Any.allows("space"));
        assert!(!KeyChoice::Any.allows(CANCEL_KEY));
        assert!(KeyChoice::One("space".into()).allows("space"));
        assert!(KeyChoice::set(["left", "right"]).allows("right"));
        assert_eq!(KeyChoice::set(["left"]).value_of("left"), None);
    }
}
