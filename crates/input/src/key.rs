use std::fmt;

/// A keyboard key, compared case-insensitively.
///
/// Keys are stored lowercased so `"W"` and `"w"` (or `"Shift"` and `"shift"`)
/// refer to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in a handler's key list: a single key or a chord that must be
/// held all at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    Single(Key),
    Chord(Vec<Key>),
}

impl KeyMatch {
    pub fn chord<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::Chord(keys.into_iter().map(Into::into).collect())
    }

    /// Whether every key of this entry is currently held.
    ///
    /// An empty chord never matches.
    pub fn is_held(&self, is_pressed: impl Fn(&Key) -> bool) -> bool {
        match self {
            Self::Single(key) => is_pressed(key),
            Self::Chord(keys) => !keys.is_empty() && keys.iter().all(is_pressed),
        }
    }

    pub fn keys(&self) -> &[Key] {
        match self {
            Self::Single(key) => std::slice::from_ref(key),
            Self::Chord(keys) => keys,
        }
    }
}

impl From<&str> for KeyMatch {
    fn from(name: &str) -> Self {
        Self::Single(Key::new(name))
    }
}

impl From<Key> for KeyMatch {
    fn from(key: Key) -> Self {
        Self::Single(key)
    }
}

impl<const N: usize> From<[&str; N]> for KeyMatch {
    fn from(names: [&str; N]) -> Self {
        Self::chord(names)
    }
}

impl From<Vec<&str>> for KeyMatch {
    fn from(names: Vec<&str>) -> Self {
        Self::chord(names)
    }
}

impl fmt::Display for KeyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(key) => write!(f, "{key}"),
            Self::Chord(keys) => {
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    write!(f, "{key}")?;
                }
                Ok(())
            }
        }
    }
}

/// Key names as reported by keyboard events.
pub mod keys {
    pub const A: &str = "a";
    pub const B: &str = "b";
    pub const C: &str = "c";
    pub const D: &str = "d";
    pub const E: &str = "e";
    pub const F: &str = "f";
    pub const G: &str = "g";
    pub const H: &str = "h";
    pub const I: &str = "i";
    pub const J: &str = "j";
    pub const K: &str = "k";
    pub const L: &str = "l";
    pub const M: &str = "m";
    pub const N: &str = "n";
    pub const O: &str = "o";
    pub const P: &str = "p";
    pub const Q: &str = "q";
    pub const R: &str = "r";
    pub const S: &str = "s";
    pub const T: &str = "t";
    pub const U: &str = "u";
    pub const V: &str = "v";
    pub const W: &str = "w";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";

    pub const ARROW_UP: &str = "ArrowUp";
    pub const ARROW_LEFT: &str = "ArrowLeft";
    pub const ARROW_DOWN: &str = "ArrowDown";
    pub const ARROW_RIGHT: &str = "ArrowRight";

    pub const SHIFT: &str = "Shift";
    pub const CONTROL: &str = "Control";
    pub const ALT: &str = "Alt";
    pub const META: &str = "Meta";
    pub const ENTER: &str = "Enter";
    pub const BACKSPACE: &str = "Backspace";
    pub const TAB: &str = "Tab";
    pub const CAPS_LOCK: &str = "CapsLock";
    pub const ESCAPE: &str = "Escape";
    pub const SPACE: &str = " ";
    pub const PAGE_UP: &str = "PageUp";
    pub const PAGE_DOWN: &str = "PageDown";
    pub const END: &str = "End";
    pub const HOME: &str = "Home";
    pub const INSERT: &str = "Insert";
    pub const DELETE: &str = "Delete";
    pub const SEMICOLON: &str = ";";
    pub const EQUAL: &str = "=";
    pub const COMMA: &str = ",";
    pub const MINUS: &str = "-";
    pub const PERIOD: &str = ".";
    pub const SLASH: &str = "/";
    pub const BACKTICK: &str = "`";
    pub const OPEN_BRACKET: &str = "[";
    pub const BACKSLASH: &str = "\\";
    pub const CLOSE_BRACKET: &str = "]";
    pub const QUOTE: &str = "'";
}
