//! Keyboard key definitions and `Modifier+Key` combination parsing

use crate::{Error, Result};
use phf::phf_map;

#[derive(Debug, Clone, Copy)]
struct KeyInfo {
    code: &'static str,
    key_code: u32,
    text: Option<&'static str>,
}

static KEYS: phf::Map<&'static str, KeyInfo> = phf_map! {
    "Enter" => KeyInfo { code: "Enter", key_code: 13, text: Some("\r") },
    "Tab" => KeyInfo { code: "Tab", key_code: 9, text: None },
    "Backspace" => KeyInfo { code: "Backspace", key_code: 8, text: None },
    "Delete" => KeyInfo { code: "Delete", key_code: 46, text: None },
    "Escape" => KeyInfo { code: "Escape", key_code: 27, text: None },
    "Space" => KeyInfo { code: "Space", key_code: 32, text: Some(" ") },
    "ArrowUp" => KeyInfo { code: "ArrowUp", key_code: 38, text: None },
    "ArrowDown" => KeyInfo { code: "ArrowDown", key_code: 40, text: None },
    "ArrowLeft" => KeyInfo { code: "ArrowLeft", key_code: 37, text: None },
    "ArrowRight" => KeyInfo { code: "ArrowRight", key_code: 39, text: None },
    "Home" => KeyInfo { code: "Home", key_code: 36, text: None },
    "End" => KeyInfo { code: "End", key_code: 35, text: None },
    "PageUp" => KeyInfo { code: "PageUp", key_code: 33, text: None },
    "PageDown" => KeyInfo { code: "PageDown", key_code: 34, text: None },
    "Insert" => KeyInfo { code: "Insert", key_code: 45, text: None },
    "Shift" => KeyInfo { code: "ShiftLeft", key_code: 16, text: None },
    "Control" => KeyInfo { code: "ControlLeft", key_code: 17, text: None },
    "Alt" => KeyInfo { code: "AltLeft", key_code: 18, text: None },
    "Meta" => KeyInfo { code: "MetaLeft", key_code: 91, text: None },
    "F1" => KeyInfo { code: "F1", key_code: 112, text: None },
    "F5" => KeyInfo { code: "F5", key_code: 116, text: None },
    "F12" => KeyInfo { code: "F12", key_code: 123, text: None },
};

/// A resolved key ready to be dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    /// DOM `key` value
    pub key: String,
    /// DOM `code` value
    pub code: String,
    /// Legacy virtual key code
    pub key_code: u32,
    /// Text inserted by the key, if any
    pub text: Option<String>,
}

impl KeyStroke {
    /// Modifier bit used by the input protocol (Alt=1, Control=2, Meta=4, Shift=8)
    pub fn modifier_bit(&self) -> u32 {
        match self.key.as_str() {
            "Alt" => 1,
            "Control" => 2,
            "Meta" => 4,
            "Shift" => 8,
            _ => 0,
        }
    }
}

/// Resolve a single key name (`Enter`, `a`, `KeyA`, `Digit1`, `ArrowLeft`...)
pub fn describe(name: &str) -> Result<KeyStroke> {
    if let Some(info) = KEYS.get(name) {
        let key = if name == "Space" { " " } else { name };
        return Ok(KeyStroke {
            key: key.to_string(),
            code: info.code.to_string(),
            key_code: info.key_code,
            text: info.text.map(str::to_string),
        });
    }

    let single = match (name.strip_prefix("Key"), name.strip_prefix("Digit")) {
        (Some(rest), _) if rest.len() == 1 => rest.chars().next().map(|c| c.to_ascii_lowercase()),
        (_, Some(rest)) if rest.len() == 1 => rest.chars().next(),
        _ => {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    };

    match single {
        Some(c) => Ok(char_stroke(c)),
        None => Err(Error::invalid_argument(format!("Unknown key: {}", name))),
    }
}

/// Stroke for a printable character
pub fn char_stroke(c: char) -> KeyStroke {
    let upper = c.to_ascii_uppercase();
    let (code, key_code) = if c.is_ascii_alphabetic() {
        (format!("Key{}", upper), upper as u32)
    } else if c.is_ascii_digit() {
        (format!("Digit{}", c), c as u32)
    } else if c == ' ' {
        ("Space".to_string(), 32)
    } else {
        (String::new(), 0)
    };

    KeyStroke {
        key: c.to_string(),
        code,
        key_code,
        text: Some(c.to_string()),
    }
}

/// Parse `Control+Shift+A` into strokes, modifiers first
pub fn parse_combo(combo: &str) -> Result<Vec<KeyStroke>> {
    if combo.is_empty() {
        return Err(Error::invalid_argument("Empty key combination"));
    }
    if combo == "+" {
        return Ok(vec![char_stroke('+')]);
    }

    let mut parts: Vec<&str> = combo.split('+').collect();
    // "Control++" names the plus key itself
    if combo.ends_with("++") {
        parts.truncate(parts.len() - 2);
        parts.push("+");
    }

    parts.into_iter().map(describe).collect()
}
