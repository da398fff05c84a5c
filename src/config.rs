use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub keybindings: Keybindings,
    /// Pre-filled on the settings screen when no credentials are stored.
    #[serde(default = "default_redirect_uri")]
    pub default_redirect_uri: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/auth/callback".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keybindings {
    pub show_filters: Vec<String>,
    pub show_new_filter: Vec<String>,
    pub show_settings: Vec<String>,
    pub move_up: Vec<String>,
    pub move_down: Vec<String>,
    pub next_field: Vec<String>,
    pub prev_field: Vec<String>,
    pub toggle: Vec<String>,
    pub refresh: Vec<String>,
    pub delete: Vec<String>,
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub submit: Vec<String>,
    pub connect: Vec<String>,
    pub check_status: Vec<String>,
    pub reveal_secret: Vec<String>,
    pub quit: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keybindings: Keybindings {
                show_filters: vec!["F1".to_string(), "alt-1".to_string()],
                show_new_filter: vec!["F2".to_string(), "alt-2".to_string()],
                show_settings: vec!["F3".to_string(), "alt-3".to_string()],
                move_up: vec!["k".to_string(), "Up".to_string()],
                move_down: vec!["j".to_string(), "Down".to_string()],
                next_field: vec!["Tab".to_string(), "Enter".to_string()],
                prev_field: vec!["BackTab".to_string()],
                toggle: vec![" ".to_string()],
                refresh: vec!["r".to_string(), "ctrl-r".to_string()],
                delete: vec!["d".to_string(), "Delete".to_string()],
                confirm: vec!["y".to_string(), "Enter".to_string()],
                cancel: vec!["n".to_string(), "Esc".to_string()],
                submit: vec!["ctrl-s".to_string()],
                connect: vec!["ctrl-o".to_string()],
                check_status: vec!["ctrl-r".to_string()],
                reveal_secret: vec!["ctrl-t".to_string()],
                quit: vec!["q".to_string(), "ctrl-q".to_string()],
            },
            default_redirect_uri: default_redirect_uri(),
        }
    }
}

pub fn parse_key_string(key_str: &str) -> (KeyCode, KeyModifiers) {
    let mut parts: Vec<&str> = key_str.split('-').collect();
    let mut modifiers = KeyModifiers::empty();

    // We process from the end to find the base key, then consume prefixes
    let base_key_str = parts.pop().unwrap_or("");

    for part in parts {
        match part.to_lowercase().as_str() {
            "ctrl" => modifiers.insert(KeyModifiers::CONTROL),
            "alt" => modifiers.insert(KeyModifiers::ALT),
            "shift" => modifiers.insert(KeyModifiers::SHIFT),
            "cmd" | "command" | "super" => modifiers.insert(KeyModifiers::SUPER),
            "meta" => modifiers.insert(KeyModifiers::META),
            _ => {}
        }
    }

    let code = match base_key_str {
        "Backspace" => KeyCode::Backspace,
        "Delete" => KeyCode::Delete,
        "Enter" => KeyCode::Enter,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        "Tab" => KeyCode::Tab,
        "BackTab" => KeyCode::BackTab,
        "Esc" => KeyCode::Esc,
        " " => KeyCode::Char(' '),
        s if s.len() > 1 && s.starts_with('F') => match s[1..].parse() {
            Ok(n) => KeyCode::F(n),
            Err(_) => KeyCode::Null,
        },
        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => KeyCode::Null,
            }
        }
    };

    (code, modifiers)
}

pub fn matches_key(event: KeyEvent, bindings: &[String]) -> bool {
    bindings.iter().any(|b| {
        let (code, modifiers) = parse_key_string(b);
        event.code == code && event.modifiers.contains(modifiers)
    })
}

/// Keys that would type into a text field rather than trigger a binding.
pub fn is_text_input(event: KeyEvent) -> bool {
    matches!(event.code, KeyCode::Char(_))
        && !event
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

impl Config {
    pub fn load() -> Self {
        use std::fs;
        if let Ok(content) = fs::read_to_string(SETTINGS_FILE) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => warn!("Ignoring {}: {}", SETTINGS_FILE, e),
            }
        }
        Self::default()
    }
}
