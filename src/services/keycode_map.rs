use crate::autofish_error;
use crate::error::Result;
use evdev::KeyCode;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Имена клавиш и кнопок мыши, которые можно указывать в реакциях
pub struct KeycodeMap;

static KEY_NAME_TO_CODE: Lazy<HashMap<&'static str, KeyCode>> = Lazy::new(|| {
    let letters = [
        ("a", KeyCode::KEY_A),
        ("b", KeyCode::KEY_B),
        ("c", KeyCode::KEY_C),
        ("d", KeyCode::KEY_D),
        ("e", KeyCode::KEY_E),
        ("f", KeyCode::KEY_F),
        ("g", KeyCode::KEY_G),
        ("h", KeyCode::KEY_H),
        ("i", KeyCode::KEY_I),
        ("j", KeyCode::KEY_J),
        ("k", KeyCode::KEY_K),
        ("l", KeyCode::KEY_L),
        ("m", KeyCode::KEY_M),
        ("n", KeyCode::KEY_N),
        ("o", KeyCode::KEY_O),
        ("p", KeyCode::KEY_P),
        ("q", KeyCode::KEY_Q),
        ("r", KeyCode::KEY_R),
        ("s", KeyCode::KEY_S),
        ("t", KeyCode::KEY_T),
        ("u", KeyCode::KEY_U),
        ("v", KeyCode::KEY_V),
        ("w", KeyCode::KEY_W),
        ("x", KeyCode::KEY_X),
        ("y", KeyCode::KEY_Y),
        ("z", KeyCode::KEY_Z),
    ];

    let digits = [
        ("1", KeyCode::KEY_1),
        ("2", KeyCode::KEY_2),
        ("3", KeyCode::KEY_3),
        ("4", KeyCode::KEY_4),
        ("5", KeyCode::KEY_5),
        ("6", KeyCode::KEY_6),
        ("7", KeyCode::KEY_7),
        ("8", KeyCode::KEY_8),
        ("9", KeyCode::KEY_9),
        ("0", KeyCode::KEY_0),
    ];

    let function_keys = [
        ("f1", KeyCode::KEY_F1),
        ("f2", KeyCode::KEY_F2),
        ("f3", KeyCode::KEY_F3),
        ("f4", KeyCode::KEY_F4),
        ("f5", KeyCode::KEY_F5),
        ("f6", KeyCode::KEY_F6),
        ("f7", KeyCode::KEY_F7),
        ("f8", KeyCode::KEY_F8),
        ("f9", KeyCode::KEY_F9),
        ("f10", KeyCode::KEY_F10),
        ("f11", KeyCode::KEY_F11),
        ("f12", KeyCode::KEY_F12),
    ];

    let special = [
        ("space", KeyCode::KEY_SPACE),
        ("enter", KeyCode::KEY_ENTER),
        ("escape", KeyCode::KEY_ESC),
        ("backspace", KeyCode::KEY_BACKSPACE),
        ("tab", KeyCode::KEY_TAB),
        ("ctrl", KeyCode::KEY_LEFTCTRL),
        ("alt", KeyCode::KEY_LEFTALT),
        ("shift", KeyCode::KEY_LEFTSHIFT),
        ("super", KeyCode::KEY_LEFTMETA),
        ("up", KeyCode::KEY_UP),
        ("down", KeyCode::KEY_DOWN),
        ("left", KeyCode::KEY_LEFT),
        ("right", KeyCode::KEY_RIGHT),
    ];

    // Кнопки мыши: click в реакциях использует их же
    let mouse = [
        ("mouse_left", KeyCode::BTN_LEFT),
        ("mouse_right", KeyCode::BTN_RIGHT),
        ("mouse_middle", KeyCode::BTN_MIDDLE),
    ];

    letters
        .into_iter()
        .chain(digits)
        .chain(function_keys)
        .chain(special)
        .chain(mouse)
        .collect()
});

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("esc", "escape"),
        ("return", "enter"),
        ("lmb", "mouse_left"),
        ("rmb", "mouse_right"),
        ("mmb", "mouse_middle"),
    ])
});

static CODE_TO_KEY_NAME: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    KEY_NAME_TO_CODE
        .iter()
        .map(|(&name, code)| (code.code(), name))
        .collect()
});

impl KeycodeMap {
    /// Код клавиши по имени (без учёта регистра, с поддержкой синонимов)
    pub fn resolve(key_name: &str) -> Result<KeyCode> {
        let normalized = key_name.trim().to_lowercase();
        let canonical = ALIASES
            .get(normalized.as_str())
            .copied()
            .unwrap_or(normalized.as_str());

        KEY_NAME_TO_CODE
            .get(canonical)
            .copied()
            .ok_or_else(|| autofish_error!(input, "Неизвестная клавиша: {}", key_name))
    }

    pub fn get_key_name(keycode: u16) -> Option<&'static str> {
        CODE_TO_KEY_NAME.get(&keycode).copied()
    }

    pub fn is_mouse_button(code: KeyCode) -> bool {
        matches!(code, KeyCode::BTN_LEFT | KeyCode::BTN_RIGHT | KeyCode::BTN_MIDDLE)
    }

    /// Все известные коды: набор возможностей виртуального устройства
    pub fn all_codes() -> impl Iterator<Item = KeyCode> {
        KEY_NAME_TO_CODE.values().copied()
    }
}
