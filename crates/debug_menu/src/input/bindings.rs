use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use super::action::{ActionStates, MenuAction};

/// Controller buttons as reported by the host's gamepad layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamepadButton {
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    FaceBottom,
    FaceRight,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InputSource {
    Key(KeyCode),
    Button(GamepadButton),
}

/// Maps physical keys and buttons to menu actions and keeps the raw held
/// set. An action is down while any source bound to it is held.
#[derive(Debug, Clone)]
pub struct InputBindings {
    keys: HashMap<KeyCode, MenuAction>,
    buttons: HashMap<GamepadButton, MenuAction>,
    held: HashSet<InputSource>,
}

impl Default for InputBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        for (key, action) in [
            (KeyCode::ArrowUp, MenuAction::Up),
            (KeyCode::ArrowDown, MenuAction::Down),
            (KeyCode::ArrowLeft, MenuAction::Left),
            (KeyCode::ArrowRight, MenuAction::Right),
            (KeyCode::Enter, MenuAction::Decide),
            (KeyCode::Backspace, MenuAction::Cancel),
            (KeyCode::F1, MenuAction::ToggleMenu),
        ] {
            bindings.bind_key(key, action);
        }
        for (button, action) in [
            (GamepadButton::DPadUp, MenuAction::Up),
            (GamepadButton::DPadDown, MenuAction::Down),
            (GamepadButton::DPadLeft, MenuAction::Left),
            (GamepadButton::DPadRight, MenuAction::Right),
            (GamepadButton::FaceBottom, MenuAction::Decide),
            (GamepadButton::FaceRight, MenuAction::Cancel),
            (GamepadButton::Special, MenuAction::ToggleMenu),
        ] {
            bindings.bind_button(button, action);
        }
        bindings
    }
}

impl InputBindings {
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            buttons: HashMap::new(),
            held: HashSet::new(),
        }
    }

    pub fn bind_key(&mut self, key: KeyCode, action: MenuAction) {
        self.keys.insert(key, action);
    }

    pub fn unbind_key(&mut self, key: KeyCode) -> Option<MenuAction> {
        self.held.remove(&InputSource::Key(key));
        self.keys.remove(&key)
    }

    pub fn bind_button(&mut self, button: GamepadButton, action: MenuAction) {
        self.buttons.insert(button, action);
    }

    /// OS key repeats are ignored; repeat timing belongs to the arbiter.
    pub fn handle_key_event(&mut self, key_event: &KeyEvent) -> bool {
        if key_event.repeat {
            return false;
        }
        let PhysicalKey::Code(code) = key_event.physical_key else {
            return false;
        };
        self.handle_key_code(code, key_event.state == ElementState::Pressed)
    }

    /// Returns whether the key is bound.
    pub fn handle_key_code(&mut self, key: KeyCode, is_pressed: bool) -> bool {
        if !self.keys.contains_key(&key) {
            return false;
        }
        self.update_source(InputSource::Key(key), is_pressed);
        true
    }

    pub fn handle_gamepad_button(&mut self, button: GamepadButton, is_pressed: bool) -> bool {
        if !self.buttons.contains_key(&button) {
            return false;
        }
        self.update_source(InputSource::Button(button), is_pressed);
        true
    }

    /// Drops every held source, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn snapshot(&self) -> ActionStates {
        let mut states = ActionStates::default();
        for source in &self.held {
            let action = match source {
                InputSource::Key(key) => self.keys.get(key),
                InputSource::Button(button) => self.buttons.get(button),
            };
            if let Some(action) = action {
                states.set(*action, true);
            }
        }
        states
    }

    fn update_source(&mut self, source: InputSource, is_pressed: bool) {
        if is_pressed {
            self.held.insert(source);
        } else {
            self.held.remove(&source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings_cover_keyboard_and_pad() {
        let mut bindings = InputBindings::default();
        assert!(bindings.handle_key_code(KeyCode::ArrowDown, true));
        assert!(bindings.handle_gamepad_button(GamepadButton::FaceBottom, true));
        assert!(!bindings.handle_key_code(KeyCode::KeyQ, true));

        let states = bindings.snapshot();
        assert!(states.is_down(MenuAction::Down));
        assert!(states.is_down(MenuAction::Decide));
        assert!(!states.is_down(MenuAction::Up));
    }

    #[test]
    fn action_stays_down_while_any_source_is_held() {
        let mut bindings = InputBindings::default();
        bindings.handle_key_code(KeyCode::ArrowUp, true);
        bindings.handle_gamepad_button(GamepadButton::DPadUp, true);
        bindings.handle_key_code(KeyCode::ArrowUp, false);
        assert!(bindings.snapshot().is_down(MenuAction::Up));

        bindings.handle_gamepad_button(GamepadButton::DPadUp, false);
        assert!(!bindings.snapshot().is_down(MenuAction::Up));
    }

    #[test]
    fn rebinding_and_release_all() {
        let mut bindings = InputBindings::empty();
        bindings.bind_key(KeyCode::KeyW, MenuAction::Up);
        bindings.handle_key_code(KeyCode::KeyW, true);
        assert!(bindings.snapshot().is_down(MenuAction::Up));

        bindings.release_all();
        assert!(!bindings.snapshot().any_down());

        bindings.handle_key_code(KeyCode::KeyW, true);
        assert_eq!(bindings.unbind_key(KeyCode::KeyW), Some(MenuAction::Up));
        assert!(!bindings.snapshot().any_down());
    }
}
