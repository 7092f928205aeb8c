use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuAction {
    Up,
    Down,
    Left,
    Right,
    Decide,
    Cancel,
    ToggleMenu,
}

pub const ACTION_COUNT: usize = 7;

impl MenuAction {
    pub const ALL: [MenuAction; ACTION_COUNT] = [
        MenuAction::Up,
        MenuAction::Down,
        MenuAction::Left,
        MenuAction::Right,
        MenuAction::Decide,
        MenuAction::Cancel,
        MenuAction::ToggleMenu,
    ];

    pub const fn index(self) -> usize {
        match self {
            MenuAction::Up => 0,
            MenuAction::Down => 1,
            MenuAction::Left => 2,
            MenuAction::Right => 3,
            MenuAction::Decide => 4,
            MenuAction::Cancel => 5,
            MenuAction::ToggleMenu => 6,
        }
    }
}

/// Raw held state of every action for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub fn set(&mut self, action: MenuAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub fn is_down(&self, action: MenuAction) -> bool {
        self.down[action.index()]
    }

    pub fn with(mut self, action: MenuAction) -> Self {
        self.set(action, true);
        self
    }

    pub fn any_down(&self) -> bool {
        self.down.iter().any(|down| *down)
    }
}
