mod action;
mod arbiter;
mod bindings;
mod repeat;

pub use action::{ActionStates, MenuAction, ACTION_COUNT};
pub use arbiter::{
    FocusCandidate, InputEvent, InputFocusArbiter, TickReport, DEFAULT_REPEAT_ACTIONS, ROOT_CONTEXT,
};
pub use bindings::{GamepadButton, InputBindings};
pub use repeat::{RepeatPolicy, RepeatTimer, TimerStep};
