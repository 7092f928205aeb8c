//! Decides, tick by tick, which single candidate receives menu input.
//!
//! Contexts form a stack with a permanent root at the bottom; only the top
//! context advances its repeat timers and routes input. Every context keeps
//! its own candidates, focus and timers while it is buried. An action still
//! held when the active context changes stays silent in the new context until
//! it is released.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, info, trace};

use super::action::{ActionStates, MenuAction, ACTION_COUNT};
use super::repeat::{RepeatPolicy, RepeatTimer};
use crate::notify::{ChangeNotificationBus, InputTargetChanged};

pub const ROOT_CONTEXT: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Pressed(MenuAction),
    Triggered { action: MenuAction, count: u32 },
    Released(MenuAction),
}

impl InputEvent {
    pub fn action(self) -> MenuAction {
        match self {
            InputEvent::Pressed(action) | InputEvent::Released(action) => action,
            InputEvent::Triggered { action, .. } => action,
        }
    }
}

/// A UI element that can hold input focus. Held weakly by the arbiter.
pub trait FocusCandidate {
    fn is_input_enabled(&self) -> bool {
        true
    }

    fn on_input(&self, event: InputEvent);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub routed: usize,
    pub dropped: usize,
    pub toggle_menu_requested: bool,
}

struct InputContext {
    candidates: Vec<Weak<dyn FocusCandidate>>,
    focused: Option<usize>,
    chosen: bool,
    timers: [RepeatTimer; ACTION_COUNT],
}

impl InputContext {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            focused: None,
            chosen: false,
            timers: [RepeatTimer::default(); ACTION_COUNT],
        }
    }

    fn remove_at(&mut self, index: usize) {
        self.candidates.remove(index);
        let len = self.candidates.len();
        self.focused = match self.focused {
            _ if len == 0 => None,
            Some(focused) if index < focused => Some(focused - 1),
            Some(focused) if index == focused => {
                self.chosen = false;
                Some(focused.min(len - 1))
            }
            other => other,
        };
        if self.focused.is_none() {
            self.chosen = false;
        }
    }

    fn prune(&mut self) {
        for index in (0..self.candidates.len()).rev() {
            if self.candidates[index].strong_count() == 0 {
                self.remove_at(index);
            }
        }
    }

    fn focused_candidate(&self) -> Option<Rc<dyn FocusCandidate>> {
        self.focused
            .and_then(|index| self.candidates.get(index))
            .and_then(Weak::upgrade)
    }

    fn step(&mut self, forward: bool) -> Option<usize> {
        let len = self.candidates.len();
        if len == 0 || self.chosen {
            return self.focused;
        }
        let next = match self.focused {
            None => 0,
            Some(index) if forward => (index + 1) % len,
            Some(index) => (index + len - 1) % len,
        };
        self.focused = Some(next);
        self.focused
    }
}

pub struct InputFocusArbiter {
    contexts: HashMap<String, InputContext>,
    stack: Vec<String>,
    policies: [RepeatPolicy; ACTION_COUNT],
    ignore_depth: u32,
    bus: Option<Rc<ChangeNotificationBus>>,
    last_active: String,
    last_states: ActionStates,
}

impl Default for InputFocusArbiter {
    fn default() -> Self {
        Self::new(RepeatPolicy::default(), &DEFAULT_REPEAT_ACTIONS)
    }
}

pub const DEFAULT_REPEAT_ACTIONS: [MenuAction; 4] = [
    MenuAction::Up,
    MenuAction::Down,
    MenuAction::Left,
    MenuAction::Right,
];

impl InputFocusArbiter {
    /// `repeat` applies to `repeat_actions`; every other action fires once
    /// per press.
    pub fn new(repeat: RepeatPolicy, repeat_actions: &[MenuAction]) -> Self {
        let mut policies = [RepeatPolicy::single_shot(); ACTION_COUNT];
        for action in repeat_actions {
            policies[action.index()] = repeat;
        }
        let mut contexts = HashMap::new();
        contexts.insert(ROOT_CONTEXT.to_string(), InputContext::new());
        Self {
            contexts,
            stack: vec![ROOT_CONTEXT.to_string()],
            policies,
            ignore_depth: 0,
            bus: None,
            last_active: ROOT_CONTEXT.to_string(),
            last_states: ActionStates::default(),
        }
    }

    pub fn with_bus(mut self, bus: Rc<ChangeNotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Moves `name` to the top, creating it if needed.
    pub fn push_context(&mut self, name: &str) {
        self.contexts
            .entry(name.to_string())
            .or_insert_with(InputContext::new);
        self.stack.retain(|existing| existing != name);
        self.stack.push(name.to_string());
        info!(context = name, depth = self.stack.len(), "input_context_pushed");
    }

    /// Pops the top context unless it is the root. Its state is kept for the
    /// next push.
    pub fn pop_context(&mut self) -> Option<String> {
        if self.active_context() == ROOT_CONTEXT {
            return None;
        }
        let popped = self.stack.pop();
        if let Some(name) = &popped {
            info!(context = name.as_str(), depth = self.stack.len(), "input_context_popped");
        }
        popped
    }

    /// Takes `name` off the stack wherever it sits, keeping its state.
    pub fn withdraw_context(&mut self, name: &str) -> bool {
        if name == ROOT_CONTEXT {
            return false;
        }
        let before = self.stack.len();
        self.stack.retain(|existing| existing != name);
        let withdrawn = self.stack.len() != before;
        if withdrawn {
            info!(context = name, depth = self.stack.len(), "input_context_withdrawn");
        }
        withdrawn
    }

    /// Forgets a context entirely. The root cannot be removed.
    pub fn remove_context(&mut self, name: &str) -> bool {
        if name == ROOT_CONTEXT {
            return false;
        }
        self.stack.retain(|existing| existing != name);
        self.contexts.remove(name).is_some()
    }

    pub fn active_context(&self) -> &str {
        self.stack
            .last()
            .map(String::as_str)
            .unwrap_or(ROOT_CONTEXT)
    }

    /// Bottom to top.
    pub fn context_names(&self) -> Vec<&str> {
        self.stack.iter().map(String::as_str).collect()
    }

    /// Adds a candidate to `context` (created if missing, not pushed).
    /// Returns its index; registering twice returns the existing index.
    pub fn register_candidate(&mut self, context: &str, candidate: &Rc<dyn FocusCandidate>) -> usize {
        let weak = Rc::downgrade(candidate);
        let entry = self
            .contexts
            .entry(context.to_string())
            .or_insert_with(InputContext::new);
        if let Some(index) = entry
            .candidates
            .iter()
            .position(|existing| Weak::ptr_eq(existing, &weak))
        {
            return index;
        }
        entry.candidates.push(weak);
        let index = entry.candidates.len() - 1;
        let old = entry.focused;
        if old.is_none() {
            entry.focused = Some(0);
        }
        let new = entry.focused;
        debug!(context, index, "focus_candidate_registered");
        self.notify_focus(context, old, new);
        index
    }

    pub fn unregister_candidate(&mut self, context: &str, candidate: &Rc<dyn FocusCandidate>) -> bool {
        let weak = Rc::downgrade(candidate);
        let Some(entry) = self.contexts.get_mut(context) else {
            return false;
        };
        let Some(index) = entry
            .candidates
            .iter()
            .position(|existing| Weak::ptr_eq(existing, &weak))
        else {
            return false;
        };
        let old = entry.focused;
        entry.remove_at(index);
        let new = entry.focused;
        self.notify_focus(context, old, new);
        true
    }

    pub fn candidate_count(&self) -> usize {
        self.active().map_or(0, |context| context.candidates.len())
    }

    pub fn focused_index(&self) -> Option<usize> {
        self.active().and_then(|context| context.focused)
    }

    pub fn is_chosen(&self) -> bool {
        self.active().is_some_and(|context| context.chosen)
    }

    /// Wraps past the last candidate. A no-op while a candidate is chosen.
    pub fn next(&mut self) -> Option<usize> {
        self.step_focus(true)
    }

    /// Wraps past the first candidate. A no-op while a candidate is chosen.
    pub fn previous(&mut self) -> Option<usize> {
        self.step_focus(false)
    }

    /// Locks navigation on the focused candidate. False when nothing is focused.
    pub fn choose(&mut self) -> bool {
        let Some(context) = self.active_mut() else {
            return false;
        };
        if context.focused.is_none() {
            return false;
        }
        context.chosen = true;
        true
    }

    pub fn reset(&mut self) {
        if let Some(context) = self.active_mut() {
            context.chosen = false;
        }
    }

    /// Each call with `true` adds one level of suppression; `false` is
    /// ignored. Only [`reset_ignore_input`](Self::reset_ignore_input) lifts it.
    pub fn set_ignore_input(&mut self, ignore: bool) {
        if ignore {
            self.ignore_depth += 1;
            debug!(depth = self.ignore_depth, "input_ignore_pushed");
        } else {
            trace!(depth = self.ignore_depth, "input_ignore_false_has_no_effect");
        }
    }

    pub fn reset_ignore_input(&mut self) {
        self.ignore_depth = 0;
    }

    pub fn is_ignoring_input(&self) -> bool {
        self.ignore_depth > 0
    }

    pub fn ignore_depth(&self) -> u32 {
        self.ignore_depth
    }

    pub fn tick(&mut self, dt: f32, time_dilation: f32, states: &ActionStates) -> TickReport {
        let mut pruned = Vec::new();
        for (name, context) in self.contexts.iter_mut() {
            let old = context.focused;
            context.prune();
            if context.focused != old {
                pruned.push((name.clone(), old, context.focused));
            }
        }
        for (name, old, new) in pruned {
            self.notify_focus(&name, old, new);
        }

        let active_name = self.active_context().to_string();
        let switched = active_name != self.last_active;
        let carried = self.last_states;
        self.last_active.clone_from(&active_name);
        self.last_states = *states;

        let policies = self.policies;
        let Some(active) = self.contexts.get_mut(&active_name) else {
            return TickReport::default();
        };
        if switched {
            for action in MenuAction::ALL {
                let timer = &mut active.timers[action.index()];
                if states.is_down(action) && carried.is_down(action) && !timer.is_held() {
                    timer.suppress_until_release();
                }
            }
            debug!(context = active_name.as_str(), "input_context_activated");
        }

        let mut events = Vec::new();
        for action in MenuAction::ALL {
            let step = active.timers[action.index()].update(
                states.is_down(action),
                dt,
                time_dilation,
                &policies[action.index()],
            );
            if step.pressed {
                events.push(InputEvent::Pressed(action));
            }
            if let Some(count) = step.triggered {
                events.push(InputEvent::Triggered { action, count });
            }
            if step.released {
                events.push(InputEvent::Released(action));
            }
        }

        let mut report = TickReport::default();
        if self.ignore_depth > 0 {
            report.dropped = events.len();
            if !events.is_empty() {
                trace!(dropped = report.dropped, depth = self.ignore_depth, "input_ignored");
            }
            return report;
        }

        for event in events {
            match event {
                InputEvent::Pressed(MenuAction::ToggleMenu) => report.toggle_menu_requested = true,
                _ if event.action() == MenuAction::ToggleMenu => {}
                InputEvent::Triggered {
                    action: action @ (MenuAction::Up | MenuAction::Down),
                    ..
                } if !self.is_chosen() => {
                    let old = self.focused_index();
                    let new = self.step_focus(action == MenuAction::Down);
                    if old != new {
                        report.routed += 1;
                    }
                }
                _ => {
                    if self.deliver(&active_name, event) {
                        report.routed += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
            }
        }
        report
    }

    fn deliver(&self, context: &str, event: InputEvent) -> bool {
        let Some(target) = self
            .contexts
            .get(context)
            .and_then(InputContext::focused_candidate)
        else {
            return false;
        };
        if !target.is_input_enabled() {
            trace!(context, ?event, "input_target_disabled");
            return false;
        }
        trace!(context, ?event, "input_routed");
        target.on_input(event);
        true
    }

    fn step_focus(&mut self, forward: bool) -> Option<usize> {
        let name = self.active_context().to_string();
        let Some(context) = self.contexts.get_mut(&name) else {
            return None;
        };
        let old = context.focused;
        let new = context.step(forward);
        self.notify_focus(&name, old, new);
        new
    }

    fn notify_focus(&self, context: &str, old: Option<usize>, new: Option<usize>) {
        if old == new {
            return;
        }
        debug!(context, ?old, ?new, "input_focus_changed");
        if let Some(bus) = &self.bus {
            bus.input_target_changed().publish(&InputTargetChanged {
                context: context.to_string(),
                new_index: new,
                old_index: old,
            });
        }
    }

    fn active(&self) -> Option<&InputContext> {
        self.contexts.get(self.active_context())
    }

    fn active_mut(&mut self) -> Option<&mut InputContext> {
        let name = self.active_context().to_string();
        self.contexts.get_mut(&name)
    }
}
