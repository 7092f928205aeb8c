//! Typed publish/subscribe hub.
//!
//! Every channel dispatches synchronously, in subscription order, on the
//! caller's thread. `publish` iterates over a snapshot of the subscriber list
//! taken when the publish starts: handlers added during a dispatch first run
//! on the next publish, and handlers removed during a dispatch still receive
//! the event already in flight.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{trace, warn};

use crate::access::ObjectHandle;
use crate::command::ControllerId;
use crate::value::{PropertyValue, Rotator, Vector2, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One detected transition of a watched property.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<T> {
    pub property_name: String,
    pub owner: ObjectHandle,
    pub new_value: T,
    pub old_value: T,
    pub persistence_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecuted {
    pub command: String,
    pub target: ControllerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionExecuted {
    pub owner: ObjectHandle,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageChanged {
    pub language: String,
    pub previous: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotRequested {
    pub request_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotProcessed {
    pub request_id: u64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveLifecycle {
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTargetChanged {
    pub context: String,
    pub new_index: Option<usize>,
    pub old_index: Option<usize>,
}

type Handler<E> = Rc<dyn Fn(&E)>;

pub struct Channel<E> {
    name: &'static str,
    ids: Rc<Cell<u64>>,
    handlers: RefCell<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> Channel<E> {
    fn new(name: &'static str, ids: Rc<Cell<u64>>) -> Self {
        Self {
            name,
            ids,
            handlers: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + 'static,
    {
        let next = self.ids.get() + 1;
        self.ids.set(next);
        let id = SubscriptionId(next);
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        trace!(channel = self.name, subscription = next, "bus_subscribed");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Returns how many handlers were invoked.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    fn clear(&self) {
        self.handlers.borrow_mut().clear();
    }
}

macro_rules! bus_channels {
    ($($field:ident : $event:ty),+ $(,)?) => {
        pub struct ChangeNotificationBus {
            $($field: Channel<$event>,)+
        }

        impl ChangeNotificationBus {
            pub fn new() -> Self {
                let ids = Rc::new(Cell::new(0));
                Self {
                    $($field: Channel::new(stringify!($field), Rc::clone(&ids)),)+
                }
            }

            $(
                pub fn $field(&self) -> &Channel<$event> {
                    &self.$field
                }
            )+

            /// Detaches every handler from every channel.
            pub fn clear_all(&self) {
                $(self.$field.clear();)+
            }

            pub fn total_subscribers(&self) -> usize {
                0 $(+ self.$field.subscriber_count())+
            }
        }
    };
}

bus_channels! {
    bool_changed: ChangeEvent<bool>,
    int_changed: ChangeEvent<i32>,
    float_changed: ChangeEvent<f32>,
    byte_changed: ChangeEvent<u8>,
    string_changed: ChangeEvent<String>,
    vector2_changed: ChangeEvent<Vector2>,
    vector3_changed: ChangeEvent<Vector3>,
    rotation_changed: ChangeEvent<Rotator>,
    menu_shown: (),
    menu_hidden: (),
    command_executed: CommandExecuted,
    function_executed: FunctionExecuted,
    language_changed: LanguageChanged,
    screenshot_requested: ScreenshotRequested,
    screenshot_processed: ScreenshotProcessed,
    saved: SaveLifecycle,
    loaded: SaveLifecycle,
    deleted: SaveLifecycle,
    input_target_changed: InputTargetChanged,
}

impl Default for ChangeNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotificationBus {
    /// Routes a property transition to the channel matching its value kind.
    /// Returns false when old and new values are of different kinds.
    pub fn publish_property_change(
        &self,
        property_name: &str,
        owner: ObjectHandle,
        new_value: &PropertyValue,
        old_value: &PropertyValue,
        persistence_key: Option<&str>,
    ) -> bool {
        fn event<T>(
            property_name: &str,
            owner: ObjectHandle,
            new_value: T,
            old_value: T,
            persistence_key: Option<&str>,
        ) -> ChangeEvent<T> {
            ChangeEvent {
                property_name: property_name.to_string(),
                owner,
                new_value,
                old_value,
                persistence_key: persistence_key.map(ToString::to_string),
            }
        }

        match (new_value, old_value) {
            (PropertyValue::Bool(new), PropertyValue::Bool(old)) => {
                self.bool_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::Int(new), PropertyValue::Int(old)) => {
                self.int_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::Float(new), PropertyValue::Float(old)) => {
                self.float_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::Byte(new), PropertyValue::Byte(old)) => {
                self.byte_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::String(new), PropertyValue::String(old)) => {
                self.string_changed.publish(&event(
                    property_name,
                    owner,
                    new.clone(),
                    old.clone(),
                    persistence_key,
                ));
            }
            (PropertyValue::Vector2(new), PropertyValue::Vector2(old)) => {
                self.vector2_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::Vector3(new), PropertyValue::Vector3(old)) => {
                self.vector3_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            (PropertyValue::Rotation(new), PropertyValue::Rotation(old)) => {
                self.rotation_changed
                    .publish(&event(property_name, owner, *new, *old, persistence_key));
            }
            _ => {
                warn!(
                    object = %owner,
                    property = property_name,
                    new_kind = ?new_value.kind(),
                    old_kind = ?old_value.kind(),
                    "property_kind_changed_event_dropped"
                );
                return false;
            }
        }
        true
    }
}
