use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::access::{AccessError, ObjectHandle, ObjectPropertyAccess};
use crate::notify::ChangeNotificationBus;
use crate::value::PropertyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchedPropertyId(u64);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot watch a property of dead object {handle}")]
    InvalidObject { handle: ObjectHandle },
    #[error("property name cannot be empty")]
    EmptyPropertyName,
    #[error(transparent)]
    Access(#[from] AccessError),
}

#[derive(Debug)]
struct WatchedProperty {
    id: WatchedPropertyId,
    owner: ObjectHandle,
    property_name: String,
    cached: PropertyValue,
    persistence_key: Option<String>,
}

struct PendingChange {
    owner: ObjectHandle,
    property_name: String,
    new_value: PropertyValue,
    old_value: PropertyValue,
    persistence_key: Option<String>,
}

/// Tracks (object, property) bindings under live edit and publishes a typed
/// change event for every observed transition.
///
/// All methods take `&self`; internal state is never borrowed while bus
/// handlers run, so handlers may register or unregister watches.
pub struct PropertyRegistry {
    access: Rc<dyn ObjectPropertyAccess>,
    bus: Rc<ChangeNotificationBus>,
    entries: RefCell<Vec<WatchedProperty>>,
    next_id: Cell<u64>,
    poll_interval: f32,
    since_last_read: Cell<f32>,
}

impl PropertyRegistry {
    pub fn new(access: Rc<dyn ObjectPropertyAccess>, bus: Rc<ChangeNotificationBus>) -> Self {
        Self::with_poll_interval(access, bus, 0.0)
    }

    pub fn with_poll_interval(
        access: Rc<dyn ObjectPropertyAccess>,
        bus: Rc<ChangeNotificationBus>,
        poll_interval: f32,
    ) -> Self {
        Self {
            access,
            bus,
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            poll_interval: poll_interval.max(0.0),
            since_last_read: Cell::new(0.0),
        }
    }

    /// Starts (or restarts) watching a property. The value read here becomes
    /// the baseline; no change event fires for it.
    pub fn register(
        &self,
        handle: ObjectHandle,
        property_name: &str,
        persistence_key: Option<&str>,
    ) -> Result<WatchedPropertyId, RegistryError> {
        if property_name.is_empty() {
            return Err(RegistryError::EmptyPropertyName);
        }
        if !self.access.is_alive(handle) {
            warn!(object = %handle, property = property_name, "property_watch_on_dead_object");
            return Err(RegistryError::InvalidObject { handle });
        }

        let baseline = self.access.read_property(handle, property_name)?;
        let persistence_key = persistence_key
            .filter(|key| !key.is_empty())
            .map(ToString::to_string);

        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries
            .iter_mut()
            .find(|entry| entry.owner == handle && entry.property_name == property_name)
        {
            existing.cached = baseline;
            existing.persistence_key = persistence_key;
            debug!(object = %handle, property = property_name, "property_watch_rebased");
            return Ok(existing.id);
        }

        let id = WatchedPropertyId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        entries.push(WatchedProperty {
            id,
            owner: handle,
            property_name: property_name.to_string(),
            cached: baseline,
            persistence_key,
        });
        debug!(
            object = %handle,
            name = self.object_label(handle).as_str(),
            property = property_name,
            "property_watch_registered"
        );
        Ok(id)
    }

    pub fn unregister(&self, handle: ObjectHandle, property_name: &str) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| !(entry.owner == handle && entry.property_name == property_name));
        entries.len() != before
    }

    /// Drops every watch on `handle`; used when a whole UI panel is torn down.
    pub fn unregister_object(&self, handle: ObjectHandle) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.owner != handle);
        let dropped = before - entries.len();
        debug!(
            object = %handle,
            name = self.object_label(handle).as_str(),
            dropped,
            "property_watches_dropped_for_object"
        );
        dropped
    }

    /// Re-reads every watched property and publishes the transitions.
    /// Returns the number of change events published.
    pub fn poll(&self, dt: f32) -> usize {
        if self.poll_interval > 0.0 {
            let elapsed = self.since_last_read.get() + dt.max(0.0);
            if elapsed < self.poll_interval {
                self.since_last_read.set(elapsed);
                return 0;
            }
            self.since_last_read.set(0.0);
        }

        let pending = self.collect_changes();
        let published = pending.len();
        for change in pending {
            self.publish(change);
        }
        published
    }

    /// Writes through the access layer and publishes the transition right
    /// away when the property is watched. Returns whether an event fired.
    pub fn write(
        &self,
        handle: ObjectHandle,
        property_name: &str,
        value: PropertyValue,
    ) -> Result<bool, RegistryError> {
        self.access.write_property(handle, property_name, value)?;

        let change = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries
                .iter_mut()
                .find(|entry| entry.owner == handle && entry.property_name == property_name)
            else {
                return Ok(false);
            };
            let current = self.access.read_property(handle, property_name)?;
            if current.same_as(&entry.cached) {
                None
            } else {
                let old_value = std::mem::replace(&mut entry.cached, current.clone());
                Some(PendingChange {
                    owner: handle,
                    property_name: entry.property_name.clone(),
                    new_value: current,
                    old_value,
                    persistence_key: entry.persistence_key.clone(),
                })
            }
        };

        match change {
            Some(change) => {
                self.publish(change);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn is_watching(&self, handle: ObjectHandle, property_name: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.owner == handle && entry.property_name == property_name)
    }

    pub fn cached_value(&self, handle: ObjectHandle, property_name: &str) -> Option<PropertyValue> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.owner == handle && entry.property_name == property_name)
            .map(|entry| entry.cached.clone())
    }

    pub fn persistence_key(&self, id: WatchedPropertyId) -> Option<String> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.persistence_key.clone())
    }

    fn collect_changes(&self) -> Vec<PendingChange> {
        let mut pending = Vec::new();
        let mut entries = self.entries.borrow_mut();
        entries.retain_mut(|entry| {
            if !self.access.is_alive(entry.owner) {
                warn!(
                    object = %entry.owner,
                    property = entry.property_name.as_str(),
                    "property_watch_dropped_dead_object"
                );
                return false;
            }
            let current = match self.access.read_property(entry.owner, &entry.property_name) {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        object = %entry.owner,
                        name = self.object_label(entry.owner).as_str(),
                        property = entry.property_name.as_str(),
                        %error,
                        "property_watch_dropped_unreadable"
                    );
                    return false;
                }
            };
            if !current.same_as(&entry.cached) {
                let old_value = std::mem::replace(&mut entry.cached, current.clone());
                pending.push(PendingChange {
                    owner: entry.owner,
                    property_name: entry.property_name.clone(),
                    new_value: current,
                    old_value,
                    persistence_key: entry.persistence_key.clone(),
                });
            }
            true
        });
        pending
    }

    fn object_label(&self, handle: ObjectHandle) -> String {
        self.access.object_name(handle).unwrap_or_default()
    }

    fn publish(&self, change: PendingChange) {
        debug!(
            object = %change.owner,
            property = change.property_name.as_str(),
            old = %change.old_value,
            new = %change.new_value,
            "property_changed"
        );
        self.bus.publish_property_change(
            &change.property_name,
            change.owner,
            &change.new_value,
            &change.old_value,
            change.persistence_key.as_deref(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::access::PropertyTable;
    use crate::notify::ChangeEvent;

    struct Fixture {
        table: Rc<PropertyTable>,
        bus: Rc<ChangeNotificationBus>,
        registry: PropertyRegistry,
        ints: Rc<RefCell<Vec<ChangeEvent<i32>>>>,
    }

    fn fixture() -> Fixture {
        let table = Rc::new(PropertyTable::new());
        let bus = Rc::new(ChangeNotificationBus::new());
        let registry = PropertyRegistry::new(
            Rc::clone(&table) as Rc<dyn ObjectPropertyAccess>,
            Rc::clone(&bus),
        );
        let ints = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&ints);
        bus.int_changed()
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));
        Fixture {
            table,
            bus,
            registry,
            ints,
        }
    }

    #[test]
    fn first_poll_after_register_is_silent() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        fx.table.define(player, "Health", PropertyValue::Int(100));

        fx.registry
            .register(player, "Health", Some("Player"))
            .expect("register");
        assert_eq!(fx.registry.poll(0.016), 0);
        assert!(fx.ints.borrow().is_empty());
    }

    #[test]
    fn event_fires_exactly_once_per_transition() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        fx.table.define(player, "Health", PropertyValue::Int(100));
        fx.registry
            .register(player, "Health", Some("Player"))
            .expect("register");

        fx.table.set_from_host(player, "Health", PropertyValue::Int(90));
        assert_eq!(fx.registry.poll(0.016), 1);
        assert_eq!(fx.registry.poll(0.016), 0);

        let events = fx.ints.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value, 100);
        assert_eq!(events[0].new_value, 90);
        assert_eq!(events[0].owner, player);
        assert_eq!(events[0].persistence_key.as_deref(), Some("Player"));
    }

    #[test]
    fn reregister_rebases_without_event() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        fx.table.define(player, "Ammo", PropertyValue::Int(3));
        let first = fx.registry.register(player, "Ammo", None).expect("register");

        fx.table.set_from_host(player, "Ammo", PropertyValue::Int(9));
        let second = fx.registry.register(player, "Ammo", None).expect("register");

        assert_eq!(first, second);
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.registry.poll(0.016), 0);
        assert!(matches!(
            fx.registry.cached_value(player, "Ammo"),
            Some(PropertyValue::Int(9))
        ));
    }

    #[test]
    fn dead_objects_are_rejected_then_dropped_silently() {
        let fx = fixture();
        let enemy = fx.table.spawn("enemy");
        fx.table.define(enemy, "Health", PropertyValue::Int(10));
        fx.registry.register(enemy, "Health", None).expect("register");

        fx.table.despawn(enemy);
        assert_eq!(fx.registry.poll(0.016), 0);
        assert!(fx.registry.is_empty());
        assert!(matches!(
            fx.registry.register(enemy, "Health", None),
            Err(RegistryError::InvalidObject { .. })
        ));
    }

    #[test]
    fn unregister_stops_events() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        fx.table.define(player, "Health", PropertyValue::Int(1));
        fx.registry.register(player, "Health", None).expect("register");

        assert!(fx.registry.unregister(player, "Health"));
        assert!(!fx.registry.unregister(player, "Health"));
        fx.table.set_from_host(player, "Health", PropertyValue::Int(2));
        assert_eq!(fx.registry.poll(0.016), 0);
    }

    #[test]
    fn unregister_object_drops_only_its_watches() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        let enemy = fx.table.spawn("enemy");
        for handle in [player, enemy] {
            fx.table.define(handle, "Health", PropertyValue::Int(1));
            fx.table.define(handle, "Armor", PropertyValue::Int(1));
            fx.registry.register(handle, "Health", None).expect("register");
            fx.registry.register(handle, "Armor", None).expect("register");
        }

        assert_eq!(fx.registry.unregister_object(enemy), 2);
        assert_eq!(fx.registry.unregister_object(enemy), 0);
        assert_eq!(fx.registry.len(), 2);

        fx.table.set_from_host(enemy, "Health", PropertyValue::Int(5));
        fx.table.set_from_host(player, "Health", PropertyValue::Int(5));
        assert_eq!(fx.registry.poll(0.016), 1);
        assert_eq!(fx.ints.borrow()[0].owner, player);
    }

    #[test]
    fn write_publishes_immediately_and_poll_stays_quiet() {
        let fx = fixture();
        let player = fx.table.spawn("player");
        fx.table.define(player, "Health", PropertyValue::Int(100));
        fx.registry.register(player, "Health", None).expect("register");

        assert!(fx
            .registry
            .write(player, "Health", PropertyValue::Int(5))
            .expect("write"));
        assert!(!fx
            .registry
            .write(player, "Health", PropertyValue::Int(5))
            .expect("write"));
        assert_eq!(fx.registry.poll(0.016), 0);
        assert_eq!(fx.ints.borrow().len(), 1);
    }

    #[test]
    fn poll_interval_defers_reads() {
        let table = Rc::new(PropertyTable::new());
        let bus = Rc::new(ChangeNotificationBus::new());
        let registry = PropertyRegistry::with_poll_interval(
            Rc::clone(&table) as Rc<dyn ObjectPropertyAccess>,
            Rc::clone(&bus),
            0.5,
        );
        let player = table.spawn("player");
        table.define(player, "Speed", PropertyValue::Float(1.0));
        registry.register(player, "Speed", None).expect("register");

        table.set_from_host(player, "Speed", PropertyValue::Float(2.0));
        assert_eq!(registry.poll(0.25), 0);
        assert_eq!(registry.poll(0.25), 1);
    }

    #[test]
    fn handler_may_unregister_during_dispatch() {
        let fx = fixture();
        let registry = Rc::new(fx.registry);
        let player = fx.table.spawn("player");
        fx.table.define(player, "Health", PropertyValue::Int(1));
        fx.table.define(player, "Armor", PropertyValue::Int(1));
        registry.register(player, "Health", None).expect("register");
        registry.register(player, "Armor", None).expect("register");

        let inner = Rc::clone(&registry);
        fx.bus.int_changed().subscribe(move |event| {
            inner.unregister(event.owner, "Armor");
        });

        fx.table.set_from_host(player, "Health", PropertyValue::Int(2));
        fx.table.set_from_host(player, "Armor", PropertyValue::Int(2));
        assert_eq!(registry.poll(0.016), 2);
        assert!(!registry.is_watching(player, "Armor"));
        assert_eq!(fx.ints.borrow().len(), 2);
    }
}
