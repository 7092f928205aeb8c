//! Session-scoped wiring of the debug menu core.
//!
//! One [`DebugMenuSession`] per game session. Every collaborator is passed in
//! explicitly and everything the session creates dies with it; `teardown`
//! detaches all bus handlers so nothing outlives the session.

use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use crate::access::{AccessError, ObjectHandle, ObjectPropertyAccess};
use crate::command::{
    CommandDispatcher, CommandHistory, CommandScope, ConnectionHandle, ConsoleExecutor,
    DispatchError, DispatchOutcome, NetMessage, NetworkTransport,
};
use crate::input::{ActionStates, InputFocusArbiter, TickReport};
use crate::notify::{
    Channel, ChangeEvent, ChangeNotificationBus, FunctionExecuted, LanguageChanged,
    ScreenshotProcessed, ScreenshotRequested,
};
use crate::persistence::{
    BlobStore, DocumentError, LoadOutcome, PropertyDocument, SaveError, SaveSystem,
};
use crate::registry::{PropertyRegistry, RegistryError, WatchedPropertyId};
use crate::settings::DebugMenuSettings;
use crate::value::PropertyValue;

pub const MENU_CONTEXT: &str = "menu";

pub struct SessionCollaborators {
    pub access: Rc<dyn ObjectPropertyAccess>,
    pub executor: Box<dyn ConsoleExecutor>,
    pub transport: Box<dyn NetworkTransport>,
    pub store: Box<dyn BlobStore>,
}

pub struct DebugMenuSession {
    settings: DebugMenuSettings,
    access: Rc<dyn ObjectPropertyAccess>,
    bus: Rc<ChangeNotificationBus>,
    registry: PropertyRegistry,
    document: Rc<RefCell<PropertyDocument>>,
    dispatcher: CommandDispatcher,
    arbiter: InputFocusArbiter,
    saves: SaveSystem,
    menu_shown: bool,
    language: String,
    next_screenshot_id: u64,
    pending_screenshot: Option<u64>,
    opening_after_capture: bool,
}

impl DebugMenuSession {
    pub fn new(settings: DebugMenuSettings, collaborators: SessionCollaborators) -> Self {
        let SessionCollaborators {
            access,
            executor,
            transport,
            store,
        } = collaborators;

        let bus = Rc::new(ChangeNotificationBus::new());
        let registry = PropertyRegistry::with_poll_interval(
            Rc::clone(&access),
            Rc::clone(&bus),
            settings.property_poll_interval,
        );
        let history = CommandHistory::new(
            settings.max_command_history,
            settings.no_save_console_commands.clone(),
        );
        let dispatcher = CommandDispatcher::new(executor, transport, Rc::clone(&bus), history);
        let arbiter = InputFocusArbiter::new(settings.repeat, &settings.repeat_actions)
            .with_bus(Rc::clone(&bus));
        let saves = SaveSystem::new(store, Rc::clone(&bus), settings.save_options());
        let document = Rc::new(RefCell::new(PropertyDocument::new()));

        let session = Self {
            language: settings.default_language.clone(),
            settings,
            access,
            bus,
            registry,
            document,
            dispatcher,
            arbiter,
            saves,
            menu_shown: false,
            next_screenshot_id: 0,
            pending_screenshot: None,
            opening_after_capture: false,
        };
        session.subscribe_persistence();
        info!(language = session.language.as_str(), "debug_menu_session_started");
        session
    }

    pub fn settings(&self) -> &DebugMenuSettings {
        &self.settings
    }

    pub fn bus(&self) -> &Rc<ChangeNotificationBus> {
        &self.bus
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn document(&self) -> Ref<'_, PropertyDocument> {
        self.document.borrow()
    }

    pub fn history(&self) -> &CommandHistory {
        self.dispatcher.history()
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        self.dispatcher.history_mut()
    }

    pub fn arbiter(&self) -> &InputFocusArbiter {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut InputFocusArbiter {
        &mut self.arbiter
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_menu_shown(&self) -> bool {
        self.menu_shown
    }

    /// Starts live-editing a property. With a persistence key, a previously
    /// saved value is written back first so it becomes the baseline.
    pub fn watch_property(
        &self,
        handle: ObjectHandle,
        property: &str,
        persistence_key: Option<&str>,
    ) -> Result<WatchedPropertyId, RegistryError> {
        if let Some(key) = persistence_key.filter(|key| !key.is_empty()) {
            let restored =
                self.document
                    .borrow()
                    .apply_to_object(key, self.access.as_ref(), handle, property);
            match restored {
                Ok(value) => debug!(object = %handle, property, value = %value, "property_restored"),
                Err(DocumentError::NotFound { .. }) => {}
                Err(error) => warn!(object = %handle, property, %error, "property_restore_failed"),
            }
        }
        self.registry.register(handle, property, persistence_key)
    }

    pub fn unwatch_property(&self, handle: ObjectHandle, property: &str) -> bool {
        self.registry.unregister(handle, property)
    }

    /// UI edit path; the change event fires before this returns.
    pub fn edit_property(
        &self,
        handle: ObjectHandle,
        property: &str,
        value: PropertyValue,
    ) -> Result<bool, RegistryError> {
        self.registry.write(handle, property, value)
    }

    /// Returns false when the menu was already shown.
    pub fn show_menu(&mut self) -> bool {
        if self.menu_shown || self.opening_after_capture {
            return false;
        }
        self.arbiter.push_context(MENU_CONTEXT);
        let request_id = self.request_screenshot();

        if self.settings.wait_for_capture_before_opening {
            self.opening_after_capture = true;
            self.arbiter.set_ignore_input(true);
            debug!(request_id, "debug_menu_waiting_for_capture");
            return true;
        }
        self.finish_showing();
        true
    }

    pub fn hide_menu(&mut self) -> bool {
        if !self.menu_shown && !self.opening_after_capture {
            return false;
        }
        if self.opening_after_capture {
            self.opening_after_capture = false;
            self.arbiter.reset_ignore_input();
        }
        self.arbiter.withdraw_context(MENU_CONTEXT);
        self.menu_shown = false;
        info!("debug_menu_hidden");
        self.bus.menu_hidden().publish(&());
        true
    }

    pub fn toggle_menu(&mut self) -> bool {
        if self.menu_shown || self.opening_after_capture {
            self.hide_menu()
        } else {
            self.show_menu()
        }
    }

    /// One frame: property poll, then input routing.
    pub fn tick(&mut self, dt: f32, time_dilation: f32, states: &ActionStates) -> TickReport {
        self.registry.poll(dt);
        let report = self.arbiter.tick(dt, time_dilation, states);
        if report.toggle_menu_requested {
            self.toggle_menu();
        }
        report
    }

    pub fn execute_command(
        &mut self,
        command: &str,
        scope: CommandScope,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(command, scope)
    }

    pub fn receive_net_message(
        &mut self,
        from: ConnectionHandle,
        message: NetMessage,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.receive(from, message)
    }

    pub fn execute_function(&self, handle: ObjectHandle, function: &str) -> Result<(), AccessError> {
        self.access.invoke_function(handle, function)?;
        info!(object = %handle, function, "debug_menu_function_executed");
        self.bus.function_executed().publish(&FunctionExecuted {
            owner: handle,
            function: function.to_string(),
        });
        Ok(())
    }

    /// Returns false for an empty key or the current language unless `forced`.
    pub fn set_language(&mut self, language: &str, forced: bool) -> bool {
        if !forced && (language.is_empty() || language == self.language) {
            return false;
        }
        let previous = std::mem::replace(&mut self.language, language.to_string());
        info!(language, previous = previous.as_str(), "debug_menu_language_changed");
        self.bus.language_changed().publish(&LanguageChanged {
            language: language.to_string(),
            previous,
        });
        true
    }

    pub fn request_screenshot(&mut self) -> u64 {
        self.next_screenshot_id += 1;
        let request_id = self.next_screenshot_id;
        self.pending_screenshot = Some(request_id);
        self.bus
            .screenshot_requested()
            .publish(&ScreenshotRequested { request_id });
        request_id
    }

    /// Called by the host once the capture for `request_id` is done.
    pub fn finish_screenshot(&mut self, request_id: u64, success: bool) -> bool {
        if self.pending_screenshot != Some(request_id) {
            warn!(request_id, "screenshot_finish_unknown_request");
            return false;
        }
        self.pending_screenshot = None;
        self.bus
            .screenshot_processed()
            .publish(&ScreenshotProcessed {
                request_id,
                success,
            });

        if self.opening_after_capture {
            self.opening_after_capture = false;
            self.arbiter.reset_ignore_input();
            self.finish_showing();
        }
        true
    }

    pub fn save(&mut self) -> Result<bool, SaveError> {
        let mut document = self.document.borrow_mut();
        self.saves.save(&mut document, self.dispatcher.history())
    }

    pub fn load(&mut self) -> Result<LoadOutcome, SaveError> {
        let mut document = self.document.borrow_mut();
        self.saves.load(&mut document, self.dispatcher.history_mut())
    }

    pub fn delete_save(&mut self) -> Result<(), SaveError> {
        self.saves.delete()
    }

    /// Detaches every bus handler. The session is inert afterwards.
    pub fn teardown(&mut self) {
        if self.menu_shown {
            self.hide_menu();
        }
        self.bus.clear_all();
        info!("debug_menu_session_torn_down");
    }

    fn finish_showing(&mut self) {
        self.menu_shown = true;
        info!("debug_menu_shown");
        self.bus.menu_shown().publish(&());
    }

    fn subscribe_persistence(&self) {
        let document = Rc::downgrade(&self.document);
        persist_changes(self.bus.bool_changed(), &document, PropertyValue::Bool);
        persist_changes(self.bus.int_changed(), &document, PropertyValue::Int);
        persist_changes(self.bus.float_changed(), &document, PropertyValue::Float);
        persist_changes(self.bus.byte_changed(), &document, PropertyValue::Byte);
        persist_changes(self.bus.string_changed(), &document, PropertyValue::String);
        persist_changes(self.bus.vector2_changed(), &document, PropertyValue::Vector2);
        persist_changes(self.bus.vector3_changed(), &document, PropertyValue::Vector3);
        persist_changes(self.bus.rotation_changed(), &document, PropertyValue::Rotation);
    }
}

fn persist_changes<T>(
    channel: &Channel<ChangeEvent<T>>,
    document: &Weak<RefCell<PropertyDocument>>,
    wrap: fn(T) -> PropertyValue,
) where
    T: Clone + 'static,
{
    let document = Weak::clone(document);
    channel.subscribe(move |event: &ChangeEvent<T>| {
        let Some(key) = event.persistence_key.as_deref().filter(|key| !key.is_empty()) else {
            return;
        };
        let Some(document) = document.upgrade() else {
            return;
        };
        let Ok(mut document) = document.try_borrow_mut() else {
            warn!(property = event.property_name.as_str(), "property_persist_document_busy");
            return;
        };
        document.set_property(key, &event.property_name, &wrap(event.new_value.clone()));
    });
}
