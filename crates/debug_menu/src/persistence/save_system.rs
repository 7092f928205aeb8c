use std::rc::Rc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::blob_store::{BlobStore, BlobStoreError};
use super::document::{DocumentError, PropertyDocument};
use crate::command::CommandHistory;
use crate::notify::{ChangeNotificationBus, SaveLifecycle};

pub const COMMAND_HISTORY_KEY: &str = "CommandHistory";

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    pub slot_name: String,
    pub disable_save_file: bool,
    pub does_not_save_console_command: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Disabled,
    NoSaveData,
    Loaded,
    /// The slot held unreadable text; current state was kept and written back.
    Recovered,
    /// The slot was written by a newer document version and was left untouched.
    NewerVersion { found: u32 },
}

/// Moves the property document and command history in and out of a blob
/// store slot, announcing each step on the bus.
pub struct SaveSystem {
    store: Box<dyn BlobStore>,
    bus: Rc<ChangeNotificationBus>,
    options: SaveOptions,
}

impl SaveSystem {
    pub fn new(store: Box<dyn BlobStore>, bus: Rc<ChangeNotificationBus>, options: SaveOptions) -> Self {
        Self {
            store,
            bus,
            options,
        }
    }

    pub fn options(&self) -> &SaveOptions {
        &self.options
    }

    /// Returns false when saving is disabled.
    pub fn save(
        &mut self,
        document: &mut PropertyDocument,
        history: &CommandHistory,
    ) -> Result<bool, SaveError> {
        if self.options.disable_save_file {
            return Ok(false);
        }

        let commands = if self.options.does_not_save_console_command {
            Vec::new()
        } else {
            history.to_vec()
        };
        document.set_string_array(COMMAND_HISTORY_KEY, &commands);

        let text = document.serialize()?;
        if let Err(store_error) = self.store.save(&self.options.slot_name, &text) {
            error!(slot = self.options.slot_name.as_str(), error = %store_error, "debug_menu_save_failed");
            return Err(store_error.into());
        }

        info!(
            slot = self.options.slot_name.as_str(),
            commands = commands.len(),
            "debug_menu_saved"
        );
        self.bus.saved().publish(&self.lifecycle());
        Ok(true)
    }

    pub fn load(
        &mut self,
        document: &mut PropertyDocument,
        history: &mut CommandHistory,
    ) -> Result<LoadOutcome, SaveError> {
        if self.options.disable_save_file {
            return Ok(LoadOutcome::Disabled);
        }

        let text = match self.store.load(&self.options.slot_name) {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!(slot = self.options.slot_name.as_str(), "debug_menu_no_save_data");
                return Ok(LoadOutcome::NoSaveData);
            }
            Err(store_error) => {
                error!(slot = self.options.slot_name.as_str(), error = %store_error, "debug_menu_load_failed");
                return Err(store_error.into());
            }
        };

        match document.deserialize(&text) {
            Ok(()) => {}
            Err(DocumentError::UnsupportedVersion { found, supported }) => {
                warn!(
                    slot = self.options.slot_name.as_str(),
                    found,
                    supported,
                    "debug_menu_save_newer_version_kept"
                );
                return Ok(LoadOutcome::NewerVersion { found });
            }
            Err(parse_error) => {
                warn!(
                    slot = self.options.slot_name.as_str(),
                    error = %parse_error,
                    "debug_menu_save_unreadable_rewriting"
                );
                self.save(document, history)?;
                return Ok(LoadOutcome::Recovered);
            }
        }

        history.replace_all(document.get_string_array(COMMAND_HISTORY_KEY));
        info!(
            slot = self.options.slot_name.as_str(),
            commands = history.len(),
            "debug_menu_loaded"
        );
        self.bus.loaded().publish(&self.lifecycle());
        Ok(LoadOutcome::Loaded)
    }

    pub fn delete(&mut self) -> Result<(), SaveError> {
        self.store.delete(&self.options.slot_name)?;
        info!(slot = self.options.slot_name.as_str(), "debug_menu_save_deleted");
        self.bus.deleted().publish(&self.lifecycle());
        Ok(())
    }

    fn lifecycle(&self) -> SaveLifecycle {
        SaveLifecycle {
            slot: self.options.slot_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::persistence::MemoryBlobStore;
    use crate::value::PropertyValue;

    const SLOT: &str = "DebugMenuSaveData";

    fn options() -> SaveOptions {
        SaveOptions {
            slot_name: SLOT.to_string(),
            disable_save_file: false,
            does_not_save_console_command: false,
        }
    }

    fn counter(bus: &ChangeNotificationBus) -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let saved = Rc::new(Cell::new(0));
        let loaded = Rc::new(Cell::new(0));
        let saved_sink = Rc::clone(&saved);
        let loaded_sink = Rc::clone(&loaded);
        bus.saved()
            .subscribe(move |_| saved_sink.set(saved_sink.get() + 1));
        bus.loaded()
            .subscribe(move |_| loaded_sink.set(loaded_sink.get() + 1));
        (saved, loaded)
    }

    #[test]
    fn save_then_load_restores_history_in_order() {
        let bus = Rc::new(ChangeNotificationBus::new());
        let (saved, loaded) = counter(&bus);
        let store = MemoryBlobStore::new();
        let mut system = SaveSystem::new(Box::new(store.clone()), Rc::clone(&bus), options());

        let mut document = PropertyDocument::new();
        document.set_property("Player", "Health", &PropertyValue::Int(3));
        let mut history = CommandHistory::new(10, Vec::new());
        for command in ["god", "fly", "ghost"] {
            history.record(command);
        }
        assert!(system.save(&mut document, &history).expect("save"));

        let mut fresh_document = PropertyDocument::new();
        let mut fresh_history = CommandHistory::new(10, Vec::new());
        assert_eq!(
            system
                .load(&mut fresh_document, &mut fresh_history)
                .expect("load"),
            LoadOutcome::Loaded
        );
        assert_eq!(fresh_history.to_vec(), vec!["god", "fly", "ghost"]);
        assert_eq!(fresh_document.get_property("Player", "Health"), Some("3"));
        assert_eq!((saved.get(), loaded.get()), (1, 1));
    }

    #[test]
    fn unreadable_slot_keeps_state_and_rewrites_it() {
        let bus = Rc::new(ChangeNotificationBus::new());
        let (saved, loaded) = counter(&bus);
        let mut store = MemoryBlobStore::new();
        store.save(SLOT, "{ not json").expect("seed");
        let mut system = SaveSystem::new(Box::new(store.clone()), Rc::clone(&bus), options());

        let mut document = PropertyDocument::new();
        document.set_scalar_string("Language", "en");
        let mut history = CommandHistory::new(10, Vec::new());
        history.record("god");

        assert_eq!(
            system.load(&mut document, &mut history).expect("load"),
            LoadOutcome::Recovered
        );
        assert_eq!(document.get_scalar_string("Language", ""), "en");
        assert_eq!(history.to_vec(), vec!["god"]);
        assert_eq!((saved.get(), loaded.get()), (1, 0));

        let rewritten = store.contents(SLOT).expect("rewritten");
        let mut check = PropertyDocument::new();
        check.deserialize(&rewritten).expect("valid json");
        assert_eq!(check.get_string_array(COMMAND_HISTORY_KEY), vec!["god"]);
    }

    #[test]
    fn newer_version_slot_is_left_untouched() {
        let bus = Rc::new(ChangeNotificationBus::new());
        let (saved, loaded) = counter(&bus);
        let mut store = MemoryBlobStore::new();
        let newer = r#"{"version":99}"#;
        store.save(SLOT, newer).expect("seed");
        let mut system = SaveSystem::new(Box::new(store.clone()), Rc::clone(&bus), options());

        let mut document = PropertyDocument::new();
        let mut history = CommandHistory::new(10, Vec::new());
        history.record("god");

        assert_eq!(
            system.load(&mut document, &mut history).expect("load"),
            LoadOutcome::NewerVersion { found: 99 }
        );
        assert_eq!(store.contents(SLOT).as_deref(), Some(newer));
        assert_eq!(history.to_vec(), vec!["god"]);
        assert_eq!((saved.get(), loaded.get()), (0, 0));
    }

    #[test]
    fn missing_slot_changes_nothing() {
        let bus = Rc::new(ChangeNotificationBus::new());
        let (saved, loaded) = counter(&bus);
        let mut system = SaveSystem::new(Box::new(MemoryBlobStore::new()), bus, options());
        let mut document = PropertyDocument::new();
        let mut history = CommandHistory::new(10, Vec::new());
        history.record("god");

        assert_eq!(
            system.load(&mut document, &mut history).expect("load"),
            LoadOutcome::NoSaveData
        );
        assert_eq!(history.len(), 1);
        assert_eq!((saved.get(), loaded.get()), (0, 0));
    }

    #[test]
    fn disabled_save_file_skips_io() {
        let store = MemoryBlobStore::new();
        let mut system = SaveSystem::new(
            Box::new(store.clone()),
            Rc::new(ChangeNotificationBus::new()),
            SaveOptions {
                disable_save_file: true,
                ..options()
            },
        );
        let mut document = PropertyDocument::new();
        let mut history = CommandHistory::new(10, Vec::new());
        assert!(!system.save(&mut document, &history).expect("save"));
        assert_eq!(
            system.load(&mut document, &mut history).expect("load"),
            LoadOutcome::Disabled
        );
        assert!(store.contents(SLOT).is_none());
    }

    #[test]
    fn history_can_be_kept_out_of_the_save() {
        let store = MemoryBlobStore::new();
        let mut system = SaveSystem::new(
            Box::new(store.clone()),
            Rc::new(ChangeNotificationBus::new()),
            SaveOptions {
                does_not_save_console_command: true,
                ..options()
            },
        );
        let mut document = PropertyDocument::new();
        let mut history = CommandHistory::new(10, Vec::new());
        history.record("god");
        system.save(&mut document, &history).expect("save");

        let mut check = PropertyDocument::new();
        check
            .deserialize(&store.contents(SLOT).expect("saved"))
            .expect("valid json");
        assert!(check.get_string_array(COMMAND_HISTORY_KEY).is_empty());
    }

    #[test]
    fn delete_announces_and_clears_slot() {
        let bus = Rc::new(ChangeNotificationBus::new());
        let deleted = Rc::new(Cell::new(0));
        let sink = Rc::clone(&deleted);
        bus.deleted().subscribe(move |_| sink.set(sink.get() + 1));

        let mut store = MemoryBlobStore::new();
        store.save(SLOT, "").expect("seed");
        let mut system = SaveSystem::new(Box::new(store), bus, options());
        system.delete().expect("delete");
        assert_eq!(deleted.get(), 1);

        let mut document = PropertyDocument::new();
        let mut history = CommandHistory::new(10, Vec::new());
        assert_eq!(
            system.load(&mut document, &mut history).expect("load"),
            LoadOutcome::NoSaveData
        );
    }
}
