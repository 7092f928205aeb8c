pub mod access;
pub mod command;
pub mod input;
pub mod notify;
pub mod persistence;
pub mod registry;
pub mod session;
pub mod settings;
pub mod value;

pub use access::{AccessError, ObjectHandle, ObjectPropertyAccess, PropertyTable};
pub use command::{
    CommandDispatcher, CommandHistory, CommandScope, ConnectionHandle, ConsoleExecutor,
    ControllerId, DispatchError, DispatchOutcome, NetMessage, NetworkTransport, TransportError,
};
pub use input::{
    ActionStates, FocusCandidate, GamepadButton, InputBindings, InputEvent, InputFocusArbiter,
    MenuAction, RepeatPolicy, RepeatTimer, TickReport, TimerStep, ACTION_COUNT,
    DEFAULT_REPEAT_ACTIONS, ROOT_CONTEXT,
};
pub use notify::{
    ChangeEvent, ChangeNotificationBus, Channel, CommandExecuted, FunctionExecuted,
    InputTargetChanged, LanguageChanged, SaveLifecycle, ScreenshotProcessed, ScreenshotRequested,
    SubscriptionId,
};
pub use persistence::{
    BlobStore, BlobStoreError, DocumentError, FavoriteEntry, FileBlobStore, LoadOutcome,
    MemoryBlobStore, PropertyDocument, SaveError, SaveOptions, SaveSystem, COMMAND_HISTORY_KEY,
    DOCUMENT_VERSION,
};
pub use registry::{PropertyRegistry, RegistryError, WatchedPropertyId};
pub use session::{DebugMenuSession, SessionCollaborators, MENU_CONTEXT};
pub use settings::{DebugMenuSettings, SettingsError};
pub use value::{PropertyKind, PropertyValue, Rotator, Vector2, Vector3};
