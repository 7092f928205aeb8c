use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use debug_menu::{
    ConnectionHandle, ConsoleExecutor, ControllerId, FocusCandidate, InputEvent, MenuAction,
    NetMessage, NetworkTransport, ObjectHandle, PropertyTable, PropertyValue, TransportError,
    Vector3,
};
use tracing::{debug, info};

pub(crate) const PLAYER_KEY: &str = "Player";

/// Host objects the menu edits.
pub(crate) struct DemoWorld {
    pub(crate) table: Rc<PropertyTable>,
    pub(crate) player: ObjectHandle,
}

pub(crate) fn build_world() -> DemoWorld {
    let table = Rc::new(PropertyTable::new());
    let player = table.spawn("player");
    table.define(player, "Health", PropertyValue::Int(100));
    table.define(player, "MoveSpeed", PropertyValue::Float(5.0));
    table.define(player, "GodMode", PropertyValue::Bool(false));
    table.define(player, "Location", PropertyValue::Vector3(Vector3::default()));
    table.define_read_only(player, "Name", PropertyValue::String("Hero".to_string()));
    table.define_function(player, "Respawn", move || info!("player_respawned"));
    DemoWorld { table, player }
}

/// Console stand-in that accepts every command.
pub(crate) struct LoggingExecutor;

impl ConsoleExecutor for LoggingExecutor {
    fn execute(&mut self, command: &str, target: ControllerId) -> Result<String, String> {
        info!(command, %target, "console_command_ran");
        Ok(String::new())
    }
}

/// Single-process session: this side is the authority and the only
/// controller is the local one.
pub(crate) struct LoopbackTransport {
    connections: Vec<ConnectionHandle>,
}

impl LoopbackTransport {
    pub(crate) fn new() -> Self {
        Self {
            connections: vec![ConnectionHandle {
                id: 0,
                controller: ControllerId(0),
            }],
        }
    }
}

impl NetworkTransport for LoopbackTransport {
    fn is_local_authority(&self) -> bool {
        true
    }

    fn local_controller(&self) -> Option<ControllerId> {
        Some(ControllerId(0))
    }

    fn enumerate_connections(&self) -> Vec<ConnectionHandle> {
        self.connections.clone()
    }

    fn is_connection_live(&self, connection: ConnectionHandle) -> bool {
        self.connections.contains(&connection)
    }

    fn send_to_authority(&mut self, message: NetMessage) -> Result<(), TransportError> {
        Err(TransportError(format!(
            "loopback is already the authority, dropped {message:?}"
        )))
    }

    fn send_to_connection(
        &mut self,
        connection: ConnectionHandle,
        message: NetMessage,
    ) -> Result<(), TransportError> {
        debug!(connection = connection.id, ?message, "loopback_sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowIntent {
    Heal,
    ToggleGodMode,
    Respawn,
    SaveNow,
}

/// One selectable line of the menu. Decisions are queued and applied by the
/// loop after the input tick.
pub(crate) struct MenuRow {
    label: &'static str,
    intent: RowIntent,
    queue: Rc<RefCell<VecDeque<RowIntent>>>,
}

impl MenuRow {
    pub(crate) fn new(
        label: &'static str,
        intent: RowIntent,
        queue: &Rc<RefCell<VecDeque<RowIntent>>>,
    ) -> Self {
        Self {
            label,
            intent,
            queue: Rc::clone(queue),
        }
    }
}

impl FocusCandidate for MenuRow {
    fn on_input(&self, event: InputEvent) {
        if let InputEvent::Triggered {
            action: MenuAction::Decide,
            ..
        } = event
        {
            info!(row = self.label, "menu_row_decided");
            self.queue.borrow_mut().push_back(self.intent);
        }
    }
}
