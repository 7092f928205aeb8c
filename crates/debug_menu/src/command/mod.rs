mod dispatcher;
mod history;

pub use dispatcher::{
    CommandDispatcher, CommandScope, ConnectionHandle, ConsoleExecutor, ControllerId,
    DispatchError, DispatchOutcome, NetMessage, NetworkTransport, TransportError,
};
pub use history::CommandHistory;
