use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::history::CommandHistory;
use crate::notify::{ChangeNotificationBus, CommandExecuted};

/// A player-controller context that console commands run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub u32);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub id: u32,
    pub controller: ControllerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandScope {
    LocalOnly,
    ServerAll,
}

/// Payloads exchanged with the authority. Encoding is up to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetMessage {
    ExecuteRequest { command: String, all_clients: bool },
    ExecuteOnClient { command: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Runs one console command against one controller and returns its output.
pub trait ConsoleExecutor {
    fn execute(&mut self, command: &str, target: ControllerId) -> Result<String, String>;
}

pub trait NetworkTransport {
    fn is_local_authority(&self) -> bool;

    fn local_controller(&self) -> Option<ControllerId>;

    /// Connections in a stable order; the authority broadcasts in this order.
    fn enumerate_connections(&self) -> Vec<ConnectionHandle>;

    fn is_connection_live(&self, connection: ConnectionHandle) -> bool;

    fn send_to_authority(&mut self, message: NetMessage) -> Result<(), TransportError>;

    fn send_to_connection(
        &mut self,
        connection: ConnectionHandle,
        message: NetMessage,
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("console command is empty")]
    EmptyCommand,
    #[error("no local controller to run the command against")]
    NoLocalController,
    #[error("only the authority may serve execute requests")]
    NotAuthority,
    #[error("command '{command}' failed on {target}: {reason}")]
    Execute {
        command: String,
        target: ControllerId,
        reason: String,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed { target: ControllerId },
    Broadcast { executed: usize, skipped: usize },
    ForwardedToAuthority,
    SentToClient { connection: ConnectionHandle },
}

/// Resolves a command plus a scope into local execution, a broadcast from
/// the authority, or a single forwarded request.
pub struct CommandDispatcher {
    executor: Box<dyn ConsoleExecutor>,
    transport: Box<dyn NetworkTransport>,
    bus: Rc<ChangeNotificationBus>,
    history: CommandHistory,
}

impl CommandDispatcher {
    pub fn new(
        executor: Box<dyn ConsoleExecutor>,
        transport: Box<dyn NetworkTransport>,
        bus: Rc<ChangeNotificationBus>,
        history: CommandHistory,
    ) -> Self {
        Self {
            executor,
            transport,
            bus,
            history,
        }
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    pub fn is_local_authority(&self) -> bool {
        self.transport.is_local_authority()
    }

    pub fn dispatch(
        &mut self,
        command: &str,
        scope: CommandScope,
    ) -> Result<DispatchOutcome, DispatchError> {
        validate(command, "dispatch")?;

        match scope {
            CommandScope::LocalOnly => {
                let target = self
                    .transport
                    .local_controller()
                    .ok_or(DispatchError::NoLocalController)?;
                self.execute_on(command, target)?;
                Ok(DispatchOutcome::Executed { target })
            }
            CommandScope::ServerAll if self.transport.is_local_authority() => {
                Ok(self.broadcast(command))
            }
            CommandScope::ServerAll => {
                self.transport.send_to_authority(NetMessage::ExecuteRequest {
                    command: command.to_string(),
                    all_clients: true,
                })?;
                debug!(command, "command_forwarded_to_authority");
                Ok(DispatchOutcome::ForwardedToAuthority)
            }
        }
    }

    /// Authority side of an `ExecuteRequest`.
    pub fn handle_authority_request(
        &mut self,
        from: ConnectionHandle,
        command: &str,
        all_clients: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        validate(command, "authority_request")?;
        if !self.transport.is_local_authority() {
            warn!(connection = from.id, command, "command_request_without_authority");
            return Err(DispatchError::NotAuthority);
        }

        if all_clients {
            return Ok(self.broadcast(command));
        }

        self.transport.send_to_connection(
            from,
            NetMessage::ExecuteOnClient {
                command: command.to_string(),
            },
        )?;
        Ok(DispatchOutcome::SentToClient { connection: from })
    }

    /// Client side of an `ExecuteOnClient`.
    pub fn handle_client_callback(&mut self, command: &str) -> Result<DispatchOutcome, DispatchError> {
        validate(command, "client_callback")?;
        let target = self
            .transport
            .local_controller()
            .ok_or(DispatchError::NoLocalController)?;
        self.execute_on(command, target)?;
        Ok(DispatchOutcome::Executed { target })
    }

    /// Routes an incoming message to the matching entry point.
    pub fn receive(
        &mut self,
        from: ConnectionHandle,
        message: NetMessage,
    ) -> Result<DispatchOutcome, DispatchError> {
        match message {
            NetMessage::ExecuteRequest {
                command,
                all_clients,
            } => self.handle_authority_request(from, &command, all_clients),
            NetMessage::ExecuteOnClient { command } => self.handle_client_callback(&command),
        }
    }

    fn broadcast(&mut self, command: &str) -> DispatchOutcome {
        let mut executed = 0;
        let mut skipped = 0;
        for connection in self.transport.enumerate_connections() {
            if !self.transport.is_connection_live(connection) {
                debug!(connection = connection.id, "command_broadcast_skipped_dead_connection");
                skipped += 1;
                continue;
            }
            match self.execute_on(command, connection.controller) {
                Ok(()) => executed += 1,
                Err(error) => {
                    warn!(connection = connection.id, %error, "command_broadcast_execute_failed");
                    skipped += 1;
                }
            }
        }
        info!(command, executed, skipped, "command_broadcast");
        DispatchOutcome::Broadcast { executed, skipped }
    }

    fn execute_on(&mut self, command: &str, target: ControllerId) -> Result<(), DispatchError> {
        let output = self
            .executor
            .execute(command, target)
            .map_err(|reason| DispatchError::Execute {
                command: command.to_string(),
                target,
                reason,
            })?;
        debug!(command, target = %target, output = output.as_str(), "command_executed");

        self.history.record(command);
        self.bus.command_executed().publish(&CommandExecuted {
            command: command.to_string(),
            target,
        });
        Ok(())
    }
}

fn validate(command: &str, entry: &'static str) -> Result<(), DispatchError> {
    if command.trim().is_empty() {
        warn!(entry, "command_dispatch_rejected_empty");
        return Err(DispatchError::EmptyCommand);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;

    type Log = Rc<RefCell<Vec<(String, ControllerId)>>>;

    struct RecordingExecutor {
        log: Log,
        fail_on: Option<ControllerId>,
    }

    impl ConsoleExecutor for RecordingExecutor {
        fn execute(&mut self, command: &str, target: ControllerId) -> Result<String, String> {
            if self.fail_on == Some(target) {
                return Err("controller busy".to_string());
            }
            self.log.borrow_mut().push((command.to_string(), target));
            Ok(String::new())
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        authority: bool,
        local: Option<ControllerId>,
        connections: Vec<ConnectionHandle>,
        dead: HashSet<u32>,
        to_authority: Rc<RefCell<Vec<NetMessage>>>,
        to_clients: Rc<RefCell<Vec<(u32, NetMessage)>>>,
    }

    impl NetworkTransport for ScriptedTransport {
        fn is_local_authority(&self) -> bool {
            self.authority
        }

        fn local_controller(&self) -> Option<ControllerId> {
            self.local
        }

        fn enumerate_connections(&self) -> Vec<ConnectionHandle> {
            self.connections.clone()
        }

        fn is_connection_live(&self, connection: ConnectionHandle) -> bool {
            !self.dead.contains(&connection.id)
        }

        fn send_to_authority(&mut self, message: NetMessage) -> Result<(), TransportError> {
            self.to_authority.borrow_mut().push(message);
            Ok(())
        }

        fn send_to_connection(
            &mut self,
            connection: ConnectionHandle,
            message: NetMessage,
        ) -> Result<(), TransportError> {
            self.to_clients.borrow_mut().push((connection.id, message));
            Ok(())
        }
    }

    fn connection(id: u32) -> ConnectionHandle {
        ConnectionHandle {
            id,
            controller: ControllerId(id * 10),
        }
    }

    fn dispatcher(transport: ScriptedTransport, log: &Log) -> CommandDispatcher {
        CommandDispatcher::new(
            Box::new(RecordingExecutor {
                log: Rc::clone(log),
                fail_on: None,
            }),
            Box::new(transport),
            Rc::new(ChangeNotificationBus::new()),
            CommandHistory::new(100, vec!["stat ".to_string()]),
        )
    }

    #[test]
    fn local_only_runs_once_against_caller() {
        let log = Log::default();
        let transport = ScriptedTransport {
            local: Some(ControllerId(1)),
            connections: vec![connection(1), connection(2)],
            ..ScriptedTransport::default()
        };
        let sent = Rc::clone(&transport.to_authority);
        let mut dispatcher = dispatcher(transport, &log);

        let outcome = dispatcher
            .dispatch("god", CommandScope::LocalOnly)
            .expect("dispatch");
        assert_eq!(
            outcome,
            DispatchOutcome::Executed {
                target: ControllerId(1)
            }
        );
        assert_eq!(*log.borrow(), vec![("god".to_string(), ControllerId(1))]);
        assert!(sent.borrow().is_empty());
        assert_eq!(dispatcher.history().to_vec(), vec!["god"]);
    }

    #[test]
    fn authority_broadcast_follows_enumeration_and_skips_dead() {
        let log = Log::default();
        let transport = ScriptedTransport {
            authority: true,
            local: Some(ControllerId(10)),
            connections: vec![connection(3), connection(1), connection(2)],
            dead: HashSet::from([1]),
            ..ScriptedTransport::default()
        };
        let mut dispatcher = dispatcher(transport, &log);

        let outcome = dispatcher
            .dispatch("slomo 0.5", CommandScope::ServerAll)
            .expect("dispatch");
        assert_eq!(
            outcome,
            DispatchOutcome::Broadcast {
                executed: 2,
                skipped: 1
            }
        );
        let targets: Vec<ControllerId> = log.borrow().iter().map(|(_, target)| *target).collect();
        assert_eq!(targets, vec![ControllerId(30), ControllerId(20)]);
    }

    #[test]
    fn remote_server_all_only_forwards() {
        let log = Log::default();
        let transport = ScriptedTransport {
            local: Some(ControllerId(1)),
            connections: vec![connection(1)],
            ..ScriptedTransport::default()
        };
        let sent = Rc::clone(&transport.to_authority);
        let mut dispatcher = dispatcher(transport, &log);

        let outcome = dispatcher
            .dispatch("ghost", CommandScope::ServerAll)
            .expect("dispatch");
        assert_eq!(outcome, DispatchOutcome::ForwardedToAuthority);
        assert!(log.borrow().is_empty());
        assert_eq!(
            *sent.borrow(),
            vec![NetMessage::ExecuteRequest {
                command: "ghost".to_string(),
                all_clients: true
            }]
        );
    }

    #[test]
    fn empty_command_rejected_on_every_entry_point() {
        for authority in [false, true] {
            let log = Log::default();
            let transport = ScriptedTransport {
                authority,
                local: Some(ControllerId(1)),
                connections: vec![connection(1)],
                ..ScriptedTransport::default()
            };
            let sent = Rc::clone(&transport.to_authority);
            let mut dispatcher = dispatcher(transport, &log);

            for scope in [CommandScope::LocalOnly, CommandScope::ServerAll] {
                assert_eq!(
                    dispatcher.dispatch("  ", scope),
                    Err(DispatchError::EmptyCommand)
                );
            }
            assert_eq!(
                dispatcher.handle_authority_request(connection(1), "", true),
                Err(DispatchError::EmptyCommand)
            );
            assert_eq!(
                dispatcher.handle_client_callback(""),
                Err(DispatchError::EmptyCommand)
            );
            assert!(log.borrow().is_empty());
            assert!(sent.borrow().is_empty());
        }
    }

    #[test]
    fn authority_request_for_one_client_answers_sender() {
        let log = Log::default();
        let transport = ScriptedTransport {
            authority: true,
            connections: vec![connection(1), connection(2)],
            ..ScriptedTransport::default()
        };
        let replies = Rc::clone(&transport.to_clients);
        let mut dispatcher = dispatcher(transport, &log);

        let outcome = dispatcher
            .receive(
                connection(2),
                NetMessage::ExecuteRequest {
                    command: "fly".to_string(),
                    all_clients: false,
                },
            )
            .expect("receive");
        assert_eq!(
            outcome,
            DispatchOutcome::SentToClient {
                connection: connection(2)
            }
        );
        assert_eq!(
            *replies.borrow(),
            vec![(
                2,
                NetMessage::ExecuteOnClient {
                    command: "fly".to_string()
                }
            )]
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn authority_request_for_all_clients_broadcasts() {
        let log = Log::default();
        let transport = ScriptedTransport {
            authority: true,
            connections: vec![connection(1), connection(2), connection(3)],
            dead: HashSet::from([3]),
            ..ScriptedTransport::default()
        };
        let replies = Rc::clone(&transport.to_clients);
        let mut dispatcher = dispatcher(transport, &log);

        let outcome = dispatcher
            .receive(
                connection(2),
                NetMessage::ExecuteRequest {
                    command: "ghost".to_string(),
                    all_clients: true,
                },
            )
            .expect("receive");
        assert_eq!(
            outcome,
            DispatchOutcome::Broadcast {
                executed: 2,
                skipped: 1
            }
        );
        assert_eq!(
            *log.borrow(),
            vec![
                ("ghost".to_string(), ControllerId(10)),
                ("ghost".to_string(), ControllerId(20)),
            ]
        );
        assert!(replies.borrow().is_empty());
        assert_eq!(dispatcher.history().to_vec(), vec!["ghost", "ghost"]);
    }

    #[test]
    fn non_authority_refuses_requests() {
        let log = Log::default();
        let mut dispatcher = dispatcher(ScriptedTransport::default(), &log);
        assert_eq!(
            dispatcher.handle_authority_request(connection(1), "god", true),
            Err(DispatchError::NotAuthority)
        );
    }

    #[test]
    fn failed_execution_is_not_recorded() {
        let log = Log::default();
        let bus = Rc::new(ChangeNotificationBus::new());
        let executed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&executed);
        bus.command_executed()
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let mut dispatcher = CommandDispatcher::new(
            Box::new(RecordingExecutor {
                log: Rc::clone(&log),
                fail_on: Some(ControllerId(1)),
            }),
            Box::new(ScriptedTransport {
                local: Some(ControllerId(1)),
                ..ScriptedTransport::default()
            }),
            bus,
            CommandHistory::new(10, Vec::new()),
        );

        assert!(matches!(
            dispatcher.dispatch("god", CommandScope::LocalOnly),
            Err(DispatchError::Execute { .. })
        ));
        assert!(dispatcher.history().is_empty());
        assert!(executed.borrow().is_empty());
    }

    #[test]
    fn net_message_is_tagged_json() {
        let message = NetMessage::ExecuteRequest {
            command: "god".to_string(),
            all_clients: true,
        };
        let text = serde_json::to_string(&message).expect("encode");
        assert_eq!(
            text,
            r#"{"type":"execute_request","command":"god","all_clients":true}"#
        );
        let back: NetMessage = serde_json::from_str(&text).expect("decode");
        assert_eq!(back, message);
    }
}
