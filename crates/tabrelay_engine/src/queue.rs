use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tabrelay_core::{Command, CommandId};

use crate::correlator::{CommandSink, DeliveryError};

/// Outbound queue for agents that poll for work over HTTP.
///
/// Each command is handed out exactly once.
#[derive(Default)]
pub struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn commands(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the oldest undelivered command.
    pub fn next_command(&self) -> Option<Command> {
        self.commands().pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands().is_empty()
    }
}

impl CommandSink for CommandQueue {
    fn deliver(&self, command: Command) -> Result<(), DeliveryError> {
        self.commands().push_back(command);
        Ok(())
    }

    fn withdraw(&self, id: CommandId) {
        self.commands().retain(|command| command.id != id);
    }
}
