// Dispatcher state machine
// Idle -> Resolving -> Running(unit) -> Terminated(status). One run per
// dispatcher; a second run is refused without touching any unit code.

use crate::registry::Registry;
use crate::resolve::{resolve, InvocationContext};
use crate::UNKNOWN_COMMAND_STATUS;
use log::{debug, info};
use thiserror::Error;
use unibox_diagnostics::fuzzy::find_similar_names;

/// A unit's initializer thunk
pub trait Initializer {
    fn initialize(&self);
}

/// A unit's entry point; the returned value is the process exit status
pub trait Entry {
    fn enter(&self, args: &[String]) -> i32;
}

impl<F: Fn()> Initializer for F {
    fn initialize(&self) {
        self()
    }
}

impl<F: Fn(&[String]) -> i32> Entry for F {
    fn enter(&self, args: &[String]) -> i32 {
        self(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Resolving,
    Running(String),
    Terminated(i32),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("{program}: unknown command `{name}`")]
    UnknownCommand {
        program: String,
        name: String,
        suggestions: Vec<String>,
    },
    #[error("dispatcher already ran in this process")]
    AlreadyDispatched,
}

impl DispatchError {
    pub fn exit_status(&self) -> i32 {
        match self {
            DispatchError::UnknownCommand { .. } => UNKNOWN_COMMAND_STATUS,
            DispatchError::AlreadyDispatched => 1,
        }
    }
}

pub struct Dispatcher<'r, I, E> {
    registry: &'r Registry<I, E>,
    program_name: String,
    state: DispatchState,
}

impl<'r, I: Initializer, E: Entry> Dispatcher<'r, I, E> {
    pub fn new(program_name: &str, registry: &'r Registry<I, E>) -> Self {
        Self {
            registry,
            program_name: program_name.to_string(),
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    /// Runs the requested unit's initializer, then its entry, and returns
    /// the entry's status
    pub fn run(&mut self, ctx: &InvocationContext) -> Result<i32, DispatchError> {
        if self.state != DispatchState::Idle {
            return Err(DispatchError::AlreadyDispatched);
        }

        self.state = DispatchState::Resolving;
        let Some(resolution) = resolve(ctx, &self.program_name, self.registry) else {
            let name = ctx.requested_name(&self.program_name);
            let known: Vec<&str> = self.registry.names().collect();
            let suggestions = find_similar_names(&name, &known, 0.8, 3);
            debug!("no command registered as `{}`", name);
            self.state = DispatchState::Terminated(UNKNOWN_COMMAND_STATUS);
            return Err(DispatchError::UnknownCommand {
                program: self.program_name.clone(),
                name,
                suggestions,
            });
        };

        let Some(entry) = self.registry.get(&resolution.unit) else {
            self.state = DispatchState::Terminated(UNKNOWN_COMMAND_STATUS);
            return Err(DispatchError::UnknownCommand {
                program: self.program_name.clone(),
                name: resolution.unit,
                suggestions: Vec::new(),
            });
        };

        info!("dispatching `{}` ({:?})", resolution.unit, resolution.via);
        self.state = DispatchState::Running(resolution.unit);
        entry.init.initialize();
        let status = entry.entry.enter(&resolution.args);

        self.state = DispatchState::Terminated(status);
        Ok(status)
    }

    /// Like `run`, but folds errors into an exit status after reporting
    /// them on stderr
    pub fn run_to_status(&mut self, ctx: &InvocationContext) -> i32 {
        match self.run(ctx) {
            Ok(status) => status,
            Err(err) => {
                eprintln!("{}", err);
                if let DispatchError::UnknownCommand { suggestions, .. } = &err {
                    if !suggestions.is_empty() {
                        eprintln!("did you mean `{}`?", suggestions.join("`, `"));
                    }
                }
                err.exit_status()
            }
        }
    }
}
