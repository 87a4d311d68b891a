//! Runtime side of a merged program: the immutable command registry and the
//! dispatcher that selects and runs exactly one unit per process.

pub mod dispatcher;
pub mod manifest;
pub mod registry;
pub mod resolve;

pub use dispatcher::{DispatchError, DispatchState, Dispatcher, Entry, Initializer};
pub use manifest::{EntryRef, ProgramManifest, ThunkRef};
pub use registry::{Registry, RegistryBuilder, RegistryEntry, RegistryError};
pub use resolve::{resolve, InvocationContext, Resolution, ResolvedVia};

/// Exit status of a process whose requested command is not registered
pub const UNKNOWN_COMMAND_STATUS: i32 = 127;

/// Registry of in-process commands, as used by tests and embedders
pub type CommandRegistry = Registry<Box<dyn Fn()>, Box<dyn Fn(&[String]) -> i32>>;
