// Invocation resolution: which registered unit did the caller ask for?

use crate::registry::Registry;
use std::path::Path;

/// What the process was started with
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationContext {
    pub argv: Vec<String>,
}

impl InvocationContext {
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::args())
    }

    /// Base name the program was invoked under
    pub fn invoked_name(&self) -> Option<String> {
        self.argv.first().map(|arg| base_name(arg))
    }

    /// True when argv[0] is the multiplexer `program` itself
    pub fn is_multiplexer(&self, program: &str) -> bool {
        self.invoked_name().as_deref() == Some(program)
    }

    /// The name reported when nothing resolves: the first positional
    /// argument under the multiplexer name, the invocation name otherwise
    pub fn requested_name(&self, program: &str) -> String {
        let arg = if self.is_multiplexer(program) {
            self.argv.get(1).or_else(|| self.argv.first())
        } else {
            self.argv.first()
        };
        arg.map(|arg| base_name(arg)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    /// argv[0] named the unit (symlink style)
    InvocationName,
    /// argv[1] named the unit under a multiplexer name
    FirstArgument,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub unit: String,
    /// Arguments after the unit name, forwarded unchanged
    pub args: Vec<String>,
    pub via: ResolvedVia,
}

/// argv[0] first; argv[1] only when argv[0] is the multiplexer `program`
pub fn resolve<I, E>(
    ctx: &InvocationContext,
    program: &str,
    registry: &Registry<I, E>,
) -> Option<Resolution> {
    let invoked = ctx.invoked_name()?;
    if registry.contains(&invoked) {
        return Some(Resolution {
            unit: invoked,
            args: ctx.argv.iter().skip(1).cloned().collect(),
            via: ResolvedVia::InvocationName,
        });
    }

    if invoked != program {
        return None;
    }
    let requested = base_name(ctx.argv.get(1)?);
    if registry.contains(&requested) {
        return Some(Resolution {
            unit: requested,
            args: ctx.argv.iter().skip(2).cloned().collect(),
            via: ResolvedVia::FirstArgument,
        });
    }

    None
}

fn base_name(arg: &str) -> String {
    Path::new(arg)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| arg.to_string())
}
