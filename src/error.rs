//! The single error type for the core library. Every fatal condition in
//! script interpretation, engine state, or resource handling becomes one of
//! these variants; there is no recovery path, only a diagnostic line.

use thiserror::Error;

/// Script-line context, normalized so "no line available" is always -1
/// rather than Option juggling at every call site.
pub const NO_LINE: i32 = -1;

#[derive(Debug, Error)]
pub enum InfraredError {
    /// Malformed script, numeric overflow, invalid NMF note, bad CLI args.
    #[error("[{module}] input error at script line {script_line} (src {source_line}): {message}")]
    Input {
        module: &'static str,
        source_line: i32,
        script_line: i32,
        message: String,
    },

    /// Bank redefinition, assignment to a constant, invalid range, invalid
    /// pointer state for the requested operation, empty graph, non-ascending
    /// graph nodes.
    #[error(
        "[{module}] constraint violated at script line {script_line} (src {source_line}): {message}"
    )]
    Constraint {
        module: &'static str,
        source_line: i32,
        script_line: i32,
        message: String,
    },

    /// Any bounded capacity (§5) exceeded.
    #[error("[{module}] capacity exceeded at script line {script_line} (src {source_line}): {message}")]
    Capacity {
        module: &'static str,
        source_line: i32,
        script_line: i32,
        message: String,
    },

    /// Module used before init or after shutdown, or an accumulator that is
    /// already open / not open for the requested transition.
    #[error("[{module}] invalid state at script line {script_line} (src {source_line}): {message}")]
    State {
        module: &'static str,
        source_line: i32,
        script_line: i32,
        message: String,
    },

    /// Allocation failure, or I/O on the output or map file.
    #[error("[{module}] resource error at script line {script_line} (src {source_line}): {message}")]
    Resource {
        module: &'static str,
        source_line: i32,
        script_line: i32,
        message: String,
    },
}

impl InfraredError {
    pub fn input(module: &'static str, script_line: i32, message: impl Into<String>) -> Self {
        InfraredError::Input {
            module,
            source_line: NO_LINE,
            script_line,
            message: message.into(),
        }
    }

    pub fn constraint(module: &'static str, script_line: i32, message: impl Into<String>) -> Self {
        InfraredError::Constraint {
            module,
            source_line: NO_LINE,
            script_line,
            message: message.into(),
        }
    }

    pub fn capacity(module: &'static str, script_line: i32, message: impl Into<String>) -> Self {
        InfraredError::Capacity {
            module,
            source_line: NO_LINE,
            script_line,
            message: message.into(),
        }
    }

    pub fn state(module: &'static str, script_line: i32, message: impl Into<String>) -> Self {
        InfraredError::State {
            module,
            source_line: NO_LINE,
            script_line,
            message: message.into(),
        }
    }

    pub fn resource(module: &'static str, message: impl Into<String>) -> Self {
        InfraredError::Resource {
            module,
            source_line: NO_LINE,
            script_line: NO_LINE,
            message: message.into(),
        }
    }

    /// Attach a source (implementation-file) line, used by call sites that
    /// want `module + line!()` context; script_line is left as already set.
    pub fn with_source_line(mut self, line: i32) -> Self {
        match &mut self {
            InfraredError::Input { source_line, .. }
            | InfraredError::Constraint { source_line, .. }
            | InfraredError::Capacity { source_line, .. }
            | InfraredError::State { source_line, .. }
            | InfraredError::Resource { source_line, .. } => *source_line = line,
        }
        self
    }

    /// Conventional process exit code per error kind (§6 only mandates
    /// "non-zero"; this refinement is additive, see DESIGN.md).
    pub fn exit_code(&self) -> i32 {
        match self {
            InfraredError::Input { .. } | InfraredError::Constraint { .. } => 1,
            InfraredError::Capacity { .. } => 2,
            InfraredError::State { .. } => 3,
            InfraredError::Resource { .. } => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, InfraredError>;
