//! Exit codes following sysexits.h conventions.
//!
//! These codes let scripts tell a bad edit value apart from a backend that
//! is down.

use colored::Colorize;
use sunprint_core::SunprintError;

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: u8 = 1;

/// Command line usage or configuration error.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: u8 = 64;

/// A local precondition failed (bad edit value, product not ready).
/// Maps to EX_DATAERR from sysexits.h.
pub const VALIDATION_FAILED: u8 = 65;

/// Cannot open or decode the input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: u8 = 66;

/// Backend unreachable, or it rejected the request.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: u8 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: u8 = 74;

/// Represents an exit code with optional error context.
#[derive(Debug)]
pub struct ExitCode {
    pub code: u8,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    fn for_core(err: &SunprintError) -> u8 {
        match err {
            SunprintError::ValidationFailed(_) | SunprintError::Font(_) => VALIDATION_FAILED,
            SunprintError::Unreachable { .. }
            | SunprintError::RemoteRejected { .. }
            | SunprintError::PollExhausted { .. } => UNAVAILABLE,
            SunprintError::Decode(_) => INPUT_ERROR,
            SunprintError::Encode(_) => IO_ERROR,
            SunprintError::Config(_) => USAGE_ERROR,
            SunprintError::Cancelled => GENERAL_ERROR,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Engine errors carry their own category; otherwise classify by the
        // context attached at the call site.
        let code = match err.chain().find_map(|e| e.downcast_ref::<SunprintError>()) {
            Some(core) => Self::for_core(core),
            None if message.contains("Failed to read") => INPUT_ERROR,
            None if message.contains("Failed to write") => IO_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }

    /// Print the message, if any, to stderr.
    pub fn report(&self) {
        if let Some(message) = &self.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(exit: ExitCode) -> Self {
        std::process::ExitCode::from(exit.code)
    }
}
