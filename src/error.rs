use std::fmt::{Display, Formatter};

use snafu::Snafu;

// ////// //
// Errors //
// ////// //

/// A native spooler call that did not do what was asked.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OsError {
    #[snafu(display("{message}"))]
    Code { code: u32, message: String },

    #[snafu(display("only {written} of {requested} bytes were written to the printer"))]
    ShortWrite { requested: usize, written: usize },
}

impl OsError {
    /// Captures the calling thread's last OS error.
    pub fn last() -> Self {
        let err = std::io::Error::last_os_error();
        OsError::Code {
            code: err.raw_os_error().unwrap_or_default() as u32,
            message: err.to_string(),
        }
    }

    pub fn from_code(code: u32, message: impl Into<String>) -> Self {
        OsError::Code { code, message: message.into() }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            OsError::Code { code, .. } => Some(*code),
            OsError::ShortWrite { .. } => None,
        }
    }
}

/// Where a [`crate::session::PrinterSession`] is in its document lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DocumentOpen,
    PageOpen,
    Closed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::DocumentOpen => "inside a document",
            SessionState::PageOpen => "inside a page",
            SessionState::Closed => "closed",
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PrintError {
    #[snafu(display("{what} {name:?} was not found"))]
    NotFound { what: &'static str, name: String },

    #[snafu(display("{message}"))]
    InvalidArgument { message: String },

    #[snafu(display("{operation}: buffer size did not converge (tried {attempted} bytes, spooler asked for {required})"))]
    BufferProtocolViolation {
        operation: &'static str,
        attempted: usize,
        required: usize,
    },

    // The OS text is surfaced as is; `operation` is kept for logging.
    #[snafu(display("{source}"))]
    OsOperationFailed { operation: &'static str, source: OsError },

    #[snafu(display("{operation} is not allowed while the printer session is {state}"))]
    InvalidState { operation: &'static str, state: SessionState },

    #[snafu(display("{operation}: malformed record data: {reason}"))]
    MalformedRecord { operation: &'static str, reason: String },
}

impl PrintError {
    /// Bytes accepted by the printer before a partial write was reported.
    pub fn written(&self) -> Option<usize> {
        match self {
            PrintError::OsOperationFailed { source: OsError::ShortWrite { written, .. }, .. } => Some(*written),
            _ => None,
        }
    }

    pub fn os_code(&self) -> Option<u32> {
        match self {
            PrintError::OsOperationFailed { source, .. } => source.code(),
            _ => None,
        }
    }
}

pub type Result<T, E = PrintError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_failure_displays_the_os_text_only() {
        let err = PrintError::OsOperationFailed {
            operation: "EnumPrinters",
            source: OsError::from_code(5, "Access is denied."),
        };
        assert_eq!(err.to_string(), "Access is denied.");
        assert_eq!(err.os_code(), Some(5));
        assert_eq!(err.written(), None);
    }

    #[test]
    fn short_write_carries_the_written_count() {
        let err = PrintError::OsOperationFailed {
            operation: "WritePrinter",
            source: OsError::ShortWrite { requested: 10, written: 4 },
        };
        assert_eq!(err.written(), Some(4));
        assert_eq!(err.os_code(), None);
        assert!(err.to_string().contains("4 of 10"));
    }

    #[test]
    fn invalid_state_names_the_state() {
        let err = PrintError::InvalidState { operation: "StartPage", state: SessionState::PageOpen };
        assert_eq!(err.to_string(), "StartPage is not allowed while the printer session is inside a page");
    }
}
