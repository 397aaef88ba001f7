//! The capability interface the rest of the crate uses to reach the print spooler.
//!
//! Everything above this module is written against [`Spooler`]. The production
//! binding lives in [`win32`]; [`memory`] holds fixtures in process memory.

use std::fmt::Debug;

use crate::error::OsError;
use crate::records::models::FormDescriptor;

pub mod memory;
#[cfg(windows)]
pub mod win32;

pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_INVALID_PRINTER_NAME: u32 = 1801;
pub const ERROR_INVALID_FORM_NAME: u32 = 1902;

/// Rights requested when opening a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Use,
    /// Needed to add, delete or select forms.
    Administer,
}

/// What a buffered query asks the spooler for. Each variant fills the buffer
/// with records of one fixed layout (see [`crate::records::layout`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<H> {
    /// One NUL-terminated wide string.
    DefaultPrinter,
    /// Level 5 printer records for local printers and connections.
    Printers,
    /// Level 2 printer record of an open printer.
    Details(H),
    /// Level 1 job records.
    Jobs(H),
    /// Level 1 form records.
    Forms(H),
    /// Level 8 driver record.
    Driver(H),
}

impl<H> Target<H> {
    pub fn operation(&self) -> &'static str {
        match self {
            Target::DefaultPrinter => "GetDefaultPrinter",
            Target::Printers => "EnumPrinters",
            Target::Details(_) => "GetPrinter",
            Target::Jobs(_) => "EnumJobs",
            Target::Forms(_) => "EnumForms",
            Target::Driver(_) => "GetPrinterDriver",
        }
    }
}

/// Why a single buffered query call did not fill the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// The buffer was too small; the spooler needs `required` bytes.
    InsufficientBuffer { required: usize },
    Os(OsError),
}

impl From<OsError> for QueryFailure {
    fn from(err: OsError) -> Self {
        QueryFailure::Os(err)
    }
}

/// The native operations of the print spooler.
///
/// Implementations do no state checking of their own; ordering is enforced by
/// [`crate::session::PrinterSession`]. A handle must not be used from two
/// threads at once.
pub trait Spooler {
    type Handle: Copy + Debug;

    /// Fills `buffer` with the records for `target` and returns how many were
    /// written. Embedded text references are absolute addresses inside `buffer`.
    fn enumerate(&self, target: Target<Self::Handle>, buffer: &mut [u8]) -> Result<u32, QueryFailure>;

    fn set_default_printer(&self, name: &str) -> Result<(), OsError>;

    fn open(&self, name: &str, access: Access) -> Result<Self::Handle, OsError>;

    fn close(&self, handle: Self::Handle) -> Result<(), OsError>;

    /// Returns the job id the spooler assigned to the document.
    fn start_document(&self, handle: Self::Handle, name: &str, datatype: &str) -> Result<u32, OsError>;

    fn start_page(&self, handle: Self::Handle) -> Result<(), OsError>;

    /// Returns how many bytes the spooler accepted.
    fn write(&self, handle: Self::Handle, bytes: &[u8]) -> Result<usize, OsError>;

    fn end_page(&self, handle: Self::Handle) -> Result<(), OsError>;

    fn end_document(&self, handle: Self::Handle) -> Result<(), OsError>;

    fn add_form(&self, handle: Self::Handle, form: &FormDescriptor) -> Result<(), OsError>;

    fn delete_form(&self, handle: Self::Handle, name: &str) -> Result<(), OsError>;

    /// Makes `form` the default paper form of printer `printer`.
    fn set_default_form(&self, handle: Self::Handle, printer: &str, form: &str) -> Result<(), OsError>;
}
