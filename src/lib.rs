//! Windows print spooler access.
//!
//! - Lists printers, jobs, paper forms and driver information
//! - Sends raw documents through a [`session::PrinterSession`]
//! - Adds and removes custom paper forms
//!
//! Every native call goes through the [`spooler::Spooler`] trait. On Windows
//! [`spooler::win32::WinSpooler`] talks to winspool; [`spooler::memory::MemorySpooler`]
//! keeps everything in process memory.

pub mod app;
pub mod cli;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod forms;
pub mod printers;
pub mod records;
pub mod session;
pub mod spooler;
pub mod status;

pub use error::{OsError, PrintError, SessionState};
pub use forms::{add_custom_form, delete_custom_form, CustomForm};
pub use records::models::{DriverDescriptor, FormDescriptor, JobDescriptor, PrinterDescriptor, PrinterDetails};
pub use session::PrinterSession;
pub use spooler::Spooler;
