//! One open printer and the document/page state machine driven through it.

use log::{debug, info, warn};
use snafu::{ensure, ResultExt};

use crate::enumerator;
use crate::error::{
    InvalidStateSnafu, NotFoundSnafu, OsError, OsOperationFailedSnafu, PrintError, Result, SessionState,
};
use crate::records::decode;
use crate::records::models::{DriverDescriptor, FormDescriptor, JobDescriptor, PrinterDetails};
use crate::spooler::{Access, Spooler, Target, ERROR_INVALID_PRINTER_NAME};

pub const DATATYPE_RAW: &str = "RAW";
pub const DATATYPE_XPS_PASS: &str = "XPS_PASS";

/// Owns one printer handle.
///
/// Legal call order is `open, (start_document, (start_page, write*, end_page)*,
/// end_document)*, close`. Anything else fails with
/// [`PrintError::InvalidState`]. Dropping a session ends any open page and
/// document and closes the handle, logging failures instead of returning them.
pub struct PrinterSession<'s, S: Spooler> {
    spooler: &'s S,
    name: String,
    handle: Option<S::Handle>,
    state: SessionState,
    job_id: Option<u32>,
}

impl<'s, S: Spooler> PrinterSession<'s, S> {
    pub fn open(spooler: &'s S, name: &str) -> Result<Self> {
        Self::open_with_access(spooler, name, Access::Use)
    }

    pub fn open_with_access(spooler: &'s S, name: &str, access: Access) -> Result<Self> {
        let handle = match spooler.open(name, access) {
            Ok(handle) => handle,
            Err(err) if err.code() == Some(ERROR_INVALID_PRINTER_NAME) => {
                return NotFoundSnafu { what: "printer", name }.fail();
            }
            Err(err) => return Err(err).context(OsOperationFailedSnafu { operation: "OpenPrinter" }),
        };
        debug!("Opened printer {name:?} ({access:?}) as {handle:?}");
        Ok(Self {
            spooler,
            name: name.to_string(),
            handle: Some(handle),
            state: SessionState::Idle,
            job_id: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Job id of the document in progress.
    pub fn job_id(&self) -> Option<u32> {
        self.job_id
    }

    /// Releases the handle. Only allowed while idle; calling it again after a
    /// successful close does nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        ensure!(
            self.state == SessionState::Idle,
            InvalidStateSnafu { operation: "ClosePrinter", state: self.state }
        );
        // The handle is gone whatever the spooler answers.
        self.handle = None;
        self.state = SessionState::Closed;
        self.spooler
            .close(handle)
            .context(OsOperationFailedSnafu { operation: "ClosePrinter" })?;
        debug!("Closed printer {:?}", self.name);
        Ok(())
    }

    /// Starts a document and returns its job id.
    pub fn start_document(&mut self, name: &str, datatype: &str) -> Result<u32> {
        let handle = self.expect_state("StartDocPrinter", SessionState::Idle)?;
        let job_id = self
            .spooler
            .start_document(handle, name, datatype)
            .context(OsOperationFailedSnafu { operation: "StartDocPrinter" })?;
        info!("Started {datatype} document {name:?} on {:?} as job {job_id}", self.name);
        self.state = SessionState::DocumentOpen;
        self.job_id = Some(job_id);
        Ok(job_id)
    }

    /// Starts a document whose bytes go to the printer untouched, using
    /// `XPS_PASS` for XPS-based drivers and `RAW` otherwise.
    pub fn start_raw_document(&mut self, name: &str) -> Result<u32> {
        self.expect_state("StartDocPrinter", SessionState::Idle)?;
        let driver = self.driver_info()?;
        let datatype = if driver.is_xps() { DATATYPE_XPS_PASS } else { DATATYPE_RAW };
        self.start_document(name, datatype)
    }

    pub fn start_page(&mut self) -> Result<()> {
        let handle = self.expect_state("StartPagePrinter", SessionState::DocumentOpen)?;
        self.spooler
            .start_page(handle)
            .context(OsOperationFailedSnafu { operation: "StartPagePrinter" })?;
        self.state = SessionState::PageOpen;
        Ok(())
    }

    /// Writes opaque bytes to the open page. Fewer bytes accepted than given
    /// is an error carrying the accepted count.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let handle = self.expect_state("WritePrinter", SessionState::PageOpen)?;
        if bytes.is_empty() {
            return Ok(0);
        }
        let written = self
            .spooler
            .write(handle, bytes)
            .context(OsOperationFailedSnafu { operation: "WritePrinter" })?;
        if written < bytes.len() {
            return Err(OsError::ShortWrite { requested: bytes.len(), written })
                .context(OsOperationFailedSnafu { operation: "WritePrinter" });
        }
        Ok(written)
    }

    /// Leaves the page even when the spooler reports a failure, so the call
    /// is never issued twice for the same page.
    pub fn end_page(&mut self) -> Result<()> {
        let handle = self.expect_state("EndPagePrinter", SessionState::PageOpen)?;
        self.state = SessionState::DocumentOpen;
        self.spooler
            .end_page(handle)
            .context(OsOperationFailedSnafu { operation: "EndPagePrinter" })
    }

    /// Leaves the document even when the spooler reports a failure.
    pub fn end_document(&mut self) -> Result<()> {
        let handle = self.expect_state("EndDocPrinter", SessionState::DocumentOpen)?;
        self.state = SessionState::Idle;
        self.job_id = None;
        self.spooler
            .end_document(handle)
            .context(OsOperationFailedSnafu { operation: "EndDocPrinter" })
    }

    pub fn jobs(&self) -> Result<Vec<JobDescriptor>> {
        let handle = self.open_handle("EnumJobs")?;
        let result = self.query(Target::Jobs(handle))?;
        decode::decode_jobs(&result)
    }

    pub fn driver_info(&self) -> Result<DriverDescriptor> {
        let handle = self.open_handle("GetPrinterDriver")?;
        let result = self.query(Target::Driver(handle))?;
        decode::decode_driver(&result)
    }

    pub fn forms(&self) -> Result<Vec<FormDescriptor>> {
        let handle = self.open_handle("EnumForms")?;
        let result = self.query(Target::Forms(handle))?;
        decode::decode_forms(&result)
    }

    pub fn details(&self) -> Result<PrinterDetails> {
        let handle = self.open_handle("GetPrinter")?;
        let result = self.query(Target::Details(handle))?;
        decode::decode_details(&result)
    }

    /// The datatype the printer uses when a document does not name one.
    pub fn default_datatype(&self) -> Result<String> {
        Ok(self.details()?.datatype)
    }

    pub(crate) fn handle(&self) -> Option<S::Handle> {
        self.handle
    }

    fn query(&self, target: Target<S::Handle>) -> Result<enumerator::EnumerationResult> {
        enumerator::query(target.operation(), 0, |buf| self.spooler.enumerate(target, buf))
    }

    fn open_handle(&self, operation: &'static str) -> Result<S::Handle> {
        self.handle.ok_or_else(|| InvalidStateSnafu { operation, state: self.state }.build())
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<S::Handle> {
        let handle = self.open_handle(operation)?;
        ensure!(self.state == expected, InvalidStateSnafu { operation, state: self.state });
        Ok(handle)
    }

    fn release(&mut self) -> Vec<PrintError> {
        let mut failures = Vec::new();
        if self.state == SessionState::PageOpen {
            if let Err(err) = self.end_page() {
                failures.push(err);
            }
        }
        if self.state == SessionState::DocumentOpen {
            if let Err(err) = self.end_document() {
                failures.push(err);
            }
        }
        if let Err(err) = self.close() {
            failures.push(err);
        }
        failures
    }
}

impl<S: Spooler> Drop for PrinterSession<'_, S> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        for err in self.release() {
            warn!("Cleaning up printer {:?} failed: {err}", self.name);
        }
    }
}
