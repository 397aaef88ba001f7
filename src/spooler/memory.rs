//! A spooler that lives in process memory.
//!
//! It fills query buffers exactly the way the native spooler does (fixed
//! records followed by packed strings, absolute addresses in text fields), so
//! the decoders run unchanged against it. Used by the test suites and as a
//! stand-in on hosts without a print spooler.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Local, Timelike, Utc};

use crate::error::OsError;
use crate::records::layout::{
    self, driver_info_8, form_info_1, job_info_1, printer_info_2, printer_info_5, CalendarFields, RecordWriter,
};
use crate::records::models::{DriverDescriptor, FormDescriptor, FormSize, ImageableArea};
use crate::spooler::{
    Access, QueryFailure, Spooler, Target, ERROR_FILE_NOT_FOUND, ERROR_INVALID_FORM_NAME, ERROR_INVALID_PRINTER_NAME,
};
use crate::status::{JOB_STATUS_PRINTED, JOB_STATUS_SPOOLING};

const FILE_TIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_INVALID_HANDLE: u32 = 6;
const ERROR_GEN_FAILURE: u32 = 31;
const ERROR_FILE_EXISTS: u32 = 80;
const ERROR_INVALID_PARAMETER: u32 = 87;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryJob {
    pub id: u32,
    pub machine_name: String,
    pub user_name: String,
    pub document: String,
    pub datatype: String,
    pub status_text: String,
    pub status: u32,
    pub priority: u32,
    pub total_pages: u32,
    pub pages_printed: u32,
    pub submitted: CalendarFields,
}

impl MemoryJob {
    pub fn new(id: u32, document: &str) -> Self {
        Self {
            id,
            machine_name: "\\\\LOCALHOST".to_string(),
            user_name: "user".to_string(),
            document: document.to_string(),
            datatype: "RAW".to_string(),
            status_text: String::new(),
            status: 0,
            priority: 1,
            total_pages: 1,
            pages_printed: 0,
            submitted: now(),
        }
    }

    pub fn with_status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    pub fn with_status_text(mut self, text: &str) -> Self {
        self.status_text = text.to_string();
        self
    }

    pub fn with_user(mut self, machine: &str, user: &str) -> Self {
        self.machine_name = machine.to_string();
        self.user_name = user.to_string();
        self
    }

    pub fn with_submitted(mut self, submitted: CalendarFields) -> Self {
        self.submitted = submitted;
        self
    }
}

/// A document written through the spooler, page by page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledDocument {
    pub job_id: u32,
    pub name: String,
    pub datatype: String,
    pub pages: Vec<Vec<u8>>,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryPrinter {
    name: String,
    port: String,
    datatype: String,
    driver: DriverDescriptor,
    jobs: Vec<MemoryJob>,
    forms: Vec<FormDescriptor>,
    default_form: Option<String>,
    documents: Vec<SpooledDocument>,
    write_limit: Option<usize>,
}

impl MemoryPrinter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            port: "USB001".to_string(),
            datatype: "RAW".to_string(),
            driver: DriverDescriptor {
                version: 3,
                name: "Generic / Text Only".to_string(),
                environment: "Windows x64".to_string(),
                driver_path: "C:\\Windows\\System32\\spool\\DRIVERS\\x64\\3\\UNIDRV.DLL".to_string(),
                default_datatype: "RAW".to_string(),
                manufacturer: "Generic".to_string(),
                provider: "Microsoft".to_string(),
                print_processor: "winprint".to_string(),
                attributes: 0,
                driver_version: 0x000A_0000_4A61_0001,
                driver_date: None,
            },
            jobs: Vec::new(),
            forms: vec![builtin_form("A4", 210_000, 297_000), builtin_form("Letter", 215_900, 279_400)],
            default_form: Some("A4".to_string()),
            documents: Vec::new(),
            write_limit: None,
        }
    }

    pub fn with_port(mut self, port: &str) -> Self {
        self.port = port.to_string();
        self
    }

    pub fn with_driver_attributes(mut self, attributes: u32) -> Self {
        self.driver.attributes = attributes;
        self
    }

    pub fn with_driver_date(mut self, date: DateTime<Utc>) -> Self {
        self.driver.driver_date = Some(date);
        self
    }

    pub fn with_job(mut self, job: MemoryJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_form(mut self, form: FormDescriptor) -> Self {
        self.forms.push(form);
        self
    }

    /// Makes every write accept at most `limit` bytes.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }
}

fn builtin_form(name: &str, width: i32, height: i32) -> FormDescriptor {
    FormDescriptor {
        name: name.to_string(),
        flags: FormDescriptor::FORM_BUILTIN,
        size: FormSize { width, height },
        imageable_area: ImageableArea { left: 0, top: 0, right: width, bottom: height },
    }
}

fn now() -> CalendarFields {
    let now = Local::now();
    CalendarFields {
        year: now.year() as u16,
        month: now.month() as u16,
        day_of_week: now.weekday().num_days_from_sunday() as u16,
        day: now.day() as u16,
        hour: now.hour() as u16,
        minute: now.minute() as u16,
        second: now.second() as u16,
        milliseconds: (now.timestamp_subsec_millis() % 1000) as u16,
    }
}

struct OpenPrinter {
    printer: usize,
    access: Access,
    document: Option<usize>,
}

#[derive(Default)]
struct State {
    printers: Vec<MemoryPrinter>,
    default_printer: Option<String>,
    handles: HashMap<MemoryHandle, OpenPrinter>,
    next_handle: u64,
    next_job: u32,
    close_calls: usize,
    query_calls: usize,
    calls: HashMap<&'static str, usize>,
    failures: Vec<&'static str>,
}

impl State {
    fn take_failure(&mut self, operation: &'static str) -> Result<(), OsError> {
        *self.calls.entry(operation).or_default() += 1;
        match self.failures.iter().position(|op| *op == operation) {
            Some(index) => {
                self.failures.remove(index);
                Err(OsError::from_code(ERROR_GEN_FAILURE, "A device attached to the system is not functioning."))
            }
            None => Ok(()),
        }
    }

    fn open(&mut self, handle: MemoryHandle) -> Result<&mut OpenPrinter, OsError> {
        self.handles
            .get_mut(&handle)
            .ok_or_else(|| OsError::from_code(ERROR_INVALID_HANDLE, "The handle is invalid."))
    }

    fn printer(&mut self, handle: MemoryHandle) -> Result<&mut MemoryPrinter, OsError> {
        let index = self.open(handle)?.printer;
        Ok(&mut self.printers[index])
    }

    fn admin_printer(&mut self, handle: MemoryHandle) -> Result<&mut MemoryPrinter, OsError> {
        if self.open(handle)?.access != Access::Administer {
            return Err(OsError::from_code(ERROR_ACCESS_DENIED, "Access is denied."));
        }
        self.printer(handle)
    }

    fn document(&mut self, handle: MemoryHandle) -> Result<&mut SpooledDocument, OsError> {
        let open = self.open(handle)?;
        let (printer, document) = (open.printer, open.document);
        let document = document.ok_or_else(|| OsError::from_code(ERROR_INVALID_PARAMETER, "The parameter is incorrect."))?;
        Ok(&mut self.printers[printer].documents[document])
    }
}

/// In-memory [`Spooler`]. Safe to share between threads; each handle still
/// belongs to one session.
#[derive(Default)]
pub struct MemorySpooler {
    state: Mutex<State>,
}

impl MemorySpooler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a printer. The first printer added becomes the default.
    pub fn with_printer(self, printer: MemoryPrinter) -> Self {
        {
            let mut state = self.lock();
            if state.printers.is_empty() {
                state.default_printer = Some(printer.name.clone());
            }
            state.printers.push(printer);
        }
        self
    }

    pub fn without_default(self) -> Self {
        self.lock().default_printer = None;
        self
    }

    /// Makes the next call of the named native operation (e.g. `"EndDocPrinter"`) fail.
    pub fn fail_next(&self, operation: &'static str) {
        self.lock().failures.push(operation);
    }

    pub fn documents(&self, printer: &str) -> Vec<SpooledDocument> {
        self.with_printer_named(printer, |p| p.documents.clone()).unwrap_or_default()
    }

    pub fn default_form(&self, printer: &str) -> Option<String> {
        self.with_printer_named(printer, |p| p.default_form.clone()).flatten()
    }

    pub fn default_printer(&self) -> Option<String> {
        self.lock().default_printer.clone()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Number of times the named native operation was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or_default()
    }

    /// Number of buffered query calls made so far.
    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    fn with_printer_named<T>(&self, name: &str, f: impl FnOnce(&MemoryPrinter) -> T) -> Option<T> {
        self.lock().printers.iter().find(|p| p.name == name).map(f)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Spooler for MemorySpooler {
    type Handle = MemoryHandle;

    fn enumerate(&self, target: Target<MemoryHandle>, buffer: &mut [u8]) -> Result<u32, QueryFailure> {
        let mut state = self.lock();
        state.query_calls += 1;
        state.take_failure(target.operation())?;
        match target {
            Target::DefaultPrinter => {
                let Some(name) = state.default_printer.clone() else {
                    return Err(OsError::from_code(ERROR_FILE_NOT_FOUND, "The system cannot find the file specified.").into());
                };
                let wide: Vec<u8> = name.encode_utf16().chain([0]).flat_map(u16::to_ne_bytes).collect();
                ensure_fits(buffer, wide.len())?;
                buffer[..wide.len()].copy_from_slice(&wide);
                Ok(1)
            }
            Target::Printers => write_printers(&state.printers, buffer),
            Target::Details(handle) => write_details(state.printer(handle)?, buffer),
            Target::Jobs(handle) => write_jobs(&state.printer(handle)?.jobs, buffer),
            Target::Forms(handle) => write_forms(&state.printer(handle)?.forms, buffer),
            Target::Driver(handle) => write_driver(&state.printer(handle)?.driver, buffer),
        }
    }

    fn set_default_printer(&self, name: &str) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("SetDefaultPrinter")?;
        if !state.printers.iter().any(|p| p.name == name) {
            return Err(invalid_printer_name());
        }
        state.default_printer = Some(name.to_string());
        Ok(())
    }

    fn open(&self, name: &str, access: Access) -> Result<MemoryHandle, OsError> {
        let mut state = self.lock();
        state.take_failure("OpenPrinter")?;
        let printer = state
            .printers
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(invalid_printer_name)?;
        state.next_handle += 1;
        let handle = MemoryHandle(state.next_handle);
        state.handles.insert(handle, OpenPrinter { printer, access, document: None });
        Ok(handle)
    }

    fn close(&self, handle: MemoryHandle) -> Result<(), OsError> {
        let mut state = self.lock();
        state.close_calls += 1;
        state
            .handles
            .remove(&handle)
            .ok_or_else(|| OsError::from_code(ERROR_INVALID_HANDLE, "The handle is invalid."))?;
        state.take_failure("ClosePrinter")
    }

    fn start_document(&self, handle: MemoryHandle, name: &str, datatype: &str) -> Result<u32, OsError> {
        let mut state = self.lock();
        state.take_failure("StartDocPrinter")?;
        state.next_job += 1;
        let job_id = state.next_job;
        let printer = state.printer(handle)?;
        printer.jobs.push(MemoryJob {
            datatype: datatype.to_string(),
            status: JOB_STATUS_SPOOLING,
            total_pages: 0,
            ..MemoryJob::new(job_id, name)
        });
        printer.documents.push(SpooledDocument {
            job_id,
            name: name.to_string(),
            datatype: datatype.to_string(),
            pages: Vec::new(),
            completed: false,
        });
        let document = printer.documents.len() - 1;
        state.open(handle)?.document = Some(document);
        Ok(job_id)
    }

    fn start_page(&self, handle: MemoryHandle) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("StartPagePrinter")?;
        state.document(handle)?.pages.push(Vec::new());
        Ok(())
    }

    fn write(&self, handle: MemoryHandle, bytes: &[u8]) -> Result<usize, OsError> {
        let mut state = self.lock();
        state.take_failure("WritePrinter")?;
        let limit = state.printer(handle)?.write_limit.unwrap_or(usize::MAX);
        let accepted = &bytes[..bytes.len().min(limit)];
        let page = state
            .document(handle)?
            .pages
            .last_mut()
            .ok_or_else(|| OsError::from_code(ERROR_INVALID_PARAMETER, "The parameter is incorrect."))?;
        page.extend_from_slice(accepted);
        Ok(accepted.len())
    }

    fn end_page(&self, handle: MemoryHandle) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("EndPagePrinter")?;
        state.document(handle).map(|_| ())
    }

    fn end_document(&self, handle: MemoryHandle) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("EndDocPrinter")?;
        let document = state.document(handle)?;
        document.completed = true;
        let (job_id, pages) = (document.job_id, document.pages.len() as u32);
        state.open(handle)?.document = None;
        if let Some(job) = state.printer(handle)?.jobs.iter_mut().find(|job| job.id == job_id) {
            job.status = JOB_STATUS_PRINTED;
            job.total_pages = pages;
            job.pages_printed = pages;
        }
        Ok(())
    }

    fn add_form(&self, handle: MemoryHandle, form: &FormDescriptor) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("AddForm")?;
        let printer = state.admin_printer(handle)?;
        if printer.forms.iter().any(|f| f.name == form.name) {
            return Err(OsError::from_code(ERROR_FILE_EXISTS, "The file exists."));
        }
        printer.forms.push(form.clone());
        Ok(())
    }

    fn delete_form(&self, handle: MemoryHandle, name: &str) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("DeleteForm")?;
        let printer = state.admin_printer(handle)?;
        let Some(index) = printer.forms.iter().position(|f| f.name == name) else {
            return Err(OsError::from_code(ERROR_INVALID_FORM_NAME, "The specified form name is invalid."));
        };
        if printer.forms[index].is_builtin() {
            return Err(OsError::from_code(ERROR_INVALID_PARAMETER, "The parameter is incorrect."));
        }
        printer.forms.remove(index);
        if printer.default_form.as_deref() == Some(name) {
            printer.default_form = None;
        }
        Ok(())
    }

    fn set_default_form(&self, handle: MemoryHandle, _printer: &str, form: &str) -> Result<(), OsError> {
        let mut state = self.lock();
        state.take_failure("SetPrinter")?;
        let printer = state.admin_printer(handle)?;
        if !printer.forms.iter().any(|f| f.name == form) {
            return Err(OsError::from_code(ERROR_INVALID_FORM_NAME, "The specified form name is invalid."));
        }
        printer.default_form = Some(form.to_string());
        Ok(())
    }
}

fn invalid_printer_name() -> OsError {
    OsError::from_code(ERROR_INVALID_PRINTER_NAME, "The printer name is invalid.")
}

fn ensure_fits(buffer: &[u8], required: usize) -> Result<(), QueryFailure> {
    if buffer.len() < required {
        return Err(QueryFailure::InsufficientBuffer { required });
    }
    Ok(())
}

fn write_printers(printers: &[MemoryPrinter], buffer: &mut [u8]) -> Result<u32, QueryFailure> {
    let layout = layout::printer_info_5();
    let strings = printers.iter().flat_map(|p| [p.name.as_str(), p.port.as_str()]);
    ensure_fits(buffer, RecordWriter::required_size(layout, printers.len(), strings))?;
    let mut writer = RecordWriter::new(layout, buffer, printers.len());
    for printer in printers {
        writer
            .begin()
            .text(printer_info_5::PRINTER_NAME, &printer.name)
            .text(printer_info_5::PORT_NAME, &printer.port)
            .u32(printer_info_5::DEVICE_NOT_SELECTED_TIMEOUT, 15_000)
            .u32(printer_info_5::TRANSMISSION_RETRY_TIMEOUT, 45_000);
    }
    Ok(printers.len() as u32)
}

fn write_details(printer: &MemoryPrinter, buffer: &mut [u8]) -> Result<u32, QueryFailure> {
    let layout = layout::printer_info_2();
    let strings = [
        printer.name.as_str(),
        printer.port.as_str(),
        printer.driver.name.as_str(),
        printer.driver.print_processor.as_str(),
        printer.datatype.as_str(),
    ];
    ensure_fits(buffer, RecordWriter::required_size(layout, 1, strings))?;
    let queued = printer.jobs.len() as u32;
    RecordWriter::new(layout, buffer, 1)
        .begin()
        .text(printer_info_2::PRINTER_NAME, &printer.name)
        .text(printer_info_2::PORT_NAME, &printer.port)
        .text(printer_info_2::DRIVER_NAME, &printer.driver.name)
        .text(printer_info_2::PRINT_PROCESSOR, &printer.driver.print_processor)
        .text(printer_info_2::DATATYPE, &printer.datatype)
        .u32(printer_info_2::PRIORITY, 1)
        .u32(printer_info_2::DEFAULT_PRIORITY, 1)
        .u32(printer_info_2::JOBS, queued);
    Ok(1)
}

fn write_jobs(jobs: &[MemoryJob], buffer: &mut [u8]) -> Result<u32, QueryFailure> {
    let layout = layout::job_info_1();
    let strings = jobs.iter().flat_map(|job| {
        [
            job.machine_name.as_str(),
            job.user_name.as_str(),
            job.document.as_str(),
            job.datatype.as_str(),
            job.status_text.as_str(),
        ]
    });
    ensure_fits(buffer, RecordWriter::required_size(layout, jobs.len(), strings))?;
    let mut writer = RecordWriter::new(layout, buffer, jobs.len());
    for (position, job) in jobs.iter().enumerate() {
        writer
            .begin()
            .u32(job_info_1::JOB_ID, job.id)
            .text(job_info_1::MACHINE_NAME, &job.machine_name)
            .text(job_info_1::USER_NAME, &job.user_name)
            .text(job_info_1::DOCUMENT, &job.document)
            .text(job_info_1::DATATYPE, &job.datatype)
            .text(job_info_1::STATUS_TEXT, &job.status_text)
            .u32(job_info_1::STATUS, job.status)
            .u32(job_info_1::PRIORITY, job.priority)
            .u32(job_info_1::POSITION, position as u32 + 1)
            .u32(job_info_1::TOTAL_PAGES, job.total_pages)
            .u32(job_info_1::PAGES_PRINTED, job.pages_printed)
            .calendar(job_info_1::SUBMITTED, job.submitted);
    }
    Ok(jobs.len() as u32)
}

fn write_forms(forms: &[FormDescriptor], buffer: &mut [u8]) -> Result<u32, QueryFailure> {
    let layout = layout::form_info_1();
    let strings = forms.iter().map(|form| form.name.as_str());
    ensure_fits(buffer, RecordWriter::required_size(layout, forms.len(), strings))?;
    let mut writer = RecordWriter::new(layout, buffer, forms.len());
    for form in forms {
        let area = form.imageable_area;
        writer
            .begin()
            .u32(form_info_1::FLAGS, form.flags)
            .text(form_info_1::NAME, &form.name)
            .size(form_info_1::SIZE, form.size.width, form.size.height)
            .rect(form_info_1::IMAGEABLE_AREA, area.left, area.top, area.right, area.bottom);
    }
    Ok(forms.len() as u32)
}

fn to_file_time(instant: DateTime<Utc>) -> u64 {
    let intervals = instant.timestamp() * 10_000_000 + i64::from(instant.timestamp_subsec_nanos() / 100);
    (intervals + FILE_TIME_UNIX_EPOCH) as u64
}

fn write_driver(driver: &DriverDescriptor, buffer: &mut [u8]) -> Result<u32, QueryFailure> {
    let layout = layout::driver_info_8();
    let strings = [
        driver.name.as_str(),
        driver.environment.as_str(),
        driver.driver_path.as_str(),
        driver.default_datatype.as_str(),
        driver.manufacturer.as_str(),
        driver.provider.as_str(),
        driver.print_processor.as_str(),
    ];
    ensure_fits(buffer, RecordWriter::required_size(layout, 1, strings))?;
    RecordWriter::new(layout, buffer, 1)
        .begin()
        .u32(driver_info_8::VERSION, driver.version)
        .text(driver_info_8::NAME, &driver.name)
        .text(driver_info_8::ENVIRONMENT, &driver.environment)
        .text(driver_info_8::DRIVER_PATH, &driver.driver_path)
        .text(driver_info_8::DEFAULT_DATATYPE, &driver.default_datatype)
        .text(driver_info_8::MANUFACTURER, &driver.manufacturer)
        .text(driver_info_8::PROVIDER, &driver.provider)
        .text(driver_info_8::PRINT_PROCESSOR, &driver.print_processor)
        .file_time(driver_info_8::DRIVER_DATE, driver.driver_date.map_or(0, to_file_time))
        .u64(driver_info_8::DRIVER_VERSION, driver.driver_version)
        .u32(driver_info_8::ATTRIBUTES, driver.attributes);
    Ok(1)
}
