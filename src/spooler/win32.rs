//! [`Spooler`] bound to the Windows print spooler (winspool).
//!
//! All FFI of the crate is confined to this module.

use core::ffi::c_void;

use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{RECTL, SIZE};
use windows::Win32::Graphics::Gdi::{DEVMODEW, DM_FORMNAME};
use windows::Win32::Graphics::Printing::{
    AddFormW, ClosePrinter, DeleteFormW, DocumentPropertiesW, EndDocPrinter, EndPagePrinter, EnumFormsW, EnumJobsW,
    EnumPrintersW, GetDefaultPrinterW, GetPrinterDriverW, GetPrinterW, OpenPrinterW, SetDefaultPrinterW, SetPrinterW,
    StartDocPrinterW, StartPagePrinter, WritePrinter, DOC_INFO_1W, FORM_INFO_1W, PRINTER_ACCESS_ADMINISTER,
    PRINTER_ACCESS_USE, PRINTER_DEFAULTSW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_HANDLE,
    PRINTER_INFO_9W,
};

use crate::enumerator::AlignedBuffer;
use crate::error::OsError;
use crate::records::models::FormDescriptor;
use crate::spooler::{Access, QueryFailure, Spooler, Target, ERROR_INSUFFICIENT_BUFFER};

// Jobs are listed from position 0, at most this many per query.
const MAX_LISTED_JOBS: u32 = 255;

const DM_OUT_BUFFER: u32 = 2;
const DM_IN_BUFFER: u32 = 8;

impl From<windows::core::Error> for OsError {
    fn from(err: windows::core::Error) -> Self {
        // Win32 errors arrive as 0x8007xxxx HRESULTs.
        let hresult = err.code().0 as u32;
        let code = if hresult & 0xFFFF_0000 == 0x8007_0000 { hresult & 0xFFFF } else { hresult };
        OsError::Code { code, message: err.message() }
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn bool_result(ok: bool) -> Result<(), OsError> {
    if ok {
        Ok(())
    } else {
        Err(OsError::last())
    }
}

/// Maps a failed sizing call onto [`QueryFailure`].
fn sized(result: windows::core::Result<()>, needed: u32) -> Result<(), QueryFailure> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let err = OsError::from(err);
            if err.code() == Some(ERROR_INSUFFICIENT_BUFFER) {
                Err(QueryFailure::InsufficientBuffer { required: needed as usize })
            } else {
                Err(QueryFailure::Os(err))
            }
        }
    }
}

fn optional(buffer: &mut [u8]) -> Option<&mut [u8]> {
    if buffer.is_empty() {
        None
    } else {
        Some(buffer)
    }
}

/// The local print spooler.
#[derive(Debug, Default, Clone, Copy)]
pub struct WinSpooler;

impl WinSpooler {
    pub fn new() -> Self {
        Self
    }
}

impl Spooler for WinSpooler {
    type Handle = PRINTER_HANDLE;

    fn enumerate(&self, target: Target<PRINTER_HANDLE>, buffer: &mut [u8]) -> Result<u32, QueryFailure> {
        let mut needed: u32 = 0;
        let mut returned: u32 = 0;
        unsafe {
            match target {
                Target::DefaultPrinter => {
                    let mut chars = (buffer.len() / 2) as u32;
                    let name = (chars > 0).then(|| PWSTR(buffer.as_mut_ptr().cast()));
                    if GetDefaultPrinterW(name, &mut chars).as_bool() {
                        return Ok(1);
                    }
                    let err = OsError::last();
                    if err.code() == Some(ERROR_INSUFFICIENT_BUFFER) {
                        return Err(QueryFailure::InsufficientBuffer { required: chars as usize * 2 });
                    }
                    Err(QueryFailure::Os(err))
                }
                Target::Printers => {
                    let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
                    let result = EnumPrintersW(flags, PCWSTR::null(), 5, optional(buffer), &mut needed, &mut returned);
                    sized(result, needed).map(|()| returned)
                }
                Target::Details(handle) => {
                    sized(GetPrinterW(handle, 2, optional(buffer), &mut needed), needed).map(|()| 1)
                }
                Target::Jobs(handle) => {
                    let result =
                        EnumJobsW(handle, 0, MAX_LISTED_JOBS, 1, optional(buffer), &mut needed, &mut returned);
                    sized(result, needed).map(|()| returned)
                }
                Target::Forms(handle) => {
                    let result = EnumFormsW(handle, 1, optional(buffer), &mut needed, &mut returned);
                    sized(result, needed).map(|()| returned)
                }
                Target::Driver(handle) => {
                    let result = GetPrinterDriverW(handle, PCWSTR::null(), 8, optional(buffer), &mut needed);
                    sized(result, needed).map(|()| 1)
                }
            }
        }
    }

    fn set_default_printer(&self, name: &str) -> Result<(), OsError> {
        let name = to_wide(name);
        unsafe { bool_result(SetDefaultPrinterW(PCWSTR::from_raw(name.as_ptr())).as_bool()) }
    }

    fn open(&self, name: &str, access: Access) -> Result<PRINTER_HANDLE, OsError> {
        let name = to_wide(name);
        let mut handle = PRINTER_HANDLE::default();
        let defaults = PRINTER_DEFAULTSW {
            pDatatype: PWSTR::null(),
            pDevMode: std::ptr::null_mut(),
            DesiredAccess: match access {
                Access::Use => PRINTER_ACCESS_USE,
                Access::Administer => PRINTER_ACCESS_ADMINISTER | PRINTER_ACCESS_USE,
            },
        };
        unsafe {
            OpenPrinterW(PCWSTR::from_raw(name.as_ptr()), &mut handle, Some(&defaults))?;
        }
        Ok(handle)
    }

    fn close(&self, handle: PRINTER_HANDLE) -> Result<(), OsError> {
        unsafe { Ok(ClosePrinter(handle)?) }
    }

    fn start_document(&self, handle: PRINTER_HANDLE, name: &str, datatype: &str) -> Result<u32, OsError> {
        let name = to_wide(name);
        let datatype = to_wide(datatype);
        let info = DOC_INFO_1W {
            pDocName: PWSTR(name.as_ptr() as *mut _),
            pOutputFile: PWSTR::null(),
            pDatatype: PWSTR(datatype.as_ptr() as *mut _),
        };
        match unsafe { StartDocPrinterW(handle, 1, &info) } {
            0 => Err(OsError::last()),
            job_id => Ok(job_id),
        }
    }

    fn start_page(&self, handle: PRINTER_HANDLE) -> Result<(), OsError> {
        unsafe { bool_result(StartPagePrinter(handle).as_bool()) }
    }

    fn write(&self, handle: PRINTER_HANDLE, bytes: &[u8]) -> Result<usize, OsError> {
        let mut written: u32 = 0;
        let length = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        unsafe {
            bool_result(WritePrinter(handle, bytes.as_ptr() as *const c_void, length, &mut written).as_bool())?;
        }
        Ok(written as usize)
    }

    fn end_page(&self, handle: PRINTER_HANDLE) -> Result<(), OsError> {
        unsafe { bool_result(EndPagePrinter(handle).as_bool()) }
    }

    fn end_document(&self, handle: PRINTER_HANDLE) -> Result<(), OsError> {
        unsafe { bool_result(EndDocPrinter(handle).as_bool()) }
    }

    fn add_form(&self, handle: PRINTER_HANDLE, form: &FormDescriptor) -> Result<(), OsError> {
        let name = to_wide(&form.name);
        let area = form.imageable_area;
        let info = FORM_INFO_1W {
            Flags: form.flags,
            pName: PWSTR(name.as_ptr() as *mut _),
            Size: SIZE { cx: form.size.width, cy: form.size.height },
            ImageableArea: RECTL { left: area.left, top: area.top, right: area.right, bottom: area.bottom },
        };
        unsafe { Ok(AddFormW(handle, 1, &info as *const FORM_INFO_1W as *const u8)?) }
    }

    fn delete_form(&self, handle: PRINTER_HANDLE, name: &str) -> Result<(), OsError> {
        let name = to_wide(name);
        unsafe { Ok(DeleteFormW(handle, PCWSTR::from_raw(name.as_ptr()))?) }
    }

    fn set_default_form(&self, handle: PRINTER_HANDLE, printer: &str, form: &str) -> Result<(), OsError> {
        let mut device = to_wide(printer);
        let form = to_wide(form);
        unsafe {
            let needed = DocumentPropertiesW(None, handle, PWSTR(device.as_mut_ptr()), None, None, 0);
            if needed <= 0 {
                return Err(OsError::last());
            }
            let mut storage = AlignedBuffer::zeroed(needed as usize);
            let devmode = storage.as_bytes_mut().as_mut_ptr() as *mut DEVMODEW;
            let result = DocumentPropertiesW(None, handle, PWSTR(device.as_mut_ptr()), Some(devmode), None, DM_OUT_BUFFER);
            if result < 0 {
                return Err(OsError::last());
            }

            let slot = &mut (*devmode).dmFormName;
            let len = (form.len() - 1).min(slot.len() - 1);
            slot.fill(0);
            slot[..len].copy_from_slice(&form[..len]);
            (*devmode).dmFields |= DM_FORMNAME;

            let result = DocumentPropertiesW(
                None,
                handle,
                PWSTR(device.as_mut_ptr()),
                Some(devmode),
                Some(devmode as *const DEVMODEW),
                DM_IN_BUFFER | DM_OUT_BUFFER,
            );
            if result < 0 {
                return Err(OsError::last());
            }

            let info = PRINTER_INFO_9W { pDevMode: devmode };
            SetPrinterW(handle, 9, Some(&info as *const PRINTER_INFO_9W as *const u8), 0)?;
        }
        Ok(())
    }
}
