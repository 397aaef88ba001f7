//! Adding and removing custom paper-size forms.

use log::{debug, info};
use snafu::{OptionExt, ResultExt};

use crate::error::{InvalidArgumentSnafu, InvalidStateSnafu, OsOperationFailedSnafu, Result, SessionState};
use crate::records::models::{FormDescriptor, FormSize, ImageableArea};
use crate::session::PrinterSession;
use crate::spooler::{Access, Spooler, ERROR_INVALID_FORM_NAME};

/// A custom form in whole millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomForm {
    pub width_mm: u32,
    pub height_mm: u32,
    pub left_mm: u32,
    pub top_mm: u32,
}

impl CustomForm {
    /// The form as the spooler stores it, in thousandths of a millimeter.
    pub fn to_descriptor(self, name: &str) -> Result<FormDescriptor> {
        let width = thousandths(self.width_mm, "width")?;
        let height = thousandths(self.height_mm, "height")?;
        Ok(FormDescriptor {
            name: name.to_string(),
            flags: FormDescriptor::FORM_USER,
            size: FormSize { width, height },
            imageable_area: ImageableArea {
                left: thousandths(self.left_mm, "left margin")?,
                top: thousandths(self.top_mm, "top margin")?,
                right: width,
                bottom: height,
            },
        })
    }
}

fn thousandths(mm: u32, what: &str) -> Result<i32> {
    mm.checked_mul(1000)
        .and_then(|value| i32::try_from(value).ok())
        .context(InvalidArgumentSnafu { message: format!("form {what} of {mm} mm is too large") })
}

/// Replaces any form called `form_name` on `printer_name` with `form`, then
/// makes it the printer's default form.
pub fn add_custom_form<S: Spooler>(spooler: &S, printer_name: &str, form_name: &str, form: CustomForm) -> Result<()> {
    let descriptor = form.to_descriptor(form_name)?;
    let session = PrinterSession::open_with_access(spooler, printer_name, Access::Administer)?;
    let handle = session_handle(&session, "AddForm")?;

    if let Err(err) = spooler.delete_form(handle, form_name) {
        debug!("No previous form {form_name:?} removed: {err}");
    }
    spooler
        .add_form(handle, &descriptor)
        .context(OsOperationFailedSnafu { operation: "AddForm" })?;
    spooler
        .set_default_form(handle, printer_name, form_name)
        .context(OsOperationFailedSnafu { operation: "SetPrinter" })?;
    info!(
        "Added form {form_name:?} ({} x {} mm) to {printer_name:?} as its default",
        form.width_mm, form.height_mm
    );
    Ok(())
}

/// Removes `form_name` from `printer_name`. A form that does not exist counts
/// as removed.
pub fn delete_custom_form<S: Spooler>(spooler: &S, printer_name: &str, form_name: &str) -> Result<()> {
    let session = PrinterSession::open_with_access(spooler, printer_name, Access::Administer)?;
    let handle = session_handle(&session, "DeleteForm")?;
    match spooler.delete_form(handle, form_name) {
        Ok(()) => {
            info!("Deleted form {form_name:?} from {printer_name:?}");
            Ok(())
        }
        Err(err) if err.code() == Some(ERROR_INVALID_FORM_NAME) => {
            debug!("Form {form_name:?} is not on {printer_name:?}");
            Ok(())
        }
        Err(err) => Err(err).context(OsOperationFailedSnafu { operation: "DeleteForm" }),
    }
}

fn session_handle<S: Spooler>(session: &PrinterSession<'_, S>, operation: &'static str) -> Result<S::Handle> {
    session
        .handle()
        .context(InvalidStateSnafu { operation, state: SessionState::Closed })
}
