//! Spooler-wide printer queries.

use log::debug;
use snafu::ResultExt;

use crate::enumerator;
use crate::error::{NotFoundSnafu, OsOperationFailedSnafu, PrintError, Result};
use crate::records::decode;
use crate::records::models::PrinterDescriptor;
use crate::spooler::{Spooler, Target, ERROR_FILE_NOT_FOUND, ERROR_INVALID_PRINTER_NAME};

pub fn list_printer_names<S: Spooler>(spooler: &S) -> Result<Vec<String>> {
    Ok(enumerate_printers(spooler)?.into_iter().map(|p| p.name).collect())
}

/// Local printers and connections, each marked if it is the default.
/// Having no default printer is not an error here.
pub fn list_printers<S: Spooler>(spooler: &S) -> Result<Vec<PrinterDescriptor>> {
    let mut printers = enumerate_printers(spooler)?;
    let default = match default_printer_name(spooler) {
        Ok(name) => Some(name),
        Err(PrintError::NotFound { .. }) => None,
        Err(err) => return Err(err),
    };
    for printer in &mut printers {
        printer.is_default = default.as_deref() == Some(printer.name.as_str());
    }
    Ok(printers)
}

pub fn default_printer_name<S: Spooler>(spooler: &S) -> Result<String> {
    let target = Target::DefaultPrinter;
    match enumerator::query(target.operation(), 0, |buf| spooler.enumerate(target, buf)) {
        Ok(result) => decode::decode_default_printer(&result),
        Err(err) if err.os_code() == Some(ERROR_FILE_NOT_FOUND) => {
            NotFoundSnafu { what: "printer", name: "(default)" }.fail()
        }
        Err(err) => Err(err),
    }
}

pub fn set_default_printer_name<S: Spooler>(spooler: &S, name: &str) -> Result<()> {
    match spooler.set_default_printer(name) {
        Ok(()) => {
            debug!("Default printer is now {name:?}");
            Ok(())
        }
        Err(err) if err.code() == Some(ERROR_INVALID_PRINTER_NAME) => NotFoundSnafu { what: "printer", name }.fail(),
        Err(err) => Err(err).context(OsOperationFailedSnafu { operation: "SetDefaultPrinter" }),
    }
}

fn enumerate_printers<S: Spooler>(spooler: &S) -> Result<Vec<PrinterDescriptor>> {
    let target = Target::Printers;
    let result = enumerator::query(target.operation(), 0, |buf| spooler.enumerate(target, buf))?;
    decode::decode_printers(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spooler::memory::{MemoryPrinter, MemorySpooler};

    fn spooler() -> MemorySpooler {
        MemorySpooler::new()
            .with_printer(MemoryPrinter::new("Office"))
            .with_printer(MemoryPrinter::new("Microsoft Print to PDF").with_port("PORTPROMPT:"))
    }

    #[test]
    fn names_in_spooler_order() {
        let spooler = spooler();
        assert_eq!(list_printer_names(&spooler).unwrap(), vec!["Office", "Microsoft Print to PDF"]);
        // Empty buffer first, then exactly what was asked for.
        assert_eq!(spooler.query_calls(), 2);
    }

    #[test]
    fn default_is_marked() {
        let spooler = spooler();
        set_default_printer_name(&spooler, "Microsoft Print to PDF").unwrap();
        let printers = list_printers(&spooler).unwrap();
        assert!(!printers[0].is_default);
        assert!(printers[1].is_default);
        assert_eq!(printers[1].port_name, "PORTPROMPT:");
        assert_eq!(default_printer_name(&spooler).unwrap(), "Microsoft Print to PDF");
    }

    #[test]
    fn missing_default_is_not_found() {
        let spooler = spooler().without_default();
        assert!(matches!(default_printer_name(&spooler), Err(PrintError::NotFound { .. })));
        assert!(list_printers(&spooler).unwrap().iter().all(|p| !p.is_default));
    }

    #[test]
    fn unknown_default_is_not_found() {
        let spooler = spooler();
        let err = set_default_printer_name(&spooler, "Nope").err().unwrap();
        assert!(matches!(err, PrintError::NotFound { .. }));
        assert_eq!(default_printer_name(&spooler).unwrap(), "Office");
    }

    #[test]
    fn no_printers_is_an_empty_list() {
        let spooler = MemorySpooler::new();
        assert!(list_printer_names(&spooler).unwrap().is_empty());
    }

    #[test]
    fn listing_failure_keeps_os_text() {
        let spooler = spooler();
        spooler.fail_next("EnumPrinters");
        let err = list_printer_names(&spooler).err().unwrap();
        assert_eq!(err.to_string(), "A device attached to the system is not functioning.");
    }
}
