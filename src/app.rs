//! The `print` command, driven by an explicit [`RunConfig`].

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use snafu::ensure;

use crate::cli::Cli;
use crate::config::models::Settings;
use crate::error::{InvalidArgumentSnafu, PrintError};
use crate::printers;
use crate::session::PrinterSession;
use crate::spooler::Spooler;

/// Which printer a command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterSelector {
    Default,
    /// 0-based position in the printer list.
    Index(i64),
    Name(String),
}

impl PrinterSelector {
    /// Purely numeric values are indices; anything else is a printer name.
    pub fn parse(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(index) => PrinterSelector::Index(index),
            Err(_) => PrinterSelector::Name(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    ListPrinters,
    ListJobs,
    ListForms,
    ShowDriver,
    Print(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub copies: i64,
    pub printer: PrinterSelector,
    pub mode: Mode,
}

impl RunConfig {
    /// Command-line flags first, then settings.
    pub fn from_cli(cli: Cli, settings: &Settings) -> Result<Self, PrintError> {
        let mode = if cli.list {
            Mode::ListPrinters
        } else if cli.jobs {
            Mode::ListJobs
        } else if cli.forms {
            Mode::ListForms
        } else if cli.driver {
            Mode::ShowDriver
        } else {
            match cli.file {
                Some(path) => Mode::Print(path),
                None => return InvalidArgumentSnafu { message: "no document path to print provided" }.fail(),
            }
        };
        let printer = cli
            .printer
            .or_else(|| settings.printer.clone())
            .map_or(PrinterSelector::Default, |value| PrinterSelector::parse(&value));
        Ok(Self { copies: cli.copies.unwrap_or(settings.copies), printer, mode })
    }
}

pub fn run<S: Spooler>(spooler: &S, config: &RunConfig, out: &mut impl Write) -> Result<()> {
    debug!("Running {config:?}");
    match &config.mode {
        Mode::ListPrinters => list_printers(spooler, out),
        Mode::ListJobs => {
            let printer = select_printer(spooler, &config.printer)?;
            let jobs = PrinterSession::open(spooler, &printer)?.jobs()?;
            write_json(out, &jobs)
        }
        Mode::ListForms => {
            let printer = select_printer(spooler, &config.printer)?;
            let forms = PrinterSession::open(spooler, &printer)?.forms()?;
            write_json(out, &forms)
        }
        Mode::ShowDriver => {
            let printer = select_printer(spooler, &config.printer)?;
            let driver = PrinterSession::open(spooler, &printer)?.driver_info()?;
            write_json(out, &driver)
        }
        Mode::Print(path) => print_file(spooler, &config.printer, path, config.copies),
    }
}

/// One line per printer, ` * 0. Name` with `*` marking the default.
pub fn list_printers<S: Spooler>(spooler: &S, out: &mut impl Write) -> Result<()> {
    for (index, printer) in printers::list_printers(spooler)?.iter().enumerate() {
        let mark = if printer.is_default { "*" } else { " " };
        writeln!(out, " {mark} {index}. {}", printer.name)?;
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Resolves a selector to a printer name. Names are not checked against the
/// printer list.
pub fn select_printer<S: Spooler>(spooler: &S, selector: &PrinterSelector) -> Result<String, PrintError> {
    match selector {
        PrinterSelector::Default => printers::default_printer_name(spooler),
        PrinterSelector::Name(name) => Ok(name.clone()),
        PrinterSelector::Index(index) => {
            ensure!(
                *index >= 0,
                InvalidArgumentSnafu { message: format!("printer index cannot be negative: {index}") }
            );
            let mut names = printers::list_printer_names(spooler)?;
            let count = names.len();
            ensure!(
                (*index as u64) < count as u64,
                InvalidArgumentSnafu {
                    message: format!("printer index too large: {index} (there are only {count} printers)"),
                }
            );
            Ok(names.swap_remove(*index as usize))
        }
    }
}

/// Prints `copies` copies of a text file, one raw document per copy. Stops at
/// the first copy that fails.
pub fn print_file<S: Spooler>(spooler: &S, selector: &PrinterSelector, path: &Path, copies: i64) -> Result<()> {
    ensure!(
        copies >= 0,
        InvalidArgumentSnafu { message: format!("number of copies to print ({copies}) cannot be negative") }
    );
    let content = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let printer = select_printer(spooler, selector)?;
    let document = path.display().to_string();
    let lines = text_lines(&content);

    for copy in 1..=copies {
        debug!("Printing copy {copy} of {copies} of {document:?} on {printer:?}");
        print_one_document(spooler, &printer, &document, &lines)?;
    }
    info!("Printed {copies} copies of {document:?} on {printer:?}");
    Ok(())
}

fn print_one_document<S: Spooler>(spooler: &S, printer: &str, document: &str, lines: &[&[u8]]) -> Result<(), PrintError> {
    let mut session = PrinterSession::open(spooler, printer)?;
    session.start_raw_document(document)?;
    session.start_page()?;
    let mut line_buffer = Vec::new();
    for line in lines {
        line_buffer.clear();
        line_buffer.extend_from_slice(line);
        line_buffer.extend_from_slice(b"\r\n");
        session.write(&line_buffer)?;
    }
    session.end_page()?;
    session.end_document()?;
    session.close()
}

/// Splits on `\n`, dropping a trailing `\r` from each line and the empty
/// piece after a final newline.
fn text_lines(content: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = content
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    if content.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::records::models::PRINTER_DRIVER_XPS;
    use crate::spooler::memory::{MemoryPrinter, MemorySpooler};

    fn spooler() -> MemorySpooler {
        MemorySpooler::new()
            .with_printer(MemoryPrinter::new("Office"))
            .with_printer(MemoryPrinter::new("Label").with_driver_attributes(PRINTER_DRIVER_XPS))
            .with_printer(MemoryPrinter::new("Fax"))
    }

    fn settings() -> Settings {
        Settings { copies: 1, printer: None, log_level: "warn".to_string() }
    }

    fn text_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn parse_args(args: &[&str]) -> Cli {
        <Cli as clap::Parser>::try_parse_from(args).unwrap()
    }

    fn invalid_argument(err: &anyhow::Error) -> String {
        match err.downcast_ref::<PrintError>() {
            Some(PrintError::InvalidArgument { message }) => message.clone(),
            other => panic!("expected an invalid argument, got {other:?}"),
        }
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(PrinterSelector::parse("1"), PrinterSelector::Index(1));
        assert_eq!(PrinterSelector::parse("-1"), PrinterSelector::Index(-1));
        assert_eq!(PrinterSelector::parse("HP 1020"), PrinterSelector::Name("HP 1020".to_string()));
    }

    #[test]
    fn select_by_index() {
        let spooler = spooler();
        assert_eq!(select_printer(&spooler, &PrinterSelector::Index(1)).unwrap(), "Label");

        let err = select_printer(&spooler, &PrinterSelector::Index(5)).err().unwrap();
        assert!(err.to_string().contains("index too large"), "{err}");

        let err = select_printer(&spooler, &PrinterSelector::Index(-1)).err().unwrap();
        assert!(err.to_string().contains("cannot be negative"), "{err}");
    }

    #[test]
    fn names_are_not_validated() {
        let spooler = spooler();
        let name = select_printer(&spooler, &PrinterSelector::Name("Elsewhere".to_string())).unwrap();
        assert_eq!(name, "Elsewhere");
        assert_eq!(spooler.query_calls(), 0);
        assert_eq!(select_printer(&spooler, &PrinterSelector::Default).unwrap(), "Office");
    }

    #[test]
    fn config_prefers_flags_over_settings() {
        let cli = parse_args(&["print", "-p", "2", "notes.txt"]);
        let settings = Settings { copies: 4, printer: Some("Office".to_string()), ..settings() };
        let config = RunConfig::from_cli(cli, &settings).unwrap();
        assert_eq!(config.copies, 4);
        assert_eq!(config.printer, PrinterSelector::Index(2));
        assert_eq!(config.mode, Mode::Print(PathBuf::from("notes.txt")));
    }

    #[test]
    fn missing_path_is_a_usage_error() {
        let cli = parse_args(&["print", "-n", "2"]);
        let err = RunConfig::from_cli(cli, &settings()).err().unwrap();
        assert_eq!(err.to_string(), "no document path to print provided");
    }

    #[test]
    fn negative_copies_are_rejected_before_anything_is_opened() {
        let spooler = spooler();
        let config = RunConfig {
            copies: -1,
            printer: PrinterSelector::Default,
            mode: Mode::Print(PathBuf::from("does-not-exist.txt")),
        };
        let err = run(&spooler, &config, &mut Vec::new()).err().unwrap();
        assert_eq!(invalid_argument(&err), "number of copies to print (-1) cannot be negative");
        assert_eq!(spooler.query_calls(), 0);
        assert!(spooler.documents("Office").is_empty());
    }

    #[test]
    fn prints_each_copy_as_a_raw_document() {
        let spooler = spooler();
        let file = text_file(b"first\r\nsecond\n");
        print_file(&spooler, &PrinterSelector::Index(1), file.path(), 2).unwrap();

        let documents = spooler.documents("Label");
        assert_eq!(documents.len(), 2);
        for document in &documents {
            assert_eq!(document.datatype, "XPS_PASS");
            assert_eq!(document.name, file.path().display().to_string());
            assert_eq!(document.pages, vec![b"first\r\nsecond\r\n".to_vec()]);
            assert!(document.completed);
        }
        assert_eq!(spooler.open_handles(), 0);
    }

    #[test]
    fn zero_copies_prints_nothing() {
        let spooler = spooler();
        let file = text_file(b"x");
        print_file(&spooler, &PrinterSelector::Default, file.path(), 0).unwrap();
        assert!(spooler.documents("Office").is_empty());
    }

    #[test]
    fn a_failing_copy_stops_the_loop_and_cleans_up() {
        let spooler = spooler();
        let file = text_file(b"line\n");
        spooler.fail_next("StartPagePrinter");
        let err = print_file(&spooler, &PrinterSelector::Default, file.path(), 3).err().unwrap();

        assert_eq!(err.to_string(), "A device attached to the system is not functioning.");
        let documents = spooler.documents("Office");
        assert_eq!(documents.len(), 1);
        assert!(documents[0].completed);
        assert_eq!(spooler.open_handles(), 0);
    }

    #[test]
    fn list_marks_the_default() {
        let spooler = spooler();
        let mut out = Vec::new();
        run(&spooler, &RunConfig { copies: 1, printer: PrinterSelector::Default, mode: Mode::ListPrinters }, &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " * 0. Office\n   1. Label\n   2. Fax\n");
    }

    #[test]
    fn driver_and_forms_as_json() {
        let spooler = spooler();
        let mut out = Vec::new();
        let config = RunConfig { copies: 1, printer: PrinterSelector::Index(1), mode: Mode::ShowDriver };
        run(&spooler, &config, &mut out).unwrap();
        let driver: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(driver["attributes"], PRINTER_DRIVER_XPS);

        let mut out = Vec::new();
        let config = RunConfig { mode: Mode::ListForms, ..config };
        run(&spooler, &config, &mut out).unwrap();
        let forms: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(forms[0]["name"], "A4");
        assert_eq!(forms[0]["size"]["width"], 210_000);
    }

    #[test]
    fn text_lines_keep_blank_lines() {
        assert_eq!(text_lines(b"a\n\nb"), vec![&b"a"[..], b"", b"b"]);
        assert_eq!(text_lines(b""), vec![&b""[..]]);
    }
}
