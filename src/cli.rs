use std::path::PathBuf;

use clap::Parser;

// ///////////// //
// CLI interface //
// ///////////// //

/// print - Sends a text file to a printer as a raw document, or lists what the print spooler knows.
#[derive(Parser, Debug)]
#[command(name = "print", version, about, long_about = None)]
pub struct Cli {
    /// Number of copies to print.
    #[arg(short = 'n', value_name = "COPIES", allow_negative_numbers = true)]
    pub copies: Option<i64>,

    /// Printer name, or printer index from the printer list. Defaults to the system default printer.
    #[arg(short = 'p', value_name = "PRINTER", allow_hyphen_values = true)]
    pub printer: Option<String>,

    /// List printers and exit.
    #[arg(short = 'l', conflicts_with_all = ["jobs", "forms", "driver"])]
    pub list: bool,

    /// Print the selected printer's jobs as JSON and exit.
    #[arg(long, conflicts_with_all = ["forms", "driver"])]
    pub jobs: bool,

    /// Print the selected printer's paper forms as JSON and exit.
    #[arg(long, conflicts_with = "driver")]
    pub forms: bool,

    /// Print the selected printer's driver information as JSON and exit.
    #[arg(long)]
    pub driver: bool,

    /// Text file to print.
    pub file: Option<PathBuf>,
}
