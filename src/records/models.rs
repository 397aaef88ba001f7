use chrono::{DateTime, Utc};
use serde_derive::Serialize;

/// Driver attribute bit set by XPS-based (v4) drivers.
pub const PRINTER_DRIVER_XPS: u32 = 0x0000_0002;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrinterDescriptor {
    pub name: String,
    pub port_name: String,
    pub attributes: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PrinterDetails {
    pub server_name: String,
    pub name: String,
    pub share_name: String,
    pub port_name: String,
    pub driver_name: String,
    pub comment: String,
    pub location: String,
    pub separator_file: String,
    pub print_processor: String,
    pub datatype: String,
    pub parameters: String,
    pub attributes: u32,
    pub priority: u32,
    pub default_priority: u32,
    /// Minutes after midnight UTC.
    pub start_time: u32,
    /// Minutes after midnight UTC.
    pub until_time: u32,
    pub status: u32,
    pub queued_jobs: u32,
    pub average_ppm: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DriverDescriptor {
    pub version: u32,
    pub name: String,
    pub environment: String,
    pub driver_path: String,
    pub default_datatype: String,
    pub manufacturer: String,
    pub provider: String,
    pub print_processor: String,
    pub attributes: u32,
    /// Four 16-bit parts, major first.
    pub driver_version: u64,
    pub driver_date: Option<DateTime<Utc>>,
}

impl DriverDescriptor {
    /// `major.minor.build.revision` of the installed driver.
    pub fn version_string(&self) -> String {
        let part = |shift: u32| (self.driver_version >> shift) & 0xFFFF;
        format!("{}.{}.{}.{}", part(48), part(32), part(16), part(0))
    }

    pub fn is_xps(&self) -> bool {
        self.attributes & PRINTER_DRIVER_XPS != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub id: u32,
    pub machine_name: String,
    pub user_name: String,
    pub document_name: String,
    pub datatype: String,
    pub status_code: u32,
    pub status: String,
    pub priority: u32,
    pub position: u32,
    pub total_pages: u32,
    pub pages_printed: u32,
    /// `None` when the spooler reported calendar fields that do not form a date.
    pub submitted: Option<DateTime<Utc>>,
}

/// Width and height in thousandths of a millimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FormSize {
    pub width: i32,
    pub height: i32,
}

/// Printable rectangle in thousandths of a millimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImageableArea {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormDescriptor {
    pub name: String,
    pub flags: u32,
    pub size: FormSize,
    pub imageable_area: ImageableArea,
}

impl FormDescriptor {
    pub const FORM_USER: u32 = 0x0000_0000;
    pub const FORM_BUILTIN: u32 = 0x0000_0001;
    pub const FORM_PRINTER: u32 = 0x0000_0002;

    pub fn is_builtin(&self) -> bool {
        self.flags & Self::FORM_BUILTIN != 0
    }
}
