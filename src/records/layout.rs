//! Fixed record shapes and bounds-checked access to them.
//!
//! Offsets follow the platform C layout rules: every field is aligned to its
//! own alignment and the record is padded to its largest field alignment.

use std::sync::OnceLock;

use snafu::ensure;

use crate::enumerator::EnumerationResult;
use crate::error::{MalformedRecordSnafu, Result};

const POINTER: usize = std::mem::size_of::<usize>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U32,
    U64,
    /// Address of a NUL-terminated UTF-16 string, or zero.
    Text,
    /// Address of something other than text. Never dereferenced.
    Pointer,
    /// Eight 16-bit calendar fields.
    SystemTime,
    FileTime,
    /// Width and height, 32-bit each.
    Size,
    /// Left, top, right, bottom, 32-bit each.
    Rect,
}

impl FieldKind {
    fn size(self) -> usize {
        match self {
            FieldKind::U32 => 4,
            FieldKind::U64 | FieldKind::FileTime | FieldKind::Size => 8,
            FieldKind::Text | FieldKind::Pointer => POINTER,
            FieldKind::SystemTime | FieldKind::Rect => 16,
        }
    }

    fn align(self) -> usize {
        match self {
            FieldKind::U32 | FieldKind::FileTime | FieldKind::Size | FieldKind::Rect => 4,
            FieldKind::U64 => 8,
            FieldKind::Text | FieldKind::Pointer => POINTER,
            FieldKind::SystemTime => 2,
        }
    }
}

#[derive(Debug)]
pub struct RecordLayout {
    name: &'static str,
    kinds: Vec<FieldKind>,
    offsets: Vec<usize>,
    size: usize,
}

impl RecordLayout {
    pub fn new(name: &'static str, kinds: &[FieldKind]) -> Self {
        let mut offsets = Vec::with_capacity(kinds.len());
        let mut cursor: usize = 0;
        let mut max_align: usize = 1;
        for kind in kinds {
            cursor = cursor.next_multiple_of(kind.align());
            offsets.push(cursor);
            cursor += kind.size();
            max_align = max_align.max(kind.align());
        }
        Self {
            name,
            kinds: kinds.to_vec(),
            offsets,
            size: cursor.next_multiple_of(max_align),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self, field: usize) -> usize {
        self.offsets[field]
    }

    fn span(&self, field: usize, expected: FieldKind) -> (usize, usize) {
        debug_assert_eq!(self.kinds[field], expected, "{} field {field}", self.name);
        (self.offsets[field], expected.size())
    }
}

/// Field indices of the level 5 printer record.
pub mod printer_info_5 {
    pub const PRINTER_NAME: usize = 0;
    pub const PORT_NAME: usize = 1;
    pub const ATTRIBUTES: usize = 2;
    pub const DEVICE_NOT_SELECTED_TIMEOUT: usize = 3;
    pub const TRANSMISSION_RETRY_TIMEOUT: usize = 4;
}

pub fn printer_info_5() -> &'static RecordLayout {
    use FieldKind::*;
    static LAYOUT: OnceLock<RecordLayout> = OnceLock::new();
    LAYOUT.get_or_init(|| RecordLayout::new("PRINTER_INFO_5", &[Text, Text, U32, U32, U32]))
}

pub mod printer_info_2 {
    pub const SERVER_NAME: usize = 0;
    pub const PRINTER_NAME: usize = 1;
    pub const SHARE_NAME: usize = 2;
    pub const PORT_NAME: usize = 3;
    pub const DRIVER_NAME: usize = 4;
    pub const COMMENT: usize = 5;
    pub const LOCATION: usize = 6;
    pub const DEV_MODE: usize = 7;
    pub const SEP_FILE: usize = 8;
    pub const PRINT_PROCESSOR: usize = 9;
    pub const DATATYPE: usize = 10;
    pub const PARAMETERS: usize = 11;
    pub const SECURITY_DESCRIPTOR: usize = 12;
    pub const ATTRIBUTES: usize = 13;
    pub const PRIORITY: usize = 14;
    pub const DEFAULT_PRIORITY: usize = 15;
    pub const START_TIME: usize = 16;
    pub const UNTIL_TIME: usize = 17;
    pub const STATUS: usize = 18;
    pub const JOBS: usize = 19;
    pub const AVERAGE_PPM: usize = 20;
}

pub fn printer_info_2() -> &'static RecordLayout {
    use FieldKind::*;
    static LAYOUT: OnceLock<RecordLayout> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        RecordLayout::new(
            "PRINTER_INFO_2",
            &[
                Text, Text, Text, Text, Text, Text, Text, Pointer, Text, Text, Text, Text, Pointer,
                U32, U32, U32, U32, U32, U32, U32, U32,
            ],
        )
    })
}

pub mod job_info_1 {
    pub const JOB_ID: usize = 0;
    pub const PRINTER_NAME: usize = 1;
    pub const MACHINE_NAME: usize = 2;
    pub const USER_NAME: usize = 3;
    pub const DOCUMENT: usize = 4;
    pub const DATATYPE: usize = 5;
    pub const STATUS_TEXT: usize = 6;
    pub const STATUS: usize = 7;
    pub const PRIORITY: usize = 8;
    pub const POSITION: usize = 9;
    pub const TOTAL_PAGES: usize = 10;
    pub const PAGES_PRINTED: usize = 11;
    pub const SUBMITTED: usize = 12;
}

pub fn job_info_1() -> &'static RecordLayout {
    use FieldKind::*;
    static LAYOUT: OnceLock<RecordLayout> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        RecordLayout::new(
            "JOB_INFO_1",
            &[U32, Text, Text, Text, Text, Text, Text, U32, U32, U32, U32, U32, SystemTime],
        )
    })
}

pub mod form_info_1 {
    pub const FLAGS: usize = 0;
    pub const NAME: usize = 1;
    pub const SIZE: usize = 2;
    pub const IMAGEABLE_AREA: usize = 3;
}

pub fn form_info_1() -> &'static RecordLayout {
    use FieldKind::*;
    static LAYOUT: OnceLock<RecordLayout> = OnceLock::new();
    LAYOUT.get_or_init(|| RecordLayout::new("FORM_INFO_1", &[U32, Text, Size, Rect]))
}

pub mod driver_info_8 {
    pub const VERSION: usize = 0;
    pub const NAME: usize = 1;
    pub const ENVIRONMENT: usize = 2;
    pub const DRIVER_PATH: usize = 3;
    pub const DATA_FILE: usize = 4;
    pub const CONFIG_FILE: usize = 5;
    pub const HELP_FILE: usize = 6;
    pub const DEPENDENT_FILES: usize = 7;
    pub const MONITOR_NAME: usize = 8;
    pub const DEFAULT_DATATYPE: usize = 9;
    pub const PREVIOUS_NAMES: usize = 10;
    pub const DRIVER_DATE: usize = 11;
    pub const DRIVER_VERSION: usize = 12;
    pub const MANUFACTURER: usize = 13;
    pub const OEM_URL: usize = 14;
    pub const HARDWARE_ID: usize = 15;
    pub const PROVIDER: usize = 16;
    pub const PRINT_PROCESSOR: usize = 17;
    pub const VENDOR_SETUP: usize = 18;
    pub const COLOR_PROFILES: usize = 19;
    pub const INF_PATH: usize = 20;
    pub const ATTRIBUTES: usize = 21;
    pub const CORE_DRIVER_DEPENDENCIES: usize = 22;
    pub const MIN_INBOX_DRIVER_DATE: usize = 23;
    pub const MIN_INBOX_DRIVER_VERSION: usize = 24;
}

pub fn driver_info_8() -> &'static RecordLayout {
    use FieldKind::*;
    static LAYOUT: OnceLock<RecordLayout> = OnceLock::new();
    LAYOUT.get_or_init(|| {
        RecordLayout::new(
            "DRIVER_INFO_8",
            &[
                U32, Text, Text, Text, Text, Text, Text, Pointer, Text, Text, Pointer, FileTime,
                U64, Text, Text, Text, Text, Text, Text, Pointer, Text, U32, Pointer, FileTime, U64,
            ],
        )
    })
}

/// Raw calendar fields of a SYSTEMTIME, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarFields {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl CalendarFields {
    fn to_words(self) -> [u16; 8] {
        [
            self.year,
            self.month,
            self.day_of_week,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.milliseconds,
        ]
    }
}

/// One record inside a filled buffer. All reads stay within the record's own
/// bytes; text references are resolved against the whole buffer.
pub struct Record<'a> {
    layout: &'static RecordLayout,
    bytes: &'a [u8],
    buffer: &'a [u8],
    base: usize,
}

impl EnumerationResult {
    /// The first `count()` records of `layout`, or an error if they would not
    /// fit in the buffer.
    pub fn records(&self, layout: &'static RecordLayout) -> Result<impl Iterator<Item = Record<'_>>> {
        let count = self.count() as usize;
        let buffer = self.bytes();
        let needed = count.checked_mul(layout.size());
        ensure!(
            needed.is_some_and(|needed| needed <= buffer.len()),
            MalformedRecordSnafu {
                operation: layout.name(),
                reason: format!("{count} records do not fit in a {} byte buffer", buffer.len()),
            }
        );
        let base = self.base_address();
        Ok(buffer
            .chunks_exact(layout.size())
            .take(count)
            .map(move |bytes| Record { layout, bytes, buffer, base }))
    }
}

impl<'a> Record<'a> {
    fn field(&self, field: usize, kind: FieldKind) -> &'a [u8] {
        let (offset, size) = self.layout.span(field, kind);
        &self.bytes[offset..offset + size]
    }

    pub fn u32(&self, field: usize) -> u32 {
        u32::from_ne_bytes(self.field(field, FieldKind::U32).try_into().unwrap_or_default())
    }

    pub fn u64(&self, field: usize) -> u64 {
        u64::from_ne_bytes(self.field(field, FieldKind::U64).try_into().unwrap_or_default())
    }

    /// 100ns intervals since 1601, as stored.
    pub fn file_time(&self, field: usize) -> u64 {
        let bytes = self.field(field, FieldKind::FileTime);
        let low = u32::from_ne_bytes(bytes[0..4].try_into().unwrap_or_default());
        let high = u32::from_ne_bytes(bytes[4..8].try_into().unwrap_or_default());
        (u64::from(high) << 32) | u64::from(low)
    }

    pub fn size(&self, field: usize) -> (i32, i32) {
        let bytes = self.field(field, FieldKind::Size);
        (read_i32(bytes, 0), read_i32(bytes, 1))
    }

    pub fn rect(&self, field: usize) -> (i32, i32, i32, i32) {
        let bytes = self.field(field, FieldKind::Rect);
        (read_i32(bytes, 0), read_i32(bytes, 1), read_i32(bytes, 2), read_i32(bytes, 3))
    }

    pub fn calendar(&self, field: usize) -> CalendarFields {
        let bytes = self.field(field, FieldKind::SystemTime);
        let word = |i: usize| u16::from_ne_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        CalendarFields {
            year: word(0),
            month: word(1),
            day_of_week: word(2),
            day: word(3),
            hour: word(4),
            minute: word(5),
            second: word(6),
            milliseconds: word(7),
        }
    }

    fn address(&self, field: usize) -> usize {
        let kind = self.layout.kinds[field];
        debug_assert!(matches!(kind, FieldKind::Text | FieldKind::Pointer));
        usize::from_ne_bytes(self.field(field, kind).try_into().unwrap_or_default())
    }

    /// Decodes a text reference into an owned string. A null reference is
    /// the empty string.
    pub fn text(&self, field: usize) -> Result<String> {
        let address = self.address(field);
        if address == 0 {
            return Ok(String::new());
        }
        let operation = self.layout.name();
        let start = address
            .checked_sub(self.base)
            .filter(|offset| *offset < self.buffer.len());
        let Some(start) = start else {
            return MalformedRecordSnafu {
                operation,
                reason: format!("text reference {address:#x} points outside the buffer"),
            }
            .fail();
        };
        wide_string_at(self.buffer, start).ok_or_else(|| {
            MalformedRecordSnafu {
                operation,
                reason: format!("text at offset {start} is not terminated"),
            }
            .build()
        })
    }
}

fn read_i32(bytes: &[u8], index: usize) -> i32 {
    i32::from_ne_bytes(bytes[4 * index..4 * index + 4].try_into().unwrap_or_default())
}

/// Reads a NUL-terminated UTF-16 string starting at byte `start`. Returns
/// `None` when the buffer ends before the terminator.
pub fn wide_string_at(buffer: &[u8], start: usize) -> Option<String> {
    let units: Vec<u16> = buffer
        .get(start..)?
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    let terminator = start + 2 * units.len();
    if terminator + 2 > buffer.len() {
        return None;
    }
    Some(String::from_utf16_lossy(&units))
}

/// Builds records into a caller-supplied buffer, the way the spooler does:
/// fixed records first, strings packed after them, text fields holding
/// absolute addresses within the buffer.
pub struct RecordWriter<'a> {
    layout: &'static RecordLayout,
    buffer: &'a mut [u8],
    base: usize,
    records: usize,
    strings: usize,
}

impl<'a> RecordWriter<'a> {
    pub fn new(layout: &'static RecordLayout, buffer: &'a mut [u8], records: usize) -> Self {
        let base = buffer.as_ptr() as usize;
        Self { layout, buffer, base, records: 0, strings: records * layout.size() }
    }

    /// Bytes needed for `records` records plus the given strings.
    pub fn required_size<'s>(layout: &RecordLayout, records: usize, strings: impl IntoIterator<Item = &'s str>) -> usize {
        records * layout.size() + strings.into_iter().map(wide_size).sum::<usize>()
    }

    pub fn begin(&mut self) -> RecordBuilder<'_, 'a> {
        let start = self.records * self.layout.size();
        self.records += 1;
        RecordBuilder { writer: self, start }
    }

    fn push_string(&mut self, value: &str) -> usize {
        let address = self.base + self.strings;
        for unit in value.encode_utf16().chain(std::iter::once(0)) {
            self.buffer[self.strings..self.strings + 2].copy_from_slice(&unit.to_ne_bytes());
            self.strings += 2;
        }
        address
    }
}

fn wide_size(value: &str) -> usize {
    2 * (value.encode_utf16().count() + 1)
}

pub struct RecordBuilder<'w, 'a> {
    writer: &'w mut RecordWriter<'a>,
    start: usize,
}

impl RecordBuilder<'_, '_> {
    fn put(&mut self, field: usize, kind: FieldKind, bytes: &[u8]) -> &mut Self {
        let (offset, size) = self.writer.layout.span(field, kind);
        let at = self.start + offset;
        self.writer.buffer[at..at + size].copy_from_slice(bytes);
        self
    }

    pub fn u32(&mut self, field: usize, value: u32) -> &mut Self {
        self.put(field, FieldKind::U32, &value.to_ne_bytes())
    }

    pub fn u64(&mut self, field: usize, value: u64) -> &mut Self {
        self.put(field, FieldKind::U64, &value.to_ne_bytes())
    }

    pub fn file_time(&mut self, field: usize, value: u64) -> &mut Self {
        let mut bytes = [0; 8];
        bytes[0..4].copy_from_slice(&(value as u32).to_ne_bytes());
        bytes[4..8].copy_from_slice(&((value >> 32) as u32).to_ne_bytes());
        self.put(field, FieldKind::FileTime, &bytes)
    }

    /// Empty strings are stored as null references.
    pub fn text(&mut self, field: usize, value: &str) -> &mut Self {
        let address = if value.is_empty() { 0 } else { self.writer.push_string(value) };
        self.put(field, FieldKind::Text, &address.to_ne_bytes())
    }

    pub fn size(&mut self, field: usize, width: i32, height: i32) -> &mut Self {
        let mut bytes = [0; 8];
        bytes[0..4].copy_from_slice(&width.to_ne_bytes());
        bytes[4..8].copy_from_slice(&height.to_ne_bytes());
        self.put(field, FieldKind::Size, &bytes)
    }

    pub fn rect(&mut self, field: usize, left: i32, top: i32, right: i32, bottom: i32) -> &mut Self {
        let mut bytes = [0; 16];
        for (i, value) in [left, top, right, bottom].into_iter().enumerate() {
            bytes[4 * i..4 * i + 4].copy_from_slice(&value.to_ne_bytes());
        }
        self.put(field, FieldKind::Rect, &bytes)
    }

    pub fn calendar(&mut self, field: usize, value: CalendarFields) -> &mut Self {
        let mut bytes = [0; 16];
        for (i, word) in value.to_words().into_iter().enumerate() {
            bytes[2 * i..2 * i + 2].copy_from_slice(&word.to_ne_bytes());
        }
        self.put(field, FieldKind::SystemTime, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_the_native_record_sizes() {
        if POINTER == 8 {
            assert_eq!(printer_info_5().size(), 32);
            assert_eq!(form_info_1().size(), 40);
            assert_eq!(job_info_1().size(), 96);
            assert_eq!(printer_info_2().size(), 136);
            assert_eq!(driver_info_8().size(), 200);
            assert_eq!(job_info_1().offset(job_info_1::PRINTER_NAME), 8);
            assert_eq!(job_info_1().offset(job_info_1::SUBMITTED), 76);
            assert_eq!(driver_info_8().offset(driver_info_8::ATTRIBUTES), 168);
        } else {
            assert_eq!(printer_info_5().size(), 20);
            assert_eq!(form_info_1().size(), 32);
            assert_eq!(job_info_1().size(), 64);
        }
    }

    #[test]
    fn wide_string_requires_a_terminator() {
        let bytes: Vec<u8> = "ab".encode_utf16().flat_map(u16::to_ne_bytes).collect();
        assert_eq!(wide_string_at(&bytes, 0), None);

        let mut terminated = bytes.clone();
        terminated.extend_from_slice(&[0, 0]);
        assert_eq!(wide_string_at(&terminated, 0).as_deref(), Some("ab"));
        assert_eq!(wide_string_at(&terminated, 2).as_deref(), Some("b"));
        assert_eq!(wide_string_at(&terminated, 40), None);
    }
}
