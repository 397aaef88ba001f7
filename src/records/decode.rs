//! Decoders from filled query buffers to owned descriptors.
//!
//! Every descriptor is fully owned, so the buffer can be dropped as soon as
//! decoding returns.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use log::debug;
use snafu::ensure;

use crate::enumerator::EnumerationResult;
use crate::error::{MalformedRecordSnafu, Result};
use crate::records::layout::{
    self, driver_info_8, form_info_1, job_info_1, printer_info_2, printer_info_5, CalendarFields,
};
use crate::records::models::*;
use crate::status;

pub fn decode_default_printer(result: &EnumerationResult) -> Result<String> {
    ensure!(
        result.count() > 0,
        MalformedRecordSnafu { operation: "GetDefaultPrinter", reason: "no name was returned" }
    );
    layout::wide_string_at(result.bytes(), 0).ok_or_else(|| {
        MalformedRecordSnafu { operation: "GetDefaultPrinter", reason: "name is not terminated" }.build()
    })
}

/// Level 5 printer records. `is_default` is filled in by the caller.
pub fn decode_printers(result: &EnumerationResult) -> Result<Vec<PrinterDescriptor>> {
    result
        .records(layout::printer_info_5())?
        .map(|record| {
            Ok(PrinterDescriptor {
                name: record.text(printer_info_5::PRINTER_NAME)?,
                port_name: record.text(printer_info_5::PORT_NAME)?,
                attributes: record.u32(printer_info_5::ATTRIBUTES),
                is_default: false,
            })
        })
        .collect()
}

pub fn decode_details(result: &EnumerationResult) -> Result<PrinterDetails> {
    let record = result.records(layout::printer_info_2())?.next();
    let Some(record) = record else {
        return MalformedRecordSnafu { operation: "PRINTER_INFO_2", reason: "no record was returned" }.fail();
    };
    Ok(PrinterDetails {
        server_name: record.text(printer_info_2::SERVER_NAME)?,
        name: record.text(printer_info_2::PRINTER_NAME)?,
        share_name: record.text(printer_info_2::SHARE_NAME)?,
        port_name: record.text(printer_info_2::PORT_NAME)?,
        driver_name: record.text(printer_info_2::DRIVER_NAME)?,
        comment: record.text(printer_info_2::COMMENT)?,
        location: record.text(printer_info_2::LOCATION)?,
        separator_file: record.text(printer_info_2::SEP_FILE)?,
        print_processor: record.text(printer_info_2::PRINT_PROCESSOR)?,
        datatype: record.text(printer_info_2::DATATYPE)?,
        parameters: record.text(printer_info_2::PARAMETERS)?,
        attributes: record.u32(printer_info_2::ATTRIBUTES),
        priority: record.u32(printer_info_2::PRIORITY),
        default_priority: record.u32(printer_info_2::DEFAULT_PRIORITY),
        start_time: record.u32(printer_info_2::START_TIME),
        until_time: record.u32(printer_info_2::UNTIL_TIME),
        status: record.u32(printer_info_2::STATUS),
        queued_jobs: record.u32(printer_info_2::JOBS),
        average_ppm: record.u32(printer_info_2::AVERAGE_PPM),
    })
}

pub fn decode_driver(result: &EnumerationResult) -> Result<DriverDescriptor> {
    let record = result.records(layout::driver_info_8())?.next();
    let Some(record) = record else {
        return MalformedRecordSnafu { operation: "DRIVER_INFO_8", reason: "no record was returned" }.fail();
    };
    Ok(DriverDescriptor {
        version: record.u32(driver_info_8::VERSION),
        name: record.text(driver_info_8::NAME)?,
        environment: record.text(driver_info_8::ENVIRONMENT)?,
        driver_path: record.text(driver_info_8::DRIVER_PATH)?,
        default_datatype: record.text(driver_info_8::DEFAULT_DATATYPE)?,
        manufacturer: record.text(driver_info_8::MANUFACTURER)?,
        provider: record.text(driver_info_8::PROVIDER)?,
        print_processor: record.text(driver_info_8::PRINT_PROCESSOR)?,
        attributes: record.u32(driver_info_8::ATTRIBUTES),
        driver_version: record.u64(driver_info_8::DRIVER_VERSION),
        driver_date: file_time_to_utc(record.file_time(driver_info_8::DRIVER_DATE)),
    })
}

// 100ns intervals between 1601-01-01 and 1970-01-01.
const FILE_TIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// A zero file time means the field was not filled in.
pub fn file_time_to_utc(file_time: u64) -> Option<DateTime<Utc>> {
    if file_time == 0 {
        return None;
    }
    let since_unix = i64::try_from(file_time.checked_sub(FILE_TIME_UNIX_EPOCH)?).ok()?;
    DateTime::<Utc>::from_timestamp(since_unix / 10_000_000, (since_unix % 10_000_000) as u32 * 100)
}

pub fn decode_forms(result: &EnumerationResult) -> Result<Vec<FormDescriptor>> {
    result
        .records(layout::form_info_1())?
        .map(|record| {
            let (width, height) = record.size(form_info_1::SIZE);
            let (left, top, right, bottom) = record.rect(form_info_1::IMAGEABLE_AREA);
            Ok(FormDescriptor {
                name: record.text(form_info_1::NAME)?,
                flags: record.u32(form_info_1::FLAGS),
                size: FormSize { width, height },
                imageable_area: ImageableArea { left, top, right, bottom },
            })
        })
        .collect()
}

/// Level 1 job records, with submission times read as local time.
pub fn decode_jobs(result: &EnumerationResult) -> Result<Vec<JobDescriptor>> {
    decode_jobs_in(result, &Local)
}

/// Level 1 job records, with submission times read in `zone`.
pub fn decode_jobs_in<Tz: TimeZone>(result: &EnumerationResult, zone: &Tz) -> Result<Vec<JobDescriptor>> {
    result
        .records(layout::job_info_1())?
        .map(|record| {
            let status_code = record.u32(job_info_1::STATUS);
            let status_text = record.text(job_info_1::STATUS_TEXT)?;
            Ok(JobDescriptor {
                id: record.u32(job_info_1::JOB_ID),
                machine_name: record.text(job_info_1::MACHINE_NAME)?,
                user_name: record.text(job_info_1::USER_NAME)?,
                document_name: record.text(job_info_1::DOCUMENT)?,
                datatype: record.text(job_info_1::DATATYPE)?,
                status: status::describe(status_code, Some(status_text.as_str())),
                status_code,
                priority: record.u32(job_info_1::PRIORITY),
                position: record.u32(job_info_1::POSITION),
                total_pages: record.u32(job_info_1::TOTAL_PAGES),
                pages_printed: record.u32(job_info_1::PAGES_PRINTED),
                submitted: calendar_to_utc(record.calendar(job_info_1::SUBMITTED), zone),
            })
        })
        .collect()
}

/// Interprets calendar fields as wall-clock time in `zone` and converts to UTC.
/// An ambiguous wall-clock time resolves to its earlier instant.
pub fn calendar_to_utc<Tz: TimeZone>(fields: CalendarFields, zone: &Tz) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(i32::from(fields.year), u32::from(fields.month), u32::from(fields.day))?
        .and_hms_milli_opt(
            u32::from(fields.hour),
            u32::from(fields.minute),
            u32::from(fields.second),
            u32::from(fields.milliseconds),
        );
    let Some(naive) = naive else {
        debug!("Ignoring invalid submission time {fields:?}");
        return None;
    };
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;
    use crate::enumerator::query;
    use crate::error::PrintError;
    use crate::records::layout::RecordWriter;

    fn fill<F>(layout: &'static layout::RecordLayout, strings: &[&str], count: usize, write: F) -> EnumerationResult
    where
        F: Fn(&mut RecordWriter<'_>),
    {
        let size = RecordWriter::required_size(layout, count, strings.iter().copied()) + 64;
        query("test", size, |buf| {
            let mut writer = RecordWriter::new(layout, buf, count);
            write(&mut writer);
            Ok(count as u32)
        })
        .unwrap()
    }

    #[test]
    fn jobs_decode_text_numbers_and_time() {
        let result = fill(
            layout::job_info_1(),
            &["HP", "\\\\WS01", "alice", "report.txt", "RAW"],
            2,
            |writer| {
                writer
                    .begin()
                    .u32(job_info_1::JOB_ID, 7)
                    .text(job_info_1::PRINTER_NAME, "HP")
                    .text(job_info_1::MACHINE_NAME, "\\\\WS01")
                    .text(job_info_1::USER_NAME, "alice")
                    .text(job_info_1::DOCUMENT, "report.txt")
                    .text(job_info_1::DATATYPE, "RAW")
                    .u32(job_info_1::STATUS, status::JOB_STATUS_PRINTING)
                    .u32(job_info_1::PRIORITY, 1)
                    .u32(job_info_1::POSITION, 1)
                    .u32(job_info_1::TOTAL_PAGES, 3)
                    .u32(job_info_1::PAGES_PRINTED, 1)
                    .calendar(
                        job_info_1::SUBMITTED,
                        CalendarFields { year: 2024, month: 3, day: 9, hour: 14, minute: 5, second: 30, milliseconds: 250, ..Default::default() },
                    );
                writer.begin().u32(job_info_1::JOB_ID, 8);
            },
        );

        let jobs = decode_jobs_in(&result, &FixedOffset::east_opt(2 * 3600).unwrap()).unwrap();
        assert_eq!(jobs.len(), 2);
        let first = &jobs[0];
        assert_eq!(first.id, 7);
        assert_eq!(first.machine_name, "\\\\WS01");
        assert_eq!(first.user_name, "alice");
        assert_eq!(first.document_name, "report.txt");
        assert_eq!(first.datatype, "RAW");
        assert_eq!(first.status, "Printing");
        assert_eq!(first.total_pages, 3);
        assert_eq!(
            first.submitted.unwrap().to_rfc3339(),
            "2024-03-09T12:05:30.250+00:00"
        );

        // Null references decode as empty strings; a zeroed time is not a date.
        let second = &jobs[1];
        assert_eq!(second.id, 8);
        assert_eq!(second.user_name, "");
        assert_eq!(second.status, status::ZERO_STATUS_LABEL);
        assert_eq!(second.submitted, None);
    }

    #[test]
    fn count_is_authoritative_over_buffer_length() {
        let layout = layout::form_info_1();
        let size = RecordWriter::required_size(layout, 2, ["A4", "Letter"]);
        let result = query("test", size, |buf| {
            let mut writer = RecordWriter::new(layout, buf, 2);
            writer.begin().text(form_info_1::NAME, "A4").size(form_info_1::SIZE, 210_000, 297_000);
            writer.begin().text(form_info_1::NAME, "Letter");
            Ok(1)
        })
        .unwrap();

        let forms = decode_forms(&result).unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].name, "A4");
        assert_eq!(forms[0].size, FormSize { width: 210_000, height: 297_000 });
    }

    #[test]
    fn references_outside_the_buffer_are_rejected() {
        let source = fill(layout::form_info_1(), &["A4"], 1, |writer| {
            writer.begin().text(form_info_1::NAME, "A4");
        });
        let copy = query("test", source.bytes().len(), |buf| {
            buf.copy_from_slice(source.bytes());
            Ok(1)
        })
        .unwrap();
        let err = decode_forms(&copy).err().unwrap();
        assert!(matches!(err, PrintError::MalformedRecord { .. }), "{err:?}");
    }

    #[test]
    fn too_many_records_for_the_buffer_are_rejected() {
        let result = query("test", 8, |_| Ok(4)).unwrap();
        let err = decode_printers(&result).err().unwrap();
        assert!(matches!(err, PrintError::MalformedRecord { .. }));
    }

    #[test]
    fn driver_and_default_printer() {
        let result = fill(layout::driver_info_8(), &["Generic", "Windows x64", "C:\\drv.dll"], 1, |writer| {
            writer
                .begin()
                .u32(driver_info_8::VERSION, 4)
                .text(driver_info_8::NAME, "Generic")
                .text(driver_info_8::ENVIRONMENT, "Windows x64")
                .text(driver_info_8::DRIVER_PATH, "C:\\drv.dll")
                .file_time(driver_info_8::DRIVER_DATE, 132_539_328_000_000_000)
                .u64(driver_info_8::DRIVER_VERSION, 0x000A_0000_4A61_0001)
                .u32(driver_info_8::ATTRIBUTES, PRINTER_DRIVER_XPS);
        });
        let driver = decode_driver(&result).unwrap();
        assert_eq!(driver.name, "Generic");
        assert_eq!(driver.environment, "Windows x64");
        assert_eq!(driver.driver_path, "C:\\drv.dll");
        assert!(driver.is_xps());
        assert_eq!(driver.version_string(), "10.0.19041.1");
        assert_eq!(driver.driver_date.unwrap().to_rfc3339(), "2021-01-01T00:00:00+00:00");

        let name: Vec<u8> = "Office\0".encode_utf16().flat_map(u16::to_ne_bytes).collect();
        let result = query("test", name.len(), |buf| {
            buf.copy_from_slice(&name);
            Ok(1)
        })
        .unwrap();
        assert_eq!(decode_default_printer(&result).unwrap(), "Office");
    }

    #[test]
    fn impossible_dates_have_no_instant() {
        let fields = CalendarFields { year: 2024, month: 2, day: 30, ..Default::default() };
        assert_eq!(calendar_to_utc(fields, &Utc), None);
    }
}
