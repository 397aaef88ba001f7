//! Two-pass, growable-buffer query protocol shared by every "list X" call.

use log::debug;
use snafu::{ensure, ResultExt};

use crate::error::{BufferProtocolViolationSnafu, OsOperationFailedSnafu, Result};
use crate::spooler::QueryFailure;

/// Byte buffer with 8-byte alignment, so record layouts containing pointers
/// and 64-bit fields can be written into it by the spooler.
pub struct AlignedBuffer {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self { words: vec![0; len.div_ceil(8)], len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` owns at least `len` initialised bytes and u8 has no alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; the borrow of `self` keeps the storage exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }
}

/// A filled query buffer. `count` is authoritative: the buffer may hold more
/// bytes than `count` records need, and those bytes are never read.
pub struct EnumerationResult {
    buffer: AlignedBuffer,
    count: u32,
}

impl EnumerationResult {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Address the spooler saw as the start of the buffer. Embedded text
    /// references are resolved against it.
    pub fn base_address(&self) -> usize {
        self.buffer.as_bytes().as_ptr() as usize
    }
}

/// Runs `call` with a buffer of `initial_hint` bytes and, if the spooler asks
/// for more, once more with exactly the size it asked for.
///
/// A second "too small" answer is a [`BufferProtocolViolation`](crate::error::PrintError::BufferProtocolViolation):
/// the query is never attempted a third time. Any other failure is returned as is.
pub fn query<F>(operation: &'static str, initial_hint: usize, mut call: F) -> Result<EnumerationResult>
where
    F: FnMut(&mut [u8]) -> Result<u32, QueryFailure>,
{
    let mut buffer = AlignedBuffer::zeroed(initial_hint);
    let required = match call(buffer.as_bytes_mut()) {
        Ok(count) => return Ok(EnumerationResult { buffer, count }),
        Err(QueryFailure::InsufficientBuffer { required }) => required,
        Err(QueryFailure::Os(source)) => return Err(source).context(OsOperationFailedSnafu { operation }),
    };

    let attempted = buffer.len();
    ensure!(required > attempted, BufferProtocolViolationSnafu { operation, attempted, required });
    debug!("{operation}: growing buffer from {attempted} to {required} bytes");

    let mut buffer = AlignedBuffer::zeroed(required);
    match call(buffer.as_bytes_mut()) {
        Ok(count) => Ok(EnumerationResult { buffer, count }),
        Err(QueryFailure::InsufficientBuffer { required: again }) => BufferProtocolViolationSnafu {
            operation,
            attempted: required,
            required: again,
        }
        .fail(),
        Err(QueryFailure::Os(source)) => Err(source).context(OsOperationFailedSnafu { operation }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OsError, PrintError};

    #[test]
    fn aligned_buffer_is_word_aligned() {
        let buffer = AlignedBuffer::zeroed(13);
        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % 8, 0);
        assert!(buffer.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn fits_first_time_in_one_call() {
        let mut calls = 0;
        let result = query("EnumForms", 64, |buf| {
            calls += 1;
            buf[0] = 7;
            Ok(1)
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(result.count(), 1);
        assert_eq!(result.bytes()[0], 7);
    }

    #[test]
    fn single_size_report_takes_exactly_two_calls() {
        let mut sizes = Vec::new();
        let result = query("EnumJobs", 0, |buf| {
            sizes.push(buf.len());
            if buf.len() < 100 {
                return Err(QueryFailure::InsufficientBuffer { required: 100 });
            }
            Ok(3)
        })
        .unwrap();
        assert_eq!(sizes, vec![0, 100]);
        assert_eq!(result.count(), 3);
        assert_eq!(result.bytes().len(), 100);
    }

    #[test]
    fn second_too_small_report_without_growth_is_a_violation() {
        let mut calls = 0;
        let err = query("EnumPrinters", 0, |_| {
            calls += 1;
            Err(QueryFailure::InsufficientBuffer { required: 40 })
        })
        .err()
        .unwrap();
        assert_eq!(calls, 2);
        assert!(matches!(
            err,
            PrintError::BufferProtocolViolation { attempted: 40, required: 40, .. }
        ));
    }

    #[test]
    fn growth_is_bounded_to_two_attempts() {
        let mut calls = 0;
        let err = query("EnumPrinters", 0, |buf| {
            calls += 1;
            Err(QueryFailure::InsufficientBuffer { required: buf.len() + 16 })
        })
        .err()
        .unwrap();
        assert_eq!(calls, 2);
        assert!(matches!(err, PrintError::BufferProtocolViolation { .. }));
    }

    #[test]
    fn first_report_not_larger_than_hint_is_a_violation() {
        let mut calls = 0;
        let err = query("GetPrinterDriver", 256, |_| {
            calls += 1;
            Err(QueryFailure::InsufficientBuffer { required: 128 })
        })
        .err()
        .unwrap();
        assert_eq!(calls, 1);
        assert!(matches!(
            err,
            PrintError::BufferProtocolViolation { attempted: 256, required: 128, .. }
        ));
    }

    #[test]
    fn other_failures_are_returned_unmodified() {
        let denied = OsError::from_code(5, "Access is denied.");
        let err = query("EnumJobs", 0, |_| Err(QueryFailure::Os(denied.clone()))).err().unwrap();
        match err {
            PrintError::OsOperationFailed { operation, source } => {
                assert_eq!(operation, "EnumJobs");
                assert_eq!(source, denied);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut calls = 0;
        let err = query("EnumJobs", 0, |_| {
            calls += 1;
            if calls == 1 {
                Err(QueryFailure::InsufficientBuffer { required: 8 })
            } else {
                Err(QueryFailure::Os(OsError::from_code(1801, "The printer name is invalid.")))
            }
        })
        .err()
        .unwrap();
        assert_eq!(err.os_code(), Some(1801));
    }
}
