//! Access protocol vocabulary shared by every attribute kind.

/// Arguments of a single attribute access. Exactly one operation is live per
/// call.
pub enum AccessArgs<'m> {
    /// Read the logical value starting at `offset` into `buffer`.
    Read {
        /// Offset into the logical value. `offset == length` is valid and
        /// yields a zero-length read.
        offset: usize,
        /// Destination for the value bytes.
        buffer: &'m mut [u8],
    },
    /// Replace the stored value with `data`, left-aligned at offset zero.
    Write {
        /// The bytes to store.
        data: &'m [u8],
    },
    /// Compare the current logical value byte-exactly against `expected`.
    /// Never mutates.
    CompareValue {
        /// The value to compare against.
        expected: &'m [u8],
    },
}

/// Outcome of one attribute access. Exactly one result per call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    /// The access completed. For reads, `len` bytes were written to the
    /// output buffer; for writes, `len` bytes were consumed.
    Success {
        /// Number of bytes transferred.
        len: usize,
    },
    /// The output buffer was too small; exactly `len` bytes (its full
    /// capacity) were written.
    ReadTruncated {
        /// Number of bytes written.
        len: usize,
    },
    /// Write input longer than the bound storage; nothing was stored.
    WriteOverflow,
    /// Offset points past the end of the logical value.
    InvalidOffset,
    /// The attribute cannot be read.
    ReadNotPermitted,
    /// The attribute cannot be written.
    WriteNotPermitted,
    /// Compared values match.
    ValueEqual,
    /// Compared values differ.
    ValueNotEqual,
}

impl AccessResult {
    /// ATT error code for protocol-visible failures, per the error response
    /// table of the Core Specification (Vol 3, Part F). `None` for outcomes
    /// the ATT layer does not report as errors (truncation is handled by
    /// multi-part reads, value comparison by find-by-type-value matching).
    pub fn att_error_code(&self) -> Option<u8> {
        match self {
            AccessResult::ReadNotPermitted => Some(0x02),
            AccessResult::WriteNotPermitted => Some(0x03),
            AccessResult::InvalidOffset => Some(0x07),
            AccessResult::WriteOverflow => Some(0x0d),
            _ => None,
        }
    }
}
