//! Single byte-range parsing for blob downloads

use std::fmt;

/// An inclusive byte window inside a blob, always within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    start: u64,
    end: u64,
}

impl RangeSpec {
    /// First byte offset.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true: a valid range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a blob of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// The `Range` header cannot be satisfied for this blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRange;

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid byte range")
    }
}

impl std::error::Error for InvalidRange {}

/// Parse `bytes=<start>-[<end>]` against a blob of `total` bytes.
///
/// A missing end means "to the end of the blob". Only the first range of a
/// multi-range header is considered. Suffix ranges (`bytes=-500`) are not
/// supported.
pub fn parse_range(header: &str, total: u64) -> Result<RangeSpec, InvalidRange> {
    let spec = header.trim().strip_prefix("bytes=").ok_or(InvalidRange)?;
    let first = spec.split(',').next().unwrap_or_default();
    let (start, end) = first.split_once('-').ok_or(InvalidRange)?;

    let start: u64 = start.trim().parse().map_err(|_| InvalidRange)?;
    let end = match end.trim() {
        "" => total.checked_sub(1).ok_or(InvalidRange)?,
        end => end.parse().map_err(|_| InvalidRange)?,
    };

    if start >= total || end >= total || start > end {
        return Err(InvalidRange);
    }

    Ok(RangeSpec { start, end })
}
