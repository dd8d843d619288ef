// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Zero-on-fault read primitives.
//!
//! The trace hooks read completion metadata out of memory they do not own and
//! that may be torn down underneath them. [`ProbeSource`] is the seam for
//! those reads: an implementation either fills the caller's buffer completely
//! or reports a fault, and the helpers here degrade any fault to zero-filled
//! data so the hot path never has to handle a read error.

#![forbid(unsafe_code)]

use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// A read at the given offset touched memory the source could not supply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("probe fault at offset {offset:#x}")]
pub struct ProbeFault {
    pub offset: u64,
}

/// A source of bytes that may fault.
///
/// On success the buffer is filled completely; on fault the buffer contents
/// are unspecified and the caller must not use them.
pub trait ProbeSource {
    fn probe(&self, offset: u64, buf: &mut [u8]) -> Result<(), ProbeFault>;
}

/// Reads a value at `offset`, yielding the zero value on any fault.
pub fn read_or_zero<T, S>(src: &S, offset: u64) -> T
where
    T: FromBytes + IntoBytes,
    S: ProbeSource + ?Sized,
{
    let mut val = T::new_zeroed();
    if src.probe(offset, val.as_mut_bytes()).is_err() {
        val = T::new_zeroed();
    }
    val
}

/// Reads a NUL-padded byte string at `offset`, yielding an empty (all-NUL)
/// buffer on any fault.
pub fn read_str_or_empty<S>(src: &S, offset: u64, buf: &mut [u8])
where
    S: ProbeSource + ?Sized,
{
    if src.probe(offset, buf).is_err() {
        buf.fill(0);
    } else if let Some(nul) = buf.iter().position(|&b| b == 0) {
        // Normalize everything past the terminator, like a string copy would.
        buf[nul..].fill(0);
    }
}

/// A slice-backed source. Reads beyond the end of the slice fault.
pub struct MemSource<'a>(pub &'a [u8]);

impl ProbeSource for MemSource<'_> {
    fn probe(&self, offset: u64, buf: &mut [u8]) -> Result<(), ProbeFault> {
        let fault = ProbeFault { offset };
        let start = usize::try_from(offset).map_err(|_| fault)?;
        let end = start.checked_add(buf.len()).ok_or(fault)?;
        let src = self.0.get(start..end).ok_or(fault)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// A wrapper that faults any read reaching at or past a byte limit, for
/// exercising partial-fault paths in tests.
pub struct FaultAfter<S> {
    pub inner: S,
    pub limit: u64,
}

impl<S: ProbeSource> ProbeSource for FaultAfter<S> {
    fn probe(&self, offset: u64, buf: &mut [u8]) -> Result<(), ProbeFault> {
        if offset.saturating_add(buf.len() as u64) > self.limit {
            return Err(ProbeFault { offset });
        }
        self.inner.probe(offset, buf)
    }
}
