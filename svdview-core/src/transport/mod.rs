//! Live register access.
//!
//! A transport moves raw bytes between the debug target and the tree. It knows
//! nothing about peripherals; [`crate::refresh`] decides what to read.

pub mod mock;
#[cfg(feature = "hardware")]
pub mod probe;

use crate::error::{ReadError, WriteError};
use std::future::Future;

pub use mock::MockTransport;
#[cfg(feature = "hardware")]
pub use probe::ProbeTransport;

/// Transport collaborator. Calls are single-flight per peripheral but several
/// peripherals may be read concurrently, hence `&self`.
pub trait RegisterTransport {
    /// Read `len` bytes starting at `address`.
    fn read_block(
        &self,
        address: u64,
        len: u32,
    ) -> impl Future<Output = Result<Vec<u8>, ReadError>> + Send;

    /// Write `data` starting at `address`.
    fn write_block(
        &self,
        address: u64,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), WriteError>> + Send;
}

/// Little-endian decode of up to eight bytes.
pub fn decode_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Little-endian encode of `value` into `len` bytes.
pub fn encode_le(value: u64, len: u32) -> Vec<u8> {
    value.to_le_bytes().into_iter().take(len as usize).collect()
}
