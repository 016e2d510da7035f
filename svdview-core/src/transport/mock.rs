//! In-memory transport for tests and `--mock` runs.
//!
//! Memory is a sparse byte map; unmapped bytes read as zero. Address ranges
//! can be marked as faulting to simulate bus errors, and every block read is
//! logged so tests can assert what was fetched.

use super::RegisterTransport;
use crate::error::{ReadError, WriteError};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    memory: BTreeMap<u64, u8>,
    faults: Vec<Range<u64>>,
    reads: Vec<(u64, u32)>,
    writes: Vec<(u64, Vec<u8>)>,
}

/// Cloneable handle; clones share memory and logs.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a little-endian 32-bit word.
    #[must_use]
    pub fn with_word(self, address: u64, value: u32) -> Self {
        self.poke(address, &value.to_le_bytes());
        self
    }

    /// Make every access touching `range` fail.
    #[must_use]
    pub fn with_fault(self, range: Range<u64>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(range);
        }
        self
    }

    pub fn poke(&self, address: u64, bytes: &[u8]) {
        if let Ok(mut state) = self.state.lock() {
            for (addr, &b) in (address..).zip(bytes) {
                state.memory.insert(addr, b);
            }
        }
    }

    pub fn peek_word(&self, address: u64) -> u32 {
        self.state.lock().map_or(0, |state| {
            let bytes: Vec<u8> = (address..address + 4)
                .map(|a| state.memory.get(&a).copied().unwrap_or(0))
                .collect();
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        })
    }

    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.clear();
        }
    }

    /// Block reads performed so far, as `(address, len)`.
    pub fn reads(&self) -> Vec<(u64, u32)> {
        self.state.lock().map(|s| s.reads.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.state.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    pub fn reset_log(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.reads.clear();
            state.writes.clear();
        }
    }

    fn faulted(state: &MockState, address: u64, len: u64) -> bool {
        let access = address..address + len;
        state
            .faults
            .iter()
            .any(|f| f.start < access.end && access.start < f.end)
    }
}

impl RegisterTransport for MockTransport {
    async fn read_block(&self, address: u64, len: u32) -> Result<Vec<u8>, ReadError> {
        let mut state = self.state.lock().map_err(|_| ReadError::Transport {
            address,
            len,
            message: "mock state poisoned".to_string(),
        })?;
        state.reads.push((address, len));
        if Self::faulted(&state, address, u64::from(len)) {
            return Err(ReadError::Transport {
                address,
                len,
                message: "bus fault".to_string(),
            });
        }
        Ok((address..address + u64::from(len))
            .map(|a| state.memory.get(&a).copied().unwrap_or(0))
            .collect())
    }

    async fn write_block(&self, address: u64, data: Vec<u8>) -> Result<(), WriteError> {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let mut state = self.state.lock().map_err(|_| WriteError::Transport {
            address,
            len,
            message: "mock state poisoned".to_string(),
        })?;
        if Self::faulted(&state, address, data.len() as u64) {
            return Err(WriteError::Transport {
                address,
                len,
                message: "bus fault".to_string(),
            });
        }
        for (addr, &b) in (address..).zip(&data) {
            state.memory.insert(addr, b);
        }
        state.writes.push((address, data));
        Ok(())
    }
}
