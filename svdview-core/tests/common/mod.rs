//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svdview_core::{
    Access, ChangeBus, DescriptionParser, Diagnostics, FieldDesc, ParseError, PeripheralDesc,
    ReadError, RegisterDesc, RegisterTransport, WriteError,
};
use tokio::sync::Barrier;

/// Route `log` output through the test harness; `RUST_LOG=debug` to see it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Base address of the `i`-th peripheral produced by [`ListParser`].
pub fn base_of(i: usize) -> u64 {
    0x4000_0000 + 0x1000 * i as u64
}

/// Parses `"NAME, NAME, ..."`. Every peripheral gets two adjacent registers.
///
/// A blob starting with `<` is rejected. A blob starting with `slow:` sleeps
/// for 200 ms before parsing the rest.
#[derive(Debug, Default, Clone)]
pub struct ListParser;

impl DescriptionParser for ListParser {
    async fn parse(&self, raw: &str) -> Result<Vec<PeripheralDesc>, ParseError> {
        let raw = match raw.strip_prefix("slow:") {
            Some(rest) => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                rest
            }
            None => raw,
        };
        if raw.starts_with('<') {
            return Err(ParseError::Malformed("unexpected markup".to_string()));
        }
        Ok(raw
            .split(',')
            .enumerate()
            .map(|(i, name)| PeripheralDesc {
                name: name.trim().to_string(),
                base_address: base_of(i),
                description: None,
                group_name: None,
                registers: vec![register("CR", 0), register("SR", 4)],
            })
            .collect())
    }
}

fn register(name: &str, offset: u32) -> RegisterDesc {
    RegisterDesc {
        name: name.to_string(),
        address_offset: offset,
        description: None,
        size: 32,
        access: Access::ReadWrite,
        reset_value: None,
        fields: vec![FieldDesc {
            name: "EN".to_string(),
            description: None,
            bit_offset: 0,
            bit_width: 1,
            access: Access::ReadWrite,
        }],
    }
}

/// Diagnostics sink that remembers what the user would have seen.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    pub errors: Mutex<Vec<String>>,
    pub console: Mutex<Vec<String>>,
}

impl Diagnostics for RecordingDiagnostics {
    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn console_line(&self, message: &str) {
        self.console.lock().unwrap().push(message.to_string());
    }
}

/// Count fires on `bus`.
pub fn count_fires(bus: &ChangeBus) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    bus.subscribe(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

/// Transport whose reads only complete once `n` of them are waiting at once.
/// Reads issued one after another never get past the first.
#[derive(Debug, Clone)]
pub struct BarrierTransport {
    barrier: Arc<Barrier>,
    reads: Arc<AtomicUsize>,
}

impl BarrierTransport {
    pub fn new(n: usize) -> Self {
        Self {
            barrier: Arc::new(Barrier::new(n)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RegisterTransport for BarrierTransport {
    async fn read_block(&self, _address: u64, len: u32) -> Result<Vec<u8>, ReadError> {
        self.barrier.wait().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xA5; len as usize])
    }

    async fn write_block(&self, _address: u64, _data: Vec<u8>) -> Result<(), WriteError> {
        Ok(())
    }
}
