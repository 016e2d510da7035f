//! probe-rs backed transport.
//!
//! probe-rs is blocking, so every access runs on the blocking pool while the
//! session itself sits behind a mutex.

use super::RegisterTransport;
use crate::error::{ReadError, WriteError};
use anyhow::{Context as _, Result};
use probe_rs::probe::list::Lister;
use probe_rs::{MemoryInterface, Permissions, Session};
use std::sync::{Arc, Mutex};

/// Reads and writes target memory through core `core_index` of a probe-rs session.
#[derive(Clone)]
pub struct ProbeTransport {
    session: Arc<Mutex<Session>>,
    core_index: usize,
}

impl ProbeTransport {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            core_index: 0,
        }
    }

    /// Open probe `index` and attach to `chip`, or auto-detect when `None`.
    pub fn attach(index: usize, chip: Option<&str>) -> Result<Self> {
        let lister = Lister::new();
        let probes = lister.list_all();
        let info = probes.get(index).context("Probe index out of range")?;
        log::info!(
            "Opening probe {} ({:04X}:{:04X})",
            info.identifier,
            info.vendor_id,
            info.product_id
        );
        let probe = info.open().context("Failed to open probe")?;
        let session = probe
            .attach(chip.unwrap_or("auto"), Permissions::default())
            .context("Failed to attach to target")?;
        log::info!("Attached to target {}", session.target().name);
        Ok(Self::new(session))
    }

    #[must_use]
    pub const fn with_core(mut self, core_index: usize) -> Self {
        self.core_index = core_index;
        self
    }

    fn read_blocking(
        session: &Mutex<Session>,
        core_index: usize,
        address: u64,
        len: u32,
    ) -> Result<Vec<u8>> {
        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("probe session poisoned"))?;
        let mut core = session.core(core_index).context("Failed to attach core")?;
        let mut data = vec![0u8; len as usize];
        core.read_8(address, &mut data)
            .context("Failed to read memory block")?;
        Ok(data)
    }

    fn write_blocking(
        session: &Mutex<Session>,
        core_index: usize,
        address: u64,
        data: &[u8],
    ) -> Result<()> {
        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("probe session poisoned"))?;
        let mut core = session.core(core_index).context("Failed to attach core")?;
        core.write_8(address, data)
            .context("Failed to write memory block")
    }
}

impl RegisterTransport for ProbeTransport {
    async fn read_block(&self, address: u64, len: u32) -> Result<Vec<u8>, ReadError> {
        let session = self.session.clone();
        let core_index = self.core_index;
        let result = tokio::task::spawn_blocking(move || {
            Self::read_blocking(&session, core_index, address, len)
        })
        .await;

        match result {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(ReadError::Transport {
                address,
                len,
                message: format!("{e:#}"),
            }),
            Err(e) => Err(ReadError::Transport {
                address,
                len,
                message: e.to_string(),
            }),
        }
    }

    async fn write_block(&self, address: u64, data: Vec<u8>) -> Result<(), WriteError> {
        let session = self.session.clone();
        let core_index = self.core_index;
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let result = tokio::task::spawn_blocking(move || {
            Self::write_blocking(&session, core_index, address, &data)
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Transport {
                address,
                len,
                message: format!("{e:#}"),
            }),
            Err(e) => Err(WriteError::Transport {
                address,
                len,
                message: e.to_string(),
            }),
        }
    }
}
