//! Peripheral refresh: plan, fetch, apply.
//!
//! Planning borrows the arena, fetching borrows only the transport, applying
//! borrows the arena mutably. No borrow of the tree is held across an await.

use crate::error::ReadError;
use crate::node::{NodeArena, NodeId, NodeKind};
use crate::transport::{decode_le, RegisterTransport};

/// Registers separated by at most this many bytes share one block read.
pub const DEFAULT_ADDR_GAP: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    register: NodeId,
    /// Byte offset inside the block.
    offset: u32,
    size: u32,
}

/// One contiguous transport read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlock {
    pub address: u64,
    pub len: u32,
    slots: Vec<Slot>,
}

impl ReadBlock {
    pub fn register_count(&self) -> usize {
        self.slots.len()
    }
}

/// Everything needed to refresh one peripheral, detached from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub peripheral: NodeId,
    pub name: String,
    pub blocks: Vec<ReadBlock>,
}

/// Outcome of every block of a plan.
#[derive(Debug)]
pub struct Fetched {
    plan: ReadPlan,
    outcomes: Vec<Result<Vec<u8>, ReadError>>,
}

impl Fetched {
    pub const fn peripheral(&self) -> NodeId {
        self.plan.peripheral
    }
}

/// Group the readable registers of `peripheral` into address blocks.
///
/// Returns `None` for a handle that is not a peripheral of this arena.
pub fn plan(arena: &NodeArena, peripheral: NodeId, addr_gap: u32) -> Option<ReadPlan> {
    let node = arena.get(peripheral)?;
    if !matches!(node.kind, NodeKind::Peripheral(_)) {
        return None;
    }

    let mut registers: Vec<(u64, u32, NodeId)> = arena
        .children(peripheral)
        .into_iter()
        .filter_map(|id| match &arena.get(id)?.kind {
            NodeKind::Register(r) if r.access.is_readable() && r.size > 0 => {
                Some((r.address, r.size_bytes(), id))
            }
            _ => None,
        })
        .collect();
    registers.sort_by_key(|&(address, _, _)| address);

    let mut blocks: Vec<ReadBlock> = Vec::new();
    for (address, size, register) in registers {
        let end = address + u64::from(size);
        match blocks.last_mut() {
            Some(block)
                if address <= block.address + u64::from(block.len) + u64::from(addr_gap) =>
            {
                let block_end = (block.address + u64::from(block.len)).max(end);
                block.len = u32::try_from(block_end - block.address).unwrap_or(u32::MAX);
                block.slots.push(Slot {
                    register,
                    offset: u32::try_from(address - block.address).unwrap_or(u32::MAX),
                    size,
                });
            }
            _ => blocks.push(ReadBlock {
                address,
                len: size,
                slots: vec![Slot {
                    register,
                    offset: 0,
                    size,
                }],
            }),
        }
    }

    Some(ReadPlan {
        peripheral,
        name: node.name.clone(),
        blocks,
    })
}

/// Read every block of `plan`. Blocks of one peripheral are read one after the other.
pub async fn fetch<T: RegisterTransport>(transport: &T, plan: ReadPlan) -> Fetched {
    let mut outcomes = Vec::with_capacity(plan.blocks.len());
    for block in &plan.blocks {
        outcomes.push(transport.read_block(block.address, block.len).await);
    }
    Fetched { plan, outcomes }
}

/// Store fetched values. Blocks that read fine are applied even if others failed.
pub fn apply(arena: &mut NodeArena, fetched: Fetched) -> Result<(), ReadError> {
    if fetched.plan.peripheral.generation() != arena.generation() {
        log::debug!(
            "dropping refresh of {} from a replaced collection",
            fetched.plan.name
        );
        return Err(ReadError::StaleNode);
    }

    let total = fetched.plan.blocks.len();
    let mut errors = Vec::new();
    for (block, outcome) in fetched.plan.blocks.iter().zip(fetched.outcomes) {
        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        if bytes.len() < block.len as usize {
            errors.push(ReadError::Transport {
                address: block.address,
                len: block.len,
                message: format!("short read of {} bytes", bytes.len()),
            });
            continue;
        }
        for slot in &block.slots {
            let start = slot.offset as usize;
            let value = decode_le(&bytes[start..start + slot.size as usize]);
            let node = arena.get_mut(slot.register).map(|n| &mut n.kind);
            if let Some(NodeKind::Register(r)) = node {
                r.value = Some(value);
            }
        }
    }

    match errors.len() {
        0 => Ok(()),
        n if n == total && total == 1 => Err(errors.remove(0)),
        failed => Err(ReadError::Partial {
            peripheral: fetched.plan.name,
            failed,
            total,
        }),
    }
}

/// Plan, fetch and apply in one go, for callers that own the arena exclusively.
pub async fn update_data<T: RegisterTransport>(
    arena: &mut NodeArena,
    transport: &T,
    peripheral: NodeId,
    addr_gap: u32,
) -> Result<(), ReadError> {
    let plan = plan(arena, peripheral, addr_gap).ok_or(ReadError::StaleNode)?;
    let fetched = fetch(transport, plan).await;
    apply(arena, fetched)
}
