//! Arena-backed node tree.
//!
//! Peripherals, registers and fields live in one flat `Vec`, addressed by
//! [`NodeId`]. Parent and child links are indices. Every time the arena is
//! rebuilt its generation changes, so handles from an old load resolve to
//! nothing instead of to an unrelated node.

use crate::description::{Access, FieldDesc, PeripheralDesc};
use serde::{Deserialize, Serialize};

/// Stable handle to a node of one particular load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    generation: u64,
    index: u32,
}

impl NodeId {
    pub const fn generation(self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralData {
    pub base_address: u64,
    pub group_name: Option<String>,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterData {
    pub address: u64,
    /// Width in bits.
    pub size: u32,
    pub access: Access,
    pub reset_value: Option<u64>,
    /// Last value read from the target.
    pub value: Option<u64>,
}

impl RegisterData {
    pub const fn size_bytes(&self) -> u32 {
        self.size.div_ceil(8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldData {
    pub bit_offset: u32,
    pub bit_width: u32,
    pub access: Access,
}

impl FieldData {
    fn as_desc(&self) -> FieldDesc {
        FieldDesc {
            name: String::new(),
            description: None,
            bit_offset: self.bit_offset,
            bit_width: self.bit_width,
            access: self.access,
        }
    }

    pub const fn mask(&self) -> u64 {
        crate::description::shifted_mask(self.bit_offset, self.bit_width)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Peripheral(PeripheralData),
    Register(RegisterData),
    Field(FieldData),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub description: Option<String>,
    pub kind: NodeKind,
    pub expanded: bool,
    parent: Option<u32>,
    children: Vec<u32>,
}

/// Borrowed view of a node with the context a renderer needs.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub id: NodeId,
    pub node: &'a Node,
    /// Pin state of the owning peripheral.
    pub pinned: bool,
    /// Current value: cached register value, or the field decoded from its register.
    pub value: Option<u64>,
    pub has_children: bool,
}

/// Flat storage for one loaded description.
#[derive(Debug, Default)]
pub struct NodeArena {
    generation: u64,
    nodes: Vec<Node>,
    roots: Vec<u32>,
}

impl NodeArena {
    /// Empty arena with the given generation.
    pub const fn empty(generation: u64) -> Self {
        Self {
            generation,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Build the tree for `peripherals`, in declaration order.
    pub fn build(generation: u64, peripherals: Vec<PeripheralDesc>) -> Self {
        let mut arena = Self::empty(generation);
        for p in peripherals {
            let p_index = arena.push(
                None,
                p.name,
                p.description,
                NodeKind::Peripheral(PeripheralData {
                    base_address: p.base_address,
                    group_name: p.group_name,
                    pinned: false,
                }),
            );
            arena.roots.push(p_index);

            for r in p.registers {
                let r_index = arena.push(
                    Some(p_index),
                    r.name,
                    r.description,
                    NodeKind::Register(RegisterData {
                        address: p.base_address + u64::from(r.address_offset),
                        size: r.size,
                        access: r.access,
                        reset_value: r.reset_value,
                        value: None,
                    }),
                );
                for f in r.fields {
                    arena.push(
                        Some(r_index),
                        f.name,
                        f.description,
                        NodeKind::Field(FieldData {
                            bit_offset: f.bit_offset,
                            bit_width: f.bit_width,
                            access: f.access,
                        }),
                    );
                }
            }
        }
        arena
    }

    fn push(
        &mut self,
        parent: Option<u32>,
        name: String,
        description: Option<String>,
        kind: NodeKind,
    ) -> u32 {
        let index = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(Node {
            name,
            description,
            kind,
            expanded: false,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent as usize].children.push(index);
        }
        index
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    const fn id(&self, index: u32) -> NodeId {
        NodeId {
            generation: self.generation,
            index,
        }
    }

    fn index(&self, id: NodeId) -> Option<usize> {
        let index = id.index as usize;
        (id.generation == self.generation && index < self.nodes.len()).then_some(index)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.index(id).map(|i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.index(id).map(|i| &mut self.nodes[i])
    }

    /// Top-level peripherals in declaration order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.roots.iter().map(|&i| self.id(i)).collect()
    }

    /// Children of `id`. Empty for fields and for stale handles.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|n| n.children.iter().map(|&i| self.id(i)).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent.map(|i| self.id(i))
    }

    /// Owning top-level peripheral of any node, the peripheral itself included.
    pub fn peripheral_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let node = self.get(current)?;
            if matches!(node.kind, NodeKind::Peripheral(_)) {
                return Some(current);
            }
            current = node.parent.map(|i| self.id(i))?;
        }
    }

    /// Pin state. Registers and fields report their peripheral's flag.
    pub fn is_pinned(&self, id: NodeId) -> bool {
        self.peripheral_of(id)
            .and_then(|p| self.get(p))
            .is_some_and(|n| matches!(&n.kind, NodeKind::Peripheral(d) if d.pinned))
    }

    /// Value of a register, or of a field decoded from its register.
    pub fn value(&self, id: NodeId) -> Option<u64> {
        let node = self.get(id)?;
        match &node.kind {
            NodeKind::Peripheral(_) => None,
            NodeKind::Register(r) => r.value,
            NodeKind::Field(f) => {
                let register = self.get(self.parent(id)?)?;
                match &register.kind {
                    NodeKind::Register(r) => r.value.map(|v| f.as_desc().decode(v)),
                    _ => None,
                }
            }
        }
    }

    pub fn view(&self, id: NodeId) -> Option<NodeView<'_>> {
        let node = self.get(id)?;
        Some(NodeView {
            id,
            node,
            pinned: self.is_pinned(id),
            value: self.value(id),
            has_children: !node.children.is_empty(),
        })
    }
}
