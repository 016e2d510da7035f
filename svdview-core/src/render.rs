//! Node to display row conversion.

use crate::node::{NodeKind, NodeView};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collapsible {
    /// Leaf row, no expander.
    None,
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemIcon {
    Peripheral,
    PinnedPeripheral,
    Register,
    Field,
}

/// A displayable row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub label: String,
    /// Secondary text, usually the current value.
    pub detail: Option<String>,
    pub tooltip: Option<String>,
    pub icon: ItemIcon,
    pub collapsible: Collapsible,
    /// Context key a front end can attach actions to, e.g. `peripheral.pinned`.
    pub context: String,
}

/// Rendering collaborator. Must be pure and cheap.
pub trait Renderer {
    fn render(&self, view: &NodeView<'_>) -> TreeItem;
}

/// Plain-text renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

impl Renderer for DefaultRenderer {
    fn render(&self, view: &NodeView<'_>) -> TreeItem {
        let node = view.node;
        let collapsible = if !view.has_children {
            Collapsible::None
        } else if node.expanded {
            Collapsible::Expanded
        } else {
            Collapsible::Collapsed
        };

        match &node.kind {
            NodeKind::Peripheral(p) => TreeItem {
                label: format!("{} @ 0x{:08X}", node.name, p.base_address),
                detail: None,
                tooltip: node.description.clone(),
                icon: if view.pinned {
                    ItemIcon::PinnedPeripheral
                } else {
                    ItemIcon::Peripheral
                },
                collapsible,
                context: if view.pinned {
                    "peripheral.pinned".to_string()
                } else {
                    "peripheral".to_string()
                },
            },
            NodeKind::Register(r) => TreeItem {
                label: format!("{} @ 0x{:08X}", node.name, r.address),
                detail: Some(
                    view.value
                        .map_or_else(|| "-".to_string(), |v| format_hex(v, r.size)),
                ),
                tooltip: node.description.clone(),
                icon: ItemIcon::Register,
                collapsible,
                context: "register".to_string(),
            },
            NodeKind::Field(f) => {
                let range = if f.bit_width == 1 {
                    format!("[{}]", f.bit_offset)
                } else {
                    format!("[{}:{}]", f.bit_offset + f.bit_width - 1, f.bit_offset)
                };
                TreeItem {
                    label: format!("{} {range}", node.name),
                    detail: Some(view.value.map_or_else(
                        || "-".to_string(),
                        |v| {
                            if f.bit_width == 1 {
                                v.to_string()
                            } else {
                                format_hex(v, f.bit_width)
                            }
                        },
                    )),
                    tooltip: node.description.clone(),
                    icon: ItemIcon::Field,
                    collapsible,
                    context: "field".to_string(),
                }
            }
        }
    }
}

/// Hex with as many digits as `bits` needs.
pub fn format_hex(value: u64, bits: u32) -> String {
    let digits = bits.div_ceil(4).max(1) as usize;
    format!("0x{value:0digits$X}")
}
