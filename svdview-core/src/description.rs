//! Parsed device description, as handed over by a [`DescriptionParser`].

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Register or field access rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
    WriteOnce,
    ReadWriteOnce,
}

impl Access {
    /// Whether a live read returns anything meaningful.
    pub const fn is_readable(self) -> bool {
        !matches!(self, Self::WriteOnly | Self::WriteOnce)
    }

    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// A top-level peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralDesc {
    pub name: String,
    pub base_address: u64,
    pub description: Option<String>,
    pub group_name: Option<String>,
    pub registers: Vec<RegisterDesc>,
}

/// A register inside a peripheral. `address_offset` is relative to the peripheral base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDesc {
    pub name: String,
    pub address_offset: u32,
    pub description: Option<String>,
    /// Width in bits.
    pub size: u32,
    pub access: Access,
    pub reset_value: Option<u64>,
    pub fields: Vec<FieldDesc>,
}

impl RegisterDesc {
    /// Width in bytes, rounded up.
    pub const fn size_bytes(&self) -> u32 {
        self.size.div_ceil(8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDesc {
    pub name: String,
    pub description: Option<String>,
    pub bit_offset: u32,
    pub bit_width: u32,
    pub access: Access,
}

impl FieldDesc {
    /// Mask of this field's bits, in register position.
    pub const fn mask(&self) -> u64 {
        shifted_mask(self.bit_offset, self.bit_width)
    }

    /// Decode the value of this field from a register value.
    pub const fn decode(&self, reg_value: u64) -> u64 {
        match (reg_value & self.mask()).checked_shr(self.bit_offset) {
            Some(v) => v,
            None => 0,
        }
    }
}

/// Low `width` bits set. Handles the full 64-bit width without overflowing.
pub const fn field_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// `field_mask(width)` moved up to `offset`. Bits past 64 are dropped.
pub const fn shifted_mask(offset: u32, width: u32) -> u64 {
    match field_mask(width).checked_shl(offset) {
        Some(mask) => mask,
        None => 0,
    }
}

/// Turns a raw description blob into peripherals.
pub trait DescriptionParser {
    fn parse(&self, raw: &str)
        -> impl Future<Output = Result<Vec<PeripheralDesc>, ParseError>> + Send;
}
