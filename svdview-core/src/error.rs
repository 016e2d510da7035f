//! Error types for the peripheral tree.
//!
//! Only [`ParseError`] is ever shown to the user. Read failures and invariant
//! violations are absorbed at the boundary that detects them.

use thiserror::Error;

/// The description blob could not be turned into a peripheral hierarchy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The blob is not well-formed for the description format.
    #[error("malformed description: {0}")]
    Malformed(String),

    /// The blob is well-formed but uses something the adapter does not handle.
    #[error("unsupported description: {0}")]
    Unsupported(String),

    /// A peripheral derives from a peripheral that does not exist.
    #[error("peripheral {peripheral} derives from unknown peripheral {base}")]
    UnknownBase { peripheral: String, base: String },
}

/// A live read through the transport failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The transport rejected a block read.
    #[error("read of {len} bytes at 0x{address:08X} failed: {message}")]
    Transport {
        address: u64,
        len: u32,
        message: String,
    },

    /// Some blocks of a peripheral were read, others were not.
    #[error("{failed} of {total} read blocks failed for {peripheral}")]
    Partial {
        peripheral: String,
        failed: usize,
        total: usize,
    },

    /// The node handle belongs to a collection that has since been replaced.
    #[error("node handle is stale")]
    StaleNode,
}

/// A field write could not be performed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The handle does not name a field of the current collection.
    #[error("node is not a writable field")]
    NotAField,

    /// The field or its register is read-only.
    #[error("{0} is read-only")]
    ReadOnly(String),

    /// The value does not fit into the field.
    #[error("value 0x{value:X} does not fit into {width} bits")]
    Overflow { value: u64, width: u32 },

    /// The read half of the read-modify-write failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The transport rejected the write.
    #[error("write of {len} bytes at 0x{address:08X} failed: {message}")]
    Transport {
        address: u64,
        len: u32,
        message: String,
    },
}

/// Aggregate error for callers that want a single type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// The session task is gone.
    #[error("session closed")]
    Closed,
}
