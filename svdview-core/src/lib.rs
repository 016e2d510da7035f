//! SVD View Core - the peripheral register tree.
//!
//! This crate keeps a lazily refreshed tree of peripherals, registers and
//! fields in step with a debug session: loads on session start, live reads
//! when the target halts or a node is expanded, and a change signal for
//! whatever is rendering it.

pub mod collection;
pub mod config;
pub mod description;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod node;
pub mod notify;
pub mod refresh;
pub mod render;
pub mod session;
#[cfg(feature = "svd")]
pub mod svd;
pub mod transport;
pub mod tree;

// Re-export commonly used types
pub use collection::PeripheralCollection;
pub use config::ViewerConfig;
pub use description::{Access, DescriptionParser, FieldDesc, PeripheralDesc, RegisterDesc};
pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use error::{ParseError, ReadError, TreeError, WriteError};
pub use lifecycle::LifecycleState;
pub use node::{NodeId, NodeKind, NodeView};
pub use notify::{ChangeBus, TreeChanged};
pub use render::{Collapsible, DefaultRenderer, ItemIcon, Renderer, TreeItem};
pub use session::{SessionHandle, TreeCommand, TreeEvent};
#[cfg(feature = "svd")]
pub use svd::SvdParser;
#[cfg(feature = "hardware")]
pub use transport::ProbeTransport;
pub use transport::{MockTransport, RegisterTransport};
pub use tree::PeripheralTree;
