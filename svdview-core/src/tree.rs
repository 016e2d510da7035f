//! The peripheral tree: lifecycle transitions plus the query surface a view polls.

use crate::collection::PeripheralCollection;
use crate::description::{DescriptionParser, PeripheralDesc};
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use crate::error::{ParseError, ReadError, WriteError};
use crate::lifecycle::LifecycleState;
use crate::node::{NodeId, NodeKind};
use crate::notify::ChangeBus;
use crate::refresh::{self, Fetched, ReadPlan, DEFAULT_ADDR_GAP};
use crate::render::{DefaultRenderer, Renderer, TreeItem};
use crate::transport::{decode_le, encode_le, RegisterTransport};
use futures_util::future::join_all;
use std::sync::Arc;

/// Peripheral register tree kept in step with a debug session.
///
/// All mutation goes through `&mut self`, so transitions are serialized by the
/// owner. [`crate::SessionHandle`] runs a tree on its own task when parses
/// must be able to overlap.
pub struct PeripheralTree<P, T, R = DefaultRenderer> {
    parser: Arc<P>,
    transport: T,
    renderer: R,
    diagnostics: Arc<dyn Diagnostics>,
    bus: Arc<ChangeBus>,
    collection: PeripheralCollection,
    state: LifecycleState,
    load_generation: u64,
    addr_gap: u32,
}

impl<P, T> PeripheralTree<P, T, DefaultRenderer>
where
    P: DescriptionParser,
    T: RegisterTransport,
{
    pub fn new(parser: P, transport: T) -> Self {
        Self::with_renderer(parser, transport, DefaultRenderer)
    }
}

impl<P, T, R> PeripheralTree<P, T, R>
where
    P: DescriptionParser,
    T: RegisterTransport,
    R: Renderer,
{
    pub fn with_renderer(parser: P, transport: T, renderer: R) -> Self {
        Self {
            parser: Arc::new(parser),
            transport,
            renderer,
            diagnostics: Arc::new(LogDiagnostics),
            bus: Arc::new(ChangeBus::new()),
            collection: PeripheralCollection::new(),
            state: LifecycleState::Idle,
            load_generation: 0,
            addr_gap: DEFAULT_ADDR_GAP,
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub const fn with_addr_gap(mut self, addr_gap: u32) -> Self {
        self.addr_gap = addr_gap;
        self
    }

    /// Subscription point for "the visible tree changed".
    pub const fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub const fn lifecycle(&self) -> &LifecycleState {
        &self.state
    }

    pub const fn collection(&self) -> &PeripheralCollection {
        &self.collection
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn parser(&self) -> Arc<P> {
        self.parser.clone()
    }

    pub fn diagnostics(&self) -> Arc<dyn Diagnostics> {
        self.diagnostics.clone()
    }

    // ---- queries ----

    /// Top-level peripherals for `None`, a node's children otherwise.
    /// Empty unless the tree is `Ready`.
    pub fn children(&self, node: Option<NodeId>) -> Vec<NodeId> {
        if !self.state.is_ready() {
            return Vec::new();
        }
        match node {
            None => self.collection.peripherals().to_vec(),
            Some(id) => self.collection.arena().children(id),
        }
    }

    pub fn tree_item(&self, node: NodeId) -> Option<TreeItem> {
        let view = self.collection.arena().view(node)?;
        Some(self.renderer.render(&view))
    }

    pub fn peripheral_of(&self, node: NodeId) -> Option<NodeId> {
        self.collection.arena().peripheral_of(node)
    }

    // ---- session lifecycle ----

    /// First half of a load: drop the old tree and announce the empty one.
    ///
    /// Returns the load generation when there is something to parse.
    pub fn begin_load(&mut self, raw: Option<&str>) -> Option<u64> {
        self.collection.clear();
        self.load_generation += 1;
        let generation = self.load_generation;

        let wanted = raw.is_some_and(|r| !r.trim().is_empty());
        self.state = if wanted {
            LifecycleState::Loading { generation }
        } else {
            LifecycleState::Idle
        };
        self.bus.fire();

        if wanted {
            log::debug!("loading description, generation {generation}");
            Some(generation)
        } else {
            log::debug!("session started without a description");
            None
        }
    }

    /// Second half of a load. Results for a superseded load are dropped.
    ///
    /// Returns whether the result was applied.
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: Result<Vec<PeripheralDesc>, ParseError>,
    ) -> bool {
        if !self.state.accepts(generation) {
            log::debug!("discarding parse result of superseded load {generation}");
            return false;
        }

        match result {
            Ok(peripherals) => {
                let count = peripherals.len();
                self.collection.replace(peripherals);
                self.state = LifecycleState::Ready;
                log::info!("loaded {count} peripherals");
                self.bus.fire();
            }
            Err(e) => {
                self.collection.clear();
                let message = format!("Unable to parse SVD file: {e}");
                self.state = LifecycleState::Failed {
                    message: message.clone(),
                };
                self.bus.fire();
                self.diagnostics.show_error(&message);
                self.diagnostics.console_line(&message);
            }
        }
        true
    }

    /// A debug session started, possibly with a description blob.
    pub async fn session_started(&mut self, raw: Option<&str>) {
        let Some(generation) = self.begin_load(raw) else {
            return;
        };
        let result = self.parser.parse(raw.unwrap_or_default()).await;
        self.finish_load(generation, result);
    }

    /// The target halted. Refreshes every peripheral concurrently, then fires once.
    ///
    /// Returns `false` without doing anything unless the tree is `Ready`.
    pub async fn session_stopped(&mut self) -> bool {
        if !self.state.is_ready() {
            log::debug!("debug stopped while {:?}, nothing to refresh", self.state);
            return false;
        }

        let plans = self.plan_all();
        let transport = &self.transport;
        let fetched = join_all(plans.into_iter().map(|p| refresh::fetch(transport, p))).await;
        for result in fetched {
            if let Err(e) = self.apply_refresh(result) {
                log::debug!("peripheral refresh failed: {e}");
            }
        }
        self.bus.fire();
        true
    }

    /// Forget everything. Safe to call in any state, any number of times.
    pub fn session_terminated(&mut self) {
        self.collection.clear();
        self.load_generation += 1;
        self.state = LifecycleState::Idle;
        self.bus.fire();
    }

    // ---- refresh ----

    /// Read plans for every peripheral, in display order.
    pub fn plan_all(&self) -> Vec<ReadPlan> {
        let arena = self.collection.arena();
        self.collection
            .peripherals()
            .iter()
            .filter_map(|&p| refresh::plan(arena, p, self.addr_gap))
            .collect()
    }

    pub fn plan_refresh(&self, peripheral: NodeId) -> Option<ReadPlan> {
        refresh::plan(self.collection.arena(), peripheral, self.addr_gap)
    }

    pub fn apply_refresh(&mut self, fetched: Fetched) -> Result<(), ReadError> {
        refresh::apply(self.collection.arena_mut(), fetched)
    }

    /// Live read of one peripheral. Does not notify.
    pub async fn update_data(&mut self, peripheral: NodeId) -> Result<(), ReadError> {
        let plan = self.plan_refresh(peripheral).ok_or(ReadError::StaleNode)?;
        let fetched = refresh::fetch(&self.transport, plan).await;
        self.apply_refresh(fetched)
    }

    // ---- view events ----

    /// Mark `node` expanded and re-read its whole peripheral.
    pub async fn on_expand(&mut self, node: NodeId) {
        let Some(peripheral) = self.mark_expanded(node, true) else {
            return;
        };
        if let Err(e) = self.update_data(peripheral).await {
            log::debug!("refresh on expand failed: {e}");
        }
        self.bus.fire();
    }

    /// Mark `node` collapsed. Display state only, no notification.
    pub fn on_collapse(&mut self, node: NodeId) {
        self.mark_expanded(node, false);
    }

    /// Sets the flag and returns the owning peripheral, logging bad handles.
    fn mark_expanded(&mut self, node: NodeId, expanded: bool) -> Option<NodeId> {
        let Some(n) = self.collection.arena_mut().get_mut(node) else {
            log::warn!("expand state change for unknown node {node:?}");
            return None;
        };
        n.expanded = expanded;
        let peripheral = self.peripheral_of(node);
        if peripheral.is_none() {
            log::warn!("node {node:?} has no owning peripheral");
        }
        peripheral
    }

    /// Flip the pin of `node`'s peripheral, re-sort and notify.
    ///
    /// Returns the new pin state, `None` for a handle without a peripheral.
    pub fn toggle_pin(&mut self, node: NodeId) -> Option<bool> {
        let pinned = self.collection.toggle_pin(node);
        match pinned {
            Some(_) => self.bus.fire(),
            None => log::warn!("cannot pin node {node:?}"),
        }
        pinned
    }

    // ---- writes ----

    /// Read-modify-write of a field's bits in its register.
    pub async fn write_field(&mut self, field: NodeId, value: u64) -> Result<(), WriteError> {
        let arena = self.collection.arena();
        let node = arena.get(field).ok_or(WriteError::NotAField)?;
        let NodeKind::Field(f) = &node.kind else {
            return Err(WriteError::NotAField);
        };
        let register_id = arena.parent(field).ok_or(WriteError::NotAField)?;
        let register_node = arena.get(register_id).ok_or(WriteError::NotAField)?;
        let NodeKind::Register(r) = &register_node.kind else {
            return Err(WriteError::NotAField);
        };

        if !f.access.is_writable() || !r.access.is_writable() {
            return Err(WriteError::ReadOnly(format!(
                "{}.{}",
                register_node.name, node.name
            )));
        }
        if value & !crate::description::field_mask(f.bit_width) != 0 {
            return Err(WriteError::Overflow {
                value,
                width: f.bit_width,
            });
        }

        let mask = f.mask();
        let shift = f.bit_offset;
        let address = r.address;
        let len = r.size_bytes();
        let readable = r.access.is_readable();
        let cached = r.value.or(r.reset_value).unwrap_or(0);

        let current = if readable {
            decode_le(&self.transport.read_block(address, len).await?)
        } else {
            cached
        };
        let next = (current & !mask) | (value.checked_shl(shift).unwrap_or(0) & mask);
        self.transport.write_block(address, encode_le(next, len)).await?;

        if let Some(NodeKind::Register(r)) = self
            .collection
            .arena_mut()
            .get_mut(register_id)
            .map(|n| &mut n.kind)
        {
            r.value = Some(next);
        }
        self.bus.fire();
        Ok(())
    }
}
