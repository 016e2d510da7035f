//! Session management module.
//!
//! Runs a [`PeripheralTree`] on a background task, processing commands in
//! arrival order and broadcasting events back to any number of listeners.
//! Parses run on their own tasks so a newer `SessionStarted` can overtake an
//! older one; the older result is dropped when it lands.

use crate::description::{DescriptionParser, PeripheralDesc};
use crate::diagnostics::Diagnostics;
use crate::error::{ParseError, TreeError, WriteError};
use crate::lifecycle::LifecycleState;
use crate::node::NodeId;
use crate::render::{Renderer, TreeItem};
use crate::transport::RegisterTransport;
use crate::tree::PeripheralTree;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug)]
pub enum TreeCommand {
    SessionStarted(Option<String>),
    SessionStopped,
    SessionTerminated,
    Expand(NodeId),
    Collapse(NodeId),
    TogglePin(NodeId),
    WriteField {
        field: NodeId,
        value: u64,
        reply: oneshot::Sender<Result<(), WriteError>>,
    },
    Children(Option<NodeId>, oneshot::Sender<Vec<NodeId>>),
    TreeItem(NodeId, oneshot::Sender<Option<TreeItem>>),
    Lifecycle(oneshot::Sender<LifecycleState>),
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// Something visible changed; re-query.
    Changed,
    /// A description failed to parse. Carries the user-facing message.
    LoadFailed(String),
}

/// Forwards parse failures to event subscribers as well as to the wrapped sink.
struct BroadcastDiagnostics {
    inner: Arc<dyn Diagnostics>,
    event_tx: broadcast::Sender<TreeEvent>,
}

impl Diagnostics for BroadcastDiagnostics {
    fn show_error(&self, message: &str) {
        self.inner.show_error(message);
        let _ = self.event_tx.send(TreeEvent::LoadFailed(message.to_string()));
    }

    fn console_line(&self, message: &str) {
        self.inner.console_line(message);
    }
}

type LoadResult = (u64, Result<Vec<PeripheralDesc>, ParseError>);

/// A handle to a peripheral tree running on a background task.
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<TreeCommand>,
    event_tx: broadcast::Sender<TreeEvent>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Move `tree` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn<P, T, R>(tree: PeripheralTree<P, T, R>) -> Self
    where
        P: DescriptionParser + Send + Sync + 'static,
        T: RegisterTransport + Send + Sync + 'static,
        R: Renderer + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        // create a broadcast channel with capacity 100
        let (evt_tx, _) = broadcast::channel(100);

        let diagnostics = Arc::new(BroadcastDiagnostics {
            inner: tree.diagnostics(),
            event_tx: evt_tx.clone(),
        });
        let tree = tree.with_diagnostics(diagnostics);

        let bus_tx = evt_tx.clone();
        tree.bus().subscribe(move || {
            let _ = bus_tx.send(TreeEvent::Changed);
        });

        let task = tokio::spawn(run(tree, cmd_rx));

        Self {
            command_tx: cmd_tx,
            event_tx: evt_tx,
            task: Some(task),
        }
    }

    /// Subscribe to tree events
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    pub fn send(&self, cmd: TreeCommand) -> Result<(), TreeError> {
        self.command_tx.send(cmd).map_err(|_| TreeError::Closed)
    }

    pub fn session_started(&self, raw: Option<String>) -> Result<(), TreeError> {
        self.send(TreeCommand::SessionStarted(raw))
    }

    pub fn session_stopped(&self) -> Result<(), TreeError> {
        self.send(TreeCommand::SessionStopped)
    }

    pub fn session_terminated(&self) -> Result<(), TreeError> {
        self.send(TreeCommand::SessionTerminated)
    }

    pub fn expand(&self, node: NodeId) -> Result<(), TreeError> {
        self.send(TreeCommand::Expand(node))
    }

    pub fn collapse(&self, node: NodeId) -> Result<(), TreeError> {
        self.send(TreeCommand::Collapse(node))
    }

    pub fn toggle_pin(&self, node: NodeId) -> Result<(), TreeError> {
        self.send(TreeCommand::TogglePin(node))
    }

    pub async fn children(&self, node: Option<NodeId>) -> Result<Vec<NodeId>, TreeError> {
        let (tx, rx) = oneshot::channel();
        self.send(TreeCommand::Children(node, tx))?;
        rx.await.map_err(|_| TreeError::Closed)
    }

    pub async fn tree_item(&self, node: NodeId) -> Result<Option<TreeItem>, TreeError> {
        let (tx, rx) = oneshot::channel();
        self.send(TreeCommand::TreeItem(node, tx))?;
        rx.await.map_err(|_| TreeError::Closed)
    }

    pub async fn lifecycle(&self) -> Result<LifecycleState, TreeError> {
        let (tx, rx) = oneshot::channel();
        self.send(TreeCommand::Lifecycle(tx))?;
        rx.await.map_err(|_| TreeError::Closed)
    }

    pub async fn write_field(&self, field: NodeId, value: u64) -> Result<(), TreeError> {
        let (tx, rx) = oneshot::channel();
        self.send(TreeCommand::WriteField {
            field,
            value,
            reply: tx,
        })?;
        Ok(rx.await.map_err(|_| TreeError::Closed)??)
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(TreeCommand::Exit);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("session task panicked: {e}");
            }
        }
    }
}

async fn run<P, T, R>(
    mut tree: PeripheralTree<P, T, R>,
    mut cmd_rx: mpsc::UnboundedReceiver<TreeCommand>,
) where
    P: DescriptionParser + Send + Sync + 'static,
    T: RegisterTransport + Send + Sync + 'static,
    R: Renderer + Send + 'static,
{
    let mut loads: JoinSet<LoadResult> = JoinSet::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(TreeCommand::Exit) => break,
                Some(cmd) => handle(&mut tree, &mut loads, cmd).await,
            },
            Some(joined) = loads.join_next(), if !loads.is_empty() => match joined {
                Ok((generation, result)) => {
                    tree.finish_load(generation, result);
                }
                Err(e) => log::error!("parse task failed: {e}"),
            },
        }
    }

    loads.abort_all();
    log::debug!("session task exiting");
}

async fn handle<P, T, R>(
    tree: &mut PeripheralTree<P, T, R>,
    loads: &mut JoinSet<LoadResult>,
    cmd: TreeCommand,
) where
    P: DescriptionParser + Send + Sync + 'static,
    T: RegisterTransport + Send + Sync + 'static,
    R: Renderer + Send + 'static,
{
    match cmd {
        TreeCommand::SessionStarted(raw) => {
            if let Some(generation) = tree.begin_load(raw.as_deref()) {
                let parser = tree.parser();
                let raw = raw.unwrap_or_default();
                loads.spawn(async move { (generation, parser.parse(&raw).await) });
            }
        }
        TreeCommand::SessionStopped => {
            tree.session_stopped().await;
        }
        TreeCommand::SessionTerminated => tree.session_terminated(),
        TreeCommand::Expand(node) => tree.on_expand(node).await,
        TreeCommand::Collapse(node) => tree.on_collapse(node),
        TreeCommand::TogglePin(node) => {
            tree.toggle_pin(node);
        }
        TreeCommand::WriteField {
            field,
            value,
            reply,
        } => {
            let _ = reply.send(tree.write_field(field, value).await);
        }
        TreeCommand::Children(node, reply) => {
            let _ = reply.send(tree.children(node));
        }
        TreeCommand::TreeItem(node, reply) => {
            let _ = reply.send(tree.tree_item(node));
        }
        TreeCommand::Lifecycle(reply) => {
            let _ = reply.send(tree.lifecycle().clone());
        }
        TreeCommand::Exit => {}
    }
}
