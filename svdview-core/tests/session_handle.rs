//! Tests for the background session task.

mod common;

use common::{base_of, ListParser, RecordingDiagnostics};
use std::sync::Arc;
use svdview_core::{
    LifecycleState, MockTransport, PeripheralTree, SessionHandle, TreeError, TreeEvent,
};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

async fn next_event(rx: &mut broadcast::Receiver<TreeEvent>) -> TreeEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timeout waiting for tree event")
        .expect("Failed to receive event")
}

async fn wait_ready(handle: &SessionHandle) {
    common::init_logging();
    for _ in 0..100 {
        if handle.lifecycle().await.unwrap().is_ready() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("tree never became ready");
}

async fn names(handle: &SessionHandle) -> Vec<String> {
    let mut out = Vec::new();
    for id in handle.children(None).await.unwrap() {
        let item = handle.tree_item(id).await.unwrap().unwrap();
        out.push(item.label.split(" @").next().unwrap().to_string());
    }
    out
}

#[tokio::test]
async fn test_load_through_handle() {
    let handle = SessionHandle::spawn(PeripheralTree::new(ListParser, MockTransport::new()));
    let mut events = handle.subscribe();

    handle.session_started(Some("B, A".to_string())).unwrap();

    // Clear, then populated.
    assert_eq!(next_event(&mut events).await, TreeEvent::Changed);
    assert_eq!(next_event(&mut events).await, TreeEvent::Changed);
    assert_eq!(handle.lifecycle().await.unwrap(), LifecycleState::Ready);
    assert_eq!(names(&handle).await, ["A", "B"]);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_newer_start_overtakes_slow_parse() {
    let handle = SessionHandle::spawn(PeripheralTree::new(ListParser, MockTransport::new()));

    handle.session_started(Some("slow:OLD".to_string())).unwrap();
    handle.session_started(Some("NEW".to_string())).unwrap();
    wait_ready(&handle).await;
    assert_eq!(names(&handle).await, ["NEW"]);

    // Let the slow parse land; it must not replace the newer tree.
    sleep(Duration::from_millis(300)).await;
    assert_eq!(names(&handle).await, ["NEW"]);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_parse_failure_is_broadcast() {
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let tree =
        PeripheralTree::new(ListParser, MockTransport::new()).with_diagnostics(diagnostics.clone());
    let handle = SessionHandle::spawn(tree);
    let mut events = handle.subscribe();

    handle.session_started(Some("<bad>".to_string())).unwrap();

    let mut failure = None;
    for _ in 0..3 {
        if let TreeEvent::LoadFailed(message) = next_event(&mut events).await {
            failure = Some(message);
            break;
        }
    }
    let message = failure.expect("no LoadFailed event");
    assert!(message.contains("unexpected markup"));
    assert_eq!(diagnostics.errors.lock().unwrap().as_slice(), [message]);
    assert!(handle.children(None).await.unwrap().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_halt_expand_and_write_through_handle() {
    let mock = MockTransport::new().with_word(base_of(0), 0x10);
    let handle = SessionHandle::spawn(PeripheralTree::new(ListParser, mock.clone()));
    handle.session_started(Some("A".to_string())).unwrap();
    wait_ready(&handle).await;

    let a = handle.children(None).await.unwrap()[0];
    let cr = handle.children(Some(a)).await.unwrap()[0];
    let en = handle.children(Some(cr)).await.unwrap()[0];

    handle.write_field(en, 1).await.unwrap();
    assert_eq!(mock.peek_word(base_of(0)), 0x11);

    mock.poke(base_of(0), &[0x00]);
    handle.session_stopped().unwrap();
    handle.expand(a).unwrap();
    let item = handle.tree_item(en).await.unwrap().unwrap();
    assert_eq!(item.detail.as_deref(), Some("0"));

    handle.collapse(a).unwrap();
    handle.toggle_pin(a).unwrap();
    let item = handle.tree_item(a).await.unwrap().unwrap();
    assert_eq!(item.context, "peripheral.pinned");

    handle.session_terminated().unwrap();
    assert_eq!(handle.lifecycle().await.unwrap(), LifecycleState::Idle);
    assert!(handle.tree_item(a).await.unwrap().is_none());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_closed_handle_reports_closed() {
    let handle = SessionHandle::spawn(PeripheralTree::new(ListParser, MockTransport::new()));
    let sender = handle.subscribe();
    handle.send(svdview_core::TreeCommand::Exit).unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.lifecycle().await, Err(TreeError::Closed));
    drop(sender);
}
