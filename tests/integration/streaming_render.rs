//! Streaming renders: skeleton first, leaves later, output relocated into the display

use super::test_utils::{inline_pipeline, readable_options, register_inline, scoped_host};
use foldscope::autovisualize::{
    active_autovisualizer, array_autovisualizer, Autovisualizer, Visualization,
};
use foldscope::host::{Host, HostEvent, OutputRecord, RecordingHost};
use foldscope::integration::{register_as_default, RegisterOptions};
use foldscope::repr::compress::decompress_payload;
use foldscope::repr::html::{extract_payload, placeholder_marker};
use foldscope::repr::{FoldableRepr, Part};
use foldscope::streaming::{
    collecting_deferred_renderings, maybe_defer, StreamingPipeline, WorkerPoolScheduler,
};
use foldscope::value::ArrayView;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn weights() -> ArrayView {
    ArrayView::new("f32", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0])
}

/// Defers every non-root leaf behind a short sleep.
fn slow_leaves(delay: Duration) -> Autovisualizer {
    Autovisualizer::new("slow_leaves", move |value, path| {
        if path.is_root() {
            return None;
        }
        let summary = value.summary();
        let part = maybe_defer(move || {
            std::thread::sleep(delay);
            Ok(Part::text(format!("slow {}", summary)))
        })
        .ok()?;
        Some(Visualization::Part(part))
    })
}

fn wait_for_delivered(host: &RecordingHost, expected: usize, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let delivered = host
            .events()
            .iter()
            .filter(|e| matches!(e, HostEvent::LeafDelivered { .. }))
            .count();
        if delivered >= expected || Instant::now() >= deadline {
            return delivered;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_skeleton_is_relocated_then_filled_in() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());
    let _visualizer = active_autovisualizer().set_scoped(Some(array_autovisualizer()));

    host.display(&weights()).unwrap();

    // The skeleton is in the display slot, still waiting for its leaf.
    let outputs = host.outputs();
    assert_eq!(outputs.len(), 1);
    let OutputRecord::Display(record) = &outputs[0] else {
        panic!("expected the fragment inside a display record");
    };
    assert_eq!(record.fragments.len(), 1);
    let fragment = record.fragments[0].clone();
    let skeleton = host.fragment_html(&fragment).unwrap();
    assert!(skeleton.contains(r#"class="fs-pending""#));
    assert!(!skeleton.contains("min="));

    assert_eq!(pipeline.run_pending(), 1);

    let filled = host.fragment_html(&fragment).unwrap();
    assert!(!filled.contains(r#"class="fs-pending""#));
    assert!(filled.contains("min=1 max=4 mean=2.5000"));

    let events = host.events();
    let emitted = events
        .iter()
        .position(|e| matches!(e, HostEvent::Emitted { .. }))
        .unwrap();
    let relocated = events
        .iter()
        .position(|e| matches!(e, HostEvent::Relocated { into_display: true, .. }))
        .unwrap();
    let delivered = events
        .iter()
        .position(|e| matches!(e, HostEvent::LeafDelivered { .. }))
        .unwrap();
    assert!(emitted < relocated);
    assert!(relocated < delivered);
}

#[test]
fn test_leaves_resolve_after_the_scope_ends() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());

    {
        let _visualizer = active_autovisualizer().set_scoped(Some(array_autovisualizer()));
        host.display(&json!({"w": 1})).unwrap();
        host.display(&weights()).unwrap();
    }
    // Resolved after the scope ended, with the captured settings.
    assert_eq!(pipeline.run_pending(), 1);
    assert!(host.document_html().contains("f32[2,2]"));
}

#[test]
fn test_updates_for_cleared_outputs_are_discarded() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());
    let _visualizer = active_autovisualizer().set_scoped(Some(array_autovisualizer()));

    host.display(&vec![weights(), weights()]).unwrap();
    host.clear_outputs();
    assert_eq!(pipeline.run_pending(), 2);

    let events = host.events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, HostEvent::LeafDiscarded { .. }))
            .count(),
        2
    );
    assert!(events
        .iter()
        .all(|e| !matches!(e, HostEvent::LeafDelivered { .. })));
}

#[test]
fn test_redisplaying_a_handle_is_inert() {
    let (host, _scope) = scoped_host();
    let pipeline = inline_pipeline();

    let repr = FoldableRepr::new(Part::text("root"));
    let handle = pipeline
        .display_streaming_as_root(
            host.clone() as Arc<dyn Host>,
            &repr,
            Vec::new(),
            Default::default(),
            true,
        )
        .unwrap();

    host.display(&handle).unwrap();
    host.display(&handle).unwrap();

    assert_eq!(host.relocation_count(), 1);
    assert!(!handle.is_stealable());
    assert!(handle.steal().unwrap_err().is_invariant_violation());
    let html = host.document_html();
    assert_eq!(html.matches("foldscope-root").count(), 1);
}

#[test]
fn test_worker_pool_resolves_each_leaf_once() {
    let (host, _scope) = scoped_host();
    let scheduler = WorkerPoolScheduler::new(2, 2).unwrap();
    let pipeline = StreamingPipeline::new(Arc::new(scheduler));
    let calls = Arc::new(AtomicUsize::new(0));

    let (parts, leaves) = collecting_deferred_renderings(|| {
        (0..5)
            .map(|i| {
                let calls = Arc::clone(&calls);
                maybe_defer(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Part::text(format!("leaf {}", i)))
                })
                .unwrap()
            })
            .collect::<Vec<_>>()
    });
    assert_eq!(leaves.len(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let handle = pipeline
        .display_streaming_as_root(
            host.clone() as Arc<dyn Host>,
            &FoldableRepr::new(Part::Siblings(parts)),
            leaves,
            Default::default(),
            false,
        )
        .unwrap();

    assert!(handle.wait_for_leaves(Duration::from_secs(10)));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let progress = handle.progress();
    assert_eq!(progress.delivered, 5);
    assert_eq!(progress.pending, 0);

    let html = host.fragment_html(handle.fragment_id()).unwrap();
    for i in 0..5 {
        assert!(html.contains(&format!("leaf {}", i)));
    }
    assert!(!html.contains(r#"class="fs-pending""#));
}

#[test]
fn test_failed_leaf_becomes_an_error_marker() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());
    let (part, leaves) = collecting_deferred_renderings(|| {
        maybe_defer(|| Err(foldscope::error::RenderError::subtree("<leaf>", "no data")))
    });
    let part = part.unwrap();
    let marker = match &part {
        Part::Deferred(leaf) => placeholder_marker(*leaf),
        other => panic!("expected a deferred leaf, got {:?}", other),
    };

    let handle = pipeline
        .display_streaming_as_root(
            host.clone() as Arc<dyn Host>,
            &FoldableRepr::new(part),
            leaves,
            Default::default(),
            true,
        )
        .unwrap();
    assert!(host.fragment_html(handle.fragment_id()).unwrap().contains(&marker));

    pipeline.run_pending();
    assert_eq!(handle.progress().failed, 1);
    let html = host.fragment_html(handle.fragment_id()).unwrap();
    assert!(html.contains(r#"class="fs-error""#));
    assert!(html.contains("no data"));
}

#[test]
fn test_reregistering_keeps_pending_leaves_alive() {
    let (host, _scope) = scoped_host();
    let options = RegisterOptions {
        compress_html: false,
        ..RegisterOptions::default()
    };
    register_as_default(&options).unwrap();
    let slow = slow_leaves(Duration::from_millis(200));
    let _visualizer = active_autovisualizer().set_scoped(Some(slow));

    host.display(&json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10])).unwrap();
    // Replaces the formatter, dropping the pipeline that owns the queued leaves.
    register_as_default(&options).unwrap();

    assert_eq!(wait_for_delivered(&host, 10, Duration::from_secs(20)), 10);
    let html = host.document_html();
    assert!(!html.contains(r#"class="fs-pending""#));
    assert!(html.contains("slow 10"));
}

#[test]
fn test_compressed_fragments_are_filled_in() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(RegisterOptions::default());
    let _visualizer = active_autovisualizer().set_scoped(Some(array_autovisualizer()));

    host.display(&weights()).unwrap();
    let outputs = host.outputs();
    let OutputRecord::Display(record) = &outputs[0] else {
        panic!("expected the fragment inside a display record");
    };
    let fragment = record.fragments[0].clone();

    let skeleton = host.fragment_html(&fragment).unwrap();
    let payload = extract_payload(&skeleton).unwrap();
    let body = decompress_payload(payload).unwrap();
    assert!(body.contains(r#"class="fs-pending""#));

    assert_eq!(pipeline.run_pending(), 1);

    let filled = host.fragment_html(&fragment).unwrap();
    assert!(!filled.contains("fs-update"));
    let payload = extract_payload(&filled).unwrap();
    let body = decompress_payload(payload).unwrap();
    assert!(!body.contains(r#"class="fs-pending""#));
    assert!(body.contains("min=1 max=4 mean=2.5000"));
    assert!(host.document_html().contains(payload));
}
