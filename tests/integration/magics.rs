//! `%%autovisualize` and `%%with` driven through a host's cell execution

use super::test_utils::{readable_options, register_inline, scoped_host};
use foldscope::autovisualize::{active_autovisualizer, Autovisualizer, Visualization};
use foldscope::context::ContextualValue;
use foldscope::error::ApiError;
use foldscope::host::{HostValue, OutputContent, RecordingHost};
use foldscope::integration::{register_autovisualize_magic, register_context_manager_magic};
use foldscope::value::ArrayView;
use once_cell::sync::Lazy;
use std::sync::Arc;

static PRECISION: Lazy<ContextualValue<u32>> =
    Lazy::new(|| ContextualValue::new("magics", "precision", 3));

fn bind_weights(host: &RecordingHost) {
    let weights = ArrayView::new("f32", vec![3], vec![0.0, 1.0, 2.0]);
    host.bind("w", HostValue::Value(Arc::new(weights)));
}

#[test]
fn test_autovisualize_cell_streams_array_summaries() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());
    register_autovisualize_magic().unwrap();
    bind_weights(&host);

    host.execute("%%autovisualize\nw").unwrap();
    assert!(active_autovisualizer().get().is_none());
    assert_eq!(pipeline.run_pending(), 1);

    let html = host.document_html();
    assert!(html.contains("f32[3]"));
    assert!(html.contains(" min=0 max=2 mean=1.0000"));
}

#[test]
fn test_autovisualize_none_renders_plain_tree() {
    let (host, _scope) = scoped_host();
    let pipeline = register_inline(readable_options());
    register_autovisualize_magic().unwrap();
    bind_weights(&host);

    host.execute("%%autovisualize None\nw").unwrap();
    assert_eq!(pipeline.run_pending(), 0);
    assert!(!host.document_html().contains("min="));
}

#[test]
fn test_autovisualize_with_custom_visualizer() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());
    register_autovisualize_magic().unwrap();
    host.bind(
        "shout",
        HostValue::Autovisualizer(Autovisualizer::new("shout", |value, _path| {
            let heading = format!("<h1>{}</h1>", value.type_name().to_uppercase());
            Some(Visualization::Html(heading))
        })),
    );

    host.execute("%%autovisualize shout\n[1, 2]").unwrap();
    assert!(host.document_html().contains("&lt;h1&gt;ARRAY&lt;/h1&gt;"));
}

#[test]
fn test_autovisualize_errors_leave_no_scope_behind() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());
    register_autovisualize_magic().unwrap();

    let err = host.execute("%%autovisualize missing\nw").unwrap_err();
    assert_eq!(err.to_string(), "NameError: name 'missing' is not defined");

    bind_weights(&host);
    let err = host.execute("%%autovisualize\nw\nundefined_name").unwrap_err();
    assert!(matches!(err, ApiError::UserExpression(_)));
    assert!(active_autovisualizer().get().is_none());
    assert_eq!(active_autovisualizer().scope_depth(), 0);
}

#[test]
fn test_with_magic_applies_setting_for_one_cell() {
    let (host, _scope) = scoped_host();
    register_context_manager_magic().unwrap();
    host.bind(
        "precise",
        HostValue::ContextManager(Arc::new(PRECISION.scoped_setting(10))),
    );
    host.set_executor(|host, body| {
        let line = format!("{} precision={}", body, PRECISION.get());
        host.emit(OutputContent::Text(line))
    });

    host.execute("%%with precise\ncell").unwrap();
    host.execute("cell").unwrap();

    assert_eq!(
        host.transcript(),
        vec!["cell precision=10".to_string(), "cell precision=3".to_string()]
    );
}

#[test]
fn test_magics_nest() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());
    register_autovisualize_magic().unwrap();
    register_context_manager_magic().unwrap();
    assert_eq!(host.magic_names(), vec!["autovisualize", "with"]);

    host.bind(
        "precise",
        HostValue::ContextManager(Arc::new(PRECISION.scoped_setting(7))),
    );
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    host.set_executor(move |_, _| {
        let visualizer = active_autovisualizer().get().map(|v| v.name().to_string());
        sink.lock().push((visualizer, PRECISION.get()));
        Ok(())
    });

    host.execute("%%with precise\n%%autovisualize\nbody").unwrap();
    assert_eq!(seen.lock().as_slice(), [(Some("arrays".to_string()), 7)]);
    assert_eq!(PRECISION.get(), 3);
}

#[test]
fn test_unknown_magic_is_a_usage_error() {
    let (host, _scope) = scoped_host();
    let err = host.execute("%%timeit\n1").unwrap_err();
    assert_eq!(err.to_string(), "Host error: UsageError: Cell magic `%%timeit` not found.");
}
