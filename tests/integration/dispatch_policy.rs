//! Formatter dispatch through a host's display path

use super::test_utils::{readable_options, register_inline, scoped_host};
use foldscope::capability::{Capabilities, Capability};
use foldscope::error::{ApiError, RenderError};
use foldscope::host::{DisplayRecord, Host, HostEvent, OutputRecord, MIME_HTML, MIME_PLAIN};
use foldscope::integration::RegisterOptions;
use foldscope::repr::Part;
use foldscope::value::{Child, Displayable, KeyPath};
use serde_json::json;
use std::borrow::Cow;

/// Has its own pretty printer and nothing else.
struct Pretty;

impl Displayable for Pretty {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Pretty")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::NativePretty])
    }

    fn repr_pretty(&self) -> Option<String> {
        Some("Pretty(...)".to_string())
    }
}

/// Has its own HTML.
struct Widget;

impl Displayable for Widget {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Widget")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::NativeHtml])
    }

    fn repr_html(&self) -> Option<String> {
        Some("<b>widget</b>".to_string())
    }
}

/// Overrides the HTML hook without declaring it, like a subclass inheriting it.
struct Inherits;

impl Displayable for Inherits {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Inherits")
    }

    fn repr_html(&self) -> Option<String> {
        Some("<i>inherited</i>".to_string())
    }
}

/// One child renders fine, the other fails.
struct HalfBroken;

impl Displayable for HalfBroken {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("HalfBroken")
    }

    fn children(&self) -> Vec<Child<'_>> {
        vec![Child::field("good", &Fine), Child::field("bad", &Broken)]
    }
}

struct Fine;

impl Displayable for Fine {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Fine")
    }

    fn summary(&self) -> String {
        "fine".to_string()
    }
}

struct Broken;

impl Displayable for Broken {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Broken")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::CustomSubtreeRepr])
    }

    fn subtree_repr(&self, path: &KeyPath) -> Option<Result<Part, RenderError>> {
        Some(Err(RenderError::subtree(path.to_string(), "boom")))
    }
}

fn last_display(outputs: &[OutputRecord]) -> &DisplayRecord {
    match outputs.last() {
        Some(OutputRecord::Display(record)) => record,
        other => panic!("expected a display record, got {:?}", other),
    }
}

#[test]
fn test_pretty_printed_values_are_left_to_the_host() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());

    host.display(&Pretty).unwrap();

    let outputs = host.outputs();
    let record = last_display(&outputs);
    assert!(!record.bundle.contains_key(MIME_HTML));
    assert_eq!(record.bundle.get(MIME_PLAIN).map(String::as_str), Some("Pretty(...)"));
    assert_eq!(host.emission_count(), 0);
}

#[test]
fn test_native_html_is_used_unchanged() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());

    host.display(&Widget).unwrap();

    let outputs = host.outputs();
    let record = last_display(&outputs);
    assert_eq!(
        record.bundle.get(MIME_HTML).map(String::as_str),
        Some("<b>widget</b>")
    );
    assert!(record.fragments.is_empty());
}

#[test]
fn test_undeclared_html_hook_is_rendered_as_a_tree() {
    let (host, _scope) = scoped_host();
    register_inline(readable_options());

    host.display(&Inherits).unwrap();

    let outputs = host.outputs();
    let record = last_display(&outputs);
    assert_eq!(record.fragments.len(), 1);
    let html = host.fragment_html(&record.fragments[0]).unwrap();
    assert!(html.contains("&lt;Inherits&gt;"));
    assert!(!html.contains("inherited"));
}

#[test]
fn test_failing_subtree_is_isolated() {
    let (host, _scope) = scoped_host();
    register_inline(RegisterOptions {
        streaming: false,
        ..readable_options()
    });

    host.display(&HalfBroken).unwrap();

    let outputs = host.outputs();
    let html = last_display(&outputs).bundle.get(MIME_HTML).cloned().unwrap();
    assert!(html.contains("fine"));
    assert!(html.contains(r#"class="fs-error""#));
    assert!(html.contains("boom"));
}

#[test]
fn test_without_streaming_nothing_is_relocated() {
    let (host, _scope) = scoped_host();
    register_inline(RegisterOptions {
        streaming: false,
        ..readable_options()
    });

    host.display(&json!({"a": [1, 2]})).unwrap();

    assert_eq!(host.relocation_count(), 0);
    assert!(host
        .events()
        .iter()
        .all(|event| !matches!(event, HostEvent::Emitted { .. })));
    let outputs = host.outputs();
    let html = last_display(&outputs).bundle.get(MIME_HTML).cloned().unwrap();
    assert!(html.starts_with(r#"<div class="foldscope-root""#));
}

#[test]
fn test_compressed_output_carries_a_payload() {
    let (host, _scope) = scoped_host();
    register_inline(RegisterOptions {
        streaming: false,
        ..RegisterOptions::default()
    });

    host.display(&json!({"k": "v"})).unwrap();

    let outputs = host.outputs();
    let html = last_display(&outputs).bundle.get(MIME_HTML).cloned().unwrap();
    let payload = foldscope::repr::html::extract_payload(&html).unwrap();
    let body = foldscope::repr::compress::decompress_payload(payload).unwrap();
    assert!(body.contains("&quot;v&quot;"));
}

#[test]
fn test_setup_outside_a_host_fails_fast() {
    let err = foldscope::integration::register_as_default(&RegisterOptions::default())
        .unwrap_err();
    assert!(matches!(err, ApiError::HostUnavailable("register_as_default")));
}
