//! HTML serialization of representation parts.

use crate::error::RenderError;
use crate::repr::compress;
use crate::repr::part::{FragmentId, LeafId, Part};

/// Options for finishing a representation into a root fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Start the rendering in roundtrip mode.
    pub roundtrip: bool,
    /// Deflate and base64-encode the body.
    pub compressed: bool,
}

const PAYLOAD_LOADER: &str = r#"<script>(function(){var root=document.currentScript.previousElementSibling;if(!root||!root.dataset.payload){return;}var bytes=Uint8Array.from(atob(root.dataset.payload),function(c){return c.charCodeAt(0);});new Response(new Blob([bytes]).stream().pipeThrough(new DecompressionStream("deflate"))).text().then(function(html){root.innerHTML=html;delete root.dataset.payload;document.querySelectorAll('template.fs-update[data-fs-target="'+root.id+'"]').forEach(function(t){var slot=root.querySelector('.fs-pending[data-fs-leaf="'+t.dataset.fsLeaf+'"]');if(slot){var leaf=document.createElement("span");leaf.className="fs-leaf";leaf.dataset.fsLeaf=t.dataset.fsLeaf;leaf.appendChild(t.content.cloneNode(true));slot.replaceWith(leaf);t.remove();}});document.dispatchEvent(new CustomEvent("foldscope:ready",{detail:root.id}));});})();</script>"#;

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Marker left in the skeleton where a deferred leaf will be spliced in.
pub fn placeholder_marker(leaf: LeafId) -> String {
    format!(
        r#"<span class="fs-pending" data-fs-leaf="{}"></span>"#,
        leaf.as_u64()
    )
}

/// Wrapper for a resolved leaf, replacing its placeholder marker.
pub fn resolved_leaf(leaf: LeafId, html: &str) -> String {
    format!(
        r#"<span class="fs-leaf" data-fs-leaf="{}">{}</span>"#,
        leaf.as_u64(),
        html
    )
}

/// Serialize a part tree to an HTML body.
pub fn to_html(part: &Part) -> String {
    let mut out = String::new();
    write_part(&mut out, part);
    out
}

fn write_part(out: &mut String, part: &Part) {
    match part {
        Part::Text(text) => {
            out.push_str(r#"<span class="fs-text">"#);
            out.push_str(&escape(text));
            out.push_str("</span>");
        }
        Part::Siblings(children) => {
            for child in children {
                write_part(out, child);
            }
        }
        Part::Foldable {
            label,
            children,
            expanded,
        } => {
            if children.is_empty() {
                out.push_str(r#"<span class="fs-label">"#);
                out.push_str(&escape(label));
                out.push_str("</span>");
                return;
            }
            out.push_str(if *expanded {
                r#"<details class="fs-node" open>"#
            } else {
                r#"<details class="fs-node">"#
            });
            out.push_str("<summary>");
            out.push_str(&escape(label));
            out.push_str(r#"</summary><div class="fs-children">"#);
            for child in children {
                write_part(out, child);
            }
            out.push_str("</div></details>");
        }
        Part::Field { key, value } => {
            out.push_str(r#"<div class="fs-field"><span class="fs-key">"#);
            out.push_str(&escape(key));
            out.push_str("</span>: ");
            write_part(out, value);
            out.push_str("</div>");
        }
        Part::Indented(children) => {
            out.push_str(r#"<div class="fs-indented">"#);
            for child in children {
                write_part(out, child);
            }
            out.push_str("</div>");
        }
        Part::Styled { style, child } => {
            out.push_str(r#"<span style=""#);
            out.push_str(&escape(style));
            out.push_str(r#"">"#);
            write_part(out, child);
            out.push_str("</span>");
        }
        Part::WordWrap { allow, child } => {
            out.push_str(if *allow {
                r#"<span class="fs-wrap">"#
            } else {
                r#"<span class="fs-nowrap">"#
            });
            write_part(out, child);
            out.push_str("</span>");
        }
        Part::VerticalSpace(height) => {
            out.push_str(r#"<div style="height: "#);
            out.push_str(&escape(height));
            out.push_str(r#""></div>"#);
        }
        Part::EmbeddedHtml { html, .. } => {
            out.push_str(r#"<iframe class="fs-embedded" srcdoc=""#);
            out.push_str(&escape(html));
            out.push_str(r#""></iframe>"#);
        }
        Part::Error(marker) => {
            out.push_str(r#"<span class="fs-error" title=""#);
            out.push_str(&escape(&marker.path));
            out.push_str(r#"">"#);
            out.push_str(&escape(&marker.message));
            out.push_str("</span>");
        }
        Part::Deferred(leaf) => out.push_str(&placeholder_marker(*leaf)),
    }
}

/// Finish a part tree into a root document fragment.
pub fn render_root(
    part: &Part,
    fragment: &FragmentId,
    options: RenderOptions,
) -> Result<String, RenderError> {
    let body = to_html(part);
    let id = escape(fragment.as_str());
    if options.compressed {
        let payload = compress::compress_payload(&body)?;
        Ok(format!(
            r#"<div class="foldscope-root" id="{}" data-roundtrip="{}" data-encoding="deflate-base64" data-payload="{}"></div>{}"#,
            id, options.roundtrip, payload, PAYLOAD_LOADER
        ))
    } else {
        Ok(format!(
            r#"<div class="foldscope-root" id="{}" data-roundtrip="{}">{}</div>"#,
            id, options.roundtrip, body
        ))
    }
}

fn payload_span(root_html: &str) -> Option<(usize, usize)> {
    let start = root_html.find(r#"data-payload=""#)? + r#"data-payload=""#.len();
    let len = root_html[start..].find('"')?;
    Some((start, start + len))
}

/// Body of a compressed root fragment, if it is one.
pub fn extract_payload(root_html: &str) -> Option<&str> {
    let (start, end) = payload_span(root_html)?;
    Some(&root_html[start..end])
}

/// A compressed root fragment with its payload replaced.
pub fn replace_payload(root_html: &str, payload: &str) -> Option<String> {
    let (start, end) = payload_span(root_html)?;
    Some(format!("{}{}{}", &root_html[..start], payload, &root_html[end..]))
}
