//! Plain-text serialization of representation parts.
//!
//! Everything is rendered fully expanded; folding only exists in HTML.

use crate::repr::part::Part;

const INDENT: &str = "  ";

pub fn to_text(part: &Part) -> String {
    match part {
        Part::Text(text) => text.clone(),
        Part::Siblings(children) => children.iter().map(to_text).collect(),
        Part::Foldable {
            label, children, ..
        } => {
            if children.is_empty() {
                return label.clone();
            }
            let mut out = format!("{}(\n", label);
            for child in children {
                out.push_str(&indent_block(&to_text(child)));
                out.push_str(",\n");
            }
            out.push(')');
            out
        }
        Part::Field { key, value } => format!("{}: {}", key, to_text(value)),
        Part::Indented(children) => {
            let body: Vec<String> = children
                .iter()
                .map(|child| indent_block(&to_text(child)))
                .collect();
            body.join("\n")
        }
        Part::Styled { child, .. } | Part::WordWrap { child, .. } => to_text(child),
        Part::VerticalSpace(_) => String::new(),
        Part::EmbeddedHtml { fallback, .. } => fallback.clone(),
        Part::Error(marker) => format!("<error: {}>", marker.message),
        Part::Deferred(_) => "<pending>".to_string(),
    }
}

fn indent_block(text: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}
