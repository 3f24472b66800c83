//! In-memory notebook host
//!
//! Keeps an output document, variable bindings and registered cell magics in
//! process. The document records where every fragment ended up, which leaf updates
//! reached it, and an event log of everything that happened.

use crate::error::{ApiError, RenderError};
use crate::host::registry::{FormatterOutput, FormatterRegistry, MIME_HTML, MIME_PLAIN};
use crate::host::{DeliveryOutcome, Host, HostValue, LeafUpdate, OutputContent};
use crate::magic::{CellMagic, MagicInvocation};
use crate::repr::compress::{compress_payload, decompress_payload};
use crate::repr::html::{
    escape, extract_payload, placeholder_marker, replace_payload, resolved_leaf,
};
use crate::repr::{FragmentId, LeafId};
use crate::value::Displayable;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

const MAX_REDISPLAY_DEPTH: usize = 8;

type CellExecutor = dyn Fn(&dyn Host, &str) -> Result<(), ApiError> + Send + Sync;

/// A display call's output: one entry per MIME type, plus relocated fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayRecord {
    pub bundle: BTreeMap<String, String>,
    pub fragments: Vec<FragmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRecord {
    Fragment(FragmentId),
    Html(String),
    Text(String),
    Display(DisplayRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Emitted { fragment: FragmentId },
    HtmlEmitted,
    TextEmitted,
    /// `into_display` is false when no display was in progress and the fragment
    /// moved to the end of the document instead.
    Relocated { fragment: FragmentId, into_display: bool },
    LeafDelivered { fragment: FragmentId, leaf: LeafId },
    LeafDiscarded { fragment: FragmentId, leaf: LeafId },
    Displayed { mimes: Vec<String> },
    MagicRegistered { name: String },
    Cleared,
}

#[derive(Debug)]
struct FragmentState {
    html: String,
    updates: Vec<LeafUpdate>,
    attached: bool,
}

/// An output slot opened by a `display` call on `thread`.
#[derive(Debug)]
struct PendingSlot {
    thread: ThreadId,
    fragments: Vec<FragmentId>,
}

#[derive(Debug, Default)]
struct Document {
    outputs: Vec<OutputRecord>,
    fragments: HashMap<FragmentId, FragmentState>,
    slots: Vec<PendingSlot>,
    events: Vec<HostEvent>,
}

impl Document {
    fn open_slot(&mut self) {
        self.slots.push(PendingSlot {
            thread: thread::current().id(),
            fragments: Vec::new(),
        });
    }

    /// Close the innermost slot opened on the calling thread.
    fn close_slot(&mut self) -> Vec<FragmentId> {
        let thread = thread::current().id();
        match self.slots.iter().rposition(|slot| slot.thread == thread) {
            Some(index) => self.slots.remove(index).fragments,
            None => Vec::new(),
        }
    }

    fn current_slot(&mut self) -> Option<&mut PendingSlot> {
        let thread = thread::current().id();
        self.slots.iter_mut().rev().find(|slot| slot.thread == thread)
    }

    fn fragment_html(&self, id: &FragmentId) -> Option<String> {
        let state = self.fragments.get(id)?;
        if state.updates.is_empty() {
            return Some(state.html.clone());
        }
        if let Some(payload) = extract_payload(&state.html) {
            match splice_compressed(&state.html, payload, id, &state.updates) {
                Ok(html) => return Some(html),
                Err(err) => warn!(fragment = %id, error = %err, "Leaf updates not spliced"),
            }
        }
        let (mut html, unplaced) = splice_updates(state.html.clone(), &state.updates);
        html.push_str(&update_templates(id, &unplaced));
        Some(html)
    }
}

/// Replace placeholder markers with resolved leaves. Returns the updates whose
/// marker was not found.
fn splice_updates(mut html: String, updates: &[LeafUpdate]) -> (String, Vec<&LeafUpdate>) {
    let mut unplaced = Vec::new();
    for update in updates {
        let marker = placeholder_marker(update.leaf);
        if html.contains(&marker) {
            html = html.replacen(&marker, &resolved_leaf(update.leaf, &update.html), 1);
        } else {
            unplaced.push(update);
        }
    }
    (html, unplaced)
}

fn splice_compressed(
    root_html: &str,
    payload: &str,
    id: &FragmentId,
    updates: &[LeafUpdate],
) -> Result<String, RenderError> {
    let body = decompress_payload(payload)?;
    let (body, unplaced) = splice_updates(body, updates);
    let payload = compress_payload(&body)?;
    let Some(mut html) = replace_payload(root_html, &payload) else {
        return Err(RenderError::Serialization("Missing payload".to_string()));
    };
    html.push_str(&update_templates(id, &unplaced));
    Ok(html)
}

/// Updates that found no placeholder ride along for the page loader to apply.
fn update_templates(id: &FragmentId, updates: &[&LeafUpdate]) -> String {
    updates
        .iter()
        .map(|update| {
            format!(
                r#"<template class="fs-update" data-fs-target="{}" data-fs-leaf="{}">{}</template>"#,
                escape(id.as_str()),
                update.leaf.as_u64(),
                update.html
            )
        })
        .collect()
}

pub struct RecordingHost {
    name: String,
    registry: FormatterRegistry,
    document: Mutex<Document>,
    bindings: RwLock<HashMap<String, HostValue>>,
    magics: RwLock<HashMap<String, Arc<dyn CellMagic>>>,
    executor: RwLock<Option<Arc<CellExecutor>>>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::with_name("recording")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registry: FormatterRegistry::with_host_defaults(),
            document: Mutex::new(Document::default()),
            bindings: RwLock::new(HashMap::new()),
            magics: RwLock::new(HashMap::new()),
            executor: RwLock::new(None),
        }
    }

    /// Bind a variable visible to [`Host::evaluate`].
    pub fn bind(&self, name: &str, value: HostValue) {
        self.bindings.write().insert(name.to_string(), value);
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.bindings.write().remove(name).is_some()
    }

    /// Replace the default cell executor.
    pub fn set_executor(
        &self,
        executor: impl Fn(&dyn Host, &str) -> Result<(), ApiError> + Send + Sync + 'static,
    ) {
        *self.executor.write() = Some(Arc::new(executor));
    }

    pub fn magic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.magics.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke a registered cell magic.
    pub fn run_magic(&self, name: &str, line: &str, body: &str) -> Result<(), ApiError> {
        let magic = self.magics.read().get(name).cloned();
        let Some(magic) = magic else {
            return Err(ApiError::Host(format!(
                "UsageError: Cell magic `%%{}` not found.",
                name
            )));
        };
        debug!(magic = name, line, "Running cell magic");
        magic.run(self, line, body)
    }

    /// Execute a cell, dispatching a leading `%%name line` to the matching magic.
    pub fn execute(&self, cell: &str) -> Result<(), ApiError> {
        match MagicInvocation::split_cell(cell) {
            Some((name, invocation)) => self.run_magic(
                &name,
                invocation.expression.as_deref().unwrap_or(""),
                &invocation.body,
            ),
            None => self.execute_code(cell),
        }
    }

    fn execute_code(&self, body: &str) -> Result<(), ApiError> {
        let executor = self.executor.read().clone();
        match executor {
            Some(executor) => executor(self, body),
            None => self.evaluate_lines(body),
        }
    }

    /// Evaluate each line; display the value of the last one.
    fn evaluate_lines(&self, body: &str) -> Result<(), ApiError> {
        let mut last = HostValue::None;
        for line in body.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            last = self.evaluate(line)?;
        }
        if let HostValue::Value(value) = last {
            self.display(value.as_ref())?;
        }
        Ok(())
    }

    /// Detach every fragment and clear the document.
    pub fn clear_outputs(&self) {
        let mut doc = self.document.lock();
        doc.outputs.clear();
        for state in doc.fragments.values_mut() {
            state.attached = false;
        }
        doc.events.push(HostEvent::Cleared);
        info!(host = %self.name, "Cleared outputs");
    }

    pub fn outputs(&self) -> Vec<OutputRecord> {
        self.document.lock().outputs.clone()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.document.lock().events.clone()
    }

    pub fn emission_count(&self) -> usize {
        self.count_events(|e| matches!(e, HostEvent::Emitted { .. }))
    }

    pub fn relocation_count(&self) -> usize {
        self.count_events(|e| matches!(e, HostEvent::Relocated { .. }))
    }

    fn count_events(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        self.document.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Current HTML of a fragment with all delivered leaves applied.
    pub fn fragment_html(&self, id: &FragmentId) -> Option<String> {
        self.document.lock().fragment_html(id)
    }

    pub fn fragment_updates(&self, id: &FragmentId) -> Vec<LeafUpdate> {
        self.document
            .lock()
            .fragments
            .get(id)
            .map(|state| state.updates.clone())
            .unwrap_or_default()
    }

    /// The whole document as HTML, in document order.
    pub fn document_html(&self) -> String {
        let doc = self.document.lock();
        let mut blocks = Vec::with_capacity(doc.outputs.len());
        for record in &doc.outputs {
            match record {
                OutputRecord::Fragment(id) => {
                    blocks.push(doc.fragment_html(id).unwrap_or_default());
                }
                OutputRecord::Html(html) => blocks.push(html.clone()),
                OutputRecord::Text(text) => blocks.push(format!("<pre>{}</pre>", escape(text))),
                OutputRecord::Display(display) => {
                    let mut block = String::from(r#"<div class="output">"#);
                    for id in &display.fragments {
                        block.push_str(&doc.fragment_html(id).unwrap_or_default());
                    }
                    match display.bundle.get(MIME_HTML) {
                        Some(html) => block.push_str(html),
                        None => {
                            if let Some(text) = display.bundle.get(MIME_PLAIN) {
                                block.push_str(&format!("<pre>{}</pre>", escape(text)));
                            }
                        }
                    }
                    block.push_str("</div>");
                    blocks.push(block);
                }
            }
        }
        blocks.join("\n")
    }

    /// Plain-text outputs: emitted text and the `text/plain` entry of each display.
    pub fn transcript(&self) -> Vec<String> {
        self.document
            .lock()
            .outputs
            .iter()
            .filter_map(|record| match record {
                OutputRecord::Text(text) => Some(text.clone()),
                OutputRecord::Display(display) => display.bundle.get(MIME_PLAIN).cloned(),
                _ => None,
            })
            .collect()
    }

    fn format_bundle(&self, value: &dyn Displayable) -> Result<BTreeMap<String, String>, ApiError> {
        let mut bundle = BTreeMap::new();
        for mime in self.registry.mime_order() {
            if let Some(content) = self.format_mime(&mime, value, 0)? {
                bundle.insert(mime, content);
            }
        }
        Ok(bundle)
    }

    fn format_mime(
        &self,
        mime: &str,
        value: &dyn Displayable,
        depth: usize,
    ) -> Result<Option<String>, ApiError> {
        match self.registry.format(mime, value)? {
            None => Ok(None),
            Some(FormatterOutput::Content(content)) => Ok(Some(content)),
            Some(FormatterOutput::Redisplay(inner)) => {
                if depth >= MAX_REDISPLAY_DEPTH {
                    return Err(ApiError::InvariantViolation(format!(
                        "Redisplay chain for {} exceeded {} levels",
                        mime, MAX_REDISPLAY_DEPTH
                    )));
                }
                self.format_mime(mime, inner.as_ref(), depth + 1)
            }
        }
    }
}

impl Host for RecordingHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn formatters(&self) -> &FormatterRegistry {
        &self.registry
    }

    fn display(&self, value: &dyn Displayable) -> Result<(), ApiError> {
        self.document.lock().open_slot();
        let bundle = self.format_bundle(value);
        let mut doc = self.document.lock();
        let fragments = doc.close_slot();
        let bundle = bundle?;

        let mimes: Vec<String> = bundle.keys().cloned().collect();
        if !bundle.is_empty() || !fragments.is_empty() {
            doc.outputs.push(OutputRecord::Display(DisplayRecord { bundle, fragments }));
        }
        doc.events.push(HostEvent::Displayed { mimes });
        Ok(())
    }

    fn emit(&self, content: OutputContent) -> Result<(), ApiError> {
        let mut doc = self.document.lock();
        match content {
            OutputContent::Fragment { id, html } => {
                debug!(fragment = %id, bytes = html.len(), "Emitted fragment");
                doc.fragments.insert(
                    id.clone(),
                    FragmentState {
                        html,
                        updates: Vec::new(),
                        attached: true,
                    },
                );
                doc.outputs.push(OutputRecord::Fragment(id.clone()));
                doc.events.push(HostEvent::Emitted { fragment: id });
            }
            OutputContent::Html(html) => {
                doc.outputs.push(OutputRecord::Html(html));
                doc.events.push(HostEvent::HtmlEmitted);
            }
            OutputContent::Text(text) => {
                doc.outputs.push(OutputRecord::Text(text));
                doc.events.push(HostEvent::TextEmitted);
            }
        }
        Ok(())
    }

    fn push_update(&self, fragment: &FragmentId, update: LeafUpdate) -> DeliveryOutcome {
        let mut doc = self.document.lock();
        let leaf = update.leaf;
        match doc.fragments.get_mut(fragment) {
            Some(state) if state.attached => {
                state.updates.push(update);
                doc.events.push(HostEvent::LeafDelivered {
                    fragment: fragment.clone(),
                    leaf,
                });
                DeliveryOutcome::Delivered
            }
            _ => {
                warn!(fragment = %fragment, leaf = %leaf, "Discarding update for detached fragment");
                doc.events.push(HostEvent::LeafDiscarded {
                    fragment: fragment.clone(),
                    leaf,
                });
                DeliveryOutcome::Discarded
            }
        }
    }

    fn relocate(&self, fragment: &FragmentId) -> Result<(), ApiError> {
        let mut doc = self.document.lock();
        let attached = doc
            .fragments
            .get(fragment)
            .map(|state| state.attached)
            .unwrap_or(false);
        if !attached {
            return Err(ApiError::Host(format!(
                "Cannot relocate fragment {}: not in the document",
                fragment
            )));
        }

        doc.outputs
            .retain(|record| !matches!(record, OutputRecord::Fragment(id) if id == fragment));
        let into_display = match doc.current_slot() {
            Some(slot) => {
                slot.fragments.push(fragment.clone());
                true
            }
            None => {
                doc.outputs.push(OutputRecord::Fragment(fragment.clone()));
                false
            }
        };
        debug!(fragment = %fragment, into_display, "Relocated fragment");
        doc.events.push(HostEvent::Relocated {
            fragment: fragment.clone(),
            into_display,
        });
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<HostValue, ApiError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(ApiError::UserExpression(
                "SyntaxError: invalid syntax".to_string(),
            ));
        }
        if let Some(value) = self.bindings.read().get(expression) {
            return Ok(value.clone());
        }
        if expression == "None" {
            return Ok(HostValue::None);
        }
        if let Ok(literal) = serde_json::from_str::<serde_json::Value>(expression) {
            return Ok(HostValue::Value(Arc::new(literal)));
        }
        if is_identifier(expression) {
            Err(ApiError::UserExpression(format!(
                "NameError: name '{}' is not defined",
                expression
            )))
        } else {
            Err(ApiError::UserExpression(format!(
                "SyntaxError: invalid syntax: {}",
                expression
            )))
        }
    }

    fn run_cell(&self, body: &str) -> Result<(), ApiError> {
        self.execute(body)
    }

    fn register_magic(&self, magic: Arc<dyn CellMagic>) -> Result<(), ApiError> {
        let name = magic.name().to_string();
        self.magics.write().insert(name.clone(), magic);
        self.document
            .lock()
            .events
            .push(HostEvent::MagicRegistered { name: name.clone() });
        info!(host = %self.name, magic = %name, "Registered cell magic");
        Ok(())
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
