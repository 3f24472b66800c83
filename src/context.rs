//! Contextual Values
//!
//! Named, process-wide configuration slots that can be overridden for the dynamic
//! extent of a block of code. Render settings (such as the active autovisualizer)
//! travel through arbitrarily deep call stacks this way without explicit parameters.
//!
//! Overrides are control-flow-local: each thread keeps its own override stacks.
//! Work that resumes later on another thread (deferred leaf producers) captures a
//! [`ContextSnapshot`] when it is created and runs inside it, so it observes the
//! configuration active at creation time rather than at resolution time.

use crate::error::{ApiError, ScopeError};
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OVERRIDE_TOKEN: AtomicU64 = AtomicU64::new(1);

type SharedValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct OverrideEntry {
    token: u64,
    value: SharedValue,
}

enum PopFailure {
    OutOfOrder,
    NotActive,
}

/// Override stacks for every contextual value, keyed by context id.
#[derive(Clone, Default)]
struct OverrideStacks {
    stacks: HashMap<u64, Vec<OverrideEntry>>,
}

impl OverrideStacks {
    fn top(&self, context_id: u64) -> Option<SharedValue> {
        self.stacks
            .get(&context_id)
            .and_then(|stack| stack.last())
            .map(|entry| Arc::clone(&entry.value))
    }

    fn depth(&self, context_id: u64) -> usize {
        self.stacks.get(&context_id).map(Vec::len).unwrap_or(0)
    }

    fn push(&mut self, context_id: u64, entry: OverrideEntry) {
        self.stacks.entry(context_id).or_default().push(entry);
    }

    fn pop(&mut self, context_id: u64, token: u64) -> Result<(), PopFailure> {
        let Some(stack) = self.stacks.get_mut(&context_id) else {
            return Err(PopFailure::NotActive);
        };

        let outcome = match stack.iter().rposition(|entry| entry.token == token) {
            Some(index) if index + 1 == stack.len() => {
                stack.pop();
                Ok(())
            }
            Some(index) => {
                // Drop the stray entry anyway so the remaining scopes can still unwind.
                stack.remove(index);
                Err(PopFailure::OutOfOrder)
            }
            None => Err(PopFailure::NotActive),
        };

        if stack.is_empty() {
            self.stacks.remove(&context_id);
        }
        outcome
    }
}

thread_local! {
    static OVERRIDES: RefCell<OverrideStacks> = RefCell::new(OverrideStacks::default());
}

fn report_violation(err: ScopeError) {
    if std::thread::panicking() {
        error!(error = %err, "Scope invariant violated while unwinding");
    } else {
        panic!("{}", err);
    }
}

/// A named configuration value with a permanent value and stack-scoped overrides.
///
/// Exactly one value is current at any time: the innermost active override on the
/// calling thread, or the permanent value when there is none.
pub struct ContextualValue<T> {
    id: u64,
    name: String,
    permanent: RwLock<T>,
}

impl<T> ContextualValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a contextual value identified by `module.qualname`.
    pub fn new(module: &str, qualname: &str, initial_value: T) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: format!("{}.{}", module, qualname),
            permanent: RwLock::new(initial_value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value. Never fails.
    pub fn get(&self) -> T {
        let scoped = OVERRIDES
            .try_with(|overrides| overrides.borrow().top(self.id))
            .ok()
            .flatten();

        if let Some(value) = scoped {
            if let Some(value) = value.downcast_ref::<T>() {
                return value.clone();
            }
        }
        self.permanent.read().clone()
    }

    /// The permanent value, ignoring any active overrides.
    pub fn permanent(&self) -> T {
        self.permanent.read().clone()
    }

    /// Number of overrides active on the calling thread.
    pub fn scope_depth(&self) -> usize {
        OVERRIDES
            .try_with(|overrides| overrides.borrow().depth(self.id))
            .unwrap_or(0)
    }

    /// Override the value until the returned guard is released or dropped.
    pub fn set_scoped(&self, value: T) -> ScopedGuard<'_, T> {
        let token = self.push(value);
        ScopedGuard {
            owner: self,
            token,
            released: false,
            _thread_local: PhantomData,
        }
    }

    /// Run `f` with the value overridden, restoring it on every exit path.
    pub fn with_scoped<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let _guard = self.set_scoped(value);
        f()
    }

    /// Replace the permanent value. Active overrides keep shadowing it until popped.
    pub fn set_globally(&self, value: T) {
        *self.permanent.write() = value;
        debug!(context = %self.name, "Replaced permanent value");
    }

    /// A not-yet-entered override, usable wherever a [`ContextManager`] is expected.
    pub fn scoped_setting(&'static self, value: T) -> ScopedSetting<T> {
        ScopedSetting {
            target: self,
            value,
        }
    }

    fn push(&self, value: T) -> u64 {
        let token = NEXT_OVERRIDE_TOKEN.fetch_add(1, Ordering::Relaxed);
        let entry = OverrideEntry {
            token,
            value: Arc::new(value),
        };
        OVERRIDES.with(|overrides| overrides.borrow_mut().push(self.id, entry));
        token
    }

    fn pop(&self, token: u64) -> Result<(), ScopeError> {
        let outcome = OVERRIDES.try_with(|overrides| overrides.borrow_mut().pop(self.id, token));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PopFailure::OutOfOrder)) => Err(ScopeError::OutOfOrder {
                context: self.name.clone(),
                token,
            }),
            Ok(Err(PopFailure::NotActive)) => Err(ScopeError::NotActive {
                context: self.name.clone(),
                token,
            }),
            // Thread is exiting; its overrides are gone with it.
            Err(_) => Ok(()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ContextualValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualValue")
            .field("name", &self.name)
            .field("permanent", &*self.permanent.read())
            .finish()
    }
}

/// Removes exactly the override it was created for.
///
/// Guards must be released innermost-first. Releasing out of order is an invariant
/// violation: [`ScopedGuard::release`] reports it as an error and an out-of-order
/// drop panics (or logs, if the thread is already unwinding).
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct ScopedGuard<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    owner: &'a ContextualValue<T>,
    token: u64,
    released: bool,
    // Overrides live in thread-local storage; the guard must stay on its thread.
    _thread_local: PhantomData<*const ()>,
}

impl<T> ScopedGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn release(mut self) -> Result<(), ScopeError> {
        self.released = true;
        self.owner.pop(self.token)
    }
}

impl<T> Drop for ScopedGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.owner.pop(self.token) {
            report_violation(err);
        }
    }
}

/// A copy of the calling thread's override stacks.
#[derive(Clone, Default)]
pub struct ContextSnapshot {
    stacks: OverrideStacks,
}

impl ContextSnapshot {
    pub fn capture() -> Self {
        OVERRIDES
            .try_with(|overrides| overrides.borrow().clone())
            .map(|stacks| Self { stacks })
            .unwrap_or_default()
    }

    /// Run `f` with this snapshot installed as the thread's overrides.
    ///
    /// Overrides pushed inside `f` are discarded with the snapshot; the thread's
    /// previous overrides are restored afterwards, including on panic.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = OVERRIDES
            .with(|overrides| std::mem::replace(&mut *overrides.borrow_mut(), self.stacks.clone()));
        let _restore = RestoreOverrides(Some(previous));
        f()
    }

    /// Number of contextual values overridden in this snapshot.
    pub fn overridden_count(&self) -> usize {
        self.stacks.stacks.len()
    }
}

impl fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("overridden", &self.overridden_count())
            .finish()
    }
}

struct RestoreOverrides(Option<OverrideStacks>);

impl Drop for RestoreOverrides {
    fn drop(&mut self) {
        if let Some(previous) = self.0.take() {
            let _ = OVERRIDES.try_with(|overrides| *overrides.borrow_mut() = previous);
        }
    }
}

/// Something that can be entered for the duration of a block and exited afterwards.
pub trait ContextManager: Send + Sync {
    fn enter(&self) -> Result<ActiveScope, ApiError>;

    fn describe(&self) -> String {
        "context manager".to_string()
    }
}

/// An entered scope. Exits on [`ActiveScope::exit`] or on drop.
pub struct ActiveScope {
    label: String,
    exit: Option<Box<dyn FnOnce() -> Result<(), ScopeError>>>,
}

impl ActiveScope {
    pub fn new(
        label: impl Into<String>,
        exit: impl FnOnce() -> Result<(), ScopeError> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            exit: Some(Box::new(exit)),
        }
    }

    pub fn noop() -> Self {
        Self {
            label: "noop".to_string(),
            exit: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn exit(mut self) -> Result<(), ScopeError> {
        match self.exit.take() {
            Some(exit) => exit(),
            None => Ok(()),
        }
    }
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        if let Some(exit) = self.exit.take() {
            if let Err(err) = exit() {
                report_violation(err);
            }
        }
    }
}

impl fmt::Debug for ActiveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveScope")
            .field("label", &self.label)
            .field("active", &self.exit.is_some())
            .finish()
    }
}

/// A context manager that changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContext;

impl ContextManager for NoopContext {
    fn enter(&self) -> Result<ActiveScope, ApiError> {
        Ok(ActiveScope::noop())
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}

/// A pending override of a `'static` contextual value.
pub struct ScopedSetting<T: 'static> {
    target: &'static ContextualValue<T>,
    value: T,
}

impl<T> ContextManager for ScopedSetting<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn enter(&self) -> Result<ActiveScope, ApiError> {
        let target = self.target;
        let token = target.push(self.value.clone());
        Ok(ActiveScope::new(target.name(), move || target.pop(token)))
    }

    fn describe(&self) -> String {
        format!("{}.set_scoped(..)", self.target.name())
    }
}
