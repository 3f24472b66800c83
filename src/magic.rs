//! Scoped-execution cell magics
//!
//! `%%autovisualize [expr]` runs a cell with an autovisualizer active and
//! `%%with expr` runs a cell inside an arbitrary context manager. In both cases
//! the scope is exited when the cell finishes, however it finishes.

use crate::autovisualize::{active_autovisualizer, array_autovisualizer, Autovisualizer};
use crate::context::{ContextManager, ContextualValue};
use crate::error::ApiError;
use crate::host::{Host, HostValue};
use once_cell::sync::Lazy;
use tracing::{debug, error};

/// A parsed magic: the expression on the magic line and the cell body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicInvocation {
    /// `None` when the line is blank, meaning "use the default".
    pub expression: Option<String>,
    pub body: String,
}

impl MagicInvocation {
    pub fn parse(line: &str, body: &str) -> Self {
        let line = line.trim();
        Self {
            expression: (!line.is_empty()).then(|| line.to_string()),
            body: body.to_string(),
        }
    }

    /// Split a cell starting with `%%name line` into the magic name and invocation.
    pub fn split_cell(cell: &str) -> Option<(String, MagicInvocation)> {
        let (header, body) = cell.split_once('\n').unwrap_or((cell, ""));
        let header = header.trim().strip_prefix("%%")?;
        let (name, line) = header
            .split_once(char::is_whitespace)
            .unwrap_or((header, ""));
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), Self::parse(line, body)))
    }
}

pub trait CellMagic: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, host: &dyn Host, line: &str, body: &str) -> Result<(), ApiError>;
}

/// Run `body` inside `scope`. The scope is exited on every path.
pub fn run_scoped(host: &dyn Host, scope: &dyn ContextManager, body: &str) -> Result<(), ApiError> {
    let active = scope.enter()?;
    debug!(scope = active.label(), "Entered cell scope");
    let result = host.run_cell(body);
    let exited = active.exit();

    match (result, exited) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(scope_err)) => {
            error!(error = %scope_err, "Scope exit failed after cell error");
            Err(err)
        }
    }
}

static DEFAULT_MAGIC_AUTOVISUALIZER: Lazy<ContextualValue<Option<Autovisualizer>>> =
    Lazy::new(|| {
        ContextualValue::new(
            module_path!(),
            "default_magic_autovisualizer",
            Some(array_autovisualizer()),
        )
    });

/// Autovisualizer used by `%%autovisualize` with a blank line.
pub fn default_magic_autovisualizer() -> &'static ContextualValue<Option<Autovisualizer>> {
    &DEFAULT_MAGIC_AUTOVISUALIZER
}

/// `%%autovisualize [expr]`
pub struct AutovisualizeMagic;

impl CellMagic for AutovisualizeMagic {
    fn name(&self) -> &str {
        "autovisualize"
    }

    fn run(&self, host: &dyn Host, line: &str, body: &str) -> Result<(), ApiError> {
        let invocation = MagicInvocation::parse(line, body);
        let chosen = match invocation.expression.as_deref() {
            None => default_magic_autovisualizer().get(),
            Some(expression) => match host.evaluate(expression)? {
                HostValue::None => None,
                HostValue::Autovisualizer(visualizer) => Some(visualizer),
                other => {
                    return Err(ApiError::UserExpression(format!(
                        "TypeError: expected an autovisualizer, got {}",
                        other.kind()
                    )))
                }
            },
        };
        let visualizer = chosen.unwrap_or_else(Autovisualizer::disabled);
        debug!(autovisualizer = visualizer.name(), "Autovisualizing cell");

        let setting = active_autovisualizer().scoped_setting(Some(visualizer));
        run_scoped(host, &setting, &invocation.body)
    }
}

/// `%%with expr`
pub struct WithMagic;

impl CellMagic for WithMagic {
    fn name(&self) -> &str {
        "with"
    }

    fn run(&self, host: &dyn Host, line: &str, body: &str) -> Result<(), ApiError> {
        let invocation = MagicInvocation::parse(line, body);
        let Some(expression) = invocation.expression.as_deref() else {
            return Err(ApiError::UserExpression(
                "UsageError: %%with requires a context manager expression".to_string(),
            ));
        };
        match host.evaluate(expression)? {
            HostValue::ContextManager(scope) => run_scoped(host, scope.as_ref(), &invocation.body),
            other => Err(ApiError::UserExpression(format!(
                "TypeError: '{}' object does not support the context manager protocol",
                other.kind()
            ))),
        }
    }
}
