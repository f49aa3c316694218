//! Resolving directive values against stores and contexts.

use crate::diagnostics;
use crate::error::{Error, Result};
use crate::scope::{self, Frame, Scope};
use crate::state::{CallArgs, Value};
use crate::store::StoreRegistry;
use crate::vdom::{DirectiveEntry, DirectiveValue};

/// Resolve `entry` in `scope`.
///
/// The value is a dotted path, optionally negated with a leading `!`. The
/// first segment `context` selects the scope's context for the entry's
/// namespace; anything else resolves against the namespace's store. Reads
/// run inside the scope, so derived state sees the right context, and are
/// tracked by whatever reactive computation is evaluating.
///
/// A function result is returned bound to the scope: calling it later,
/// from an event listener or a spawned task, still sees this scope.
pub fn evaluate(entry: &DirectiveEntry, scope: &Scope, stores: &StoreRegistry) -> Result<Value> {
    let path = match &entry.value {
        DirectiveValue::Text(path) => path.as_str(),
        DirectiveValue::Object(map) => {
            return Err(Error::InvalidExpression {
                value: serde_json::Value::Object(map.clone()).to_string(),
            })
        }
    };
    let (negate, path) = match path.strip_prefix('!') {
        Some(rest) => (!rest.is_empty(), rest),
        None => (false, path),
    };

    let Some(namespace) = entry.namespace.as_deref() else {
        diagnostics::warn(format!(
            "Namespace missing for \"{path}\". The value for that path won't be resolved."
        ));
        return Ok(Value::Undefined);
    };

    let frame = Frame {
        namespace: Some(namespace.to_string()),
        scope: Some(scope.clone()),
    };
    let _frame = scope::enter_frame(frame.clone());
    let value = resolve(path, namespace, scope, stores);

    match value {
        Value::Function(function) if negate => {
            diagnostics::warn(
                "Using a function with a negation operator is deprecated. Use derived state instead.",
            );
            let result = function.call(CallArgs::none())?;
            Ok(Value::Bool(!result.is_truthy()))
        }
        Value::Function(function) => Ok(Value::Function(function.bind(frame))),
        Value::Pending => Ok(Value::Pending),
        value if negate => Ok(Value::Bool(!value.is_truthy())),
        value => Ok(value),
    }
}

/// Evaluate `entry` and, if the result is a function, call it.
pub fn evaluate_and_call(entry: &DirectiveEntry, scope: &Scope, stores: &StoreRegistry) -> Result<Value> {
    match evaluate(entry, scope, stores)? {
        Value::Function(function) => function.call(CallArgs::none()),
        value => Ok(value),
    }
}

fn resolve(path: &str, namespace: &str, scope: &Scope, stores: &StoreRegistry) -> Value {
    let store = stores.ensure(namespace);
    let mut segments = path.split('.');
    let mut current = match segments.next() {
        Some("context") => scope.context(namespace).map(Value::Object).unwrap_or_default(),
        Some(first) => store.root().get(first),
        None => return Value::Undefined,
    };
    for segment in segments {
        current = match &current {
            Value::Object(object) => object.get(segment),
            _ => return Value::Undefined,
        };
    }
    current
}
