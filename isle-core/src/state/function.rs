//! Callable values: actions, callbacks and the wrappers the runtime puts
//! around them.

use std::fmt;
use std::future::ready;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::Value;
use crate::diagnostics;
use crate::dom::EventArg;
use crate::error::Result;
use crate::scope::{self, Frame, ScopedFuture};
use crate::task;

type SyncBody = Arc<dyn Fn(&CallArgs) -> Result<Value> + Send + Sync>;
type AsyncBody = Arc<dyn Fn(CallArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Arguments passed to a [`Function`].
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    /// Set when the call comes from an event directive.
    pub event: Option<EventArg>,
}

impl CallArgs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(args: Vec<Value>) -> Self {
        Self { args, event: None }
    }

    pub fn with_event(event: EventArg) -> Self {
        Self {
            args: Vec::new(),
            event: Some(event),
        }
    }

    /// Positional argument `index`, `undefined` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

#[derive(Clone)]
enum Body {
    Sync(SyncBody),
    Async(AsyncBody),
    /// Runs `target` inside a captured scope frame.
    Bound { target: Function, frame: Frame },
}

/// A function stored in a store or returned by an expression.
///
/// Async functions are awaited through a [`ScopedFuture`], so `get_context`
/// and friends keep working after every `.await`.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

struct FunctionInner {
    body: Body,
    sync_event: bool,
}

impl Function {
    /// A synchronous function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self::from_body(Body::Sync(Arc::new(f)), false)
    }

    /// An async function. Calls made from directives spawn the future on the
    /// ambient tokio runtime.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::from_body(
            Body::Async(Arc::new(move |args| Box::pin(f(args)) as BoxFuture<'static, _>)),
            false,
        )
    }

    fn from_body(body: Body, sync_event: bool) -> Self {
        Self {
            inner: Arc::new(FunctionInner { body, sync_event }),
        }
    }

    /// Mark this function as needing synchronous access to the event.
    /// Event directives then call it without deferring to a later task.
    pub fn with_sync_event(self) -> Self {
        Self::from_body(self.inner.body.clone(), true)
    }

    /// Bind this function to `frame`: every call runs inside it.
    pub fn bind(&self, frame: Frame) -> Self {
        Self::from_body(
            Body::Bound {
                target: self.clone(),
                frame,
            },
            self.inner.sync_event,
        )
    }

    pub fn requires_sync_event(&self) -> bool {
        self.inner.sync_event
    }

    pub fn is_async(&self) -> bool {
        match &self.inner.body {
            Body::Sync(_) => false,
            Body::Async(_) => true,
            Body::Bound { target, .. } => target.is_async(),
        }
    }

    /// Call the function. Async functions are spawned and yield `undefined`;
    /// their errors are reported when the future fails.
    pub fn call(&self, args: CallArgs) -> Result<Value> {
        match &self.inner.body {
            Body::Sync(f) => f(&args),
            Body::Async(_) => {
                let future = self.call_async(args);
                task::spawn(async move {
                    if let Err(error) = future.await {
                        diagnostics::report(&error);
                    }
                });
                Ok(Value::Undefined)
            }
            Body::Bound { target, frame } => {
                let _frame = scope::enter_frame(frame.clone());
                target.call(args)
            }
        }
    }

    /// Call the function and return a future of its result.
    ///
    /// The future re-enters the scope frame that was current at call time on
    /// every poll.
    pub fn call_async(&self, args: CallArgs) -> BoxFuture<'static, Result<Value>> {
        match &self.inner.body {
            Body::Sync(f) => Box::pin(ready(f(&args))),
            Body::Async(f) => Box::pin(ScopedFuture::new(scope::current_frame(), f(args))),
            Body::Bound { target, frame } => {
                let _frame = scope::enter_frame(frame.clone());
                target.call_async(args)
            }
        }
    }

    /// Stable identity of the underlying function.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("async", &self.is_async())
            .field("sync_event", &self.inner.sync_event)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn sync_functions_return_their_value() {
        let double = Function::new(|args| {
            let n = args.arg(0).as_f64().ok_or_else(|| Error::action("not a number"))?;
            Ok(Value::Number(n * 2.0))
        });
        assert_eq!(double.call(CallArgs::new(vec![21.into()])).unwrap(), Value::Number(42.0));
        assert!(double.call(CallArgs::none()).is_err());
    }

    #[test]
    fn sync_event_flag_survives_binding() {
        let f = Function::new(|_| Ok(Value::Undefined)).with_sync_event();
        assert!(f.requires_sync_event());
        assert!(f.bind(Frame::default()).requires_sync_event());
        assert!(!f.is_async());
    }

    #[tokio::test]
    async fn async_functions_can_be_awaited() {
        let f = Function::new_async(|args: CallArgs| async move { Ok(args.arg(0)) });
        assert!(f.is_async());
        let value = f.call_async(CallArgs::new(vec!["done".into()])).await.unwrap();
        assert_eq!(value, Value::from("done"));
    }
}
