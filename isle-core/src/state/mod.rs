//! Reactive state.
//!
//! Store state and element context are trees of [`ObjectHandle`]s. Each
//! handle owns its properties; a property that has been read is backed by a
//! reactive cell, so reading it inside an effect subscribes that effect to
//! exactly that property. Getters are memoized per reading scope.
//!
//! ```rust,ignore
//! let state = ObjectHandle::from_json(Some("counter"), &json!({"count": 1}));
//! state.set_getter("double", Getter::new(|this| {
//!     Value::Number(this.get("count").as_f64().unwrap_or(0.0) * 2.0)
//! }));
//! let label = Effect::new(move || println!("{:?}", state.get("double")));
//! ```

mod cell;
mod function;
mod merge;
mod object;
mod value;

pub use cell::Getter;
pub(crate) use cell::PropCell;
pub use function::{CallArgs, Function};
pub use merge::{deep_merge, Source};
pub use object::{ObjectHandle, ObjectId, ObjectKind, Slot};
pub use value::{format_number, Value, ValueKey};
