pub mod macros;

mod addr;
mod batch;
mod collections;
mod computed;
mod effect;
mod reactive;
mod refs;
mod runtime;
mod store;
mod value;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions};
pub use reactive::Reactive;
pub use refs::{RefBag, Reference};
pub use runtime::Runtime;
pub use store::Key;
pub use value::{CellId, List, Map, Record, Set, Value, WeakMap, WeakSet};
pub use watch::{OnCancel, WatchOptions, Watcher};

/// Classification of a write, driving notification fan-out: setting an
/// existing field, adding a new field or key, or deleting one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerOp {
	Set,
	Add,
	Delete,
}

pub(crate) type FxIndexMap<K, V> = indexmap::IndexMap<K, V, fxhash::FxBuildHasher>;
pub(crate) type FxIndexSet<T> = indexmap::IndexSet<T, fxhash::FxBuildHasher>;
