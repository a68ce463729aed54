use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::addr::WeakAddr;
use crate::effect::EffectBody;
use crate::value::{CellId, Value};
use crate::FxIndexSet;

/// Field address as seen by the interception layer.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Key {
	Name(Rc<str>),
	Index(usize),
	Length,
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Key::Name(Rc::from(name))
	}
}

impl From<Rc<str>> for Key {
	fn from(name: Rc<str>) -> Self {
		Key::Name(name)
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Key::Index(index)
	}
}

impl From<i32> for Key {
	fn from(index: i32) -> Self {
		Key::Index(index.max(0) as usize)
	}
}

/// Dependency key inside one target's bucket. Beyond the literal field
/// keys there are two reserved sentinels: `Iterate` stands for "this
/// target's key set" (enumeration, size, has-any-new-key) and
/// `MapKeyIterate` for keyed-collection key enumeration, which must not
/// be disturbed by value-only writes.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DepKey {
	Name(Rc<str>),
	Index(usize),
	Length,
	Entry(Value),
	ValueKey,
	Iterate,
	MapKeyIterate,
}

impl From<Key> for DepKey {
	fn from(key: Key) -> Self {
		match key {
			Key::Name(name) => DepKey::Name(name),
			Key::Index(index) => DepKey::Index(index),
			Key::Length => DepKey::Length,
		}
	}
}

/// One dependency set: the computations subscribed to a single
/// (target, key) pair, in insertion order.
pub(crate) struct DepCell {
	pub(crate) target: CellId,
	pub(crate) key: DepKey,
	pub(crate) set: RefCell<FxIndexSet<WeakAddr<EffectBody>>>,
}

pub(crate) type Dep = Rc<DepCell>;

/// Identity-keyed dependency storage: target id -> key -> subscriber set.
/// Holds no strong reference to either targets or computations; buckets
/// emptied by effect cleanup are pruned eagerly.
pub(crate) struct DepStore {
	buckets: RefCell<FxHashMap<CellId, FxHashMap<DepKey, Dep>>>,
}

impl DepStore {
	pub(crate) fn new() -> Self {
		DepStore {
			buckets: RefCell::new(FxHashMap::default()),
		}
	}

	pub(crate) fn dep(&self, target: CellId, key: DepKey) -> Dep {
		let mut buckets = self.buckets.borrow_mut();
		let bucket = buckets.entry(target).or_default();
		bucket
			.entry(key.clone())
			.or_insert_with(|| {
				Rc::new(DepCell {
					target,
					key,
					set: RefCell::new(FxIndexSet::default()),
				})
			})
			.clone()
	}

	/// Collects the live dependency sets for `keys`, in the given key
	/// order, without creating missing entries.
	pub(crate) fn lookup(&self, target: CellId, keys: &[DepKey]) -> Vec<Dep> {
		let buckets = self.buckets.borrow();
		let Some(bucket) = buckets.get(&target) else {
			return Vec::new();
		};
		keys.iter()
			.filter_map(|key| bucket.get(key).cloned())
			.collect()
	}

	/// Dependency sets for every tracked list index at or beyond
	/// `from_index`, for direct length truncation fan-out.
	pub(crate) fn lookup_indices_from(&self, target: CellId, from_index: usize) -> Vec<Dep> {
		let buckets = self.buckets.borrow();
		let Some(bucket) = buckets.get(&target) else {
			return Vec::new();
		};
		bucket
			.iter()
			.filter_map(|(key, dep)| match key {
				DepKey::Index(index) if *index >= from_index => Some(dep.clone()),
				_ => None,
			})
			.collect()
	}

	/// Drops an emptied dependency set; removes the whole bucket once its
	/// last set is gone, so dead targets do not accumulate entries.
	pub(crate) fn prune(&self, target: CellId, key: &DepKey) {
		let mut buckets = self.buckets.borrow_mut();
		let Some(bucket) = buckets.get_mut(&target) else {
			return;
		};
		let emptied = bucket
			.get(key)
			.map(|dep| dep.set.borrow().is_empty())
			.unwrap_or(false);
		if emptied {
			bucket.remove(key);
			if bucket.is_empty() {
				buckets.remove(&target);
			}
		}
	}
}
