use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxHashMap;

use crate::reactive::Reactive;
use crate::refs::Reference;
use crate::{FxIndexMap, FxIndexSet};

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a structured cell. Identity survives
/// allocator address reuse, so dependency buckets never alias.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CellId(u64);

impl CellId {
	pub(crate) fn next() -> CellId {
		CellId(NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// A dynamic value. Structured variants are cheap-clone handles over a
/// shared cell; cloning never copies the underlying data.
#[derive(Clone)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Rc<str>),
	Record(Record),
	List(List),
	Map(Map),
	Set(Set),
	WeakMap(WeakMap),
	WeakSet(WeakSet),
	Reactive(Reactive),
	Ref(Reference),
}

macro_rules! cell_type {
	($name:ident, $data:ty) => {
		#[derive(Clone)]
		pub struct $name {
			pub(crate) cell: Rc<Cell<$data>>,
		}

		impl $name {
			pub fn new() -> Self {
				$name {
					cell: Rc::new(Cell {
						id: CellId::next(),
						data: RefCell::new(Default::default()),
					}),
				}
			}

			pub fn id(&self) -> CellId {
				self.cell.id
			}

			pub fn ptr_eq(&self, other: &Self) -> bool {
				Rc::ptr_eq(&self.cell, &other.cell)
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}
	};
}

pub(crate) struct Cell<T> {
	pub(crate) id: CellId,
	pub(crate) data: RefCell<T>,
}

cell_type!(Record, FxIndexMap<Rc<str>, Value>);
cell_type!(List, Vec<Value>);
cell_type!(Map, FxIndexMap<Value, Value>);
cell_type!(Set, FxIndexSet<Value>);
cell_type!(WeakMap, FxHashMap<CellId, (WeakTarget, Value)>);
cell_type!(WeakSet, FxHashMap<CellId, WeakTarget>);

impl Record {
	/// Raw insertion, used to build plain data before wrapping.
	pub fn insert(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) {
		self.cell.data.borrow_mut().insert(key.into(), value.into());
	}
}

impl List {
	/// Raw append, used to build plain data before wrapping.
	pub fn push_raw(&self, value: impl Into<Value>) {
		self.cell.data.borrow_mut().push(value.into());
	}
}

impl Map {
	/// Raw insertion, used to build plain data before wrapping.
	pub fn insert_raw(&self, key: impl Into<Value>, value: impl Into<Value>) {
		self.cell
			.data
			.borrow_mut()
			.insert(key.into().to_raw(), value.into().to_raw());
	}
}

impl Set {
	/// Raw insertion, used to build plain data before wrapping.
	pub fn insert_raw(&self, value: impl Into<Value>) {
		self.cell.data.borrow_mut().insert(value.into().to_raw());
	}
}

/// The raw structured targets the interception layer knows how to wrap.
#[derive(Clone)]
pub(crate) enum Target {
	Record(Record),
	List(List),
	Map(Map),
	Set(Set),
	WeakMap(WeakMap),
	WeakSet(WeakSet),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum TargetKind {
	Record,
	List,
	Map,
	Set,
	WeakMap,
	WeakSet,
	/// Standalone tracked node (derived value, value ref) that has an
	/// identity in the dependency store but no backing collection.
	Node,
}

impl Target {
	pub(crate) fn id(&self) -> CellId {
		match self {
			Target::Record(t) => t.id(),
			Target::List(t) => t.id(),
			Target::Map(t) => t.id(),
			Target::Set(t) => t.id(),
			Target::WeakMap(t) => t.id(),
			Target::WeakSet(t) => t.id(),
		}
	}

	pub(crate) fn kind(&self) -> TargetKind {
		match self {
			Target::Record(_) => TargetKind::Record,
			Target::List(_) => TargetKind::List,
			Target::Map(_) => TargetKind::Map,
			Target::Set(_) => TargetKind::Set,
			Target::WeakMap(_) => TargetKind::WeakMap,
			Target::WeakSet(_) => TargetKind::WeakSet,
		}
	}

	pub(crate) fn to_value(&self) -> Value {
		match self {
			Target::Record(t) => Value::Record(t.clone()),
			Target::List(t) => Value::List(t.clone()),
			Target::Map(t) => Value::Map(t.clone()),
			Target::Set(t) => Value::Set(t.clone()),
			Target::WeakMap(t) => Value::WeakMap(t.clone()),
			Target::WeakSet(t) => Value::WeakSet(t.clone()),
		}
	}

	pub(crate) fn from_value(value: &Value) -> Option<Target> {
		match value {
			Value::Record(t) => Some(Target::Record(t.clone())),
			Value::List(t) => Some(Target::List(t.clone())),
			Value::Map(t) => Some(Target::Map(t.clone())),
			Value::Set(t) => Some(Target::Set(t.clone())),
			Value::WeakMap(t) => Some(Target::WeakMap(t.clone())),
			Value::WeakSet(t) => Some(Target::WeakSet(t.clone())),
			_ => None,
		}
	}

	pub(crate) fn downgrade(&self) -> WeakTarget {
		match self {
			Target::Record(t) => WeakTarget::Record(Rc::downgrade(&t.cell)),
			Target::List(t) => WeakTarget::List(Rc::downgrade(&t.cell)),
			Target::Map(t) => WeakTarget::Map(Rc::downgrade(&t.cell)),
			Target::Set(t) => WeakTarget::Set(Rc::downgrade(&t.cell)),
			Target::WeakMap(t) => WeakTarget::WeakMap(Rc::downgrade(&t.cell)),
			Target::WeakSet(t) => WeakTarget::WeakSet(Rc::downgrade(&t.cell)),
		}
	}
}

/// Weakly held structured target, used as the key side of weak collections.
#[derive(Clone)]
pub(crate) enum WeakTarget {
	Record(Weak<Cell<FxIndexMap<Rc<str>, Value>>>),
	List(Weak<Cell<Vec<Value>>>),
	Map(Weak<Cell<FxIndexMap<Value, Value>>>),
	Set(Weak<Cell<FxIndexSet<Value>>>),
	WeakMap(Weak<Cell<FxHashMap<CellId, (WeakTarget, Value)>>>),
	WeakSet(Weak<Cell<FxHashMap<CellId, WeakTarget>>>),
}

impl WeakTarget {
	pub(crate) fn is_alive(&self) -> bool {
		match self {
			WeakTarget::Record(w) => w.strong_count() > 0,
			WeakTarget::List(w) => w.strong_count() > 0,
			WeakTarget::Map(w) => w.strong_count() > 0,
			WeakTarget::Set(w) => w.strong_count() > 0,
			WeakTarget::WeakMap(w) => w.strong_count() > 0,
			WeakTarget::WeakSet(w) => w.strong_count() > 0,
		}
	}
}

impl Value {
	pub fn record() -> Value {
		Value::Record(Record::new())
	}

	pub fn list() -> Value {
		Value::List(List::new())
	}

	pub fn map() -> Value {
		Value::Map(Map::new())
	}

	pub fn weak_map() -> Value {
		Value::WeakMap(WeakMap::new())
	}

	pub fn weak_set() -> Value {
		Value::WeakSet(WeakSet::new())
	}

	/// Strips instrumentation: a wrapper yields its raw target, anything
	/// else is returned unchanged.
	pub fn to_raw(&self) -> Value {
		match self {
			Value::Reactive(wrapper) => wrapper.raw(),
			other => other.clone(),
		}
	}

	pub fn is_structured(&self) -> bool {
		matches!(
			self,
			Value::Record(_)
				| Value::List(_) | Value::Map(_)
				| Value::Set(_) | Value::WeakMap(_)
				| Value::WeakSet(_)
		)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_reactive(&self) -> Option<&Reactive> {
		match self {
			Value::Reactive(wrapper) => Some(wrapper),
			_ => None,
		}
	}

	pub fn as_ref_value(&self) -> Option<&Reference> {
		match self {
			Value::Ref(reference) => Some(reference),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			Value::Float(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(value) => Some(value),
			_ => None,
		}
	}

	/// Identity of the underlying cell, seeing through wrappers.
	pub(crate) fn raw_cell_id(&self) -> Option<CellId> {
		match self {
			Value::Reactive(wrapper) => Some(wrapper.target_id()),
			other => Target::from_value(other).map(|t| t.id()),
		}
	}
}

fn canonical_float_bits(value: f64) -> u64 {
	if value.is_nan() {
		// All NaN payloads collapse to one key.
		0x7ff8_0000_0000_0000
	} else {
		// -0.0 folds onto +0.0.
		(value + 0.0).to_bits()
	}
}

/// Same-value semantics: NaN equals NaN, -0.0 equals +0.0, structured
/// values compare by cell identity, wrappers by wrapper identity.
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => {
				canonical_float_bits(*a) == canonical_float_bits(*b)
			}
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
			(Value::List(a), Value::List(b)) => a.ptr_eq(b),
			(Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
			(Value::Set(a), Value::Set(b)) => a.ptr_eq(b),
			(Value::WeakMap(a), Value::WeakMap(b)) => a.ptr_eq(b),
			(Value::WeakSet(a), Value::WeakSet(b)) => a.ptr_eq(b),
			(Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
			(Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl Eq for Value {}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		discriminant(self).hash(state);
		match self {
			Value::Null => {}
			Value::Bool(value) => value.hash(state),
			Value::Int(value) => value.hash(state),
			Value::Float(value) => canonical_float_bits(*value).hash(state),
			Value::Str(value) => value.hash(state),
			Value::Record(t) => t.id().hash(state),
			Value::List(t) => t.id().hash(state),
			Value::Map(t) => t.id().hash(state),
			Value::Set(t) => t.id().hash(state),
			Value::WeakMap(t) => t.id().hash(state),
			Value::WeakSet(t) => t.id().hash(state),
			Value::Reactive(wrapper) => wrapper.addr().hash(state),
			Value::Ref(reference) => reference.addr().hash(state),
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(value) => value.fmt(f),
			Value::Int(value) => value.fmt(f),
			Value::Float(value) => value.fmt(f),
			Value::Str(value) => value.fmt(f),
			Value::Record(t) => {
				write!(f, "Record(")?;
				t.cell.data.borrow().fmt(f)?;
				f.write_str(")")
			}
			Value::List(t) => {
				write!(f, "List(")?;
				t.cell.data.borrow().fmt(f)?;
				f.write_str(")")
			}
			Value::Map(t) => write!(f, "Map(#{:?})", t.id()),
			Value::Set(t) => write!(f, "Set(#{:?})", t.id()),
			Value::WeakMap(t) => write!(f, "WeakMap(#{:?})", t.id()),
			Value::WeakSet(t) => write!(f, "WeakSet(#{:?})", t.id()),
			Value::Reactive(wrapper) => write!(f, "Reactive({:?})", wrapper.raw()),
			Value::Ref(_) => f.write_str("Ref"),
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Int(value as i64)
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Value::Int(value as i64)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(Rc::from(value))
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(Rc::from(value.as_str()))
	}
}

impl From<Record> for Value {
	fn from(value: Record) -> Self {
		Value::Record(value)
	}
}

impl From<List> for Value {
	fn from(value: List) -> Self {
		Value::List(value)
	}
}

impl From<Map> for Value {
	fn from(value: Map) -> Self {
		Value::Map(value)
	}
}

impl From<Set> for Value {
	fn from(value: Set) -> Self {
		Value::Set(value)
	}
}

impl From<Reactive> for Value {
	fn from(value: Reactive) -> Self {
		Value::Reactive(value)
	}
}

impl From<Reference> for Value {
	fn from(value: Reference) -> Self {
		Value::Ref(value)
	}
}
