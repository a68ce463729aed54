use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive::Reactive;
use crate::runtime::Runtime;
use crate::store::{DepKey, Key};
use crate::value::{CellId, TargetKind};
use crate::{TriggerOp, Value};

/// A live single-field reference: reading goes through the owning
/// reactive source (standalone cell or parent field), so liveness
/// survives destructuring.
#[derive(Clone)]
pub struct Reference {
	inner: Rc<dyn RefTarget>,
}

trait RefTarget {
	fn get(&self) -> Value;
	fn set(&self, value: Value);
}

/// Standalone reactive cell holding one value.
struct ValueRef {
	id: CellId,
	rt: Runtime,
	value: RefCell<Value>,
}

impl RefTarget for ValueRef {
	fn get(&self) -> Value {
		self.rt.track(self.id, DepKey::ValueKey);
		let value = self.value.borrow().clone();
		if value.is_structured() {
			self.rt.reactive(value)
		} else {
			value
		}
	}

	fn set(&self, value: Value) {
		let stored = value.to_raw();
		{
			let mut slot = self.value.borrow_mut();
			if *slot == stored {
				return;
			}
			*slot = stored;
		}
		self.rt.trigger(
			self.id,
			TargetKind::Node,
			DepKey::ValueKey,
			TriggerOp::Set,
			None,
		);
	}
}

/// Reference into a field of a reactive parent; reads and writes pass
/// through the parent's instrumentation.
struct FieldRef {
	source: Reactive,
	key: Key,
}

impl RefTarget for FieldRef {
	fn get(&self) -> Value {
		self.source.get(self.key.clone())
	}

	fn set(&self, value: Value) {
		self.source.set(self.key.clone(), value);
	}
}

impl Reference {
	pub fn value(&self) -> Value {
		self.inner.get()
	}

	pub fn set_value(&self, value: impl Into<Value>) {
		self.inner.set(value.into());
	}

	pub fn ptr_eq(&self, other: &Reference) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.inner) as *const () as usize
	}
}

impl Runtime {
	/// Standalone reactive cell exposing a single tracked value.
	pub fn ref_value(&self, value: impl Into<Value>) -> Reference {
		Reference {
			inner: Rc::new(ValueRef {
				id: CellId::next(),
				rt: self.clone(),
				value: RefCell::new(value.into().to_raw()),
			}),
		}
	}

	/// Live reference to one field of a reactive source.
	pub fn to_ref(&self, source: &Reactive, key: impl Into<Key>) -> Reference {
		Reference {
			inner: Rc::new(FieldRef {
				source: source.clone(),
				key: key.into(),
			}),
		}
	}

	/// A plain record holding a live reference for every current key of
	/// `source`, so the fields can be carried around independently.
	pub fn to_refs(&self, source: &Reactive) -> Value {
		let record = crate::value::Record::new();
		for key in source.keys() {
			if let Value::Str(name) = key {
				let reference = self.to_ref(source, Key::Name(name.clone()));
				record.insert(name, Value::Ref(reference));
			}
		}
		Value::Record(record)
	}

	/// Wraps a bag of fields so references read and write as if they were
	/// plain fields: reads auto-unwrap, writes pass through.
	pub fn proxy_refs(&self, target: impl Into<Value>) -> RefBag {
		RefBag {
			target: target.into(),
		}
	}
}

/// Field bag that sees through references on both reads and writes.
#[derive(Clone)]
pub struct RefBag {
	target: Value,
}

impl RefBag {
	pub fn get(&self, key: impl Into<Key>) -> Value {
		match self.target.get(key) {
			Value::Ref(reference) => reference.value(),
			other => other,
		}
	}

	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
		let key = key.into();
		match self.target.get(key.clone()) {
			Value::Ref(reference) => reference.set_value(value),
			_ => self.target.set(key, value),
		}
	}
}
