use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::effect::{Effect, EffectOptions};
use crate::runtime::Runtime;
use crate::store::DepKey;
use crate::value::{CellId, TargetKind};
use crate::{TriggerOp, Value};

impl Runtime {
	/// Memoized derived value. The getter runs lazily: on the first read
	/// after construction and after each invalidation, never eagerly.
	pub fn computed(&self, getter: impl FnMut() -> Value + 'static) -> Computed {
		Computed::new(self.clone(), Box::new(getter))
	}
}

#[derive(Clone)]
pub struct Computed {
	body: Rc<ComputedBody>,
}

struct ComputedBody {
	id: CellId,
	rt: Runtime,
	dirty: Cell<bool>,
	value: RefCell<Value>,
	effect: Effect,
}

impl Computed {
	fn new(rt: Runtime, getter: Box<dyn FnMut() -> Value>) -> Computed {
		let body = Rc::new_cyclic(|this: &Weak<ComputedBody>| {
			// Invalidation only marks the node dirty and notifies readers
			// of the node's value key; recomputation waits for the next
			// read.
			let this = this.clone();
			let scheduler = move |_effect: Effect| {
				if let Some(body) = this.upgrade() {
					body.invalidate();
				}
			};
			ComputedBody {
				id: CellId::next(),
				rt: rt.clone(),
				dirty: Cell::new(true),
				value: RefCell::new(Value::Null),
				effect: Effect::new(rt.clone(), getter, EffectOptions::scheduled_lazy(scheduler)),
			}
		});
		Computed { body }
	}

	/// Reads the derived value, recomputing at most once per
	/// invalidation. The read itself is trackable: a computation reading
	/// it re-runs when this node's own dependencies change.
	pub fn value(&self) -> Value {
		if self.body.dirty.get() {
			let result = self.body.effect.run();
			*self.body.value.borrow_mut() = result;
			self.body.dirty.set(false);
		}
		self.body.rt.track(self.body.id, DepKey::ValueKey);
		self.body.value.borrow().clone()
	}

	/// Detaches the derived value from its dependencies. Later reads
	/// recompute untracked.
	pub fn stop(&self) {
		self.body.effect.stop();
		self.body.dirty.set(true);
	}

	pub fn ptr_eq(&self, other: &Computed) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl ComputedBody {
	fn invalidate(&self) {
		if !self.dirty.get() {
			self.dirty.set(true);
			self.rt.trigger(
				self.id,
				TargetKind::Node,
				DepKey::ValueKey,
				TriggerOp::Set,
				None,
			);
		}
	}
}
