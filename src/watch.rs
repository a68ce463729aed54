use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::effect::{Effect, EffectOptions};
use crate::reactive::Reactive;
use crate::runtime::Runtime;
use crate::store::Key;
use crate::value::{CellId, Target, Value};

#[derive(Default)]
pub struct WatchOptions {
	/// Fire the callback once on creation, with `Null` as the old value.
	pub immediate: bool,
}

impl WatchOptions {
	pub fn immediate() -> Self {
		WatchOptions { immediate: true }
	}
}

/// Handed to the watch callback; lets it install a cancellation hook
/// that runs if the source changes again before the callback's
/// asynchronous work completes.
pub struct OnCancel {
	slot: Option<Box<dyn FnOnce()>>,
}

impl OnCancel {
	pub fn register(&mut self, func: impl FnOnce() + 'static) {
		self.slot = Some(Box::new(func));
	}
}

type WatchCallback = Box<dyn FnMut(Value, Value, &mut OnCancel)>;

impl Runtime {
	/// Watches an accessor: `callback(new, old, on_cancel)` fires when
	/// anything the accessor reads changes.
	pub fn watch(
		&self,
		getter: impl FnMut() -> Value + 'static,
		callback: impl FnMut(Value, Value, &mut OnCancel) + 'static,
		options: WatchOptions,
	) -> Watcher {
		watch_impl(self, Box::new(getter), Box::new(callback), options)
	}

	/// Watches a structured value deeply: every nested field is read (and
	/// so tracked) on each evaluation, cycle-safe.
	pub fn watch_value(
		&self,
		source: impl Into<Value>,
		callback: impl FnMut(Value, Value, &mut OnCancel) + 'static,
		options: WatchOptions,
	) -> Watcher {
		let source = source.into();
		let getter = move || {
			let mut seen = FxHashSet::default();
			traverse(&source, &mut seen);
			source.clone()
		};
		watch_impl(self, Box::new(getter), Box::new(callback), options)
	}
}

pub struct Watcher {
	body: Rc<WatcherBody>,
}

struct WatcherBody {
	effect: RefCell<Option<Effect>>,
	old: RefCell<Value>,
	cleanup: RefCell<Option<Box<dyn FnOnce()>>>,
	callback: RefCell<WatchCallback>,
	running: Cell<bool>,
}

fn watch_impl(
	rt: &Runtime,
	getter: Box<dyn FnMut() -> Value>,
	callback: WatchCallback,
	options: WatchOptions,
) -> Watcher {
	let body = Rc::new(WatcherBody {
		effect: RefCell::new(None),
		old: RefCell::new(Value::Null),
		cleanup: RefCell::new(None),
		callback: RefCell::new(callback),
		running: Cell::new(false),
	});
	let scheduler = {
		let body = Rc::downgrade(&body);
		move |_effect: Effect| {
			if let Some(body) = body.upgrade() {
				body.notify();
			}
		}
	};
	let effect = Effect::new(
		rt.clone(),
		getter,
		EffectOptions::scheduled_lazy(scheduler),
	);
	*body.effect.borrow_mut() = Some(effect);

	if options.immediate {
		body.notify();
	} else {
		// Evaluate once, silently, to subscribe and capture the initial
		// old value.
		let initial = body.effect.borrow().as_ref().map(Effect::run);
		*body.old.borrow_mut() = initial.unwrap_or(Value::Null);
	}
	Watcher { body }
}

impl WatcherBody {
	fn notify(&self) {
		if self.running.get() {
			tracing::warn!("watch callback re-entered from its own mutation; skipped");
			return;
		}
		let Some(effect) = self.effect.borrow().clone() else {
			return;
		};
		let new_value = effect.run();
		// A newer change arrived: give the previous callback invocation a
		// chance to discard its still-pending work.
		if let Some(cancel) = self.cleanup.borrow_mut().take() {
			cancel();
		}
		let old_value = std::mem::replace(&mut *self.old.borrow_mut(), new_value.clone());
		let mut on_cancel = OnCancel { slot: None };
		self.running.set(true);
		(self.callback.borrow_mut())(new_value, old_value, &mut on_cancel);
		self.running.set(false);
		*self.cleanup.borrow_mut() = on_cancel.slot;
	}
}

impl Watcher {
	/// Unsubscribes the watcher and runs any pending cancellation hook.
	pub fn stop(&self) {
		if let Some(effect) = self.effect() {
			effect.stop();
		}
		if let Some(cancel) = self.body.cleanup.borrow_mut().take() {
			cancel();
		}
	}

	fn effect(&self) -> Option<Effect> {
		self.body.effect.borrow().clone()
	}
}

/// Forces a read of every reachable field so each one is tracked.
/// Wrapped targets are read through their instrumentation; plain
/// structured values are descended into raw.
fn traverse(value: &Value, seen: &mut FxHashSet<CellId>) {
	match value {
		Value::Reactive(wrapper) => {
			let id = wrapper.target_id();
			if !seen.insert(id) {
				return;
			}
			traverse_wrapper(wrapper, seen);
		}
		Value::Record(record) => {
			if !seen.insert(record.id()) {
				return;
			}
			for child in record.cell.data.borrow().values() {
				traverse(child, seen);
			}
		}
		Value::List(list) => {
			if !seen.insert(list.id()) {
				return;
			}
			for child in list.cell.data.borrow().iter() {
				traverse(child, seen);
			}
		}
		Value::Map(map) => {
			if !seen.insert(map.id()) {
				return;
			}
			for (key, child) in map.cell.data.borrow().iter() {
				traverse(key, seen);
				traverse(child, seen);
			}
		}
		Value::Set(set) => {
			if !seen.insert(set.id()) {
				return;
			}
			for child in set.cell.data.borrow().iter() {
				traverse(child, seen);
			}
		}
		_ => {}
	}
}

fn traverse_wrapper(wrapper: &Reactive, seen: &mut FxHashSet<CellId>) {
	match &wrapper.body.target {
		Target::Record(_) => {
			for key in wrapper.keys() {
				if let Value::Str(name) = key {
					traverse(&wrapper.get(Key::Name(name)), seen);
				}
			}
		}
		Target::List(_) => {
			for child in wrapper.to_vec() {
				traverse(&child, seen);
			}
		}
		Target::Map(_) => {
			for (key, child) in wrapper.entries() {
				traverse(&key, seen);
				traverse(&child, seen);
			}
		}
		Target::Set(_) => {
			for child in wrapper.values() {
				traverse(&child, seen);
			}
		}
		// Weak collections are not enumerable.
		Target::WeakMap(_) | Target::WeakSet(_) => {}
	}
}
