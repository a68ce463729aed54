use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::addr::WeakAddr;
use crate::effect::{Effect, EffectBody, EffectOptions};
use crate::reactive::ReactiveBody;
use crate::store::{Dep, DepKey, DepStore};
use crate::value::{CellId, TargetKind};
use crate::{FxIndexMap, TriggerOp, Value};

/// One reactive universe: dependency store, tracking stack, scheduler
/// queue and wrapper caches. Constructed once and handed (by cheap
/// clone) to everything that records or notifies; independent runtimes
/// never observe each other.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) body: Rc<RuntimeBody>,
}

pub(crate) struct RuntimeBody {
	pub(crate) store: DepStore,
	stack: RefCell<Vec<Frame>>,
	pause: Cell<usize>,
	pub(crate) queue: RefCell<FxIndexMap<usize, Weak<EffectBody>>>,
	pub(crate) flushing: Cell<bool>,
	pub(crate) batch_depth: Cell<usize>,
	pub(crate) caches: [RefCell<FxHashMap<CellId, Weak<ReactiveBody>>>; 4],
}

/// A computation currently on the tracking stack, together with the
/// dependency sets it has joined during this run.
struct Frame {
	effect: Weak<EffectBody>,
	collected: RefCell<SmallVec<[Dep; 8]>>,
}

impl Runtime {
	pub fn new() -> Runtime {
		Runtime {
			body: Rc::new(RuntimeBody {
				store: DepStore::new(),
				stack: RefCell::new(Vec::new()),
				pause: Cell::new(0),
				queue: RefCell::new(FxIndexMap::default()),
				flushing: Cell::new(false),
				batch_depth: Cell::new(0),
				caches: Default::default(),
			}),
		}
	}

	/// Registers a side-effecting computation and runs it once.
	pub fn effect(&self, mut func: impl FnMut() + 'static) -> Effect {
		self.effect_with(
			move || {
				func();
				Value::Null
			},
			EffectOptions::default(),
		)
	}

	/// Registers a computation with full control over laziness and
	/// scheduling; the primitive `computed` and `watch` build on.
	pub fn effect_with(
		&self,
		func: impl FnMut() -> Value + 'static,
		options: EffectOptions,
	) -> Effect {
		Effect::new(self.clone(), Box::new(func), options)
	}

	/// Runs `func` with dependency tracking suspended.
	pub fn untracked<R>(&self, func: impl FnOnce() -> R) -> R {
		struct PauseGuard<'a>(&'a Cell<usize>);
		impl Drop for PauseGuard<'_> {
			fn drop(&mut self) {
				self.0.set(self.0.get() - 1);
			}
		}
		self.body.pause.set(self.body.pause.get() + 1);
		let _guard = PauseGuard(&self.body.pause);
		func()
	}

	pub(crate) fn push_frame(&self, effect: Weak<EffectBody>) {
		self.body.stack.borrow_mut().push(Frame {
			effect,
			collected: RefCell::new(SmallVec::new()),
		});
	}

	pub(crate) fn pop_frame(&self) -> SmallVec<[Dep; 8]> {
		match self.body.stack.borrow_mut().pop() {
			Some(frame) => frame.collected.into_inner(),
			None => SmallVec::new(),
		}
	}

	/// Subscribes the innermost active computation to (target, key).
	/// No-op outside a computation or while tracking is suspended.
	pub(crate) fn track(&self, target: CellId, key: DepKey) {
		if self.body.pause.get() > 0 {
			return;
		}
		let stack = self.body.stack.borrow();
		let Some(frame) = stack.last() else {
			return;
		};
		tracing::trace!(?target, ?key, "track");
		let dep = self.body.store.dep(target, key);
		let inserted = dep
			.set
			.borrow_mut()
			.insert(WeakAddr::new(frame.effect.clone()));
		if inserted {
			frame.collected.borrow_mut().push(dep);
		}
	}

	/// Fans a mutation out to the affected computations.
	///
	/// The affected set is the union of: the literal key's subscribers;
	/// for list `Add`, the length subscribers; for a direct length write,
	/// every tracked index at or beyond the new length; for non-list
	/// `Add`/`Delete`, the enumeration sentinel (plus key enumeration for
	/// keyed collections); for keyed-collection `Set`, the enumeration
	/// sentinel, since entry values are observable through iteration.
	/// Computations currently running are excluded: a write made by a
	/// computation never re-enters it synchronously.
	pub(crate) fn trigger(
		&self,
		target: CellId,
		kind: TargetKind,
		key: DepKey,
		op: TriggerOp,
		new_value: Option<Value>,
	) {
		let is_list = kind == TargetKind::List;
		let is_keyed = matches!(kind, TargetKind::Map | TargetKind::WeakMap);

		let mut keys: SmallVec<[DepKey; 4]> = SmallVec::new();
		keys.push(key.clone());
		match op {
			TriggerOp::Add => {
				if is_list {
					if matches!(key, DepKey::Index(_)) {
						keys.push(DepKey::Length);
					}
				} else {
					keys.push(DepKey::Iterate);
					if is_keyed {
						keys.push(DepKey::MapKeyIterate);
					}
				}
			}
			TriggerOp::Delete => {
				if !is_list {
					keys.push(DepKey::Iterate);
					if is_keyed {
						keys.push(DepKey::MapKeyIterate);
					}
				}
			}
			TriggerOp::Set => {
				if kind == TargetKind::Map {
					keys.push(DepKey::Iterate);
				}
			}
		}

		let mut deps = self.body.store.lookup(target, &keys);
		if is_list && key == DepKey::Length {
			let new_len = new_value
				.as_ref()
				.and_then(Value::as_int)
				.unwrap_or(0)
				.max(0) as usize;
			deps.extend(self.body.store.lookup_indices_from(target, new_len));
		}
		if deps.is_empty() {
			return;
		}

		let mut seen: FxHashSet<usize> = FxHashSet::default();
		let mut affected: Vec<Effect> = Vec::new();
		for dep in &deps {
			for weak in dep.set.borrow().iter() {
				if let Some(body) = weak.upgrade() {
					if body.running.get() {
						continue;
					}
					if seen.insert(Rc::as_ptr(&body) as usize) {
						affected.push(Effect { body });
					}
				}
			}
		}
		drop(deps);

		tracing::trace!(?target, ?op, affected = affected.len(), "trigger");
		for effect in affected {
			match effect.body.scheduler.clone() {
				Some(scheduler) => scheduler(effect),
				None => {
					effect.run();
				}
			}
		}
	}

	pub(crate) fn prune_dep(&self, dep: &Dep) {
		self.body.store.prune(dep.target, &dep.key);
	}

	pub(crate) fn wrapper_cache(
		&self,
		shallow: bool,
		readonly: bool,
	) -> &RefCell<FxHashMap<CellId, Weak<ReactiveBody>>> {
		let index = (shallow as usize) | ((readonly as usize) << 1);
		&self.body.caches[index]
	}
}

impl Default for Runtime {
	fn default() -> Self {
		Runtime::new()
	}
}
