use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::WeakAddr;
use crate::runtime::Runtime;
use crate::store::Dep;
use crate::Value;

pub(crate) type EffectFn = Box<dyn FnMut() -> Value>;
pub type SchedulerFn = Rc<dyn Fn(Effect)>;

/// Configuration for a registered computation.
///
/// `lazy` computations are not run at registration; `scheduler`, when
/// present, receives the computation instead of it being re-run
/// synchronously on invalidation.
#[derive(Default)]
pub struct EffectOptions {
	pub lazy: bool,
	pub scheduler: Option<SchedulerFn>,
}

impl EffectOptions {
	pub fn lazy() -> Self {
		EffectOptions {
			lazy: true,
			scheduler: None,
		}
	}

	pub fn with_scheduler(scheduler: impl Fn(Effect) + 'static) -> Self {
		EffectOptions {
			lazy: false,
			scheduler: Some(Rc::new(scheduler)),
		}
	}

	/// Routes re-runs through the runtime's de-duplicating job queue, so
	/// several invalidations in one batch collapse into a single re-run.
	pub fn queued(rt: &Runtime) -> Self {
		let rt = rt.clone();
		EffectOptions {
			lazy: false,
			scheduler: Some(Rc::new(move |effect: Effect| rt.queue_job(&effect))),
		}
	}

	pub fn scheduled_lazy(scheduler: impl Fn(Effect) + 'static) -> Self {
		EffectOptions {
			lazy: true,
			scheduler: Some(Rc::new(scheduler)),
		}
	}
}

/// A registered reactive computation. Cheap to clone; the underlying
/// body is shared.
#[derive(Clone)]
pub struct Effect {
	pub(crate) body: Rc<EffectBody>,
}

pub struct EffectBody {
	pub(crate) rt: Runtime,
	pub(crate) running: Cell<bool>,
	active: Cell<bool>,
	pub(crate) scheduler: Option<SchedulerFn>,
	inner: RefCell<EffectInner>,
}

struct EffectInner {
	func: EffectFn,
	deps: SmallVec<[Dep; 8]>,
	this: Weak<EffectBody>,
}

impl Effect {
	pub(crate) fn new(rt: Runtime, func: EffectFn, options: EffectOptions) -> Effect {
		let body = Rc::new_cyclic(|this: &Weak<EffectBody>| EffectBody {
			rt,
			running: Cell::new(false),
			active: Cell::new(true),
			scheduler: options.scheduler,
			inner: RefCell::new(EffectInner {
				func,
				deps: SmallVec::new(),
				this: this.clone(),
			}),
		});
		let effect = Effect { body };
		if !options.lazy {
			effect.run();
		}
		effect
	}

	/// Forces a synchronous re-run, returning the computation's result.
	pub fn run(&self) -> Value {
		self.body.clone().run()
	}

	/// Unsubscribes from every dependency set and deactivates the
	/// computation. A stopped computation still runs when forced, but
	/// without tracking.
	pub fn stop(&self) {
		self.body.stop();
	}

	pub fn is_active(&self) -> bool {
		self.body.active.get()
	}

	pub fn ptr_eq(&self, other: &Effect) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}
}

impl EffectBody {
	pub(crate) fn run(self: Rc<Self>) -> Value {
		if self.running.get() {
			tracing::warn!("ignored re-entrant run of an active computation");
			return Value::Null;
		}
		if !self.active.get() {
			let rt = self.rt.clone();
			return rt.untracked(|| (self.inner.borrow_mut().func)());
		}

		// Stale subscriptions go first, then the computation goes onto
		// the tracking stack; conditional reads that disappear this run
		// genuinely unsubscribe.
		self.cleanup();
		let this = self.inner.borrow().this.clone();
		self.rt.push_frame(this);
		self.running.set(true);
		let scope = RunScope {
			body: self.clone(),
			completed: Cell::new(false),
		};

		let result = (self.inner.borrow_mut().func)();

		let deps = scope.complete();
		self.inner.borrow_mut().deps = deps;
		result
	}

	pub(crate) fn cleanup(&self) {
		let deps = std::mem::take(&mut self.inner.borrow_mut().deps);
		if deps.is_empty() {
			return;
		}
		let this = WeakAddr::new(self.inner.borrow().this.clone());
		for dep in deps {
			dep.set.borrow_mut().shift_remove(&this);
			self.rt.prune_dep(&dep);
		}
	}

	fn stop(&self) {
		if self.active.get() {
			self.active.set(false);
			self.cleanup();
		}
	}
}

impl Drop for EffectBody {
	fn drop(&mut self) {
		self.cleanup();
	}
}

/// Restores the tracking stack when a run unwinds, detaching whatever
/// subscriptions were collected up to the panic.
struct RunScope {
	body: Rc<EffectBody>,
	completed: Cell<bool>,
}

impl RunScope {
	fn complete(self) -> SmallVec<[Dep; 8]> {
		self.completed.set(true);
		self.body.running.set(false);
		self.body.rt.pop_frame()
	}
}

impl Drop for RunScope {
	fn drop(&mut self) {
		if self.completed.get() {
			return;
		}
		self.body.running.set(false);
		let deps = self.body.rt.pop_frame();
		let this = WeakAddr::new(self.body.inner.borrow().this.clone());
		for dep in deps {
			dep.set.borrow_mut().shift_remove(&this);
			self.body.rt.prune_dep(&dep);
		}
	}
}
