use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::effect::Effect;
use crate::runtime::Runtime;

impl Runtime {
	/// Enqueues a computation for the next flush. Idempotent within one
	/// flush cycle: a computation queued twice in one burst runs once.
	/// Outside a batch the queue is drained at the end of the current
	/// mutation turn.
	pub fn queue_job(&self, effect: &Effect) {
		let addr = Rc::as_ptr(&effect.body) as usize;
		let first = {
			let mut queue = self.body.queue.borrow_mut();
			let was_empty = queue.is_empty();
			queue.insert(addr, Rc::downgrade(&effect.body));
			was_empty
		};
		if self.body.batch_depth.get() > 0 || self.body.flushing.get() {
			return;
		}

		#[cfg(target_arch = "wasm32")]
		{
			if first {
				let rt = self.clone();
				microtask::queue(move || rt.flush_jobs());
			}
		}
		#[cfg(not(target_arch = "wasm32"))]
		{
			let _ = first;
			self.flush_jobs();
		}
	}

	/// Drains the job queue until empty. Every queued computation is
	/// attempted independently; the first panic, if any, resumes once
	/// the drain completes.
	pub fn flush_jobs(&self) {
		if self.body.flushing.get() {
			return;
		}
		self.body.flushing.set(true);
		let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
		loop {
			let jobs: Vec<_> = {
				let mut queue = self.body.queue.borrow_mut();
				if queue.is_empty() {
					break;
				}
				queue.drain(..).map(|(_, weak)| weak).collect()
			};
			tracing::trace!(jobs = jobs.len(), "flush");
			for weak in jobs {
				let Some(body) = weak.upgrade() else {
					continue;
				};
				let effect = Effect { body };
				if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
					effect.run();
				})) {
					tracing::error!("queued computation panicked during flush");
					if first_panic.is_none() {
						first_panic = Some(payload);
					}
				}
			}
		}
		self.body.flushing.set(false);
		if let Some(payload) = first_panic {
			resume_unwind(payload);
		}
	}

	/// Coalesces the mutations made inside `func`: queued computations
	/// flush once, when the outermost batch exits.
	pub fn batch<R>(&self, func: impl FnOnce() -> R) -> R {
		struct BatchGuard<'a>(&'a Runtime);
		impl Drop for BatchGuard<'_> {
			fn drop(&mut self) {
				let depth = self.0.body.batch_depth.get() - 1;
				self.0.body.batch_depth.set(depth);
				if depth == 0 && !std::thread::panicking() {
					self.0.flush_jobs();
				}
			}
		}
		self.body.batch_depth.set(self.body.batch_depth.get() + 1);
		let _guard = BatchGuard(self);
		func()
	}

	pub fn in_batch(&self) -> bool {
		self.body.batch_depth.get() > 0
	}
}

#[cfg(target_arch = "wasm32")]
mod microtask {
	use wasm_bindgen::prelude::*;

	#[wasm_bindgen]
	extern "C" {
		#[wasm_bindgen(js_name = queueMicrotask)]
		fn queue_microtask(closure: &JsValue);
	}

	pub fn queue<F: FnOnce() + 'static>(func: F) {
		queue_microtask(&Closure::once_into_js(func));
	}
}
