use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mockall::predicate::eq;
use weft::{record, EffectOptions, Reactive, Runtime, Value, WatchOptions};

mod mock;

use mock::{SharedSpy, Spy};

fn wrap(rt: &Runtime, value: Value) -> Reactive {
	rt.reactive(value).as_reactive().unwrap().clone()
}

#[test]
fn computed_memoizes_lazily() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "foo" => 1, "bar" => 2 });

	let runs = Rc::new(Cell::new(0));
	let sum = rt.computed({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			let foo = state.get("foo").as_int().unwrap();
			let bar = state.get("bar").as_int().unwrap();
			Value::Int(foo + bar)
		}
	});

	// Nothing runs until the first read.
	assert_eq!(runs.get(), 0);

	assert_eq!(sum.value().as_int(), Some(3));
	assert_eq!(sum.value().as_int(), Some(3));
	assert_eq!(runs.get(), 1);

	state.set("foo", 2);
	assert_eq!(runs.get(), 1);

	assert_eq!(sum.value().as_int(), Some(4));
	assert_eq!(sum.value().as_int(), Some(4));
	assert_eq!(runs.get(), 2);
}

#[test]
fn computed_invalidation_reaches_outer_computations() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "foo" => 1 });

	let double = rt.computed({
		let state = state.clone();
		move || Value::Int(state.get("foo").as_int().unwrap() * 2)
	});

	let spy = SharedSpy::new();
	spy.get().expect_hit().times(1).with(eq(2)).return_const(());

	let _fx = rt.effect({
		let double = double.clone();
		let spy = spy.clone();
		move || spy.get().hit(double.value().as_int().unwrap())
	});

	spy.get().checkpoint();
	spy.get().expect_hit().times(1).with(eq(4)).return_const(());

	state.set("foo", 2);

	spy.get().checkpoint();
}

#[test]
fn conditional_reads_retarget_dependencies() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "flag" => true, "a" => 1, "b" => 10 });

	let spy = SharedSpy::new();
	spy.get().expect_hit().times(1).with(eq(1)).return_const(());

	let _fx = rt.effect({
		let state = state.clone();
		let spy = spy.clone();
		move || {
			let value = if state.get("flag").as_bool().unwrap() {
				state.get("a")
			} else {
				state.get("b")
			};
			spy.get().hit(value.as_int().unwrap());
		}
	});

	spy.get().checkpoint();

	// The untaken branch is not a dependency.
	spy.get().expect_hit().times(0).return_const(());
	state.set("b", 20);
	spy.get().checkpoint();

	spy.get().expect_hit().times(1).with(eq(20)).return_const(());
	state.set("flag", false);
	spy.get().checkpoint();

	// After the flip, the previously read branch is dropped...
	spy.get().expect_hit().times(0).return_const(());
	state.set("a", 5);
	spy.get().checkpoint();

	// ...and the newly read one re-runs the computation.
	spy.get().expect_hit().times(1).with(eq(30)).return_const(());
	state.set("b", 30);
	spy.get().checkpoint();
}

#[test]
fn self_write_does_not_recurse() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "n" => 0 });

	let runs = Rc::new(Cell::new(0));
	let _fx = rt.effect({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			let n = state.get("n").as_int().unwrap();
			state.set("n", n + 1);
		}
	});

	assert_eq!(runs.get(), 1);
	assert_eq!(state.get("n").as_int(), Some(1));

	state.set("n", 10);
	assert_eq!(runs.get(), 2);
	assert_eq!(state.get("n").as_int(), Some(11));
}

#[test]
fn batched_mutations_flush_once() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "a" => 1, "b" => 2, "c" => 3 });

	let runs = Rc::new(Cell::new(0));
	let _fx = rt.effect_with(
		{
			let state = state.clone();
			let runs = runs.clone();
			move || {
				runs.set(runs.get() + 1);
				state.get("a");
				state.get("b");
				state.get("c");
				Value::Null
			}
		},
		EffectOptions::queued(&rt),
	);

	assert_eq!(runs.get(), 1);

	rt.batch(|| {
		state.set("a", 10);
		state.set("b", 20);
		state.set("c", 30);
	});

	assert_eq!(runs.get(), 2);
}

#[test]
fn nested_computations_do_not_leak_reads() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "outer" => 1, "inner" => 2 });

	let outer_runs = Rc::new(Cell::new(0));
	let inner_runs = Rc::new(Cell::new(0));
	let inner_slot: Rc<RefCell<Vec<weft::Effect>>> = Rc::new(RefCell::new(Vec::new()));

	let _outer = rt.effect({
		let state = state.clone();
		let outer_runs = outer_runs.clone();
		let inner_runs = inner_runs.clone();
		let inner_slot = inner_slot.clone();
		let rt = rt.clone();
		move || {
			outer_runs.set(outer_runs.get() + 1);
			state.get("outer");
			let inner = rt.effect({
				let state = state.clone();
				let inner_runs = inner_runs.clone();
				move || {
					inner_runs.set(inner_runs.get() + 1);
					state.get("inner");
				}
			});
			inner_slot.borrow_mut().push(inner);
		}
	});

	assert_eq!(outer_runs.get(), 1);
	assert_eq!(inner_runs.get(), 1);

	// A field read only by the nested computation re-runs it alone.
	state.set("inner", 20);
	assert_eq!(outer_runs.get(), 1);
	assert_eq!(inner_runs.get(), 2);

	state.set("outer", 10);
	assert_eq!(outer_runs.get(), 2);
	assert_eq!(inner_runs.get(), 3);
}

#[test]
fn stopped_computations_stay_quiet() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "x" => 1 });

	let runs = Rc::new(Cell::new(0));
	let fx = rt.effect({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			state.get("x");
		}
	});

	assert_eq!(runs.get(), 1);
	state.set("x", 2);
	assert_eq!(runs.get(), 2);

	fx.stop();
	state.set("x", 3);
	assert_eq!(runs.get(), 2);
}

#[test]
fn watch_accessor_fires_with_new_and_old() {
	let rt = Runtime::new();
	let obj = wrap(&rt, record! { "a" => record! { "b" => 1 } });

	let seen: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
	let _watcher = rt.watch(
		{
			let obj = obj.clone();
			move || obj.get("a").get("b")
		},
		{
			let seen = seen.clone();
			move |new_value, old_value, _on_cancel| {
				seen.borrow_mut().push((new_value, old_value));
			}
		},
		WatchOptions::default(),
	);

	assert!(seen.borrow().is_empty());

	obj.get("a").set("b", 5);

	let seen = seen.borrow();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].0, Value::Int(5));
	assert_eq!(seen[0].1, Value::Int(1));
}

#[test]
fn watch_immediate_fires_with_null_old_value() {
	let rt = Runtime::new();
	let obj = wrap(&rt, record! { "n" => 7 });

	let seen: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
	let _watcher = rt.watch(
		{
			let obj = obj.clone();
			move || obj.get("n")
		},
		{
			let seen = seen.clone();
			move |new_value, old_value, _on_cancel| {
				seen.borrow_mut().push((new_value, old_value));
			}
		},
		WatchOptions::immediate(),
	);

	let seen = seen.borrow();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].0, Value::Int(7));
	assert_eq!(seen[0].1, Value::Null);
}

#[test]
fn watch_deep_value_sees_nested_mutations() {
	let rt = Runtime::new();
	let source = rt.reactive(record! { "a" => record! { "b" => 1 } });
	let obj = source.as_reactive().unwrap().clone();

	let runs = Rc::new(Cell::new(0));
	let _watcher = rt.watch_value(
		source.clone(),
		{
			let runs = runs.clone();
			move |_new, _old, _on_cancel| runs.set(runs.get() + 1)
		},
		WatchOptions::default(),
	);

	assert_eq!(runs.get(), 0);
	obj.get("a").set("b", 2);
	assert_eq!(runs.get(), 1);
}

#[test]
fn stale_watch_callbacks_are_cancelled() {
	let rt = Runtime::new();
	let obj = wrap(&rt, record! { "n" => 0 });

	let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
	let _watcher = rt.watch(
		{
			let obj = obj.clone();
			move || obj.get("n")
		},
		{
			let order = order.clone();
			move |new_value, _old, on_cancel| {
				order
					.borrow_mut()
					.push(format!("cb:{}", new_value.as_int().unwrap()));
				let order = order.clone();
				let stamp = new_value.as_int().unwrap();
				on_cancel.register(move || order.borrow_mut().push(format!("cancel:{stamp}")));
			}
		},
		WatchOptions::default(),
	);

	obj.set("n", 1);
	obj.set("n", 2);

	// The second change cancels the first callback's pending work before
	// its own callback runs.
	assert_eq!(
		*order.borrow(),
		vec![
			"cb:1".to_string(),
			"cancel:1".to_string(),
			"cb:2".to_string()
		]
	);
}

#[test]
fn ref_cell_tracks_reads_and_skips_equal_writes() {
	let rt = Runtime::new();
	let count = rt.ref_value(0);

	let spy = SharedSpy::new();
	spy.get().expect_hit().times(1).with(eq(0)).return_const(());

	let _fx = rt.effect({
		let count = count.clone();
		let spy = spy.clone();
		move || spy.get().hit(count.value().as_int().unwrap())
	});

	spy.get().checkpoint();
	spy.get().expect_hit().times(1).with(eq(1)).return_const(());
	count.set_value(1);
	spy.get().checkpoint();

	// Same-value write: no notification.
	spy.get().expect_hit().times(0).return_const(());
	count.set_value(1);
	spy.get().checkpoint();
}

#[test]
fn ref_bag_reads_and_writes_through() {
	let rt = Runtime::new();
	let obj = wrap(&rt, record! { "foo" => 1, "bar" => 2 });

	let bag = rt.proxy_refs(rt.to_refs(&obj));
	assert_eq!(bag.get("bar").as_int(), Some(2));

	bag.set("bar", 3);
	assert_eq!(obj.get("bar").as_int(), Some(3));

	// Liveness survives the destructuring: reads through the bag still
	// subscribe to the parent object.
	let spy = SharedSpy::new();
	spy.get().expect_hit().times(1).with(eq(3)).return_const(());
	let _fx = rt.effect({
		let bag = bag.clone();
		let spy = spy.clone();
		move || spy.get().hit(bag.get("bar").as_int().unwrap())
	});

	spy.get().checkpoint();
	spy.get().expect_hit().times(1).with(eq(4)).return_const(());
	obj.set("bar", 4);
	spy.get().checkpoint();
}

#[test]
fn runtimes_are_isolated() {
	let rt1 = Runtime::new();
	let rt2 = Runtime::new();
	let state = wrap(&rt1, record! { "x" => 1 });

	let runs = Rc::new(Cell::new(0));
	let _fx = rt2.effect({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			state.get("x");
		}
	});

	assert_eq!(runs.get(), 1);

	// The wrapper records into rt1; a computation registered with rt2
	// was never subscribed there.
	state.set("x", 2);
	assert_eq!(runs.get(), 1);
}

#[test]
fn effect_macro_clones_captures() {
	let rt = Runtime::new();
	let state = wrap(&rt, record! { "x" => 1 });

	let spy = SharedSpy::new();
	spy.get().expect_hit().times(1).with(eq(1)).return_const(());

	let _fx = weft::effect!((state, spy) rt => {
		spy.get().hit(state.get("x").as_int().unwrap());
	});

	spy.get().checkpoint();
	spy.get().expect_hit().times(1).with(eq(5)).return_const(());
	state.set("x", 5);
	spy.get().checkpoint();
}
