use std::rc::Rc;

use crate::runtime::Runtime;
use crate::store::{DepKey, Key};
use crate::value::{CellId, Target, Value};
use crate::TriggerOp;

/// Instrumented facade over a structured target. Reads record
/// dependencies for the innermost active computation, writes classify
/// the mutation and notify subscribers. One wrapper exists per (target,
/// flavor): wrapping the same target twice yields the identical wrapper.
#[derive(Clone)]
pub struct Reactive {
	pub(crate) body: Rc<ReactiveBody>,
}

pub(crate) struct ReactiveBody {
	pub(crate) rt: Runtime,
	pub(crate) target: Target,
	pub(crate) shallow: bool,
	pub(crate) readonly: bool,
}

impl Runtime {
	/// Deep mutable wrapper. Non-structured values pass through unwrapped.
	pub fn reactive(&self, value: impl Into<Value>) -> Value {
		wrap(self, value.into(), false, false)
	}

	/// Root-level-only mutable wrapper: nested structured reads come back raw.
	pub fn shallow_reactive(&self, value: impl Into<Value>) -> Value {
		wrap(self, value.into(), true, false)
	}

	/// Deep read-only wrapper: writes warn and are ignored, nested reads
	/// are read-only too.
	pub fn readonly(&self, value: impl Into<Value>) -> Value {
		wrap(self, value.into(), false, true)
	}

	/// Root-level-only read-only wrapper.
	pub fn shallow_readonly(&self, value: impl Into<Value>) -> Value {
		wrap(self, value.into(), true, true)
	}
}

pub(crate) fn wrap(rt: &Runtime, value: Value, shallow: bool, readonly: bool) -> Value {
	let target = match &value {
		Value::Reactive(wrapper) => {
			if readonly && !wrapper.body.readonly {
				// A read-only view over an already-reactive target wraps
				// the same raw cell; every other re-wrap is a no-op.
				wrapper.body.target.clone()
			} else {
				return value;
			}
		}
		other => match Target::from_value(other) {
			Some(target) => target,
			None => return value,
		},
	};

	let cache = rt.wrapper_cache(shallow, readonly);
	let cached = cache
		.borrow()
		.get(&target.id())
		.and_then(|weak| weak.upgrade());
	if let Some(body) = cached {
		return Value::Reactive(Reactive { body });
	}

	let body = Rc::new(ReactiveBody {
		rt: rt.clone(),
		target,
		shallow,
		readonly,
	});
	cache
		.borrow_mut()
		.insert(body.target.id(), Rc::downgrade(&body));
	Value::Reactive(Reactive { body })
}

impl Reactive {
	/// The raw, uninstrumented target. Reads and writes through it are
	/// invisible to dependency tracking.
	pub fn raw(&self) -> Value {
		self.body.target.to_value()
	}

	pub fn is_readonly(&self) -> bool {
		self.body.readonly
	}

	pub fn is_shallow(&self) -> bool {
		self.body.shallow
	}

	pub fn ptr_eq(&self, other: &Reactive) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as usize
	}

	pub(crate) fn target_id(&self) -> CellId {
		self.body.target.id()
	}

	pub(crate) fn track(&self, key: DepKey) {
		self.body.rt.track(self.body.target.id(), key);
	}

	pub(crate) fn trigger(&self, key: DepKey, op: TriggerOp, new_value: Option<Value>) {
		self.body.rt.trigger(
			self.body.target.id(),
			self.body.target.kind(),
			key,
			op,
			new_value,
		);
	}

	pub(crate) fn wrap_child(&self, value: Value) -> Value {
		if self.body.shallow || !value.is_structured() {
			value
		} else {
			wrap(&self.body.rt, value, false, self.body.readonly)
		}
	}

	pub(crate) fn store_form(&self, value: Value) -> Value {
		if self.body.shallow {
			value
		} else {
			value.to_raw()
		}
	}

	pub(crate) fn deny_write(&self, key: Option<&Key>) -> bool {
		if self.body.readonly {
			tracing::warn!(?key, "write through a read-only wrapper ignored");
		}
		self.body.readonly
	}

	/// Tracked field read. Missing fields read as `Null` and are still
	/// tracked, so a later addition notifies the reader.
	pub fn get(&self, key: impl Into<Key>) -> Value {
		let key = key.into();
		match (&self.body.target, &key) {
			(Target::Record(record), Key::Name(name)) => {
				self.track(DepKey::Name(name.clone()));
				let value = record
					.cell
					.data
					.borrow()
					.get(name.as_ref())
					.cloned()
					.unwrap_or(Value::Null);
				self.wrap_child(value)
			}
			(Target::List(list), Key::Index(index)) => {
				self.track(DepKey::Index(*index));
				let value = list
					.cell
					.data
					.borrow()
					.get(*index)
					.cloned()
					.unwrap_or(Value::Null);
				self.wrap_child(value)
			}
			(Target::List(list), Key::Length) => {
				self.track(DepKey::Length);
				Value::Int(list.cell.data.borrow().len() as i64)
			}
			_ => {
				tracing::warn!(?key, "unsupported field read for this target kind");
				Value::Null
			}
		}
	}

	/// Tracked field write: classifies the mutation as set-existing or
	/// add-new, skips notification when old and new are same-value equal.
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
		let key = key.into();
		if self.deny_write(Some(&key)) {
			return;
		}
		let value = value.into();
		match (&self.body.target, &key) {
			(Target::Record(record), Key::Name(name)) => {
				let stored = self.store_form(value);
				let op = {
					let mut data = record.cell.data.borrow_mut();
					let old = data.get(name.as_ref()).cloned();
					match old {
						Some(old) if old == stored => None,
						Some(_) => {
							data.insert(name.clone(), stored);
							Some(TriggerOp::Set)
						}
						None => {
							data.insert(name.clone(), stored);
							Some(TriggerOp::Add)
						}
					}
				};
				if let Some(op) = op {
					self.trigger(DepKey::Name(name.clone()), op, None);
				}
			}
			(Target::List(list), Key::Index(index)) => {
				let stored = self.store_form(value);
				let index = *index;
				let op = {
					let mut data = list.cell.data.borrow_mut();
					if index < data.len() {
						if data[index] == stored {
							None
						} else {
							data[index] = stored;
							Some(TriggerOp::Set)
						}
					} else {
						data.resize(index, Value::Null);
						data.push(stored);
						Some(TriggerOp::Add)
					}
				};
				if let Some(op) = op {
					self.trigger(DepKey::Index(index), op, None);
				}
			}
			(Target::List(list), Key::Length) => {
				let Some(requested) = value.as_int() else {
					tracing::warn!("length accepts only integer values");
					return;
				};
				let new_len = requested.max(0) as usize;
				let changed = {
					let mut data = list.cell.data.borrow_mut();
					if new_len == data.len() {
						false
					} else {
						data.resize(new_len, Value::Null);
						true
					}
				};
				if changed {
					self.trigger(
						DepKey::Length,
						TriggerOp::Set,
						Some(Value::Int(new_len as i64)),
					);
				}
			}
			_ => {
				tracing::warn!(?key, "unsupported field write for this target kind");
			}
		}
	}

	pub fn set_len(&self, new_len: usize) {
		self.set(Key::Length, Value::Int(new_len as i64));
	}

	/// Tracked presence check on the literal key.
	pub fn has(&self, key: impl Into<Key>) -> bool {
		let key = key.into();
		match (&self.body.target, &key) {
			(Target::Record(record), Key::Name(name)) => {
				self.track(DepKey::Name(name.clone()));
				record.cell.data.borrow().contains_key(name.as_ref())
			}
			(Target::List(list), Key::Index(index)) => {
				self.track(DepKey::Index(*index));
				*index < list.cell.data.borrow().len()
			}
			(Target::List(_), Key::Length) => {
				self.track(DepKey::Length);
				true
			}
			_ => false,
		}
	}

	/// Removes an existing record field, notifying the literal key and
	/// the enumeration subscribers. Returns whether the key existed.
	pub fn delete(&self, key: impl Into<Key>) -> bool {
		let key = key.into();
		if self.deny_write(Some(&key)) {
			return false;
		}
		match (&self.body.target, &key) {
			(Target::Record(record), Key::Name(name)) => {
				let existed = record
					.cell
					.data
					.borrow_mut()
					.shift_remove(name.as_ref())
					.is_some();
				if existed {
					self.trigger(DepKey::Name(name.clone()), TriggerOp::Delete, None);
				}
				existed
			}
			_ => {
				tracing::warn!(?key, "unsupported delete for this target kind");
				false
			}
		}
	}

	/// Enumeration read. Tracks the structural sentinel (`Length` for
	/// lists, key enumeration for keyed collections).
	pub fn keys(&self) -> Vec<Value> {
		match &self.body.target {
			Target::Record(record) => {
				self.track(DepKey::Iterate);
				record
					.cell
					.data
					.borrow()
					.keys()
					.map(|name| Value::Str(name.clone()))
					.collect()
			}
			Target::List(list) => {
				self.track(DepKey::Length);
				(0..list.cell.data.borrow().len())
					.map(|index| Value::Int(index as i64))
					.collect()
			}
			Target::Map(map) => {
				self.track(DepKey::MapKeyIterate);
				map.cell
					.data
					.borrow()
					.keys()
					.map(|key| self.wrap_child(key.clone()))
					.collect()
			}
			Target::Set(set) => {
				self.track(DepKey::Iterate);
				set.cell
					.data
					.borrow()
					.iter()
					.map(|value| self.wrap_child(value.clone()))
					.collect()
			}
			_ => {
				tracing::warn!("weak collections are not enumerable");
				Vec::new()
			}
		}
	}

	/// Tracked element/entry count.
	pub fn len(&self) -> usize {
		match &self.body.target {
			Target::Record(record) => {
				self.track(DepKey::Iterate);
				record.cell.data.borrow().len()
			}
			Target::List(list) => {
				self.track(DepKey::Length);
				list.cell.data.borrow().len()
			}
			Target::Map(map) => {
				self.track(DepKey::Iterate);
				map.cell.data.borrow().len()
			}
			Target::Set(set) => {
				self.track(DepKey::Iterate);
				set.cell.data.borrow().len()
			}
			_ => {
				tracing::warn!("weak collections expose no size");
				0
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Iteration snapshot of a list: tracks the length and every index,
	/// like an element-by-element traversal would.
	pub fn to_vec(&self) -> Vec<Value> {
		let Target::List(list) = &self.body.target else {
			tracing::warn!("to_vec applies to lists only");
			return Vec::new();
		};
		self.track(DepKey::Length);
		let data = list.cell.data.borrow();
		(0..data.len())
			.map(|index| {
				self.track(DepKey::Index(index));
				self.wrap_child(data[index].clone())
			})
			.collect()
	}

	/// Appends to a list; returns the new length.
	pub fn push(&self, value: impl Into<Value>) -> usize {
		if self.deny_write(None) {
			return self.raw_list_len();
		}
		let Target::List(list) = &self.body.target else {
			tracing::warn!("push applies to lists only");
			return 0;
		};
		let stored = self.store_form(value.into());
		let index = {
			let mut data = list.cell.data.borrow_mut();
			data.push(stored);
			data.len() - 1
		};
		self.trigger(DepKey::Index(index), TriggerOp::Add, None);
		index + 1
	}

	/// Removes and returns the last element, `Null` when empty.
	pub fn pop(&self) -> Value {
		if self.deny_write(None) {
			return Value::Null;
		}
		self.mutate_list(|data| data.pop().unwrap_or(Value::Null))
			.map(|value| self.wrap_child(value))
			.unwrap_or(Value::Null)
	}

	/// Removes and returns the first element, `Null` when empty.
	pub fn shift(&self) -> Value {
		if self.deny_write(None) {
			return Value::Null;
		}
		self.mutate_list(|data| {
			if data.is_empty() {
				Value::Null
			} else {
				data.remove(0)
			}
		})
		.map(|value| self.wrap_child(value))
		.unwrap_or(Value::Null)
	}

	/// Prepends an element; returns the new length.
	pub fn unshift(&self, value: impl Into<Value>) -> usize {
		if self.deny_write(None) {
			return self.raw_list_len();
		}
		let stored = self.store_form(value.into());
		self.mutate_list(move |data| {
			data.insert(0, stored);
			data.len()
		})
		.unwrap_or(0)
	}

	/// Replaces `delete_count` elements starting at `start` with `items`;
	/// returns the removed elements.
	pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
		if self.deny_write(None) {
			return Vec::new();
		}
		let stored: Vec<Value> = items
			.into_iter()
			.map(|item| self.store_form(item))
			.collect();
		self.mutate_list(move |data| {
			let start = start.min(data.len());
			let end = (start + delete_count).min(data.len());
			data.splice(start..end, stored).collect::<Vec<Value>>()
		})
		.map(|removed| {
			removed
				.into_iter()
				.map(|value| self.wrap_child(value))
				.collect()
		})
		.unwrap_or_default()
	}

	/// Tracked identity search. Falls back to comparing raw forms, since
	/// stored elements and the probe may differ only in wrapping.
	pub fn index_of(&self, value: &Value) -> Option<usize> {
		let Target::List(list) = &self.body.target else {
			return None;
		};
		self.track(DepKey::Length);
		let data = list.cell.data.borrow();
		for index in 0..data.len() {
			self.track(DepKey::Index(index));
		}
		data.iter().position(|item| item == value).or_else(|| {
			let raw = value.to_raw();
			data.iter().position(|item| item.to_raw() == raw)
		})
	}

	pub fn last_index_of(&self, value: &Value) -> Option<usize> {
		let Target::List(list) = &self.body.target else {
			return None;
		};
		self.track(DepKey::Length);
		let data = list.cell.data.borrow();
		for index in 0..data.len() {
			self.track(DepKey::Index(index));
		}
		data.iter().rposition(|item| item == value).or_else(|| {
			let raw = value.to_raw();
			data.iter().rposition(|item| item.to_raw() == raw)
		})
	}

	pub fn includes(&self, value: &Value) -> bool {
		self.index_of(value).is_some()
	}

	fn raw_list_len(&self) -> usize {
		match &self.body.target {
			Target::List(list) => list.cell.data.borrow().len(),
			_ => 0,
		}
	}

	/// Applies a structural list mutation, then notifies from an
	/// index-by-index diff: changed prefixes as sets, grown tail as
	/// adds, shrunk tail as deletes, plus the length itself when no add
	/// already implies it. Returns `None` for non-lists.
	fn mutate_list<R>(&self, func: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
		let Target::List(list) = &self.body.target else {
			tracing::warn!("list operation on a non-list target");
			return None;
		};
		let before: Vec<Value> = list.cell.data.borrow().clone();
		let result = func(&mut list.cell.data.borrow_mut());
		let after: Vec<Value> = list.cell.data.borrow().clone();

		let old_len = before.len();
		let new_len = after.len();
		// One structural operation is one mutation turn: scheduled
		// subscribers coalesce even though several keys are notified.
		self.body.rt.batch(|| {
			for index in 0..old_len.min(new_len) {
				if before[index] != after[index] {
					self.trigger(DepKey::Index(index), TriggerOp::Set, None);
				}
			}
			for index in old_len..new_len {
				self.trigger(DepKey::Index(index), TriggerOp::Add, None);
			}
			for index in new_len..old_len {
				self.trigger(DepKey::Index(index), TriggerOp::Delete, None);
			}
			if new_len < old_len {
				self.trigger(
					DepKey::Length,
					TriggerOp::Set,
					Some(Value::Int(new_len as i64)),
				);
			}
		});
		Some(result)
	}
}

impl Value {
	/// Field read that sees through instrumentation: tracked on wrappers,
	/// raw on plain structured values, `Null` otherwise.
	pub fn get(&self, key: impl Into<Key>) -> Value {
		match self {
			Value::Reactive(wrapper) => wrapper.get(key),
			Value::Record(record) => match key.into() {
				Key::Name(name) => record
					.cell
					.data
					.borrow()
					.get(name.as_ref())
					.cloned()
					.unwrap_or(Value::Null),
				_ => Value::Null,
			},
			Value::List(list) => match key.into() {
				Key::Index(index) => list
					.cell
					.data
					.borrow()
					.get(index)
					.cloned()
					.unwrap_or(Value::Null),
				Key::Length => Value::Int(list.cell.data.borrow().len() as i64),
				_ => Value::Null,
			},
			_ => Value::Null,
		}
	}

	/// Field write counterpart of [`Value::get`].
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
		match self {
			Value::Reactive(wrapper) => wrapper.set(key, value),
			Value::Record(record) => {
				if let Key::Name(name) = key.into() {
					record.cell.data.borrow_mut().insert(name, value.into());
				}
			}
			Value::List(list) => {
				if let Key::Index(index) = key.into() {
					let mut data = list.cell.data.borrow_mut();
					if index < data.len() {
						data[index] = value.into();
					} else {
						data.resize(index, Value::Null);
						data.push(value.into());
					}
				}
			}
			_ => {
				tracing::warn!("field write on a non-structured value ignored");
			}
		}
	}
}
