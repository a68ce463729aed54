use crate::reactive::Reactive;
use crate::store::DepKey;
use crate::value::{Target, Value};
use crate::TriggerOp;

/// Instrumented operations for keyed and set collections. Everything
/// goes through the raw backing store: keys and stored values are
/// unwrapped first, so a wrapper never ends up inside a collection.
impl Reactive {
	/// Tracked lookup in a keyed collection.
	pub fn map_get(&self, key: impl Into<Value>) -> Value {
		let key = key.into().to_raw();
		match &self.body.target {
			Target::Map(map) => {
				self.track(DepKey::Entry(key.clone()));
				let value = map
					.cell
					.data
					.borrow()
					.get(&key)
					.cloned()
					.unwrap_or(Value::Null);
				self.wrap_child(value)
			}
			Target::WeakMap(weak_map) => {
				let Some(id) = key.raw_cell_id() else {
					tracing::warn!("weak collections take structured keys only");
					return Value::Null;
				};
				self.track(DepKey::Entry(key));
				let mut data = weak_map.cell.data.borrow_mut();
				data.retain(|_, (weak, _)| weak.is_alive());
				data.get(&id)
					.map(|(_, value)| self.wrap_child(value.clone()))
					.unwrap_or(Value::Null)
			}
			_ => {
				tracing::warn!("map_get applies to keyed collections only");
				Value::Null
			}
		}
	}

	/// Keyed insertion; add-new notifies enumeration subscribers,
	/// set-existing only the entry (and iteration, which observes values).
	pub fn map_set(&self, key: impl Into<Value>, value: impl Into<Value>) {
		if self.deny_write(None) {
			return;
		}
		let key = key.into().to_raw();
		let stored = value.into().to_raw();
		match &self.body.target {
			Target::Map(map) => {
				let op = {
					let mut data = map.cell.data.borrow_mut();
					let old = data.get(&key).cloned();
					match old {
						Some(old) if old == stored => None,
						Some(_) => {
							data.insert(key.clone(), stored);
							Some(TriggerOp::Set)
						}
						None => {
							data.insert(key.clone(), stored);
							Some(TriggerOp::Add)
						}
					}
				};
				if let Some(op) = op {
					self.trigger(DepKey::Entry(key), op, None);
				}
			}
			Target::WeakMap(weak_map) => {
				let Some(target) = crate::value::Target::from_value(&key) else {
					tracing::warn!("weak collections take structured keys only");
					return;
				};
				let op = {
					let mut data = weak_map.cell.data.borrow_mut();
					data.retain(|_, (weak, _)| weak.is_alive());
					let old = data.get(&target.id()).map(|(_, old)| old.clone());
					match old {
						Some(old) if old == stored => None,
						Some(_) => {
							data.insert(target.id(), (target.downgrade(), stored));
							Some(TriggerOp::Set)
						}
						None => {
							data.insert(target.id(), (target.downgrade(), stored));
							Some(TriggerOp::Add)
						}
					}
				};
				if let Some(op) = op {
					self.trigger(DepKey::Entry(key), op, None);
				}
			}
			_ => {
				tracing::warn!("map_set applies to keyed collections only");
			}
		}
	}

	/// Adds to a set collection; returns whether the value was new.
	pub fn add(&self, value: impl Into<Value>) -> bool {
		if self.deny_write(None) {
			return false;
		}
		let stored = value.into().to_raw();
		match &self.body.target {
			Target::Set(set) => {
				let added = set.cell.data.borrow_mut().insert(stored.clone());
				if added {
					self.trigger(DepKey::Entry(stored), TriggerOp::Add, None);
				}
				added
			}
			Target::WeakSet(weak_set) => {
				let Some(target) = crate::value::Target::from_value(&stored) else {
					tracing::warn!("weak collections take structured values only");
					return false;
				};
				let added = {
					let mut data = weak_set.cell.data.borrow_mut();
					data.retain(|_, weak| weak.is_alive());
					data.insert(target.id(), target.downgrade()).is_none()
				};
				if added {
					self.trigger(DepKey::Entry(stored), TriggerOp::Add, None);
				}
				added
			}
			_ => {
				tracing::warn!("add applies to set collections only");
				false
			}
		}
	}

	/// Tracked membership check for keyed and set collections.
	pub fn contains(&self, value: impl Into<Value>) -> bool {
		let probe = value.into().to_raw();
		match &self.body.target {
			Target::Map(map) => {
				self.track(DepKey::Entry(probe.clone()));
				map.cell.data.borrow().contains_key(&probe)
			}
			Target::Set(set) => {
				self.track(DepKey::Entry(probe.clone()));
				set.cell.data.borrow().contains(&probe)
			}
			Target::WeakMap(weak_map) => {
				let Some(id) = probe.raw_cell_id() else {
					return false;
				};
				self.track(DepKey::Entry(probe));
				let mut data = weak_map.cell.data.borrow_mut();
				data.retain(|_, (weak, _)| weak.is_alive());
				data.contains_key(&id)
			}
			Target::WeakSet(weak_set) => {
				let Some(id) = probe.raw_cell_id() else {
					return false;
				};
				self.track(DepKey::Entry(probe));
				let mut data = weak_set.cell.data.borrow_mut();
				data.retain(|_, weak| weak.is_alive());
				data.contains_key(&id)
			}
			_ => {
				tracing::warn!("contains applies to collections only");
				false
			}
		}
	}

	/// Removes an entry (by key) or element (by value). Returns whether
	/// anything was removed.
	pub fn remove(&self, value: impl Into<Value>) -> bool {
		if self.deny_write(None) {
			return false;
		}
		let probe = value.into().to_raw();
		let existed = match &self.body.target {
			Target::Map(map) => map.cell.data.borrow_mut().shift_remove(&probe).is_some(),
			Target::Set(set) => set.cell.data.borrow_mut().shift_remove(&probe),
			Target::WeakMap(weak_map) => match probe.raw_cell_id() {
				Some(id) => weak_map.cell.data.borrow_mut().remove(&id).is_some(),
				None => false,
			},
			Target::WeakSet(weak_set) => match probe.raw_cell_id() {
				Some(id) => weak_set.cell.data.borrow_mut().remove(&id).is_some(),
				None => false,
			},
			_ => {
				tracing::warn!("remove applies to collections only");
				false
			}
		};
		if existed {
			self.trigger(DepKey::Entry(probe), TriggerOp::Delete, None);
		}
		existed
	}

	/// Iteration snapshot of a keyed collection as (key, value) pairs, or
	/// of a set collection as (value, value) pairs.
	pub fn entries(&self) -> Vec<(Value, Value)> {
		match &self.body.target {
			Target::Map(map) => {
				self.track(DepKey::Iterate);
				map.cell
					.data
					.borrow()
					.iter()
					.map(|(key, value)| {
						(self.wrap_child(key.clone()), self.wrap_child(value.clone()))
					})
					.collect()
			}
			Target::Set(set) => {
				self.track(DepKey::Iterate);
				set.cell
					.data
					.borrow()
					.iter()
					.map(|value| {
						(
							self.wrap_child(value.clone()),
							self.wrap_child(value.clone()),
						)
					})
					.collect()
			}
			_ => {
				tracing::warn!("entries applies to keyed and set collections only");
				Vec::new()
			}
		}
	}

	/// Iteration snapshot of the stored values.
	pub fn values(&self) -> Vec<Value> {
		match &self.body.target {
			Target::Map(map) => {
				self.track(DepKey::Iterate);
				map.cell
					.data
					.borrow()
					.values()
					.map(|value| self.wrap_child(value.clone()))
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
				tracing::warn!("values applies to keyed and set collections only");
				Vec::new()
			}
		}
	}

	/// Tracked iteration; the callback receives (value, key), both lazily
	/// wrapped.
	pub fn for_each(&self, mut func: impl FnMut(Value, Value)) {
		for (key, value) in self.entries() {
			func(value, key);
		}
	}
}
