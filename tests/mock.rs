use std::sync::{Arc, Mutex, MutexGuard};

use mockall::*;

#[automock]
pub trait Spy {
	fn hit(&self, value: i64);
}

#[derive(Clone)]
pub struct SharedSpy(Arc<Mutex<MockSpy>>);

impl SharedSpy {
	pub fn new() -> SharedSpy {
		SharedSpy(Arc::new(Mutex::new(MockSpy::new())))
	}

	pub fn get<'a>(&'a self) -> MutexGuard<'a, MockSpy> {
		return self.0.lock().unwrap();
	}
}
