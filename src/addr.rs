use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Weak;

/// Weak reference compared and hashed by allocation address, so it can
/// live in identity sets without requiring the pointee to be comparable.
pub struct WeakAddr<T: ?Sized> {
	ptr: Weak<T>,
}

impl<T: ?Sized> WeakAddr<T> {
	pub fn new(ptr: Weak<T>) -> Self {
		WeakAddr { ptr }
	}
}

impl<T: ?Sized> Clone for WeakAddr<T> {
	fn clone(&self) -> Self {
		WeakAddr {
			ptr: self.ptr.clone(),
		}
	}
}

impl<T: ?Sized> Deref for WeakAddr<T> {
	type Target = Weak<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for WeakAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		Weak::as_ptr(&self.ptr).eq(&Weak::as_ptr(&other.ptr))
	}
}

impl<T: ?Sized> Eq for WeakAddr<T> {}

impl<T: ?Sized> Hash for WeakAddr<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		(Weak::as_ptr(&self.ptr) as *const ()).hash(state)
	}
}
