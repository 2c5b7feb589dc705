//! Cheaply clonable, immutable strings. Every name, kind and locator in the
//! engine is a `Strng`, so stores can key by them without copying.

pub use arcstr::ArcStr as Strng;
pub use arcstr::{format, literal};

pub const EMPTY: Strng = literal!("");

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	Strng::from(s.as_ref())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clones_share_storage() {
		let a = new("gateway:default/mine");
		let b = a.clone();
		assert_eq!(a, b);
		assert_eq!(a.as_ptr(), b.as_ptr());
	}

	#[test]
	fn empty_is_default() {
		assert_eq!(EMPTY, Strng::default());
	}
}
