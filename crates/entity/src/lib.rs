//! Densely numbered entity references used as arena keys.
//!
//! Every referenceable thing in an `lnc` function — a variable, a label, a
//! basic block — is represented by a small `Copy` index type implementing
//! [`EntityRef`] rather than by name. Names live in side tables for
//! diagnostics and printing; the hot data structures (instructions,
//! liveness sets, interference graphs) only ever carry indices, so mutating
//! block order or renaming a variable never requires chasing pointers.

mod keys;
mod map;
mod primary;

pub use keys::Keys;
pub use map::SecondaryMap;
pub use primary::PrimaryMap;

/// A type that can be used as a key in a [`PrimaryMap`] or [`SecondaryMap`].
///
/// An `EntityRef` is a thin wrapper around a `u32` index. Implementors are
/// expected to be `Copy`, cheap to compare, and dense starting at zero
/// within a single arena.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a small index.
    fn new(index: usize) -> Self;

    /// Get the index of this reference.
    fn index(self) -> usize;
}

/// Declare a new entity reference type wrapping a `u32`.
///
/// ```
/// lnc_entity::entity_impl!(Variable);
/// ```
#[macro_export]
macro_rules! entity_impl {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            /// The index of this entity within its owning arena.
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}{}", stringify!($name), self.0)
            }
        }
    };
}
