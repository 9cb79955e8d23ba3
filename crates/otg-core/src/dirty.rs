//! Per-record change tracking.
//!
//! A record is dirty when it changed since it was last emitted. The store
//! never sets the flag on its own: whoever mutates a record decides whether
//! the change is worth reporting and calls [`Dirtyable::mark_dirty`]. The
//! only place the flag goes back to `false` is a successful emission in
//! [`diff`](crate::diff).

/// Capability of records that take part in change-filtered emission.
pub trait Dirtyable {
    fn is_dirty(&self) -> bool;
    fn mark_dirty(&mut self);
    fn clear_dirty(&mut self);
}

/// Implement [`Dirtyable`] for records holding a private `changed: bool`.
macro_rules! impl_dirtyable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::dirty::Dirtyable for $ty {
                #[inline]
                fn is_dirty(&self) -> bool {
                    self.changed
                }
                #[inline]
                fn mark_dirty(&mut self) {
                    self.changed = true;
                }
                #[inline]
                fn clear_dirty(&mut self) {
                    self.changed = false;
                }
            }
        )*
    };
}

pub(crate) use impl_dirtyable;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Order, Position, Trade};

    fn cycle<T: Dirtyable + Default>() {
        let mut r = T::default();
        assert!(!r.is_dirty());
        r.mark_dirty();
        assert!(r.is_dirty());
        r.clear_dirty();
        assert!(!r.is_dirty());
    }

    #[test]
    fn every_keyed_record_is_dirtyable() {
        cycle::<Order>();
        cycle::<Trade>();
        cycle::<Position>();
        cycle::<Account>();
    }
}
