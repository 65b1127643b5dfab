/*!
 * Registry Entry
 * Immutable value/refcount pair replaced wholesale on every update
 */

use std::num::NonZeroUsize;

/// A live registry entry
///
/// Never mutated in place. Every increment or decrement builds a new entry
/// and swaps it in against the previously observed one, so a refcount of
/// zero is unrepresentable.
#[derive(Debug)]
pub(crate) struct RegistryEntry<V> {
    value: V,
    refcount: NonZeroUsize,
}

impl<V: Clone> RegistryEntry<V> {
    /// First reference to a freshly created value
    #[inline]
    pub(crate) fn first(value: V) -> Self {
        Self {
            value,
            refcount: NonZeroUsize::MIN,
        }
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn refcount(&self) -> usize {
        self.refcount.get()
    }

    /// Entry with one more reference
    #[inline]
    pub(crate) fn retained(&self) -> Self {
        Self {
            value: self.value.clone(),
            refcount: self
                .refcount
                .checked_add(1)
                .expect("registry refcount overflow"),
        }
    }

    /// Entry with one fewer reference, or `None` when this was the last one
    #[inline]
    pub(crate) fn released(&self) -> Option<Self> {
        NonZeroUsize::new(self.refcount.get() - 1).map(|refcount| Self {
            value: self.value.clone(),
            refcount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retain_release_cycle() {
        let entry = RegistryEntry::first("lock");
        assert_eq!(entry.refcount(), 1);

        let two = entry.retained();
        assert_eq!(two.refcount(), 2);
        assert_eq!(*two.value(), "lock");

        let one = two.released().unwrap();
        assert_eq!(one.refcount(), 1);
        assert!(one.released().is_none());
    }
}
