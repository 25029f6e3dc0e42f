//! Typed dense indices and the vectors keyed by them.
use std::{marker::PhantomData, ops};

/// Position in an [IndexedMap].
pub trait IndexRef: Copy + Eq {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}

/// Implement [IndexRef] for a tuple struct wrapping an unsigned integer,
/// `u32` unless another type is given.
#[macro_export]
macro_rules! impl_index {
    ($name:ident) => {
        $crate::impl_index!($name, u32);
    };

    ($name:ident, $repr:ty) => {
        impl $crate::IndexRef for $name {
            #[inline]
            fn index(&self) -> usize {
                self.0 as usize
            }

            #[inline]
            fn new(input: usize) -> Self {
                Self(input as $repr)
            }
        }

        impl From<$repr> for $name {
            fn from(input: $repr) -> Self {
                Self(input)
            }
        }

        impl From<usize> for $name {
            fn from(input: usize) -> Self {
                <Self as $crate::IndexRef>::new(input)
            }
        }
    };
}

/// A `Vec<D>` that can only be indexed by `K`. Keys are handed out by
/// [IndexedMap::push] and stay valid because nothing is ever removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexedMap<K: IndexRef, D> {
    data: Vec<D>,
    key: PhantomData<K>,
}

impl<K: IndexRef, D> IndexedMap<K, D> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            key: PhantomData,
        }
    }

    pub fn get(&self, key: K) -> Option<&D> {
        self.data.get(key.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append `item` and return its key.
    pub fn push(&mut self, item: D) -> K {
        let key = K::new(self.data.len());
        self.data.push(item);
        key
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, d)| (K::new(i), d))
    }

    /// Every key in order. Does not borrow the map.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = K> + use<K, D> {
        (0..self.data.len()).map(K::new)
    }

    pub fn values(&self) -> std::slice::Iter<'_, D> {
        self.data.iter()
    }
}

impl<K: IndexRef, D> ops::Index<K> for IndexedMap<K, D> {
    type Output = D;

    fn index(&self, key: K) -> &D {
        &self.data[key.index()]
    }
}

impl<K: IndexRef, D> ops::IndexMut<K> for IndexedMap<K, D> {
    fn index_mut(&mut self, key: K) -> &mut D {
        &mut self.data[key.index()]
    }
}

impl<K: IndexRef, D> Default for IndexedMap<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: IndexRef, D> FromIterator<D> for IndexedMap<K, D> {
    fn from_iter<T: IntoIterator<Item = D>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().collect(),
            key: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexRef, IndexedMap};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Slot(u16);
    crate::impl_index!(Slot, u16);

    #[test]
    fn keys_follow_pushes() {
        let mut map: IndexedMap<Slot, &str> = IndexedMap::new();
        assert_eq!(map.push("a"), Slot(0));
        assert_eq!(map.push("b"), Slot(1));
        map[Slot(0)] = "c";
        assert_eq!(map.iter().collect::<Vec<_>>(), [(Slot(0), &"c"), (Slot(1), &"b")]);
        assert!(map.get(Slot(2)).is_none());
        assert_eq!(map.keys().next_back().map(|k| k.index()), Some(1));
        assert_eq!(Slot::from(7usize), Slot(7));
    }
}
