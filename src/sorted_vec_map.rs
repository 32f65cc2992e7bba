use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A map that maintains entries in sorted key order, optimized for small
/// collections.
///
/// The core keeps its sparse, order-sensitive maps in this structure: the
/// reconciliation baseline (symbol -> recognized ledger difference) and the
/// margin tier schedules (limit -> rate). Both are tiny, iterated far more
/// often than they are mutated, and require deterministic iteration order so
/// that bracket arithmetic, persistence and log output are stable.
///
/// Because the backing vector is always sorted, every point operation is a
/// binary search (O(log n)) followed by an indexed access; inserts and
/// removals shift the tail (O(n)), which is irrelevant at the sizes these
/// maps reach.
///
/// # Type Parameters
///
/// - `N`: inline capacity (default: 8) before the backing `SmallVec` spills
///   to the heap.
///
/// # Ordering Guarantees
///
/// - Keys are always maintained in sorted order by their `Ord` implementation.
/// - Iteration order is deterministic and corresponds to key sort order.
/// - Duplicate keys are deduplicated (last write wins).
///
/// # Examples
///
/// ```rust
/// # use gridarb::sorted_vec_map::SortedVecMap;
/// let mut map = SortedVecMap::new();
/// map.insert("zebra", 3);
/// map.insert("apple", 1);
/// map.insert("mango", 2);
///
/// let keys: Vec<_> = map.keys().copied().collect();
/// assert_eq!(keys, vec!["apple", "mango", "zebra"]);
/// assert_eq!(map.get(&"apple"), Some(&1));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortedVecMap<K, V, const N: usize = 8> {
    inner: SmallVec<[(K, V); N]>,
}

impl<K, V, const N: usize> Default for SortedVecMap<K, V, N> {
    #[inline]
    fn default() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }
}

impl<K: Ord, V> SortedVecMap<K, V> {
    /// Creates an empty `SortedVecMap`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: SmallVec::new_const(),
        }
    }

    /// Returns the number of elements in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the map contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clears the map, removing all key-value pairs.
    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Slot of `key` in the sorted backing vector: `Ok(index)` when present,
    /// `Err(index)` with the insertion point otherwise.
    #[inline]
    fn slot_of(&self, key: &K) -> Result<usize, usize> {
        self.inner.binary_search_by(|(k, _)| k.cmp(key))
    }

    /// Returns `true` if the map contains the specified key.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.slot_of(key).is_ok()
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        let slot = self.slot_of(key).ok()?;
        Some(&self.inner[slot].1)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    #[inline]
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = self.slot_of(key).ok()?;
        Some(&mut self.inner[slot].1)
    }

    /// Inserts a key-value pair, maintaining sorted order.
    ///
    /// Returns the previous value if the key was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.slot_of(&key) {
            Ok(slot) => Some(std::mem::replace(&mut self.inner[slot].1, value)),
            Err(slot) => {
                self.inner.insert(slot, (key, value));
                None
            }
        }
    }

    /// Removes a key from the map, returning the value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slot_of(key).ok()?;
        Some(self.inner.remove(slot).1)
    }

    /// Retains only the elements specified by the predicate.
    ///
    /// Rebuilds the backing vector in one pass; relative order is untouched,
    /// so the sorted invariant holds without re-sorting.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut kept: SmallVec<[(K, V); 8]> = SmallVec::with_capacity(self.inner.len());
        for (key, mut value) in self.inner.drain(..) {
            if f(&key, &mut value) {
                kept.push((key, value));
            }
        }
        self.inner = kept;
    }

    /// Iterates key-value pairs in sorted key order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().map(|(k, v)| (k, v))
    }

    /// Iterates keys in sorted order.
    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.iter().map(|(k, _)| k)
    }

    /// Iterates values in key-sorted order.
    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.iter().map(|(_, v)| v)
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SortedVecMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K: Ord, V> IntoIterator for SortedVecMap<K, V> {
    type Item = (K, V);
    type IntoIter = smallvec::IntoIter<[(K, V); 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<K: Ord + PartialEq, V: PartialEq> PartialEq for SortedVecMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K: Ord + Eq, V: Eq> Eq for SortedVecMap<K, V> {}
