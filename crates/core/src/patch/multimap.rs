use std::collections::{BTreeMap, BTreeSet};

/// Key to ordered-set-of-values map. Empty value sets are never kept.
#[derive(Clone, Debug)]
pub struct MultiMap<K, V> {
    inner: BTreeMap<K, BTreeSet<V>>,
}

impl<K: Ord + Clone, V: Ord + Clone> MultiMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Returns false if the pair was already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.inner.entry(key).or_default().insert(value)
    }

    /// Returns false if the pair was not present.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.inner.get_mut(key) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.inner.remove(key);
        }
        removed
    }

    /// Remove every value stored under `key`.
    pub fn remove_key(&mut self, key: &K) -> BTreeSet<V> {
        self.inner.remove(key).unwrap_or_default()
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.inner
            .get(key)
            .map_or(false, |values| values.contains(value))
    }

    pub fn values(&self, key: &K) -> impl Iterator<Item = &V> {
        self.inner.get(key).into_iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.inner.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Default for MultiMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
