use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;

/// Copy-out reads on `DashMap`.
///
/// A `DashMap` read guard holds its shard lock until dropped. Registries hand
/// out clones of their `Arc` values instead so callers can await freely
/// without pinning a shard.
pub trait DashMapExt<K, V> {
    /// Clone the value for `key`.
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone;

    /// Clone every value. Each shard is locked only while it is copied, so
    /// the result is a snapshot per shard rather than of the whole map.
    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone;
}

impl<K, V> DashMapExt<K, V> for DashMap<K, V>
where
    K: Eq + Hash,
{
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).map(|r| r.value().clone())
    }

    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_out_values() {
        let map: DashMap<String, u32> = DashMap::new();
        map.insert("a".into(), 1);
        map.insert("b".into(), 2);

        assert_eq!(map.get_cloned("a"), Some(1));
        assert_eq!(map.get_cloned("z"), None);

        let mut values = map.values_cloned();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }
}
