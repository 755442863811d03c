use {indexmap::IndexMap, std::hash::Hash};

/// Merge `overrides` into `base`, keyed by `K`.
///
/// Collision policy: the override wins. A colliding key keeps the position it
/// had in `base`; keys that `base` lacks are appended in the order `overrides`
/// yields them. Duplicate keys within either input collapse to the last value.
pub fn merge_ordered<K, V>(
    base: impl IntoIterator<Item = (K, V)>,
    overrides: impl IntoIterator<Item = (K, V)>,
) -> IndexMap<K, V>
where
    K: Hash + Eq,
{
    let mut merged: IndexMap<K, V> = base.into_iter().collect();
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    merged
}
