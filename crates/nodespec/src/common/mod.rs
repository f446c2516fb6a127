pub mod env;
pub mod error;
pub mod format;
pub mod parser;
pub mod setup;

/// Ordered map, so that resource listings are deterministic.
pub type Map<K, V> = std::collections::BTreeMap<K, V>;
pub type Set<T> = std::collections::BTreeSet<T>;

pub fn has_unique_elements<T: Ord>(items: &[T]) -> bool {
    let set: Set<&T> = items.iter().collect();
    set.len() == items.len()
}
