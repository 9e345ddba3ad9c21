//! Type aliases for `HashMap`/`HashSet` backed by `ahash`, the hasher the
//! rest of this workspace assumes when it says "hash map" without
//! qualification.

#[cfg(feature = "ahash")]
pub type AHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
#[cfg(feature = "ahash")]
pub type AHashSet<K> = std::collections::HashSet<K, ahash::RandomState>;

#[cfg(not(feature = "ahash"))]
pub type AHashMap<K, V> = std::collections::HashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub type AHashSet<K> = std::collections::HashSet<K>;
