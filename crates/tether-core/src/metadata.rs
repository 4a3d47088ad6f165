//! Metadata maps and the inheritance split
//!
//! Remote objects carry string tags. Some were declared by the user, the rest
//! were added by the server (organization defaults, the internal identity
//! tag). [`split`] separates the two by key.

use std::collections::{BTreeMap, BTreeSet};

/// Ordered tag map of a remote object
pub type Metadata = BTreeMap<String, String>;

/// Reserved metadata key holding the internal identity tag
pub const INTERNAL_TAG_KEY: &str = "__tf_id";

/// Partition of a metadata map into user-declared and inherited entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSplit {
    pub own: Metadata,
    pub inherited: Metadata,
}

/// Split `server` into entries whose key the user declared and the rest.
pub fn split<'a, K>(server: &Metadata, user_declared_keys: K) -> MetadataSplit
where
    K: IntoIterator<Item = &'a String>,
{
    let declared: BTreeSet<&str> = user_declared_keys.into_iter().map(String::as_str).collect();

    let mut result = MetadataSplit::default();
    for (key, value) in server {
        let target = if declared.contains(key.as_str()) {
            &mut result.own
        } else {
            &mut result.inherited
        };
        target.insert(key.clone(), value.clone());
    }
    result
}

/// Union of two disjoint partitions
pub fn merge(own: &Metadata, inherited: &Metadata) -> Metadata {
    let mut merged = inherited.clone();
    merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Entries of `server` whose key is in `user` with the same value
pub fn matching_entries(server: &Metadata, user: &Metadata) -> Metadata {
    server
        .iter()
        .filter(|(key, value)| user.get(*key) == Some(*value))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Internal identity tag stored in `metadata`; empty values count as absent
pub fn internal_tag(metadata: &Metadata) -> Option<&str> {
    metadata
        .get(INTERNAL_TAG_KEY)
        .map(String::as_str)
        .filter(|tag| !tag.is_empty())
}
