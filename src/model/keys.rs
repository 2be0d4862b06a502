//! Entity keys.
//!
//! Namespace-scoped entities are keyed `"{namespace}/{name}"`; cluster-scoped
//! entities are keyed by `name` alone. Keys are opaque strings — callers must
//! not parse them back apart except via the helpers below.

/// Build the composite key for a namespace-scoped entity.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Build the key for a cluster-scoped entity.
pub fn cluster_key(name: &str) -> String {
    name.to_string()
}

/// Split a namespaced key back into `(namespace, name)`. Returns `None` if
/// the key has no `/` separator (i.e. it was a cluster-scoped key).
pub fn split_namespaced(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}
