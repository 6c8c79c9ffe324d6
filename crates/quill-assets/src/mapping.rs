//! Bidirectional name ↔ path mapping.

use std::collections::HashMap;

/// One generation of the asset mapping.
///
/// `by_path` maps a logical path (`/assets/img/logo.png`) to its content
/// name (`<sha256>.png`); `by_name` is the inverse. Both directions are
/// always populated together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMapping {
    by_name: HashMap<String, String>,
    by_path: HashMap<String, String>,
    generation: u64,
}

impl AssetMapping {
    pub(crate) fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub(crate) fn insert(&mut self, logical_path: String, name: String) {
        self.by_name.insert(name.clone(), logical_path.clone());
        self.by_path.insert(logical_path, name);
    }

    /// Content name for a logical path.
    pub fn name_for(&self, logical_path: &str) -> Option<&str> {
        self.by_path.get(logical_path).map(String::as_str)
    }

    /// Logical path for a content name.
    pub fn path_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Registration pass that produced this mapping. `0` is the empty
    /// mapping a registry starts with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(logical path, name)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_path.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }
}

/// Builds a generation-0 mapping from `(logical path, name)` pairs.
impl FromIterator<(String, String)> for AssetMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut mapping = Self::default();
        for (path, name) in pairs {
            mapping.insert(path, name);
        }
        mapping
    }
}
