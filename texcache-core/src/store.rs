//! Keyed texture storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::texture::TextureHandle;

/// Key to texture mapping. One entry per key; the store holds one strong
/// reference to each texture.
#[derive(Debug, Default)]
pub struct TextureStore {
    entries: BTreeMap<String, TextureHandle>,
}

impl TextureStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `key` has an entry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Handle stored under `key`.
    pub fn get(&self, key: &str) -> Option<TextureHandle> {
        self.entries.get(key).cloned()
    }

    /// Insert unless the key is taken; returns the handle that ends up
    /// stored under `key`.
    pub fn insert_if_absent(
        &mut self,
        key: String,
        texture: TextureHandle,
    ) -> TextureHandle {
        Arc::clone(self.entries.entry(key).or_insert(texture))
    }

    /// Remove and return the entry for `key`.
    pub fn remove(&mut self, key: &str) -> Option<TextureHandle> {
        self.entries.remove(key)
    }

    /// Remove the entry holding this exact texture.
    pub fn remove_handle(
        &mut self,
        texture: &TextureHandle,
    ) -> Option<(String, TextureHandle)> {
        let key = self
            .entries
            .iter()
            .find(|(_, t)| Arc::ptr_eq(t, texture))
            .map(|(k, _)| k.clone())?;
        self.entries.remove_entry(&key)
    }

    /// Key of the entry holding this exact texture.
    pub fn key_of(&self, texture: &TextureHandle) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, t)| Arc::ptr_eq(t, texture))
            .map(|(k, _)| k.as_str())
    }

    /// Remove entries nobody but the store references.
    pub fn remove_unused(&mut self) -> Vec<(String, TextureHandle)> {
        let unused: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, t)| Arc::strong_count(t) == 1)
            .map(|(k, _)| k.clone())
            .collect();

        unused
            .into_iter()
            .filter_map(|key| self.entries.remove_entry(&key))
            .collect()
    }

    /// Remove and return every entry.
    pub fn clear(&mut self) -> Vec<(String, TextureHandle)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    /// Copy of the map.
    pub fn snapshot(&self) -> BTreeMap<String, TextureHandle> {
        self.entries.clone()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TextureHandle)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }
}
