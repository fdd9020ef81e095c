//! Hierarchical attribute namespace
//!
//! Objects are `/`-separated paths; each carries named groups of attributes.
//! An attribute is addressed as `object/group/name`, with the group part
//! omitted for unnamed groups. The empty path is the device itself and always
//! exists.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{FpgaError, Result};
use crate::feature::table::FeatureTable;

pub type ShowFn = Arc<dyn Fn(&FeatureTable) -> Result<String> + Send + Sync>;
pub type StoreFn = Arc<dyn Fn(&FeatureTable, &str) -> Result<()> + Send + Sync>;

/// A named read and/or write endpoint
#[derive(Clone)]
pub struct Attribute {
    pub name: &'static str,
    show: Option<ShowFn>,
    store: Option<StoreFn>,
}

impl Attribute {
    pub fn ro<S>(name: &'static str, show: S) -> Self
    where
        S: Fn(&FeatureTable) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name,
            show: Some(Arc::new(show)),
            store: None,
        }
    }

    pub fn wo<W>(name: &'static str, store: W) -> Self
    where
        W: Fn(&FeatureTable, &str) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            show: None,
            store: Some(Arc::new(store)),
        }
    }

    pub fn rw<S, W>(name: &'static str, show: S, store: W) -> Self
    where
        S: Fn(&FeatureTable) -> Result<String> + Send + Sync + 'static,
        W: Fn(&FeatureTable, &str) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            show: Some(Arc::new(show)),
            store: Some(Arc::new(store)),
        }
    }

    pub fn is_readable(&self) -> bool {
        self.show.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.store.is_some()
    }

    pub fn show(&self, table: &FeatureTable) -> Result<String> {
        match &self.show {
            Some(show) => show(table),
            None => Err(FpgaError::AccessDenied(format!("{} is write-only", self.name))),
        }
    }

    pub fn store(&self, table: &FeatureTable, value: &str) -> Result<()> {
        match &self.store {
            Some(store) => store(table, value),
            None => Err(FpgaError::AccessDenied(format!("{} is read-only", self.name))),
        }
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AttrGroup {
    pub name: Option<&'static str>,
    pub attrs: Vec<Attribute>,
}

impl AttrGroup {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self { name: None, attrs }
    }

    pub fn named(name: &'static str, attrs: Vec<Attribute>) -> Self {
        Self {
            name: Some(name),
            attrs,
        }
    }
}

/// Creation and removal of attribute-carrying objects
pub trait ObjectRegistry {
    fn create_object(&self, path: &str, groups: Vec<AttrGroup>) -> Result<()>;

    fn remove_object(&self, path: &str);
}

#[derive(Default)]
struct Inner {
    objects: BTreeSet<String>,
    attrs: BTreeMap<String, Attribute>,
    // (object, group name) -> attribute keys it registered
    groups: BTreeMap<(String, Option<&'static str>), Vec<String>>,
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

impl Inner {
    fn add_group(&mut self, object: &str, group: AttrGroup) -> Result<()> {
        if !self.objects.contains(object) {
            return Err(FpgaError::NoEntry(format!("object {object:?}")));
        }
        let id = (object.to_string(), group.name);
        if self.groups.contains_key(&id) {
            return Err(FpgaError::AlreadyExists(format!(
                "group {:?} on {object:?}",
                group.name
            )));
        }

        let keys: Vec<String> = group
            .attrs
            .iter()
            .map(|a| join(&[object, group.name.unwrap_or(""), a.name]))
            .collect();
        let unique: BTreeSet<&String> = keys.iter().collect();
        if unique.len() != keys.len() {
            return Err(FpgaError::AlreadyExists(format!(
                "duplicate attribute in group {:?} on {object:?}",
                group.name
            )));
        }
        if let Some(dup) = keys.iter().find(|k| self.attrs.contains_key(*k)) {
            return Err(FpgaError::AlreadyExists(format!("attribute {dup}")));
        }

        for (key, attr) in keys.iter().zip(group.attrs) {
            self.attrs.insert(key.clone(), attr);
        }
        self.groups.insert(id, keys);
        Ok(())
    }

    fn remove_group(&mut self, object: &str, name: Option<&'static str>) -> bool {
        match self.groups.remove(&(object.to_string(), name)) {
            Some(keys) => {
                for key in keys {
                    self.attrs.remove(&key);
                }
                true
            }
            None => false,
        }
    }

    fn remove_groups_of(&mut self, object: &str) {
        let ids: Vec<Option<&'static str>> = self
            .groups
            .keys()
            .filter(|(o, _)| o == object)
            .map(|(_, name)| *name)
            .collect();
        for name in ids {
            self.remove_group(object, name);
        }
    }
}

/// In-process attribute tree of one device
pub struct Namespace {
    inner: RwLock<Inner>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.objects.insert(String::new());
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Attach a group of attributes to an existing object
    pub fn add_group(&self, object: &str, group: AttrGroup) -> Result<()> {
        self.inner.write().add_group(object, group)
    }

    pub fn remove_group(&self, object: &str, name: Option<&'static str>) {
        if !self.inner.write().remove_group(object, name) {
            tracing::warn!("Group {:?} not registered on {:?}", name, object);
        }
    }

    pub fn contains_object(&self, path: &str) -> bool {
        self.inner.read().objects.contains(path)
    }

    /// Number of objects besides the device root
    pub fn object_count(&self) -> usize {
        self.inner.read().objects.len() - 1
    }

    pub fn attribute(&self, path: &str) -> Result<Attribute> {
        let path = path.trim_matches('/');
        self.inner
            .read()
            .attrs
            .get(path)
            .cloned()
            .ok_or_else(|| FpgaError::NoEntry(format!("attribute {path:?}")))
    }

    /// Attribute paths under `prefix`, in sorted order
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim_matches('/');
        self.inner
            .read()
            .attrs
            .keys()
            .filter(|k| {
                prefix.is_empty()
                    || k.as_str() == prefix
                    || (k.starts_with(prefix) && k[prefix.len()..].starts_with('/'))
            })
            .cloned()
            .collect()
    }
}

impl ObjectRegistry for Namespace {
    fn create_object(&self, path: &str, groups: Vec<AttrGroup>) -> Result<()> {
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
            return Err(FpgaError::invalid(format!("bad object path {path:?}")));
        }
        let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);

        let mut inner = self.inner.write();
        if !inner.objects.contains(parent) {
            return Err(FpgaError::NoEntry(format!("parent of {path:?}")));
        }
        if !inner.objects.insert(path.to_string()) {
            return Err(FpgaError::AlreadyExists(format!("object {path:?}")));
        }

        for group in groups {
            if let Err(e) = inner.add_group(path, group) {
                inner.remove_groups_of(path);
                inner.objects.remove(path);
                return Err(e);
            }
        }

        tracing::debug!("Created object {}", path);
        Ok(())
    }

    fn remove_object(&self, path: &str) {
        let mut inner = self.inner.write();
        let prefix = format!("{path}/");
        if inner.objects.iter().any(|o| o.starts_with(&prefix)) {
            tracing::warn!("Removing {} while it still has children", path);
        }
        inner.remove_groups_of(path);
        if inner.objects.remove(path) {
            tracing::debug!("Removed object {}", path);
        }
    }
}
