//! Runtime tree of counter scopes

use std::fmt;

use crate::error::Result;
use crate::feature::namespace::{AttrGroup, ObjectRegistry};

/// Identity of a counter scope
///
/// `Root` aggregates every child of its subtree; `Index(n)` is the n-th port
/// or translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerfId {
    Root,
    Index(u32),
}

impl fmt::Display for PerfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerfId::Root => write!(f, "root"),
            PerfId::Index(n) => write!(f, "{n}"),
        }
    }
}

/// One node of the counter tree, owning its children
#[derive(Debug)]
pub struct PerfObject {
    id: PerfId,
    path: String,
    children: Vec<PerfObject>,
}

impl PerfObject {
    /// Create a top-level scope at `path`
    pub fn create(
        registry: &dyn ObjectRegistry,
        path: &str,
        id: PerfId,
        groups: Vec<AttrGroup>,
    ) -> Result<Self> {
        registry.create_object(path, groups)?;
        Ok(Self {
            id,
            path: path.to_string(),
            children: Vec::new(),
        })
    }

    /// Create a child scope and link it under `self`
    ///
    /// Indexed children get the id appended to `name` (`port0`, `afu1`).
    pub fn add_child(
        &mut self,
        registry: &dyn ObjectRegistry,
        name: &str,
        id: PerfId,
        groups: Vec<AttrGroup>,
    ) -> Result<&mut PerfObject> {
        let path = match id {
            PerfId::Root => format!("{}/{}", self.path, name),
            PerfId::Index(n) => format!("{}/{}{}", self.path, name, n),
        };
        let child = PerfObject::create(registry, &path, id, groups)?;
        self.children.push(child);
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    pub fn id(&self) -> PerfId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn children(&self) -> &[PerfObject] {
        &self.children
    }

    /// Nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PerfObject::node_count).sum::<usize>()
    }

    /// Remove the subtree, children first and in reverse creation order
    pub fn destroy(mut self, registry: &dyn ObjectRegistry) {
        while let Some(child) = self.children.pop() {
            child.destroy(registry);
        }
        registry.remove_object(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FpgaError;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    /// Registry that journals calls and can fail the n-th creation
    #[derive(Default)]
    struct Recorder {
        created: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
        live: Mutex<BTreeSet<String>>,
        fail_at: Option<usize>,
    }

    impl ObjectRegistry for Recorder {
        fn create_object(&self, path: &str, _groups: Vec<AttrGroup>) -> Result<()> {
            let mut created = self.created.lock();
            if self.fail_at == Some(created.len()) {
                return Err(FpgaError::OutOfMemory(path.to_string()));
            }
            created.push(path.to_string());
            self.live.lock().insert(path.to_string());
            Ok(())
        }

        fn remove_object(&self, path: &str) {
            self.removed.lock().push(path.to_string());
            self.live.lock().remove(path);
        }
    }

    fn populate(root: &mut PerfObject, registry: &Recorder) -> Result<()> {
        for bank in ["iommu", "fabric"] {
            let node = root.add_child(registry, bank, PerfId::Root, vec![])?;
            for n in 0..2 {
                node.add_child(registry, "unit", PerfId::Index(n), vec![])?;
            }
        }
        Ok(())
    }

    fn build(registry: &Recorder) -> Result<PerfObject> {
        let mut root = PerfObject::create(registry, "perf", PerfId::Root, vec![])?;
        match populate(&mut root, registry) {
            Ok(()) => Ok(root),
            Err(e) => {
                root.destroy(registry);
                Err(e)
            }
        }
    }

    #[test]
    fn test_build_destroy_symmetry() {
        let registry = Recorder::default();
        let tree = build(&registry).unwrap();
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.children()[1].children()[0].path(), "perf/fabric/unit0");
        tree.destroy(&registry);

        let created = registry.created.lock().clone();
        let mut removed = registry.removed.lock().clone();
        assert_eq!(created.len(), removed.len());
        removed.reverse();
        assert_eq!(created, removed);
        assert!(registry.live.lock().is_empty());
    }

    #[test]
    fn test_partial_build_unwinds() {
        for fail_at in 1..7 {
            let registry = Recorder {
                fail_at: Some(fail_at),
                ..Default::default()
            };
            assert!(matches!(build(&registry), Err(FpgaError::OutOfMemory(_))));
            assert!(registry.live.lock().is_empty(), "leak when failing at {fail_at}");

            let created = registry.created.lock().clone();
            let mut removed = registry.removed.lock().clone();
            removed.reverse();
            assert_eq!(created, removed);
        }
    }

    #[test]
    fn test_child_naming() {
        let registry = Recorder::default();
        let mut root = PerfObject::create(&registry, "perf", PerfId::Root, vec![]).unwrap();
        let fabric = root
            .add_child(&registry, "fabric", PerfId::Root, vec![])
            .unwrap();
        let port = fabric
            .add_child(&registry, "port", PerfId::Index(1), vec![])
            .unwrap();
        assert_eq!(port.path(), "perf/fabric/port1");
        assert_eq!(port.id(), PerfId::Index(1));
        assert_eq!(PerfId::Root.to_string(), "root");
    }
}
