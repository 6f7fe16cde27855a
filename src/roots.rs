//! Storage roots: which physical directory holds a given library.
//!
//! A media library is split across several mounted roots, each tagged with
//! the origin (site) it belongs to. Requests name a root by numeric id plus a
//! path relative to it. The table is built once from config and never
//! mutated.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RootError {
    #[error("duplicate root id {0}")]
    DuplicateId(u32),
    #[error("unknown root id {0}")]
    UnknownRoot(u32),
    #[error("relative path must not be absolute: {0}")]
    Absolute(String),
    #[error("relative path must not leave its root: {0}")]
    Traversal(String),
}

/// One storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Root {
    pub id: u32,
    pub path: PathBuf,
    pub origin: String,
}

impl Root {
    /// Join a request-relative path onto this root.
    ///
    /// Absolute paths and `..` components are rejected so a request can never
    /// name a file outside the root.
    pub fn join(&self, relative: &str) -> Result<PathBuf, RootError> {
        let rel = Path::new(relative);
        if rel.has_root() {
            return Err(RootError::Absolute(relative.to_string()));
        }
        let mut out = self.path.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(RootError::Traversal(relative.to_string()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(RootError::Absolute(relative.to_string()));
                }
            }
        }
        Ok(out)
    }
}

/// Immutable lookup table over the configured roots.
#[derive(Debug, Clone, Default)]
pub struct RootTable {
    roots: Vec<Root>,
}

impl RootTable {
    /// Build the table, rejecting duplicate ids.
    pub fn new(roots: Vec<Root>) -> Result<Self, RootError> {
        let mut seen = HashSet::new();
        for root in &roots {
            if !seen.insert(root.id) {
                return Err(RootError::DuplicateId(root.id));
            }
        }
        Ok(Self { roots })
    }

    pub fn resolve_root(&self, id: u32) -> Option<&Root> {
        self.roots.iter().find(|r| r.id == id)
    }

    /// Resolve `(root id, relative path)` to an absolute source path.
    pub fn resolve(&self, id: u32, relative: &str) -> Result<PathBuf, RootError> {
        self.resolve_root(id)
            .ok_or(RootError::UnknownRoot(id))?
            .join(relative)
    }

    /// All roots serving `origin`, in configuration order.
    pub fn roots_for_origin<'a, 'b>(
        &'a self,
        origin: &'b str,
    ) -> impl Iterator<Item = &'a Root> + use<'a, 'b> {
        self.roots.iter().filter(move |r| r.origin == origin)
    }

    /// The first configured root for `origin`.
    pub fn default_root(&self, origin: &str) -> Option<&Root> {
        self.roots_for_origin(origin).next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Root> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
