use std::collections::BTreeSet;

use crate::package::PackageDef;
use crate::platform::CpuArchitecture;
use crate::repository::{DefHandle, VersionEntry};

/// A repository held entirely in memory. Backs deterministic tests and
/// side-loaded package sets.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    url: String,
    packages: Vec<PackageDef>,
}

impl MemoryRepository {
    pub fn new(url: impl Into<String>) -> Self {
        MemoryRepository {
            url: url.into(),
            packages: Vec::new(),
        }
    }

    pub fn insert(&mut self, def: PackageDef) {
        self.packages.push(def);
    }

    pub fn with(mut self, def: PackageDef) -> Self {
        self.insert(def);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lists every version of `name`; platform filtering is the dependency
    /// cache's job so incompatible variants stay visible to diagnostics.
    pub fn list_versions(&self, name: &str, _os: &str, _arch: CpuArchitecture) -> Vec<VersionEntry> {
        let mut entries: Vec<VersionEntry> = self
            .packages
            .iter()
            .filter(|def| def.identity.name == name)
            .map(|def| VersionEntry {
                version: def.identity.version.clone(),
                handle: DefHandle::Inline(Box::new(def.clone())),
            })
            .collect();

        entries.sort_by(|a, b| b.version.cmp(&a.version));
        entries
    }

    pub fn names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .packages
            .iter()
            .map(|def| def.identity.name.as_str())
            .collect();
        names.into_iter().map(String::from).collect()
    }
}
