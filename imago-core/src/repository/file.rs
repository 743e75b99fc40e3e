use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::package::{PackageDef, PackageDocument};
use crate::platform::CpuArchitecture;
use crate::repository::{DefHandle, RepositoryError, VersionEntry};

#[derive(Debug, Deserialize)]
struct FileIndex {
    #[serde(default)]
    packages: Vec<PackageDocument>,
}

/// A repository backed by one JSON index document on disk.
#[derive(Debug)]
pub struct FileRepository {
    url: String,
    packages: Vec<PackageDef>,
}

impl FileRepository {
    /// Reads and decodes the whole index up front; a malformed document is
    /// a permanent repository error.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let url = path.display().to_string();

        let data = fs::read_to_string(path)
            .map_err(|err| RepositoryError::permanent(&url, format!("read failed: {err}")))?;

        let index: FileIndex = serde_json::from_str(&data)
            .map_err(|err| RepositoryError::permanent(&url, format!("decode failed: {err}")))?;

        let mut packages = Vec::with_capacity(index.packages.len());
        for document in index.packages {
            let def = document
                .into_def(Some(url.clone()))
                .map_err(|err| RepositoryError::permanent(&url, err))?;
            packages.push(def);
        }

        Ok(FileRepository { url, packages })
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
