use std::fmt;

use imago_semver::Version;
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::package::PackageDef;
use crate::platform::{os_matches, CpuArchitecture};

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileRepository;
pub use http::HttpRepository;
pub use memory::MemoryRepository;

/// One candidate version as listed by a repository, with an opaque handle
/// that resolves to the full definition.
#[derive(Clone, Debug)]
pub struct VersionEntry {
    pub version: Version,
    pub(crate) handle: DefHandle,
}

#[derive(Clone, Debug)]
pub(crate) enum DefHandle {
    /// The backing store already decoded the full definition.
    Inline(Box<PackageDef>),
    /// The definition lives behind another request.
    Remote { name: String, version: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryErrorKind {
    Transient,
    Permanent,
}

#[derive(Error, Debug)]
#[error("repository {url}: {message}")]
pub struct RepositoryError {
    pub url: String,
    pub kind: RepositoryErrorKind,
    pub message: String,
}

impl RepositoryError {
    pub fn transient(url: impl Into<String>, message: impl fmt::Display) -> Self {
        RepositoryError {
            url: url.into(),
            kind: RepositoryErrorKind::Transient,
            message: message.to_string(),
        }
    }

    pub fn permanent(url: impl Into<String>, message: impl fmt::Display) -> Self {
        RepositoryError {
            url: url.into(),
            kind: RepositoryErrorKind::Permanent,
            message: message.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RepositoryErrorKind::Transient
    }
}

/// A package source. The variants share one small capability: list the
/// candidate versions of a name for a target platform, and resolve a listed
/// candidate to its full definition.
#[derive(Debug)]
pub enum Repository {
    Http(HttpRepository),
    File(FileRepository),
    Memory(MemoryRepository),
}

impl Repository {
    pub fn url(&self) -> &str {
        match self {
            Repository::Http(repo) => repo.url(),
            Repository::File(repo) => repo.url(),
            Repository::Memory(repo) => repo.url(),
        }
    }

    /// Candidate versions of `name` compatible with `(os, arch)`, newest
    /// first. A name the repository does not carry yields an empty list,
    /// not an error.
    pub async fn list_versions(
        &self,
        name: &str,
        os: &str,
        arch: CpuArchitecture,
        cancel: &CancellationToken,
    ) -> Result<Vec<VersionEntry>, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::transient(self.url(), "cancelled"));
        }

        match self {
            Repository::Http(repo) => repo.list_versions(name, os, arch).await,
            Repository::File(repo) => Ok(repo.list_versions(name, os, arch)),
            Repository::Memory(repo) => Ok(repo.list_versions(name, os, arch)),
        }
    }

    pub async fn get_definition(
        &self,
        entry: &VersionEntry,
    ) -> Result<PackageDef, RepositoryError> {
        match &entry.handle {
            DefHandle::Inline(def) => {
                let mut def = (**def).clone();
                if def.source_repository.is_none() {
                    def.source_repository = Some(self.url().to_string());
                }
                Ok(def)
            }
            DefHandle::Remote { name, version } => match self {
                Repository::Http(repo) => repo.get_definition(name, version).await,
                Repository::File(repo) => Err(RepositoryError::permanent(
                    repo.url(),
                    format!("no local definition for {name} {version}"),
                )),
                Repository::Memory(repo) => Err(RepositoryError::permanent(
                    repo.url(),
                    format!("no in-memory definition for {name} {version}"),
                )),
            },
        }
    }

    /// Every package name the repository carries. Used for diagnostics
    /// only; resolution never enumerates repositories wholesale.
    pub async fn names(&self) -> Result<Vec<String>, RepositoryError> {
        match self {
            Repository::Http(repo) => repo.names().await,
            Repository::File(repo) => Ok(repo.names()),
            Repository::Memory(repo) => Ok(repo.names()),
        }
    }
}

pub(crate) fn def_is_compatible(def: &PackageDef, os: &str, arch: CpuArchitecture) -> bool {
    os_matches(&def.identity.os, os) && arch.supports(def.identity.arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageDef, PackageIdentity};
    use imago_semver::Version;

    fn def(name: &str, version: &str) -> PackageDef {
        PackageDef {
            identity: PackageIdentity {
                name: name.to_string(),
                version: Version::parse(version).unwrap(),
                os: "any".to_string(),
                arch: CpuArchitecture::AnyCpu,
            },
            dependencies: Vec::new(),
            source_repository: None,
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_names_are_sorted() {
        let repo = Repository::Memory(
            MemoryRepository::new("mem://main")
                .with(def("Tool", "1.0.0"))
                .with(def("Tool", "2.0.0"))
                .with(def("Aid", "0.1.0")),
        );

        let entries = repo
            .list_versions("Tool", "linux", CpuArchitecture::X64, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].version, Version::parse("2.0.0").unwrap());

        assert_eq!(repo.names().await.unwrap(), ["Aid", "Tool"]);
    }

    #[tokio::test]
    async fn definitions_are_stamped_with_their_source() {
        let repo = Repository::Memory(MemoryRepository::new("mem://main").with(def("Tool", "1.0.0")));

        let entries = repo
            .list_versions("Tool", "linux", CpuArchitecture::X64, &CancellationToken::new())
            .await
            .unwrap();
        let definition = repo.get_definition(&entries[0]).await.unwrap();

        assert_eq!(definition.source_repository.as_deref(), Some("mem://main"));
    }

    #[test]
    fn errors_carry_the_repository_url() {
        let error = RepositoryError::transient("https://packages.example", "connection reset");
        assert!(error.is_transient());
        assert_eq!(
            error.to_string(),
            "repository https://packages.example: connection reset"
        );
    }
}
