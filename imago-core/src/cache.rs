use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use imago_semver::Version;

use crate::cancel::CancellationToken;
use crate::error::ImagoError;
use crate::package::PackageDef;
use crate::platform::CpuArchitecture;
use crate::repository::{def_is_compatible, Repository, RepositoryError};
use crate::Result;

/// Every candidate the resolver may consider, keyed by package name with
/// per-name lists held newest-first. Populated once before search; never
/// mutated afterwards.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    packages: BTreeMap<String, Vec<PackageDef>>,
    incompatible: BTreeSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate, keeping the first definition seen for any
    /// `(name, version)` pair and the per-name list version-descending.
    pub fn insert(&mut self, def: PackageDef) -> bool {
        let candidates = self.packages.entry(def.identity.name.clone()).or_default();

        if candidates
            .iter()
            .any(|existing| existing.identity.version == def.identity.version)
        {
            return false;
        }

        candidates.push(def);
        candidates.sort_by(|a, b| b.identity.version.cmp(&a.identity.version));
        true
    }

    pub fn candidates(&self, name: &str) -> &[PackageDef] {
        self.packages.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn definition(&self, name: &str, version: &Version) -> Option<&PackageDef> {
        self.candidates(name)
            .iter()
            .find(|def| &def.identity.version == version)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Remembers that `name` had at least one variant rejected by the
    /// platform filter, so a later lookup miss can be reported as an
    /// incompatibility rather than a missing package.
    pub fn note_incompatible(&mut self, name: &str) {
        self.incompatible.insert(name.to_string());
    }

    pub fn had_incompatible(&self, name: &str) -> bool {
        self.incompatible.contains(name)
    }

    /// Builds the graph for one resolve: the transitive closure of the root
    /// names over every repository, filtered to the target platform, with
    /// `seeds` (installed or side-loaded definitions) inserted first and
    /// unconditionally.
    ///
    /// Repositories are queried in parallel per round; their results are
    /// merged in caller order, so an earlier repository's definition wins a
    /// `(name, version)` tie.
    pub async fn populate(
        repositories: &[Repository],
        os: &str,
        arch: CpuArchitecture,
        root_names: &[String],
        seeds: &[PackageDef],
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut graph = DependencyGraph::new();
        let mut pending: BTreeSet<String> = root_names.iter().cloned().collect();
        let mut visited: BTreeSet<String> = BTreeSet::new();

        for seed in seeds {
            pending.insert(seed.identity.name.clone());
            for dep in &seed.dependencies {
                pending.insert(dep.name.clone());
            }
            graph.insert(seed.clone());
        }

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return Err(ImagoError::Cancelled);
            }

            let batch: Vec<String> = pending
                .iter()
                .filter(|name| !visited.contains(*name))
                .cloned()
                .collect();
            pending.clear();

            if batch.is_empty() {
                break;
            }
            visited.extend(batch.iter().cloned());

            let batch_ref = &batch;
            let queries = repositories.iter().map(|repo| async move {
                let mut defs = Vec::new();
                for name in batch_ref {
                    let entries = repo.list_versions(name, os, arch, cancel).await?;
                    for entry in entries {
                        defs.push(repo.get_definition(&entry).await?);
                    }
                }
                Ok::<Vec<PackageDef>, RepositoryError>(defs)
            });

            let results = join_all(queries).await;

            if cancel.is_cancelled() {
                return Err(ImagoError::Cancelled);
            }

            for result in results {
                for def in result? {
                    if !def_is_compatible(&def, os, arch) {
                        graph.note_incompatible(&def.identity.name);
                        continue;
                    }
                    for dep in &def.dependencies {
                        if !visited.contains(&dep.name) {
                            pending.insert(dep.name.clone());
                        }
                    }
                    graph.insert(def);
                }
            }
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageDependency, PackageIdentity};
    use crate::repository::MemoryRepository;
    use imago_semver::VersionSpecifier;

    fn def(name: &str, version: &str, deps: &[(&str, &str)]) -> PackageDef {
        PackageDef {
            identity: PackageIdentity {
                name: name.to_string(),
                version: Version::parse(version).unwrap(),
                os: "any".to_string(),
                arch: CpuArchitecture::AnyCpu,
            },
            dependencies: deps
                .iter()
                .map(|(dep, spec)| PackageDependency {
                    name: dep.to_string(),
                    version: VersionSpecifier::parse(spec).unwrap(),
                })
                .collect(),
            source_repository: None,
        }
    }

    fn tagged(name: &str, version: &str, os: &str, arch: CpuArchitecture) -> PackageDef {
        let mut package = def(name, version, &[]);
        package.identity.os = os.to_string();
        package.identity.arch = arch;
        package
    }

    #[tokio::test]
    async fn follows_dependencies_transitively() {
        let repo = Repository::Memory(
            MemoryRepository::new("mem://main")
                .with(def("App", "1.0.0", &[("Lib", "^2.0.0")]))
                .with(def("Lib", "2.1.0", &[("Base", "^1.0.0")]))
                .with(def("Base", "1.0.0", &[])),
        );

        let graph = DependencyGraph::populate(
            &[repo],
            "linux",
            CpuArchitecture::X64,
            &["App".to_string()],
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(graph.candidates("App").len(), 1);
        assert_eq!(graph.candidates("Lib").len(), 1);
        assert_eq!(graph.candidates("Base").len(), 1);
    }

    #[tokio::test]
    async fn first_repository_wins_a_version_tie() {
        let first = Repository::Memory(
            MemoryRepository::new("mem://first").with(def("Tool", "1.0.0", &[("A", "^1.0.0")])),
        );
        let second = Repository::Memory(
            MemoryRepository::new("mem://second")
                .with(def("Tool", "1.0.0", &[]))
                .with(def("Tool", "1.1.0", &[]))
                .with(def("A", "1.0.0", &[])),
        );

        let graph = DependencyGraph::populate(
            &[first, second],
            "linux",
            CpuArchitecture::X64,
            &["Tool".to_string()],
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let candidates = graph.candidates("Tool");
        assert_eq!(candidates.len(), 2);
        // Newest first.
        assert_eq!(candidates[0].identity.version, Version::parse("1.1.0").unwrap());
        // The 1.0.0 definition came from the first repository, dependency list included.
        assert_eq!(candidates[1].dependencies.len(), 1);
        assert_eq!(
            candidates[1].source_repository.as_deref(),
            Some("mem://first")
        );
    }

    #[tokio::test]
    async fn seeds_bypass_the_platform_filter_and_win_ties() {
        let repo = Repository::Memory(
            MemoryRepository::new("mem://main").with(def("Installed", "1.0.0", &[])),
        );

        let seed = tagged("Installed", "1.0.0", "windows", CpuArchitecture::X86);

        let graph = DependencyGraph::populate(
            &[repo],
            "linux",
            CpuArchitecture::X64,
            &[],
            &[seed.clone()],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let candidates = graph.candidates("Installed");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity.os, "windows");
        assert!(candidates[0].source_repository.is_none());
    }

    #[tokio::test]
    async fn filters_incompatible_variants() {
        let repo = Repository::Memory(
            MemoryRepository::new("mem://main")
                .with(tagged("Native", "1.0.0", "linux", CpuArchitecture::X86))
                .with(tagged("Native", "1.0.0", "windows", CpuArchitecture::X64)),
        );

        let graph = DependencyGraph::populate(
            &[repo],
            "linux",
            CpuArchitecture::X86,
            &["Native".to_string()],
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let candidates = graph.candidates("Native");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity.os, "linux");
    }

    #[tokio::test]
    async fn cancellation_stops_population() {
        let repo = Repository::Memory(
            MemoryRepository::new("mem://main").with(def("App", "1.0.0", &[])),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = DependencyGraph::populate(
            &[repo],
            "linux",
            CpuArchitecture::X64,
            &["App".to_string()],
            &[],
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ImagoError::Cancelled)));
    }
}
