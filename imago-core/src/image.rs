use std::collections::BTreeMap;
use std::collections::BTreeSet;

use imago_semver::Version;

use crate::error::{DependencyError, ImagoError};
use crate::package::{PackageDef, PackageIdentity, PackageSpecifier};
use crate::platform::CpuArchitecture;
use crate::resolve::ImageResolution;
use crate::Result;

pub mod document;

pub use document::{DocumentPackage, ImageDocument};

/// The input to a resolve: root requirements, target platform and the
/// repositories to draw from. `fixed_packages` and `installed_packages`
/// are populated by the merge engine.
#[derive(Clone, Debug, Default)]
pub struct ImageSpecifier {
    pub roots: Vec<PackageSpecifier>,
    pub repositories: Vec<String>,
    pub os: String,
    pub arch: CpuArchitecture,
    pub fixed_packages: Vec<PackageSpecifier>,
    pub installed_packages: Vec<PackageDef>,
}

impl ImageSpecifier {
    pub fn builder() -> ImageSpecifierBuilder {
        ImageSpecifierBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ImageSpecifierBuilder {
    roots: Vec<PackageSpecifier>,
    repositories: Vec<String>,
    os: Option<String>,
    arch: Option<CpuArchitecture>,
    fixed_packages: Vec<PackageSpecifier>,
    installed_packages: Vec<PackageDef>,
}

impl ImageSpecifierBuilder {
    pub fn root(mut self, specifier: PackageSpecifier) -> Self {
        self.roots.push(specifier);
        self
    }

    pub fn repository(mut self, url: impl Into<String>) -> Self {
        self.repositories.push(url.into());
        self
    }

    pub fn os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn arch(mut self, arch: CpuArchitecture) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn fixed(mut self, specifier: PackageSpecifier) -> Self {
        self.fixed_packages.push(specifier);
        self
    }

    pub fn installed(mut self, def: PackageDef) -> Self {
        self.installed_packages.push(def);
        self
    }

    /// Validates the assembled specifier: the target platform must be set
    /// and no two roots may name the same package.
    pub fn build(self) -> Result<ImageSpecifier> {
        let os = self.os.ok_or_else(|| ImagoError::Specifier {
            reason: "target OS is not set".to_string(),
        })?;
        let arch = self.arch.ok_or_else(|| ImagoError::Specifier {
            reason: "target architecture is not set".to_string(),
        })?;

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for root in &self.roots {
            if !seen.insert(&root.name) {
                return Err(ImagoError::Specifier {
                    reason: format!("duplicate root package: {}", root.name),
                });
            }
        }

        Ok(ImageSpecifier {
            roots: self.roots,
            repositories: self.repositories,
            os,
            arch,
            fixed_packages: self.fixed_packages,
            installed_packages: self.installed_packages,
        })
    }
}

/// The immutable outcome of a successful resolve: concrete packages in
/// deployment order, plus the repositories they were drawn from. The
/// deploy subsystem consumes this; the identifier itself never performs
/// I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageIdentifier {
    packages: Vec<PackageDef>,
    repositories: Vec<String>,
}

impl ImageIdentifier {
    pub(crate) fn from_resolution(
        resolution: ImageResolution,
        repositories: Vec<String>,
    ) -> Result<Self> {
        if !resolution.success {
            return Err(ImagoError::Dependency(DependencyError {
                conflicts: resolution.conflicts,
                diagnostic: resolution.diagnostic,
            }));
        }

        Ok(ImageIdentifier {
            packages: resolution.packages,
            repositories,
        })
    }

    /// The resolved set, leaves first.
    pub fn packages(&self) -> &[PackageDef] {
        &self.packages
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Which repository a resolved package came from; `None` for
    /// side-loaded definitions.
    pub fn source_repository(&self, identity: &PackageIdentity) -> Option<&str> {
        self.packages
            .iter()
            .find(|def| &def.identity == identity)
            .and_then(|def| def.source_repository.as_deref())
    }

    /// The name-to-version mapping, sorted by name.
    pub fn assignments(&self) -> BTreeMap<&str, &Version> {
        self.packages
            .iter()
            .map(|def| (def.identity.name.as_str(), &def.identity.version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imago_semver::VersionSpecifier;

    #[test]
    fn build_requires_a_target_platform() {
        let missing_os = ImageSpecifier::builder()
            .arch(CpuArchitecture::X64)
            .build();
        assert!(matches!(missing_os, Err(ImagoError::Specifier { .. })));

        let missing_arch = ImageSpecifier::builder().os("linux").build();
        assert!(matches!(missing_arch, Err(ImagoError::Specifier { .. })));
    }

    #[test]
    fn build_rejects_duplicate_roots() {
        let result = ImageSpecifier::builder()
            .os("linux")
            .arch(CpuArchitecture::X64)
            .root(PackageSpecifier::new("Tool", VersionSpecifier::Any))
            .root(PackageSpecifier::new("Tool", VersionSpecifier::AnyRelease))
            .build();

        assert!(matches!(result, Err(ImagoError::Specifier { .. })));
    }

    #[test]
    fn build_accepts_a_well_formed_specifier() {
        let image = ImageSpecifier::builder()
            .os("linux")
            .arch(CpuArchitecture::X64)
            .root(PackageSpecifier::new("Tool", VersionSpecifier::Any))
            .repository("https://packages.example")
            .build()
            .unwrap();

        assert_eq!(image.roots.len(), 1);
        assert_eq!(image.repositories.len(), 1);
        assert_eq!(image.os, "linux");
    }
}
