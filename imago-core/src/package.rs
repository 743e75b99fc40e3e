use std::collections::BTreeMap;
use std::fmt;

use imago_semver::{Version, VersionSpecifier};
use serde::{Deserialize, Serialize};

use crate::platform::CpuArchitecture;

/// A named package requirement with a version constraint, optionally pinned
/// to an OS or CPU architecture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSpecifier {
    pub name: String,
    pub version: VersionSpecifier,
    pub arch: CpuArchitecture,
    pub os: Option<String>,
}

impl PackageSpecifier {
    pub fn new(name: impl Into<String>, version: VersionSpecifier) -> Self {
        PackageSpecifier {
            name: name.into(),
            version,
            arch: CpuArchitecture::Unspecified,
            os: None,
        }
    }

    pub fn with_arch(mut self, arch: CpuArchitecture) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// The identity of one concrete package build.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
    pub os: String,
    pub arch: CpuArchitecture,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDependency {
    pub name: String,
    pub version: VersionSpecifier,
}

/// A package definition as served by a repository: identity, dependency
/// list and the repository it came from. `None` for `source_repository`
/// means the definition was side-loaded (an installed or local package).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDef {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub source_repository: Option<String>,
}

impl PackageDef {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }
}

/// The wire form of a package definition. Repositories and installed-set
/// files carry these; they are converted into `PackageDef` at decode time
/// so malformed version text surfaces as a parse error immediately.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    pub version: String,
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default)]
    pub architecture: CpuArchitecture,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

fn default_os() -> String {
    "any".to_string()
}

impl PackageDocument {
    pub fn into_def(
        self,
        source_repository: Option<String>,
    ) -> Result<PackageDef, imago_semver::Error> {
        let version = Version::parse(&self.version)
            .map_err(|err| imago_semver::Error::new(self.version.clone(), err.to_string()))?;

        let arch = if self.architecture == CpuArchitecture::Unspecified {
            CpuArchitecture::AnyCpu
        } else {
            self.architecture
        };

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for (name, spec) in self.dependencies {
            let version = VersionSpecifier::parse(&spec)?;
            dependencies.push(PackageDependency { name, version });
        }

        Ok(PackageDef {
            identity: PackageIdentity {
                name: self.name,
                version,
                os: self.os,
                arch,
            },
            dependencies,
            source_repository,
        })
    }

    pub fn from_def(def: &PackageDef) -> Self {
        PackageDocument {
            name: def.identity.name.clone(),
            version: def.identity.version.to_string(),
            os: def.identity.os.clone(),
            architecture: def.identity.arch,
            dependencies: def
                .dependencies
                .iter()
                .map(|dep| (dep.name.clone(), dep.version.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trips_into_def() {
        let json = r#"{
            "name": "Demonstration",
            "version": "9.1.0",
            "os": "linux",
            "architecture": "x64",
            "dependencies": { "OpenTAP": "^9.12.0" }
        }"#;

        let doc: PackageDocument = serde_json::from_str(json).unwrap();
        let def = doc.into_def(Some("https://packages.example".to_string())).unwrap();

        assert_eq!(def.identity.name, "Demonstration");
        assert_eq!(def.identity.version, Version::parse("9.1.0").unwrap());
        assert_eq!(def.identity.arch, CpuArchitecture::X64);
        assert_eq!(def.dependencies.len(), 1);
        assert_eq!(def.dependencies[0].name, "OpenTAP");
    }

    #[test]
    fn missing_os_and_arch_default_to_portable() {
        let json = r#"{ "name": "Tool", "version": "1.0.0" }"#;
        let doc: PackageDocument = serde_json::from_str(json).unwrap();
        let def = doc.into_def(None).unwrap();

        assert_eq!(def.identity.os, "any");
        assert_eq!(def.identity.arch, CpuArchitecture::AnyCpu);
        assert!(def.source_repository.is_none());
    }

    #[test]
    fn from_def_round_trips() {
        let json = r#"{
            "name": "Demonstration",
            "version": "9.1.0",
            "os": "linux",
            "architecture": "x64",
            "dependencies": { "OpenTAP": "^9.12.0" }
        }"#;

        let doc: PackageDocument = serde_json::from_str(json).unwrap();
        let def = doc.into_def(None).unwrap();
        let back = PackageDocument::from_def(&def).into_def(None).unwrap();

        assert_eq!(def, back);
    }

    #[test]
    fn malformed_dependency_spec_is_a_parse_error() {
        let json = r#"{
            "name": "Broken",
            "version": "1.0.0",
            "dependencies": { "Dep": "not-a-version" }
        }"#;

        let doc: PackageDocument = serde_json::from_str(json).unwrap();
        assert!(doc.into_def(None).is_err());
    }
}
