use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use imago_semver::VersionSpecifier;

use crate::error::ImagoError;
use crate::image::ImageSpecifier;
use crate::package::{PackageDef, PackageDocument, PackageSpecifier};
use crate::platform::CpuArchitecture;
use crate::Result;

/// Builds the augmented image specifier for a merge: the existing
/// installation is carried as soft constraints next to the new roots.
///
/// Installed packages named by a new root are replaced outright. Every
/// other installed package is retained: pinned `Compatible(installed)` so
/// the resolver may move it within its major when the new roots force an
/// upgrade, and seeded into the dependency cache with its installed
/// metadata. A root whose name is a package file on disk is loaded and
/// pinned to exactly its version.
pub fn merge_image(
    installed: &[PackageDef],
    new_roots: Vec<PackageSpecifier>,
    repositories: Vec<String>,
    os: impl Into<String>,
    arch: CpuArchitecture,
) -> Result<ImageSpecifier> {
    let mut roots = Vec::with_capacity(new_roots.len());
    let mut side_loaded = Vec::new();

    for root in new_roots {
        let path = Path::new(&root.name);
        if path.is_file() {
            let def = load_package_file(path)?;
            roots.push(PackageSpecifier::new(
                def.identity.name.clone(),
                VersionSpecifier::exact(def.identity.version.clone()),
            ));
            side_loaded.push(def);
        } else {
            roots.push(root);
        }
    }

    let replaced: BTreeSet<String> = roots.iter().map(|root| root.name.clone()).collect();

    let mut builder = ImageSpecifier::builder().os(os).arch(arch);
    for url in repositories {
        builder = builder.repository(url);
    }
    for root in roots {
        builder = builder.root(root);
    }

    for def in installed {
        if replaced.contains(def.name()) {
            continue;
        }

        builder = builder
            .fixed(PackageSpecifier::new(
                def.name(),
                VersionSpecifier::compatible(def.version().clone()),
            ))
            .installed(def.clone());
    }

    for def in side_loaded {
        builder = builder.installed(def);
    }

    builder.build()
}

/// Reads one package definition document from disk.
pub fn load_package_file(path: &Path) -> Result<PackageDef> {
    let data = fs::read_to_string(path).map_err(|source| ImagoError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let document: PackageDocument =
        serde_json::from_str(&data).map_err(|source| ImagoError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(document.into_def(None)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageIdentity;
    use imago_semver::Version;

    fn installed(name: &str, version: &str) -> PackageDef {
        PackageDef {
            identity: PackageIdentity {
                name: name.to_string(),
                version: Version::parse(version).unwrap(),
                os: "linux".to_string(),
                arch: CpuArchitecture::AnyCpu,
            },
            dependencies: Vec::new(),
            source_repository: None,
        }
    }

    #[test]
    fn retained_packages_become_compatible_pins_and_seeds() {
        let image = merge_image(
            &[installed("OpenTAP", "9.12.0"), installed("Extra", "1.2.0")],
            vec![PackageSpecifier::new(
                "Demonstration",
                VersionSpecifier::parse("^9.0.0").unwrap(),
            )],
            vec!["https://packages.example".to_string()],
            "linux",
            CpuArchitecture::X64,
        )
        .unwrap();

        assert_eq!(image.roots.len(), 1);
        assert_eq!(image.fixed_packages.len(), 2);
        assert_eq!(image.installed_packages.len(), 2);
        assert_eq!(
            image.fixed_packages[0].version,
            VersionSpecifier::compatible(Version::parse("9.12.0").unwrap())
        );
    }

    #[test]
    fn a_root_replaces_the_installed_package_of_the_same_name() {
        let image = merge_image(
            &[installed("OpenTAP", "9.12.0")],
            vec![PackageSpecifier::new(
                "OpenTAP",
                VersionSpecifier::parse("^9.14.0").unwrap(),
            )],
            Vec::new(),
            "linux",
            CpuArchitecture::X64,
        )
        .unwrap();

        assert!(image.fixed_packages.is_empty());
        assert!(image.installed_packages.is_empty());
        assert_eq!(image.roots.len(), 1);
    }

    #[test]
    fn a_file_root_is_loaded_and_pinned_exact() {
        let dir = std::env::temp_dir().join("imago-merge-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("SideLoaded.json");
        fs::write(
            &path,
            r#"{ "name": "SideLoaded", "version": "2.0.0", "os": "linux" }"#,
        )
        .unwrap();

        let image = merge_image(
            &[],
            vec![PackageSpecifier::new(
                path.display().to_string(),
                VersionSpecifier::Any,
            )],
            Vec::new(),
            "linux",
            CpuArchitecture::X64,
        )
        .unwrap();

        fs::remove_file(&path).unwrap();

        assert_eq!(image.roots.len(), 1);
        assert_eq!(image.roots[0].name, "SideLoaded");
        assert_eq!(
            image.roots[0].version,
            VersionSpecifier::exact(Version::parse("2.0.0").unwrap())
        );
        assert_eq!(image.installed_packages.len(), 1);
        assert!(image.installed_packages[0].source_repository.is_none());
    }
}
