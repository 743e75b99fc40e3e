use std::collections::BTreeMap;
use std::fmt;

use imago_semver::{Version, VersionSpecifier};

use crate::package::PackageDef;

/// Where a version constraint on a package came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequirementOrigin {
    /// A root specifier of the image.
    Root,
    /// A fixed specifier added for an installed package.
    Fixed,
    /// A dependency edge of a selected candidate, `name@version`.
    Dependency(String),
}

impl fmt::Display for RequirementOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementOrigin::Root => f.write_str("the image"),
            RequirementOrigin::Fixed => f.write_str("the installed set"),
            RequirementOrigin::Dependency(parent) => f.write_str(parent),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Requirement {
    pub origin: RequirementOrigin,
    pub specifier: VersionSpecifier,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.specifier, self.origin)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// The name has no candidates anywhere.
    PackageNotFound,
    /// Candidates exist but none fits the target OS or architecture.
    NoCompatibleVariant,
    /// Two specifiers for the same name cannot both hold.
    ConstraintIntersectionEmpty,
    /// The search exhausted every assignment.
    DependencyUnsatisfiable,
}

#[derive(Clone, Debug)]
pub struct ConflictReport {
    pub kind: ConflictKind,
    pub name: String,
    pub requirements: Vec<Requirement>,
    pub message: String,
}

/// The outcome of one resolver invocation. `assignments` and `packages`
/// are meaningful when `success` holds; `conflicts` and `diagnostic` are
/// always populated with whatever the search observed.
#[derive(Debug)]
pub struct ImageResolution {
    pub assignments: BTreeMap<String, Version>,
    pub success: bool,
    pub diagnostic: String,
    pub conflicts: Vec<ConflictReport>,
    pub packages: Vec<PackageDef>,
}
