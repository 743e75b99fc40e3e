use std::error::Error as StdError;
use std::fmt;

pub use semver::Version;

/// A version constraint attached to a package requirement.
///
/// The grammar is deliberately small: `^1.2.3` keeps the major version,
/// `1.2.3` pins an exact version, `1.2` keeps major and minor, the empty
/// string accepts any release and `*` accepts anything at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionSpecifier {
    /// Matches every version, pre-releases included.
    Any,
    /// Matches every version without a pre-release tag.
    AnyRelease,
    /// Matches exactly one version.
    Exact(Version),
    /// Matches `w` with the same major as the reference, `w >= reference`,
    /// where `w` is a release unless the reference itself is a pre-release.
    Compatible(Version),
    /// Matches the reference's major.minor with a patch at or above the
    /// reference's.
    MinimumCompatible(Version),
}

#[derive(Debug, Clone)]
pub struct Error {
    input: String,
    message: String,
}

impl Error {
    pub fn new(input: String, message: String) -> Self {
        Self { input, message }
    }

    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.input)
    }
}

impl StdError for Error {}

impl VersionSpecifier {
    pub fn parse(original: &str) -> Result<Self, Error> {
        let s = original.trim();

        if s.is_empty() {
            return Ok(VersionSpecifier::AnyRelease);
        }

        if s == "*" || s.eq_ignore_ascii_case("any") {
            return Ok(VersionSpecifier::Any);
        }

        if let Some(rest) = s.strip_prefix('^') {
            let version = parse_full(original, rest)?;
            return Ok(VersionSpecifier::Compatible(version));
        }

        if let Ok(version) = Version::parse(s) {
            return Ok(VersionSpecifier::Exact(version));
        }

        if let Some((major, minor)) = parse_major_minor(s) {
            return Ok(VersionSpecifier::MinimumCompatible(Version::new(
                major, minor, 0,
            )));
        }

        Err(Error::new(
            original.to_string(),
            "expected ^X.Y.Z, X.Y.Z, X.Y, empty or *".to_string(),
        ))
    }

    /// Pin a concrete version.
    pub fn exact(version: Version) -> Self {
        VersionSpecifier::Exact(version)
    }

    /// Accept the version and everything above it within its major.
    pub fn compatible(version: Version) -> Self {
        VersionSpecifier::Compatible(version)
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpecifier::Any => true,
            VersionSpecifier::AnyRelease => version.pre.is_empty(),
            VersionSpecifier::Exact(reference) => version == reference,
            VersionSpecifier::Compatible(reference) => {
                version.major == reference.major
                    && version >= reference
                    && (version.pre.is_empty() || !reference.pre.is_empty())
            }
            VersionSpecifier::MinimumCompatible(reference) => {
                version.major == reference.major
                    && version.minor == reference.minor
                    && version.patch >= reference.patch
            }
        }
    }

    /// Whether some version can satisfy both specifiers.
    ///
    /// Decided over the abstract version space, not any concrete candidate
    /// list; two specifiers can be compatible even when no repository
    /// carries a version in the overlap.
    pub fn is_compatible(&self, other: &VersionSpecifier) -> bool {
        use VersionSpecifier::*;

        match (self, other) {
            (Any, _) | (_, Any) => true,
            (AnyRelease, AnyRelease) => true,
            (AnyRelease, Exact(v)) | (Exact(v), AnyRelease) => v.pre.is_empty(),
            // Every Compatible and MinimumCompatible range contains releases.
            (AnyRelease, _) | (_, AnyRelease) => true,
            (Exact(u), Exact(v)) => u == v,
            (Exact(v), spec) | (spec, Exact(v)) => spec.matches(v),
            (Compatible(a), Compatible(b)) => a.major == b.major,
            (Compatible(c), MinimumCompatible(m)) | (MinimumCompatible(m), Compatible(c)) => {
                c.major == m.major && m.minor >= c.minor
            }
            (MinimumCompatible(a), MinimumCompatible(b)) => {
                a.major == b.major && a.minor == b.minor
            }
        }
    }

    /// The intersection of two compatible specifiers, `None` when it is
    /// empty. A `Compatible` and a `MinimumCompatible` tighten into a new
    /// `MinimumCompatible` floored at the higher reference; every other
    /// pairing keeps the more restrictive of the two inputs.
    pub fn intersect(&self, other: &VersionSpecifier) -> Option<VersionSpecifier> {
        if !self.is_compatible(other) {
            return None;
        }

        // Neither input alone expresses the overlap: the minimum pins
        // major.minor while the caret raises the floor. Compatibility has
        // already established that the minimum's minor is not below the
        // caret reference's.
        if let (VersionSpecifier::Compatible(caret), VersionSpecifier::MinimumCompatible(floor))
        | (VersionSpecifier::MinimumCompatible(floor), VersionSpecifier::Compatible(caret)) =
            (self, other)
        {
            let reference = if caret >= floor { caret } else { floor };
            return Some(VersionSpecifier::MinimumCompatible(reference.clone()));
        }

        let picked = match self.rank().cmp(&other.rank()) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => match (self, other) {
                (VersionSpecifier::Compatible(a), VersionSpecifier::Compatible(b))
                | (
                    VersionSpecifier::MinimumCompatible(a),
                    VersionSpecifier::MinimumCompatible(b),
                ) => {
                    if a >= b {
                        self
                    } else {
                        other
                    }
                }
                _ => self,
            },
        };

        Some(picked.clone())
    }

    /// True when the specifier explicitly asks for a pre-release: an
    /// `Exact` pin on one, or a `Compatible` whose reference is one.
    pub fn permits_prerelease(&self) -> bool {
        match self {
            VersionSpecifier::Exact(reference) | VersionSpecifier::Compatible(reference) => {
                !reference.pre.is_empty()
            }
            VersionSpecifier::Any
            | VersionSpecifier::AnyRelease
            | VersionSpecifier::MinimumCompatible(_) => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            VersionSpecifier::Any => 0,
            VersionSpecifier::AnyRelease => 1,
            VersionSpecifier::Compatible(_) => 2,
            VersionSpecifier::MinimumCompatible(_) => 3,
            VersionSpecifier::Exact(_) => 4,
        }
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpecifier::Any => write!(f, "any"),
            VersionSpecifier::AnyRelease => write!(f, "any release"),
            VersionSpecifier::Exact(v) => write!(f, "{v}"),
            VersionSpecifier::Compatible(v) => write!(f, "^{v}"),
            VersionSpecifier::MinimumCompatible(v) => {
                if v.patch == 0 {
                    write!(f, "{}.{}", v.major, v.minor)
                } else {
                    write!(f, "{}.{}.{}", v.major, v.minor, v.patch)
                }
            }
        }
    }
}

fn parse_full(original: &str, s: &str) -> Result<Version, Error> {
    Version::parse(s.trim()).map_err(|err| Error::new(original.to_string(), err.to_string()))
}

fn parse_major_minor(s: &str) -> Option<(u64, u64)> {
    let (major, minor) = s.split_once('.')?;
    let major = major.parse().ok()?;
    let minor = minor.parse().ok()?;
    Some((major, minor))
}
