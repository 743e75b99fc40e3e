use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CPU architecture a package targets, or a host runs.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CpuArchitecture {
    #[default]
    Unspecified,
    AnyCpu,
    X86,
    X64,
    Arm,
    Arm64,
}

impl CpuArchitecture {
    /// Whether a host of this architecture can run a plugin built for
    /// `plugin`.
    pub fn supports(self, plugin: CpuArchitecture) -> bool {
        plugin == CpuArchitecture::AnyCpu || self == CpuArchitecture::Unspecified || self == plugin
    }

    /// Whether two plugins can be installed side by side.
    pub fn coexists_with(self, other: CpuArchitecture) -> bool {
        self == CpuArchitecture::AnyCpu || other == CpuArchitecture::AnyCpu || self == other
    }
}

impl fmt::Display for CpuArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CpuArchitecture::Unspecified => "unspecified",
            CpuArchitecture::AnyCpu => "anycpu",
            CpuArchitecture::X86 => "x86",
            CpuArchitecture::X64 => "x64",
            CpuArchitecture::Arm => "arm",
            CpuArchitecture::Arm64 => "arm64",
        };
        f.write_str(name)
    }
}

impl FromStr for CpuArchitecture {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "unspecified" | "" => Ok(CpuArchitecture::Unspecified),
            "anycpu" | "any" => Ok(CpuArchitecture::AnyCpu),
            "x86" => Ok(CpuArchitecture::X86),
            "x64" | "x86_64" | "amd64" => Ok(CpuArchitecture::X64),
            "arm" => Ok(CpuArchitecture::Arm),
            "arm64" | "aarch64" => Ok(CpuArchitecture::Arm64),
            other => Err(format!("unknown CPU architecture: {other}")),
        }
    }
}

pub fn current_os() -> &'static str {
    std::env::consts::OS
}

pub fn current_arch() -> CpuArchitecture {
    match std::env::consts::ARCH {
        "x86" => CpuArchitecture::X86,
        "x86_64" => CpuArchitecture::X64,
        "arm" => CpuArchitecture::Arm,
        "aarch64" => CpuArchitecture::Arm64,
        _ => CpuArchitecture::Unspecified,
    }
}

/// Case-insensitive OS match; a package tagged `any` installs everywhere.
pub fn os_matches(package_os: &str, target_os: &str) -> bool {
    package_os.eq_ignore_ascii_case(target_os) || package_os.eq_ignore_ascii_case("any")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anycpu_runs_everywhere() {
        assert!(CpuArchitecture::X64.supports(CpuArchitecture::AnyCpu));
        assert!(CpuArchitecture::Arm64.supports(CpuArchitecture::AnyCpu));
    }

    #[test]
    fn unspecified_host_accepts_anything() {
        assert!(CpuArchitecture::Unspecified.supports(CpuArchitecture::X86));
        assert!(CpuArchitecture::Unspecified.supports(CpuArchitecture::Arm));
    }

    #[test]
    fn mismatched_concrete_archs_are_rejected() {
        assert!(!CpuArchitecture::X64.supports(CpuArchitecture::X86));
        assert!(CpuArchitecture::X64.supports(CpuArchitecture::X64));
    }

    #[test]
    fn coexistence_requires_anycpu_or_equality() {
        assert!(CpuArchitecture::X64.coexists_with(CpuArchitecture::AnyCpu));
        assert!(CpuArchitecture::AnyCpu.coexists_with(CpuArchitecture::Arm));
        assert!(CpuArchitecture::X64.coexists_with(CpuArchitecture::X64));
        assert!(!CpuArchitecture::X64.coexists_with(CpuArchitecture::X86));
    }

    #[test]
    fn os_match_is_case_insensitive() {
        assert!(os_matches("Linux", "linux"));
        assert!(os_matches("any", "windows"));
        assert!(!os_matches("windows", "linux"));
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(
            "x86_64".parse::<CpuArchitecture>().unwrap(),
            CpuArchitecture::X64
        );
        assert_eq!(
            "AnyCPU".parse::<CpuArchitecture>().unwrap(),
            CpuArchitecture::AnyCpu
        );
    }
}
