use imago_semver::VersionSpecifier;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::ImagoError;
use crate::image::ImageSpecifierBuilder;
use crate::package::PackageSpecifier;
use crate::platform::CpuArchitecture;
use crate::Result;

/// An image description as read from a file or the command line, before
/// version specifiers and architectures are parsed.
///
/// Three formats are auto-detected by the first non-blank byte: `<` is
/// XML, `[` or `{` is JSON, anything else is the compact
/// `name[:version][,name[:version]...]` form.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ImageDocument {
    #[serde(default)]
    pub packages: Vec<DocumentPackage>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct DocumentPackage {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl ImageDocument {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim_start().chars().next() {
            Some('<') => parse_xml(input),
            Some('[') | Some('{') => parse_json(input),
            _ => Ok(parse_compact(input)),
        }
    }

    /// Converts the raw document into a specifier builder, parsing version
    /// constraints and architecture names as it goes. The caller supplies
    /// the target platform before `build()`.
    pub fn into_builder(self) -> Result<ImageSpecifierBuilder> {
        let mut builder = ImageSpecifierBuilder::default();

        if let Some(os) = self.os {
            builder = builder.os(os);
        }
        if let Some(arch) = &self.architecture {
            builder = builder.arch(parse_arch(arch)?);
        }
        for url in self.repositories {
            builder = builder.repository(url);
        }

        for package in self.packages {
            let version = VersionSpecifier::parse(package.version.as_deref().unwrap_or(""))?;
            let mut specifier = PackageSpecifier::new(package.name, version);
            if let Some(os) = package.os {
                specifier = specifier.with_os(os);
            }
            if let Some(arch) = &package.architecture {
                specifier = specifier.with_arch(parse_arch(arch)?);
            }
            builder = builder.root(specifier);
        }

        Ok(builder)
    }
}

fn parse_arch(value: &str) -> Result<CpuArchitecture> {
    value
        .parse()
        .map_err(|reason| ImagoError::Document { reason })
}

fn parse_json(input: &str) -> Result<ImageDocument> {
    if input.trim_start().starts_with('[') {
        let packages: Vec<DocumentPackage> =
            serde_json::from_str(input).map_err(|err| ImagoError::Document {
                reason: err.to_string(),
            })?;
        return Ok(ImageDocument {
            packages,
            ..ImageDocument::default()
        });
    }

    serde_json::from_str(input).map_err(|err| ImagoError::Document {
        reason: err.to_string(),
    })
}

fn parse_compact(input: &str) -> ImageDocument {
    let mut document = ImageDocument::default();

    for entry in input.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (name, version) = match entry.split_once(':') {
            Some((name, version)) => (name.trim(), Some(version.trim().to_string())),
            None => (entry, None),
        };

        document.packages.push(DocumentPackage {
            name: name.to_string(),
            version,
            os: None,
            architecture: None,
        });
    }

    document
}

fn parse_xml(input: &str) -> Result<ImageDocument> {
    let mut reader = Reader::from_str(input);
    let mut document = ImageDocument::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                let name = element.name();
                if name.as_ref().eq_ignore_ascii_case(b"Image") {
                    document.os = attribute(&element, b"OS")?.or(document.os);
                    document.architecture =
                        attribute(&element, b"Architecture")?.or(document.architecture);
                } else if name.as_ref().eq_ignore_ascii_case(b"Package") {
                    let package_name =
                        attribute(&element, b"name")?.ok_or_else(|| ImagoError::Document {
                            reason: "Package element without a name attribute".to_string(),
                        })?;
                    document.packages.push(DocumentPackage {
                        name: package_name,
                        version: attribute(&element, b"version")?,
                        os: attribute(&element, b"os")?,
                        architecture: attribute(&element, b"architecture")?,
                    });
                } else if name.as_ref().eq_ignore_ascii_case(b"Repository") {
                    if let Some(url) = attribute(&element, b"url")? {
                        document.repositories.push(url);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(ImagoError::Document {
                    reason: err.to_string(),
                })
            }
        }
    }

    Ok(document)
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| ImagoError::Document {
            reason: err.to_string(),
        })?;
        if attr.key.as_ref().eq_ignore_ascii_case(key) {
            let value = attr.unescape_value().map_err(|err| ImagoError::Document {
                reason: err.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_and_parses_compact_lists() {
        let document = ImageDocument::parse("OpenTAP:^9.12.0, Demonstration").unwrap();

        assert_eq!(document.packages.len(), 2);
        assert_eq!(document.packages[0].name, "OpenTAP");
        assert_eq!(document.packages[0].version.as_deref(), Some("^9.12.0"));
        assert_eq!(document.packages[1].name, "Demonstration");
        assert_eq!(document.packages[1].version, None);
    }

    #[test]
    fn detects_and_parses_json_objects() {
        let input = r#"{
            "packages": [ { "name": "OpenTAP", "version": "^9.12.0" } ],
            "repositories": [ "https://packages.example" ],
            "os": "linux",
            "architecture": "x64"
        }"#;

        let document = ImageDocument::parse(input).unwrap();
        assert_eq!(document.packages.len(), 1);
        assert_eq!(document.os.as_deref(), Some("linux"));
        assert_eq!(document.repositories.len(), 1);
    }

    #[test]
    fn detects_and_parses_json_arrays() {
        let input = r#"[ { "name": "OpenTAP" }, { "name": "Demonstration", "version": "^9.0.0" } ]"#;

        let document = ImageDocument::parse(input).unwrap();
        assert_eq!(document.packages.len(), 2);
        assert!(document.repositories.is_empty());
    }

    #[test]
    fn detects_and_parses_xml() {
        let input = r#"
            <Image OS="linux" Architecture="x64">
                <Repository url="https://packages.example"/>
                <Package name="OpenTAP" version="^9.12.0"/>
                <Package name="Native" architecture="x86"/>
            </Image>
        "#;

        let document = ImageDocument::parse(input).unwrap();
        assert_eq!(document.os.as_deref(), Some("linux"));
        assert_eq!(document.architecture.as_deref(), Some("x64"));
        assert_eq!(document.repositories.len(), 1);
        assert_eq!(document.packages.len(), 2);
        assert_eq!(
            document.packages[1].architecture.as_deref(),
            Some("x86")
        );
    }

    #[test]
    fn builder_conversion_parses_specifiers() {
        let document = ImageDocument::parse("OpenTAP:^9.12.0,Tools").unwrap();
        let image = document
            .into_builder()
            .unwrap()
            .os("linux")
            .arch(CpuArchitecture::X64)
            .build()
            .unwrap();

        assert_eq!(image.roots.len(), 2);
        assert_eq!(
            image.roots[0].version,
            VersionSpecifier::parse("^9.12.0").unwrap()
        );
        assert_eq!(image.roots[1].version, VersionSpecifier::AnyRelease);
    }

    #[test]
    fn malformed_xml_is_a_document_error() {
        assert!(ImageDocument::parse("<Image><Package</Image>").is_err());
    }

    #[test]
    fn malformed_specifier_is_a_parse_error() {
        let document = ImageDocument::parse("Tool:not.a.version").unwrap();
        assert!(document.into_builder().is_err());
    }
}
