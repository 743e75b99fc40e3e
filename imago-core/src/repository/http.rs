use imago_semver::Version;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::console;
use crate::package::{PackageDef, PackageDocument};
use crate::platform::CpuArchitecture;
use crate::repository::{DefHandle, RepositoryError, RepositoryErrorKind, VersionEntry};

#[derive(Debug, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    versions: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
}

/// A repository behind an HTTP index.
///
/// `GET {base}/packages/{name}?os={os}&arch={arch}` lists candidate
/// versions already filtered for the target platform;
/// `GET {base}/packages/{name}/{version}` returns one full definition.
#[derive(Debug)]
pub struct HttpRepository {
    base: String,
    client: Client,
}

impl HttpRepository {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, Client::new())
    }

    pub fn with_client(base: impl Into<String>, client: Client) -> Self {
        let base = base.into();
        HttpRepository {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.base
    }

    pub async fn list_versions(
        &self,
        name: &str,
        os: &str,
        arch: CpuArchitecture,
    ) -> Result<Vec<VersionEntry>, RepositoryError> {
        let url = format!("{}/packages/{}?os={}&arch={}", self.base, name, os, arch);

        if console::is_verbose() {
            console::verbose(&format!("repository request: name={name} url={url}"));
        }

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|err| self.wrap(&url, &err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let index = response
            .error_for_status()
            .map_err(|err| self.wrap(&url, &err))?
            .json::<IndexDocument>()
            .await
            .map_err(|err| RepositoryError::permanent(&url, format!("decode failed: {err}")))?;

        let mut entries = Vec::with_capacity(index.versions.len());
        for entry in index.versions {
            let version = Version::parse(&entry.version).map_err(|err| {
                RepositoryError::permanent(&url, format!("bad version {}: {err}", entry.version))
            })?;
            entries.push(VersionEntry {
                version,
                handle: DefHandle::Remote {
                    name: name.to_string(),
                    version: entry.version,
                },
            });
        }

        entries.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(entries)
    }

    pub async fn get_definition(
        &self,
        name: &str,
        version: &str,
    ) -> Result<PackageDef, RepositoryError> {
        let url = format!("{}/packages/{}/{}", self.base, name, version);

        let document = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|err| self.wrap(&url, &err))?
            .error_for_status()
            .map_err(|err| self.wrap(&url, &err))?
            .json::<PackageDocument>()
            .await
            .map_err(|err| RepositoryError::permanent(&url, format!("decode failed: {err}")))?;

        document
            .into_def(Some(self.base.clone()))
            .map_err(|err| RepositoryError::permanent(&url, err))
    }

    pub async fn names(&self) -> Result<Vec<String>, RepositoryError> {
        let url = format!("{}/packages", self.base);

        self.client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|err| self.wrap(&url, &err))?
            .error_for_status()
            .map_err(|err| self.wrap(&url, &err))?
            .json::<Vec<String>>()
            .await
            .map_err(|err| RepositoryError::permanent(&url, format!("decode failed: {err}")))
    }

    fn wrap(&self, url: &str, err: &reqwest::Error) -> RepositoryError {
        let kind = if err.is_timeout() || err.is_connect() {
            RepositoryErrorKind::Transient
        } else if let Some(status) = err.status() {
            if status.is_server_error() {
                RepositoryErrorKind::Transient
            } else {
                RepositoryErrorKind::Permanent
            }
        } else {
            RepositoryErrorKind::Transient
        };

        RepositoryError {
            url: url.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}
