//! HTTP client for the catalog REST API.
//!
//! Targets are addressed as `{base}/{endpoint}.json{path}` with matrix
//! parameters for version (`;v=`) and site (`;s=`), e.g.
//! `/search.json/LSST;v=current;s=all?filter=...&max=1000`.

use crate::client::CatalogClient;
use crate::error::{CatalogError, Result};
use crate::types::{unpack, Dataset, DatasetPatch, NewDataset, SearchQuery, VersionId};
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    /// Root of the REST API, e.g. `http://host:8180/rest-datacat-v1/r`
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpCatalogClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|source| CatalogError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CatalogError::HttpClient)?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target_url(&self, endpoint: &str, path: &str, matrix: &[(&str, &str)]) -> Result<Url> {
        let mut raw = format!(
            "{}/{}.json",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint
        );
        if !path.starts_with('/') {
            raw.push('/');
        }
        raw.push_str(path);
        for (key, value) in matrix {
            raw.push(';');
            raw.push_str(key);
            raw.push('=');
            raw.push_str(value);
        }
        Url::parse(&raw).map_err(|source| CatalogError::InvalidUrl { url: raw, source })
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>> {
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::from_send(method.clone(), &url, e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CatalogError::from_body(method.clone(), &url, e))?;

        debug!(%method, %url, status = status.as_u16(), bytes = body.len(), "Catalog response");

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(CatalogError::from_response(status.as_u16(), &body))
        }
    }

    /// Register a new dataset under `folder`.
    pub async fn create_dataset(&self, folder: &str, dataset: &NewDataset) -> Result<()> {
        let url = self.target_url("datasets", folder, &[])?;
        let request = self.http_client.post(url.clone()).json(dataset);
        self.send(Method::POST, url, request).await?;
        Ok(())
    }

    /// Remove a dataset and all of its versions.
    pub async fn delete_dataset(&self, path: &str) -> Result<()> {
        let url = self.target_url("datasets", path, &[])?;
        let request = self.http_client.delete(url.clone());
        self.send(Method::DELETE, url, request).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Dataset>> {
        let url = self.target_url(
            "search",
            &query.folder,
            &[("v", query.version.as_str()), ("s", query.site.as_str())],
        )?;
        let params = [
            ("filter", query.filter.clone()),
            ("max", query.max_num.to_string()),
        ];
        let request = self.http_client.get(url.clone()).query(&params);
        let body = self.send(Method::GET, url, request).await?;
        Ok(unpack(&body)?)
    }

    async fn patch_dataset(
        &self,
        path: &str,
        patch: &DatasetPatch,
        version_id: &VersionId,
        site: Option<&str>,
    ) -> Result<()> {
        let mut matrix = vec![("v", version_id.as_str())];
        if let Some(site) = site {
            matrix.push(("s", site));
        }
        let url = self.target_url("datasets", path, &matrix)?;
        debug!(%url, patch = patch.kind(), "Patching dataset");
        let request = self.http_client.patch(url.clone()).json(patch);
        self.send(Method::PATCH, url, request).await?;
        Ok(())
    }
}
