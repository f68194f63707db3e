use crate::cloud::status_error;
use crate::document::{ObjectStore, SourceRef};
use crate::error::{MappingError, Result};
use futures::future::BoxFuture;
use log::{debug, warn};
use reqwest::{Client, Url};

const GCS_BASE_URL: &str = "https://storage.googleapis.com/storage/v1";

/// [`ObjectStore`] reading `gs://bucket/path` objects through the Cloud
/// Storage JSON API.
#[derive(Clone)]
pub struct GcsObjectStore {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GcsObjectStore {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            base_url: GCS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Media download URL; the object path is a single encoded segment.
    pub(crate) fn object_url(&self, source: &SourceRef) -> Result<Url> {
        if source.scheme != "gs" {
            return Err(MappingError::InvalidSourceRef(source.to_string()));
        }

        let mut url =
            Url::parse(&self.base_url).map_err(|e| MappingError::InvalidConfig(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| {
                MappingError::InvalidConfig(format!("'{}' cannot be a base URL", self.base_url))
            })?
            .extend(["b", source.bucket.as_str(), "o", source.path.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    async fn download(&self, source: &SourceRef) -> Result<Vec<u8>> {
        let url = self.object_url(source)?;
        debug!("Downloading {}", source);

        let res = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            warn!("Cloud Storage error (status {})", status);
            return Err(status_error(
                "Cloud Storage",
                status,
                err_text,
                MappingError::Transport,
            ));
        }

        Ok(res.bytes().await?.to_vec())
    }
}

impl ObjectStore for GcsObjectStore {
    fn fetch<'a>(&'a self, source: &'a SourceRef) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(self.download(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_path() {
        let store = GcsObjectStore::new("token");
        let source = SourceRef::parse("gs://statements/2023/acme q4.pdf").unwrap();
        let url = store.object_url(&source).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/statements/o/2023%2Facme%20q4.pdf?alt=media"
        );
    }

    #[test]
    fn test_non_gcs_scheme_rejected() {
        let store = GcsObjectStore::new("token");
        let source = SourceRef::parse("s3://bucket/file.pdf").unwrap();
        assert!(matches!(
            store.object_url(&source),
            Err(MappingError::InvalidSourceRef(_))
        ));
    }
}
