use async_trait::async_trait;
use fieldtrack_config::settings::MediaSettings;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use super::MediaStorage;

/// Uploads evidence with a plain HTTP `PUT` to an object store endpoint
/// (S3-compatible gateways, MinIO, nginx WebDAV).
pub struct HttpMediaStorage {
    client: Client,
    upload_url: String,
    public_base_url: String,
    access_token: Option<String>,
}

impl HttpMediaStorage {
    pub fn new(upload_url: String, public_base_url: String, access_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            upload_url: upload_url.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self::new(
            settings.upload_url.clone(),
            settings.public_base_url.clone(),
            settings.access_token.clone(),
        )
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl MediaStorage for HttpMediaStorage {
    fn provider_name(&self) -> &str {
        "http"
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        path_hint: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let path = path_hint.trim_start_matches('/');
        let mut req = self
            .client
            .put(format!("{}/{}", self.upload_url, path))
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| format!("Upload request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Upload rejected with {}: {}", status, body));
        }

        Ok(self.public_url(path))
    }
}
