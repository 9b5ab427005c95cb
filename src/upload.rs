//! Archive upload over HTTP
//!
//! Each archive is sent as a single `multipart/form-data` POST with one field
//! named `file`. Basic authentication is added only when both a username and
//! a password are configured. Any 2xx response counts as delivered.

use crate::error::{DeliveryError, Result};
use crate::throttle::{DeliveryState, UploadThrottle};
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Overall timeout for one upload request
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Multipart field carrying the archive
pub const UPLOAD_FIELD: &str = "file";

/// Sends archives to the collection server
pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
    throttle: UploadThrottle,
}

impl Uploader {
    /// Create an uploader for `endpoint`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(
        endpoint: impl Into<String>,
        credentials: Option<(&str, &str)>,
        throttle: UploadThrottle,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .user_agent(concat!("astrocam/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
            throttle,
        })
    }

    /// Upload one archive, honouring the throttle
    ///
    /// The attempt start is recorded in `state` before the request goes out.
    pub async fn upload(&self, state: &mut DeliveryState, archive: &Path) -> Result<()> {
        let bytes = tokio::fs::read(archive)
            .await
            .map_err(|source| DeliveryError::ReadFailed {
                archive: archive.to_path_buf(),
                source,
            })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.throttle.wait(state).await;

        info!(archive = %file_name, size = bytes.len(), endpoint = %self.endpoint, "uploading archive");

        let form = Form::new().part(UPLOAD_FIELD, Part::bytes(bytes).file_name(file_name));
        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                archive: archive.to_path_buf(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(archive = %archive.display(), status = status.as_u16(), "upload accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let reason = match body.trim() {
            "" => status.canonical_reason().unwrap_or("unknown status").to_string(),
            text => text.chars().take(200).collect(),
        };

        Err(DeliveryError::Rejected {
            archive: archive.to_path_buf(),
            status: status.as_u16(),
            reason,
        }
        .into())
    }
}
