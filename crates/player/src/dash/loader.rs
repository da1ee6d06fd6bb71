use reqwest::header::ACCEPT;
use url::Url;

use super::Manifest;
use crate::{util::http::HttpClient, DashError, DashResult};

const MPD_ACCEPT: &str = "application/dash+xml,video/vnd.mpeg.dash.mpd";

/// Fetches and parses a manifest.
///
/// Once a manifest carries a `Location` element, later loads are made against it instead of
/// the original address.
pub struct ManifestLoader {
    client: HttpClient,
    url: Url,
}

impl ManifestLoader {
    pub fn new(client: HttpClient, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn load(&mut self) -> DashResult<Manifest> {
        tracing::debug!(url = %self.url, "loading manifest");

        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, MPD_ACCEPT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(DashError::HttpError(status));
        }

        // relative URLs resolve against the final address after redirects
        let base_url = response.url().clone();
        let document = response.bytes().await?;
        let manifest = Manifest::parse(&document, &base_url)?;

        if let Some(location) = &manifest.location {
            if location != &self.url {
                tracing::info!(location = %location, "manifest moved");
                self.url = location.clone();
            }
        }
        tracing::info!(
            periods = manifest.periods.len(),
            dynamic = manifest.dynamic,
            "manifest loaded"
        );
        Ok(manifest)
    }
}
