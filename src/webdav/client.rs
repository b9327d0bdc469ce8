//! WebDAV client (C2): authenticated PROPFIND/GET/PUT/DELETE against a
//! Nextcloud server, plus the pre-pass server-identity check.
//!
//! Grounded on `services/webdav/service.rs`'s `WebDAVService`, the
//! `Client::builder()` timeout setup and `authenticated_request` request
//! construction, but with the retry/backoff loop removed: this engine
//! never retries within a pass, so a failed request surfaces immediately
//! and the unresolved state re-enters the action list on the next pass.

use bytes::Bytes;
use futures_util::Stream;
use reqwest::{Client, Method, StatusCode};

use crate::error::{Result, SyncError};
use crate::webdav::config::WebDAVConfig;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getcontenttype/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

pub struct DavClient {
    http: Client,
    config: WebDAVConfig,
}

impl DavClient {
    /// Builds a client that rejects invalid TLS certificates. This is a
    /// hard policy, not a configurable toggle: the default
    /// `reqwest::Client` already refuses self-signed/invalid certs, so no
    /// `danger_accept_invalid_certs` call appears anywhere in this module.
    pub fn new(config: WebDAVConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncError::NetworkIo {
                url: config.webdav_url(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    /// Issues the fixed PROPFIND request body at the given URL and depth.
    pub async fn propfind(&self, url: &str, depth: &str) -> Result<String> {
        let response = self
            .http
            .request(Method::from_bytes(b"PROPFIND").unwrap(), url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| classify_request_error(e, url))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::from_u16(207).unwrap() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|e| SyncError::NetworkIo {
            url: url.to_string(),
            source: e,
        })
    }

    /// Streams a resource's body for download.
    pub async fn get(
        &self,
        url: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| classify_request_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes_stream())
    }

    /// Uploads `bytes` to `url`, preserving the local mtime (seconds since
    /// epoch) via `X-OC-MTime`.
    pub async fn put(&self, url: &str, bytes: Vec<u8>, mtime_seconds: i64) -> Result<()> {
        let response = self
            .http
            .put(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "application/octet-stream")
            .header("X-OC-MTime", mtime_seconds.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| classify_request_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Deletes a resource. A 404 is treated as success (idempotent
    /// deletion).
    pub async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .http
            .delete(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| classify_request_error(e, url))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(SyncError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }

    /// Server-identity check: a plain `GET` on the base URL must carry an
    /// `X-Nextcloud-*` header, or the body must contain the
    /// case-insensitive substring "nextcloud".
    pub async fn check_is_nextcloud(&self, base_url: &str) -> Result<()> {
        let response = self
            .http
            .get(base_url)
            .send()
            .await
            .map_err(|e| classify_request_error(e, base_url))?;

        let has_nextcloud_header = response
            .headers()
            .keys()
            .any(|k| k.as_str().to_ascii_lowercase().starts_with("x-nextcloud"));

        if has_nextcloud_header {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if body.to_ascii_lowercase().contains("nextcloud") {
            return Ok(());
        }

        Err(SyncError::NotNextcloud {
            url: base_url.to_string(),
        })
    }
}

/// Turns a failed `send()` into a typed error, separating TLS certificate
/// rejections from every other connection failure so the caller can log
/// and react to them distinctly.
fn classify_request_error(error: reqwest::Error, url: &str) -> SyncError {
    if error.is_connect() && is_tls_error(&error) {
        let host = host_of(url);
        tracing::warn!(host = %host, "TLS certificate for host was rejected");
        return SyncError::TlsUntrusted { host };
    }
    SyncError::NetworkIo {
        url: url.to_string(),
        source: error,
    }
}

/// Walks the error's source chain looking for the TLS/certificate wording
/// the underlying HTTP stack reports on a handshake failure.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        let text = err.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = err.source();
    }
    false
}

fn host_of(url: &str) -> String {
    crate::path::parse_base_url(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
