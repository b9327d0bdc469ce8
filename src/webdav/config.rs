use std::time::Duration;

/// WebDAV server configuration, grounded on
/// `services/webdav/config.rs`'s `WebDAVConfig` but narrowed to the single
/// Nextcloud server-type this engine speaks.
#[derive(Debug, Clone)]
pub struct WebDAVConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
}

impl WebDAVConfig {
    pub fn new(server_url: String, username: String, password: String) -> Self {
        Self {
            server_url,
            username,
            password,
            timeout_seconds: 30,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Base WebDAV URL: `<server>/remote.php/dav/files/<user>`.
    pub fn webdav_url(&self) -> String {
        format!(
            "{}/remote.php/dav/files/{}",
            self.server_url.trim_end_matches('/'),
            self.username
        )
    }
}
