//! Remote snapshot collector (C5): one PROPFIND at `Depth: infinity`
//! rooted at the pair's remote root, filtered to files matching the
//! extension allowlist.
//!
//! Grounded on `services/webdav/service.rs`'s
//! `discover_files_and_directories` (PROPFIND + XML parse), simplified to
//! a single infinite-depth request rather than a recursive, adaptive
//! depth-probing strategy.

use crate::error::Result;
use crate::path::{relative_to_url, strip_remote_root};
use crate::registry::Pair;
use crate::state::StateStore;
use crate::webdav::DavClient;
use crate::xml::{parse_multistatus, DavEntry};

/// A remote file, already rebased to the pair-relative path used as the
/// `Entry` key (the pair's `remote_root` prefix stripped off).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub relative_path: String,
    pub remote_mtime_ms: i64,
}

/// Runs PROPFIND against the pair's remote root and returns the file
/// entries (folders dropped, extension filter applied, paths rebased to
/// the pair root).
pub async fn list_files(
    client: &DavClient,
    base_url: &str,
    username: &str,
    pair: &Pair,
) -> Result<Vec<RemoteFile>> {
    let root_url = relative_to_url(base_url, username, &pair.remote_root, "/");
    let body = client.propfind(&root_url, "infinity").await?;
    let entries = parse_multistatus(&body)?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.is_folder)
        .filter_map(|e| rebase(e, &pair.remote_root))
        .filter(|f| pair.accepts(&f.relative_path))
        .collect())
}

fn rebase(entry: DavEntry, remote_root: &str) -> Option<RemoteFile> {
    let relative_path = strip_remote_root(&entry.relative_path, remote_root)?;
    let remote_mtime_ms = entry.remote_mtime_ms?;
    Some(RemoteFile {
        relative_path,
        remote_mtime_ms,
    })
}

/// Records every surviving file against the state store.
pub async fn observe(
    store: &StateStore,
    client: &DavClient,
    base_url: &str,
    username: &str,
    pair: &Pair,
    captured_at: i64,
) -> Result<()> {
    for file in list_files(client, base_url, username, pair).await? {
        store
            .observe_remote(pair.id, &file.relative_path, file.remote_mtime_ms, captured_at)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdav::WebDAVConfig;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn multistatus_body() -> String {
        format!(
            r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</d:getlastmodified>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/photo.jpg</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>100</d:getcontentlength>
        <d:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</d:getlastmodified>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/notes.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>50</d:getcontentlength>
        <d:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</d:getlastmodified>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#
        )
    }

    #[tokio::test]
    async fn extension_filter_drops_unlisted_files_and_folders() {
        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .and(header("Depth", "infinity"))
            .respond_with(ResponseTemplate::new(207).set_body_string(multistatus_body()))
            .mount(&server)
            .await;

        let client = DavClient::new(WebDAVConfig::new(
            server.uri(),
            "alice".to_string(),
            "secret".to_string(),
        ))
        .unwrap();

        let pair = Pair {
            id: 1,
            remote_root: "Docs".into(),
            local_root: "/tmp/p1".into(),
            allowed_extensions: vec![".jpg".to_string(), ".png".to_string()],
        };

        let files = list_files(&client, &server.uri(), "alice", &pair)
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "photo.jpg");
    }
}
