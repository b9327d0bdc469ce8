//! Path codec (C1): conversions between the three path views used across
//! the sync engine: relative storage paths, full WebDAV URLs, and raw
//! `<d:href>` values from PROPFIND responses.
//!
//! Grounded on `services/webdav/url_management.rs`'s `WebDAVUrlManager`,
//! generalized to strip exactly the Nextcloud `remote.php/dav/files/<user>`
//! prefix (first four non-empty path segments) rather than branching on a
//! server-type enum, since this engine only ever talks to Nextcloud.

use url::Url;

/// Converts a `<d:href>` value (percent-encoded path, first four segments
/// `remote.php/dav/files/<user>`) into a relative, percent-decoded storage
/// path. Returns `"/"` for the pair root itself.
pub fn href_to_relative(href: &str) -> String {
    let path = href.split('?').next().unwrap_or(href);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let remainder = if segments.len() > 4 {
        &segments[4..]
    } else {
        &segments[segments.len().min(4)..]
    };

    if remainder.is_empty() {
        return "/".to_string();
    }

    let decoded: Vec<String> = remainder
        .iter()
        .map(|seg| {
            urlencoding::decode(seg)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| (*seg).to_string())
        })
        .collect();

    decoded.join("/")
}

/// Builds the full WebDAV URL for a relative path under a pair's remote
/// root. Spaces are encoded as `%20`, never `+`.
pub fn relative_to_url(base_url: &str, username: &str, remote_root: &str, relative: &str) -> String {
    let mut url = base_url.trim_end_matches('/').to_string();
    url.push_str("/remote.php/dav/files/");
    url.push_str(username);

    for segment in remote_root.split('/').filter(|s| !s.is_empty()) {
        url.push('/');
        url.push_str(&encode_segment(segment));
    }

    if relative != "/" {
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(&encode_segment(segment));
        }
    }

    url
}

/// Joins a pair's local root with a relative storage path, converting
/// forward slashes to the platform's native separator.
pub fn local_of(local_root: &str, relative: &str) -> std::path::PathBuf {
    let mut path = std::path::PathBuf::from(local_root);
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).replace('+', "%20")
}

/// Strips a pair's remote root from a DAV-root-relative path, yielding the
/// pair-relative storage path used as the `Entry` key. Returns `None` if
/// `path` does not fall under `root`.
pub fn strip_remote_root(path: &str, root: &str) -> Option<String> {
    let root_segments: Vec<&str> = root.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if path_segments.len() < root_segments.len() {
        return None;
    }
    if path_segments[..root_segments.len()] != root_segments[..] {
        return None;
    }

    Some(path_segments[root_segments.len()..].join("/"))
}

/// Validates that `url` parses as an absolute URL; used by the identity
/// check before issuing the base-URL `GET`.
pub fn parse_base_url(url: &str) -> Result<Url, url::ParseError> {
    Url::parse(url)
}
