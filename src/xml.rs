//! PROPFIND multistatus parser (C3).
//!
//! Grounded on `webdav_xml_parser.rs`'s `quick_xml` event-loop parser,
//! extended to retain `resourcetype`'s `collection` marker (folder vs file)
//! instead of discarding folders inline, so the remote snapshot collector
//! (C5) is the layer that decides to ignore folders.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Result, SyncError};

/// One `<d:response>` entry from a PROPFIND multistatus body.
#[derive(Debug, Clone, PartialEq)]
pub struct DavEntry {
    pub remote_url: String,
    pub relative_path: String,
    pub display_name: String,
    pub is_folder: bool,
    pub content_length: i64,
    pub content_type: String,
    pub remote_mtime_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct RawResponse {
    href: Option<String>,
    displayname: String,
    content_length: Option<i64>,
    last_modified: Option<String>,
    content_type: Option<String>,
    is_collection: bool,
    status_ok: bool,
}

/// Parses a PROPFIND multistatus document. A `<d:response>` missing
/// `<d:href>` or `<d:getlastmodified>` is logged and skipped, not fatal to
/// the rest of the document.
pub fn parse_multistatus(xml_text: &str) -> Result<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawResponse> = None;
    let mut current_element = String::new();
    let mut in_response = false;
    let mut in_propstat = false;
    let mut in_resourcetype = false;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(&e)?;
                match name.as_str() {
                    "response" => {
                        in_response = true;
                        current = Some(RawResponse::default());
                    }
                    "propstat" => in_propstat = true,
                    "resourcetype" => in_resourcetype = true,
                    "collection" if in_resourcetype => {
                        if let Some(resp) = current.as_mut() {
                            resp.is_collection = true;
                        }
                    }
                    _ => current_element = name,
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| SyncError::DavXmlMalformed {
                    reason: e.to_string(),
                })?;
                if in_response && !text.trim().is_empty() {
                    if let Some(resp) = current.as_mut() {
                        match current_element.as_str() {
                            "href" => resp.href = Some(text.trim().to_string()),
                            "displayname" => resp.displayname = text.trim().to_string(),
                            "getcontentlength" => resp.content_length = text.trim().parse().ok(),
                            "getlastmodified" => resp.last_modified = Some(text.trim().to_string()),
                            "getcontenttype" => resp.content_type = Some(text.trim().to_string()),
                            "status" if in_propstat => {
                                if text.contains("200") {
                                    resp.status_ok = true;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name_end(&e)?;
                match name.as_str() {
                    "response" => {
                        if let Some(resp) = current.take() {
                            match finish_entry(resp) {
                                Some(entry) => entries.push(entry),
                                None => {
                                    tracing::warn!("skipping malformed PROPFIND response entry");
                                }
                            }
                        }
                        in_response = false;
                    }
                    "propstat" => in_propstat = false,
                    "resourcetype" => in_resourcetype = false,
                    _ => {}
                }
                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SyncError::DavXmlMalformed {
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn finish_entry(resp: RawResponse) -> Option<DavEntry> {
    let href = resp.href?;
    if !resp.status_ok {
        return None;
    }

    let remote_mtime_ms = resp
        .last_modified
        .as_deref()
        .and_then(parse_http_date);

    if !resp.is_collection && remote_mtime_ms.is_none() && resp.last_modified.is_some() {
        // getlastmodified was present but unparseable: treat as malformed.
        return None;
    }

    let relative_path = crate::path::href_to_relative(&href);

    Some(DavEntry {
        remote_url: href,
        relative_path,
        display_name: resp.displayname,
        is_folder: resp.is_collection,
        content_length: resp.content_length.unwrap_or(0),
        content_type: resp.content_type.unwrap_or_default(),
        remote_mtime_ms,
    })
}

/// Parses an RFC 1123/7231 HTTP-date into UTC milliseconds since epoch.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

fn local_name(e: &BytesStart) -> Result<String> {
    let name = e.name();
    let full = std::str::from_utf8(name.as_ref())
        .map_err(|e| SyncError::DavXmlMalformed {
            reason: e.to_string(),
        })?
        .to_string();
    Ok(strip_prefix(&full))
}

fn local_name_end(e: &quick_xml::events::BytesEnd) -> Result<String> {
    let name = e.name();
    let full = std::str::from_utf8(name.as_ref())
        .map_err(|e| SyncError::DavXmlMalformed {
            reason: e.to_string(),
        })?
        .to_string();
    Ok(strip_prefix(&full))
}

fn strip_prefix(name: &str) -> String {
    match name.split_once(':') {
        Some((_, local)) => local.to_lowercase(),
        None => name.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Docs</d:displayname>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</d:getlastmodified>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/a.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>a.txt</d:displayname>
        <d:getcontentlength>1024</d:getcontentlength>
        <d:getcontenttype>text/plain</d:getcontenttype>
        <d:getlastmodified>Tue, 14 Nov 2023 22:13:20 GMT</d:getlastmodified>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/remote.php/dav/files/alice/Docs/broken.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn parses_files_and_folders() {
        let entries = parse_multistatus(SAMPLE).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_folder);
        assert_eq!(entries[0].relative_path, "Docs");
        assert!(!entries[1].is_folder);
        assert_eq!(entries[1].relative_path, "Docs/a.txt");
        assert_eq!(entries[1].content_length, 1024);
        assert!(entries[1].remote_mtime_ms.is_some());
    }

    #[test]
    fn skips_non_200_status() {
        let entries = parse_multistatus(SAMPLE).unwrap();
        assert!(entries.iter().all(|e| e.relative_path != "Docs/broken.txt"));
    }

    #[test]
    fn http_date_parses_to_utc_ms() {
        let ms = parse_http_date("Tue, 14 Nov 2023 22:13:20 GMT").unwrap();
        assert_eq!(ms, 1_700_000_000_000);
    }
}
