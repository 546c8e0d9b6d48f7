//! Google Drive v3 implementation of [`RemoteStore`].
//!
//! Listing renders a [`ListQuery`] into Drive's `q` syntax and follows `nextPageToken` until
//! the result set is exhausted. Media downloads stream the response body chunk by chunk.
//!
//! Google-native documents have no binary content to download. Docs, Sheets, Slides and
//! Drawings are exported as PDF (the entry name gains a `.pdf` suffix); other native types
//! such as shortcuts and forms are left out of file listings.

use async_trait::async_trait;
use drive_bucket_core::contract::{
    EntryKind, ListQuery, MediaDownload, Predicate, RemoteEntry, RemoteStore, Session,
    FOLDER_MIME_TYPE,
};
use drive_bucket_core::error::{FetchError, ListingError};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";
const PAGE_SIZE: u32 = 1000;

const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";
pub const EXPORT_MIME_TYPE: &str = "application/pdf";
const EXPORT_EXTENSION: &str = ".pdf";
const EXPORTABLE_NATIVE_TYPES: [&str; 4] = ["document", "spreadsheet", "presentation", "drawing"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// int64 fields arrive as JSON strings.
    #[serde(default)]
    size: Option<String>,
}

impl DriveFile {
    /// Google-native type without a downloadable body, folders excluded.
    fn is_native(&self) -> bool {
        self.mime_type != FOLDER_MIME_TYPE && self.mime_type.starts_with(NATIVE_MIME_PREFIX)
    }

    fn is_exportable(&self) -> bool {
        self.mime_type
            .strip_prefix(NATIVE_MIME_PREFIX)
            .is_some_and(|kind| EXPORTABLE_NATIVE_TYPES.contains(&kind))
    }
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        if file.is_native() && file.is_exportable() {
            let name = if file.name.to_lowercase().ends_with(EXPORT_EXTENSION) {
                file.name
            } else {
                format!("{}{EXPORT_EXTENSION}", file.name)
            };
            return RemoteEntry {
                id: file.id,
                name,
                is_folder: false,
                mime_type: Some(file.mime_type),
                size: None,
                export_mime_type: None,
            }
            .exported_as(EXPORT_MIME_TYPE);
        }
        let size = file.size.as_deref().and_then(|s| s.parse().ok());
        RemoteEntry {
            id: file.id,
            is_folder: file.mime_type == FOLDER_MIME_TYPE,
            name: file.name,
            mime_type: Some(file.mime_type),
            size,
            export_mime_type: None,
        }
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Render a query in Drive's search syntax. Trashed items are always excluded.
pub fn render_query(query: &ListQuery) -> String {
    let mut clauses: Vec<String> = query
        .predicates
        .iter()
        .map(|p| match p {
            Predicate::InParent(id) => format!("'{}' in parents", escape_literal(id)),
            Predicate::Kind(EntryKind::Folder) => format!("mimeType = '{FOLDER_MIME_TYPE}'"),
            Predicate::Kind(EntryKind::File) => format!("mimeType != '{FOLDER_MIME_TYPE}'"),
            Predicate::NameContains(needle) => {
                format!("name contains '{}'", escape_literal(needle))
            }
        })
        .collect();
    clauses.push("trashed = false".to_string());
    clauses.join(" and ")
}

#[derive(Debug, Clone)]
pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl DriveClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DRIVE_API_BASE.to_string());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn list_params(&self, query: &ListQuery, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", render_query(query)),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", self.page_size.to_string()),
            ("orderBy", "name".to_string()),
        ];
        if query.include_all_drives {
            params.push(("supportsAllDrives", "true".to_string()));
            params.push(("includeItemsFromAllDrives", "true".to_string()));
            params.push(("corpora", "allDrives".to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        params
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list(
        &self,
        session: &Session,
        query: &ListQuery,
    ) -> Result<Vec<RemoteEntry>, ListingError> {
        let url = format!("{}/files", self.base_url);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let params = self.list_params(query, page_token.as_deref());
            let resp = self
                .client
                .get(&url)
                .bearer_auth(session.access_token())
                .query(&params)
                .send()
                .await
                .map_err(|e| ListingError::Transport {
                    source: Box::new(e),
                })?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ListingError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let page: FileList = resp.json().await.map_err(|e| ListingError::Decode {
                source: Box::new(e),
            })?;
            pages += 1;
            debug!(page = pages, count = page.files.len(), "Fetched Drive listing page");
            entries.extend(
                page.files
                    .into_iter()
                    .filter(|file| {
                        let skip = file.is_native() && !file.is_exportable();
                        if skip {
                            warn!(
                                file_id = %file.id,
                                name = %file.name,
                                mime_type = %file.mime_type,
                                "Skipping Google-native file that cannot be exported"
                            );
                        }
                        !skip
                    })
                    .map(RemoteEntry::from),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            parent = ?query.parent(),
            pages,
            count = entries.len(),
            "Drive listing complete"
        );
        Ok(entries)
    }

    async fn open_media(
        &self,
        session: &Session,
        entry: &RemoteEntry,
    ) -> Result<MediaDownload, FetchError> {
        let file_id = entry.id.as_str();
        let request = match entry.export_mime_type.as_deref() {
            Some(export) => self
                .client
                .get(format!("{}/files/{}/export", self.base_url, file_id))
                .query(&[("mimeType", export)]),
            None => self
                .client
                .get(format!("{}/files/{}", self.base_url, file_id))
                .query(&[("alt", "media"), ("supportsAllDrives", "true")]),
        };
        let resp = request
            .bearer_auth(session.access_token())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                file_id: file_id.to_string(),
                source: Box::new(e),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                file_id: file_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let total_size = resp.content_length();
        debug!(
            file_id,
            ?total_size,
            export = ?entry.export_mime_type,
            "Opened Drive media stream"
        );
        let id = file_id.to_string();
        let chunks = resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| FetchError::Transport {
                    file_id: id.clone(),
                    source: Box::new(e),
                })
            })
            .boxed();
        Ok(MediaDownload::new(total_size, chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_folder_query() {
        let q = render_query(&ListQuery::children("root123", EntryKind::Folder));
        assert_eq!(
            q,
            "'root123' in parents and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn test_render_file_query_with_name_filter() {
        let q = render_query(&ListQuery::children("f1", EntryKind::File).name_contains(".mp4"));
        assert_eq!(
            q,
            "'f1' in parents and mimeType != 'application/vnd.google-apps.folder' and name contains '.mp4' and trashed = false"
        );
    }

    #[test]
    fn test_render_escapes_quotes_and_backslashes() {
        let q = render_query(&ListQuery::children("r", EntryKind::File).name_contains(r"it's a\b"));
        assert!(q.contains(r"name contains 'it\'s a\\b'"), "{q}");
    }

    #[test]
    fn test_drive_file_size_is_parsed_from_string() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"1","name":"a.mp4","mimeType":"video/mp4","size":"42"}"#,
        )
        .unwrap();
        let entry = RemoteEntry::from(file);
        assert_eq!(entry.size, Some(42));
        assert!(!entry.is_folder);
        assert_eq!(entry.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(entry.export_mime_type, None);
    }

    #[test]
    fn test_native_document_maps_to_pdf_export() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"d","name":"Shot list","mimeType":"application/vnd.google-apps.document"}"#,
        )
        .unwrap();
        assert!(file.is_native() && file.is_exportable());
        let entry = RemoteEntry::from(file);
        assert_eq!(entry.name, "Shot list.pdf");
        assert_eq!(entry.export_mime_type.as_deref(), Some(EXPORT_MIME_TYPE));
        assert_eq!(entry.size, None);
    }

    #[test]
    fn test_native_name_already_ending_in_pdf_is_kept() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"s","name":"budget.PDF","mimeType":"application/vnd.google-apps.spreadsheet"}"#,
        )
        .unwrap();
        assert_eq!(RemoteEntry::from(file).name, "budget.PDF");
    }

    #[test]
    fn test_shortcut_is_native_but_not_exportable() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"x","name":"link","mimeType":"application/vnd.google-apps.shortcut"}"#,
        )
        .unwrap();
        assert!(file.is_native());
        assert!(!file.is_exportable());
    }

    #[test]
    fn test_folder_is_not_native_content() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"f","name":"20231102","mimeType":"application/vnd.google-apps.folder"}"#,
        )
        .unwrap();
        assert!(!file.is_native());
        assert!(RemoteEntry::from(file).is_folder);
    }
}
