//! Items, kinds, and snapshots exchanged with the session store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised by the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An item was stamped for a different session than the one it is being stored in.
    #[error("item '{filename}' belongs to session {item_session}, not {session_id}")]
    SessionMismatch {
        /// Session the caller tried to store into.
        session_id: String,
        /// Session recorded on the item.
        item_session: String,
        /// File name of the offending item.
        filename: String,
    },
}

/// How a stored item should be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    /// Photo or scan of a page.
    Image,
    /// PDF with an extractable text layer.
    PdfText,
    /// Single page of a PDF without a text layer.
    PdfImagePage,
    /// Kind produced by a collaborator that the pipeline does not handle.
    Other(String),
}

impl ContentKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Image => "image",
            Self::PdfText => "pdf_text",
            Self::PdfImagePage => "pdf_image_page",
            Self::Other(name) => name,
        }
    }

    /// MIME type assumed for payloads of this kind when the uploader did not supply one.
    pub fn default_mime_type(&self) -> &'static str {
        match self {
            Self::PdfText | Self::PdfImagePage => "application/pdf",
            Self::Image | Self::Other(_) => "image/png",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContentKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "image" => Self::Image,
            "pdf_text" => Self::PdfText,
            "pdf_image_page" | "pdf_images" => Self::PdfImagePage,
            _ => Self::Other(value),
        }
    }
}

impl From<ContentKind> for String {
    fn from(value: ContentKind) -> Self {
        value.as_str().to_string()
    }
}

/// File data held between upload and extraction.
#[derive(Debug, Clone)]
pub struct StoredItem {
    /// Session the item was uploaded into.
    pub session_id: String,
    /// Display name; PDF pages use `<file>_page_<n>`.
    pub filename: String,
    /// Extraction strategy selector.
    pub content_kind: ContentKind,
    /// MIME type sent upstream alongside the payload.
    pub mime_type: String,
    /// Raw bytes of the image or PDF.
    pub payload: Bytes,
    /// Text already extracted by the uploader, if any.
    pub extracted_text_hint: Option<String>,
    /// 1-based page number for items split out of a PDF.
    pub page_number: Option<u32>,
    /// Construction time; every item reads the clock itself.
    pub created_at: OffsetDateTime,
}

impl StoredItem {
    /// Create an item stamped with the current wall-clock time.
    pub fn new(
        session_id: impl Into<String>,
        filename: impl Into<String>,
        content_kind: ContentKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new_at(
            session_id,
            filename,
            content_kind,
            payload,
            OffsetDateTime::now_utc(),
        )
    }

    /// Create an item stamped with `created_at`, usually [`SessionStore::now`].
    ///
    /// [`SessionStore::now`]: crate::session::SessionStore::now
    pub fn new_at(
        session_id: impl Into<String>,
        filename: impl Into<String>,
        content_kind: ContentKind,
        payload: impl Into<Bytes>,
        created_at: OffsetDateTime,
    ) -> Self {
        let mime_type = content_kind.default_mime_type().to_string();
        Self {
            session_id: session_id.into(),
            filename: filename.into(),
            content_kind,
            mime_type,
            payload: payload.into(),
            extracted_text_hint: None,
            page_number: None,
            created_at,
        }
    }

    /// Attach pre-extracted text.
    pub fn with_text_hint(mut self, text: impl Into<String>) -> Self {
        self.extracted_text_hint = Some(text.into());
        self
    }

    /// Attach a 1-based page number.
    pub fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    /// Override the MIME type sent upstream.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Per-session snapshot used for "has this session expired" checks.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Whether the session is present.
    pub exists: bool,
    /// Number of stored items.
    pub total_items: usize,
    /// Content kinds present, in first-seen order.
    pub content_kinds: Vec<ContentKind>,
    /// RFC3339 creation time of the first stored item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl SessionInfo {
    pub(crate) fn missing() -> Self {
        Self {
            exists: false,
            total_items: 0,
            content_kinds: Vec::new(),
            created_at: None,
        }
    }
}

/// Aggregate counters across all sessions.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Number of live sessions.
    pub total_sessions: usize,
    /// Number of stored items across sessions.
    pub total_items: usize,
    /// Expiry interval, in hours.
    pub cleanup_interval_hours: f64,
}
