//! Upload intake: validates a batch of files against the configured limits and stores them as
//! session items.
//!
//! Every file is validated and converted before a session is created, so a rejected batch never
//! leaves a session behind.

use crate::{
    config::Config,
    pipeline::{PdfTextExtractor, format_pages},
    session::{ContentKind, SessionError, SessionStore, StoredItem},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

/// MIME type accepted for PDF documents.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// MIME types accepted for images.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Errors that reject an upload batch.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The batch was empty.
    #[error("You didn't upload any files. I need something to read!")]
    NoFiles,
    /// A file exceeded the per-file size limit.
    #[error("The file '{filename}' is {size_mb:.1}MB, but I can only handle files up to {limit_mb}MB.")]
    FileTooLarge {
        /// Offending file.
        filename: String,
        /// Actual size in megabytes.
        size_mb: f64,
        /// Configured limit in megabytes.
        limit_mb: usize,
    },
    /// A file was neither a supported image nor a PDF.
    #[error("I don't know how to read '{filename}' ({content_type}). I can only read images (JPG, PNG) and PDF files.")]
    UnsupportedType {
        /// Offending file.
        filename: String,
        /// Declared or inferred MIME type.
        content_type: String,
    },
    /// A PDF had more pages than allowed.
    #[error("Your PDF '{filename}' has {pages} pages, but I can only read {limit} pages at a time.")]
    TooManyPages {
        /// Offending file.
        filename: String,
        /// Page count of the PDF.
        pages: usize,
        /// Configured page limit.
        limit: usize,
    },
    /// Images plus PDF pages exceeded the batch limit.
    #[error("I can only read {limit} images or PDF pages at a time. You uploaded {count} items.")]
    TooManyItems {
        /// Images plus PDF pages in the batch.
        count: usize,
        /// Configured limit.
        limit: usize,
    },
    /// A PDF could not be parsed.
    #[error("I'm having trouble reading '{filename}'. It might be damaged or corrupted.")]
    CorruptedPdf {
        /// Offending file.
        filename: String,
        /// Parser error.
        reason: String,
    },
    /// The session store rejected the batch.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The blocking intake task failed.
    #[error("upload worker failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// Short headline for the error.
    pub fn title(&self) -> &'static str {
        match self {
            Self::NoFiles => "No files to process",
            Self::FileTooLarge { .. } => "File is too big",
            Self::UnsupportedType { .. } => "Unsupported file type",
            Self::TooManyPages { .. } => "PDF has too many pages",
            Self::TooManyItems { .. } => "Too many files",
            Self::CorruptedPdf { .. } => "File seems damaged",
            Self::Session(_) | Self::Worker(_) => "Upload could not be stored",
        }
    }

    /// Follow-up hints for the user.
    pub fn suggestions(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Self::NoFiles => &[
                "Click the upload button to choose your images or PDF",
                "Make sure your files are selected before clicking upload",
            ],
            Self::FileTooLarge { .. } => &[
                "Try taking a clearer photo instead of scanning",
                "Reduce the PDF file size using a PDF compressor",
                "Split large PDFs into smaller parts",
            ],
            Self::UnsupportedType { .. } => &[
                "Try converting your file to JPG or PNG format",
                "Take a photo of the document instead",
                "Save your document as a PDF file",
            ],
            Self::TooManyPages { .. } => &[
                "Split your PDF into smaller parts",
                "Upload the pages as separate images instead",
            ],
            Self::TooManyItems { .. } => &[
                "Try uploading only your most important pages",
                "Split your PDF into smaller parts",
            ],
            Self::CorruptedPdf { .. } => &[
                "Try uploading the file again",
                "Check if the file opens correctly on your device",
            ],
            Self::Session(_) | Self::Worker(_) => &["Please try uploading your files again"],
        };
        hints.iter().map(|hint| hint.to_string()).collect()
    }
}

/// Limits applied to an upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct UploadLimits {
    /// Maximum images plus PDF pages per batch.
    pub max_images: usize,
    /// Maximum pages in a single PDF.
    pub max_pdf_pages: usize,
    /// Maximum size of a single file, in megabytes.
    pub max_file_size_mb: usize,
    /// Accepted MIME types.
    pub supported_types: Vec<&'static str>,
}

impl UploadLimits {
    /// Limits from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut supported_types = SUPPORTED_IMAGE_TYPES.to_vec();
        supported_types.push(PDF_MIME_TYPE);
        Self {
            max_images: config.max_images,
            max_pdf_pages: config.max_pdf_pages,
            max_file_size_mb: config.max_file_size_mb,
            supported_types,
        }
    }

    fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_config(&Config::with_defaults())
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name.
    pub filename: String,
    /// Client-declared MIME type, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Build an uploaded file.
    pub fn new(
        filename: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data: data.into(),
        }
    }
}

/// Summary of one accepted file.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    /// Original file name.
    pub filename: String,
    /// Resolved MIME type.
    pub file_type: String,
    /// How the file was stored.
    pub content_kind: ContentKind,
    /// Images the file contributes to the batch limit.
    pub image_count: usize,
    /// Page count for PDFs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    /// Size in megabytes, rounded to two decimals.
    pub file_size_mb: f64,
}

/// Result of an accepted upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    /// Session holding the stored items.
    pub session_id: String,
    /// Human-readable summary.
    pub message: String,
    /// Per-file summaries in upload order.
    pub processed_files: Vec<ProcessedFile>,
    /// Images plus PDF pages in the batch.
    pub total_images: usize,
    /// Follow-up hints.
    pub suggestions: Vec<String>,
}

enum FileShape {
    Image,
    Pdf { pages: usize },
}

struct ValidatedFile {
    file: UploadedFile,
    mime_type: String,
    shape: FileShape,
}

/// An item waiting for its session id.
struct PendingItem {
    filename: String,
    content_kind: ContentKind,
    mime_type: String,
    payload: Bytes,
    text_hint: Option<String>,
    page_number: Option<u32>,
}

impl PendingItem {
    fn new(
        filename: impl Into<String>,
        content_kind: ContentKind,
        mime_type: &str,
        payload: Bytes,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_kind,
            mime_type: mime_type.to_string(),
            payload,
            text_hint: None,
            page_number: None,
        }
    }

    fn stamp(self, session_id: &str, created_at: OffsetDateTime) -> StoredItem {
        let mut item = StoredItem::new_at(
            session_id,
            self.filename,
            self.content_kind,
            self.payload,
            created_at,
        )
        .with_mime_type(self.mime_type);
        if let Some(hint) = self.text_hint {
            item = item.with_text_hint(hint);
        }
        if let Some(page) = self.page_number {
            item = item.with_page_number(page);
        }
        item
    }
}

/// Validates uploads and turns them into session items.
pub struct UploadProcessor {
    store: Arc<SessionStore>,
    pdf: Arc<dyn PdfTextExtractor>,
    limits: UploadLimits,
}

impl UploadProcessor {
    /// Build a processor writing into `store`.
    pub fn new(
        store: Arc<SessionStore>,
        pdf: Arc<dyn PdfTextExtractor>,
        limits: UploadLimits,
    ) -> Self {
        tracing::info!(
            max_images = limits.max_images,
            max_pdf_pages = limits.max_pdf_pages,
            max_file_size_mb = limits.max_file_size_mb,
            "Upload processor initialized"
        );
        Self { store, pdf, limits }
    }

    /// Configured limits.
    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Validate the whole batch, then create a session and store its items.
    pub fn accept(&self, files: Vec<UploadedFile>) -> Result<UploadReceipt, UploadError> {
        if files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        let mut validated = Vec::with_capacity(files.len());
        let mut total_images = 0;
        for file in files {
            let checked = self.validate(file)?;
            total_images += match checked.shape {
                FileShape::Image => 1,
                FileShape::Pdf { pages } => pages,
            };
            validated.push(checked);
        }

        if total_images > self.limits.max_images {
            return Err(UploadError::TooManyItems {
                count: total_images,
                limit: self.limits.max_images,
            });
        }

        let mut pending = Vec::with_capacity(total_images);
        let mut processed_files = Vec::with_capacity(validated.len());
        for checked in validated {
            let (file_items, summary) = self.plan_items(checked)?;
            pending.extend(file_items);
            processed_files.push(summary);
        }

        // The session exists only once every file has been converted.
        let session_id = self.store.create_session();
        let created_at = self.store.now();
        let items = pending
            .into_iter()
            .map(|item| item.stamp(&session_id, created_at))
            .collect();
        if let Err(error) = self.store.store_items(&session_id, items) {
            self.store.delete_session(&session_id);
            return Err(error.into());
        }
        tracing::info!(
            session_id = %session_id,
            files = processed_files.len(),
            total_images,
            "Upload accepted"
        );

        Ok(UploadReceipt {
            message: format!(
                "Great! I successfully processed {} file(s) with {total_images} image(s) to read!",
                processed_files.len()
            ),
            session_id,
            processed_files,
            total_images,
            suggestions: vec![
                "Now I can extract text from your images!".to_string(),
                "Click 'Extract Text' to see what I found!".to_string(),
                "This might take 30-60 seconds depending on how much text there is.".to_string(),
            ],
        })
    }

    fn validate(&self, file: UploadedFile) -> Result<ValidatedFile, UploadError> {
        if file.data.len() > self.limits.max_file_size_bytes() {
            return Err(UploadError::FileTooLarge {
                filename: file.filename,
                size_mb: file.data.len() as f64 / BYTES_PER_MB,
                limit_mb: self.limits.max_file_size_mb,
            });
        }

        let mime_type = resolve_mime_type(&file.filename, file.content_type.as_deref());
        let shape = if mime_type == PDF_MIME_TYPE {
            let pages = self
                .pdf
                .page_count(&file.data)
                .map_err(|error| UploadError::CorruptedPdf {
                    filename: file.filename.clone(),
                    reason: error.to_string(),
                })?;
            if pages == 0 {
                return Err(UploadError::CorruptedPdf {
                    filename: file.filename,
                    reason: "document has no pages".to_string(),
                });
            }
            if pages > self.limits.max_pdf_pages {
                return Err(UploadError::TooManyPages {
                    filename: file.filename,
                    pages,
                    limit: self.limits.max_pdf_pages,
                });
            }
            FileShape::Pdf { pages }
        } else if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            FileShape::Image
        } else {
            return Err(UploadError::UnsupportedType {
                filename: file.filename,
                content_type: mime_type,
            });
        };

        Ok(ValidatedFile {
            file,
            mime_type,
            shape,
        })
    }

    fn plan_items(
        &self,
        checked: ValidatedFile,
    ) -> Result<(Vec<PendingItem>, ProcessedFile), UploadError> {
        let ValidatedFile {
            file,
            mime_type,
            shape,
        } = checked;
        let file_size_mb = (file.data.len() as f64 / BYTES_PER_MB * 100.0).round() / 100.0;

        let pages = match shape {
            FileShape::Image => {
                let item = PendingItem::new(&file.filename, ContentKind::Image, &mime_type, file.data);
                let summary = ProcessedFile {
                    filename: file.filename,
                    file_type: mime_type,
                    content_kind: ContentKind::Image,
                    image_count: 1,
                    page_count: None,
                    file_size_mb,
                };
                return Ok((vec![item], summary));
            }
            FileShape::Pdf { pages } => pages,
        };

        let page_texts = self
            .pdf
            .extract_pages(&file.data, self.limits.max_pdf_pages)
            .map_err(|error| UploadError::CorruptedPdf {
                filename: file.filename.clone(),
                reason: error.to_string(),
            })?;

        if page_texts.iter().any(|page| page.has_text()) {
            tracing::debug!(filename = %file.filename, pages, "PDF has a text layer");
            let mut item =
                PendingItem::new(&file.filename, ContentKind::PdfText, &mime_type, file.data);
            item.text_hint = Some(format_pages(&page_texts));
            let summary = ProcessedFile {
                filename: file.filename,
                file_type: mime_type,
                content_kind: ContentKind::PdfText,
                image_count: 0,
                page_count: Some(pages),
                file_size_mb,
            };
            return Ok((vec![item], summary));
        }

        tracing::debug!(filename = %file.filename, pages, "PDF has no text layer; storing pages");
        let items = (1..=pages)
            .map(|page| {
                let mut item = PendingItem::new(
                    format!("{}_page_{page}", file.filename),
                    ContentKind::PdfImagePage,
                    &mime_type,
                    file.data.clone(),
                );
                item.page_number = Some(page as u32);
                item
            })
            .collect();
        let summary = ProcessedFile {
            filename: file.filename,
            file_type: mime_type,
            content_kind: ContentKind::PdfImagePage,
            image_count: pages,
            page_count: Some(pages),
            file_size_mb,
        };
        Ok((items, summary))
    }
}

/// Normalize the declared MIME type, falling back to the file extension when the client sent
/// nothing useful.
pub fn resolve_mime_type(filename: &str, declared: Option<&str>) -> String {
    let declared = declared
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value != "application/octet-stream");
    if let Some(declared) = declared {
        return declared;
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => PDF_MIME_TYPE,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
    .to_string()
}
