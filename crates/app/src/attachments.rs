//! Images and PDFs gathered before a send.
//!
//! Any number of images, at most one PDF (a new PDF replaces the old one).
//! The controller clears the preparer only once a request has actually been
//! dispatched, so a failed send keeps the user's attachments for a retry.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use shared::chat::Attachment;
use shared::ChatError;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PdfAttachment {
    filename: String,
    data_url: String,
}

#[derive(Debug, Default)]
pub struct AttachmentPreparer {
    images: Vec<String>,
    pdf: Option<PdfAttachment>,
}

impl AttachmentPreparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `data:image/*` URLs and remote http(s) image URLs.
    pub fn add_image(&mut self, data_url: impl Into<String>) -> Result<(), ChatError> {
        let url = data_url.into();
        let remote = url.starts_with("https://") || url.starts_with("http://");
        if !remote && !is_data_url_of(&url, "image/") {
            return Err(invalid(format!(
                "expected an image data URL, got {}",
                preview(&url)
            )));
        }
        self.images.push(url);
        Ok(())
    }

    pub fn add_pdf(
        &mut self,
        data_url: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<(), ChatError> {
        let data_url = data_url.into();
        if !is_data_url_of(&data_url, "application/pdf") {
            return Err(invalid(format!(
                "expected a PDF data URL, got {}",
                preview(&data_url)
            )));
        }
        let filename = filename.into();
        if let Some(previous) = &self.pdf {
            tracing::debug!(replaced = %previous.filename, "replacing attached PDF");
        }
        self.pdf = Some(PdfAttachment { filename, data_url });
        Ok(())
    }

    /// Read a file from disk and attach it according to its extension.
    pub fn add_file(&mut self, path: &Path) -> Result<(), ChatError> {
        let (mime, data_url) = data_url_from_file(path)?;
        if mime == "application/pdf" {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());
            self.add_pdf(data_url, filename)
        } else {
            self.add_image(data_url)
        }
    }

    pub fn clear_all(&mut self) {
        self.images.clear();
        self.pdf = None;
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.pdf.is_none()
    }

    /// Images in insertion order, then the PDF.
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut out: Vec<Attachment> = self
            .images
            .iter()
            .map(|url| Attachment::Image { url: url.clone() })
            .collect();
        if let Some(pdf) = &self.pdf {
            out.push(Attachment::File {
                filename: pdf.filename.clone(),
                data_url: pdf.data_url.clone(),
            });
        }
        out
    }
}

fn is_data_url_of(url: &str, mime_prefix: &str) -> bool {
    url.strip_prefix("data:")
        .map_or(false, |rest| rest.starts_with(mime_prefix) && rest.contains(','))
}

fn preview(url: &str) -> String {
    url.chars().take(32).collect()
}

fn invalid(message: String) -> ChatError {
    ChatError::Attachment { message }
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Base64-encode a file into a data URL. Returns the mime type alongside.
pub fn data_url_from_file(path: &Path) -> Result<(&'static str, String), ChatError> {
    let mime = mime_for(path)
        .ok_or_else(|| invalid(format!("unsupported file type: {}", path.display())))?;
    let bytes = fs::read(path)
        .map_err(|e| invalid(format!("could not read {}: {}", path.display(), e)))?;
    Ok((mime, format!("data:{};base64,{}", mime, STANDARD.encode(bytes))))
}
