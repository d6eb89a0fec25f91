//! Page rasterization for scanned PDF documents.
//!
//! Converts a document byte stream into an ordered, lazily rendered
//! sequence of page images using pdftoppm (Poppler). Rendering is
//! restartable from any page index; nothing is rendered until a page is
//! requested. Rasterization failures are fatal for the whole document and
//! surface immediately.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;

/// Upper bound on a single external rasterization tool call.
const TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised while decoding a document into page images. Always fatal
/// for the whole document: no partial output is produced.
#[derive(Debug, Error)]
pub enum RasterizationError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Document could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("Document contains no pages")]
    EmptyDocument,

    #[error("Page index {index} out of range for {page_count}-page document")]
    PageOutOfRange { index: u32, page_count: u32 },

    #[error("Rasterization timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An immutable in-memory raster of one source page.
///
/// Owned by the worker processing the page and dropped once all of that
/// page's strategy candidates are scored; never retained in the final
/// report.
#[derive(Debug, Clone)]
pub struct PageImage {
    page_index: u32,
    image: GrayImage,
}

impl PageImage {
    pub fn new(page_index: u32, image: GrayImage) -> Self {
        Self { page_index, image }
    }

    /// Index of the source page this raster came from.
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The pixel buffer.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// A copy of this page with a transformed pixel buffer. The origin page
    /// index is preserved.
    pub fn with_image(&self, image: GrayImage) -> Self {
        Self {
            page_index: self.page_index,
            image,
        }
    }
}

/// Source of page images for the extraction pipeline.
///
/// `PdfRasterizer` is the production implementation; tests supply in-memory
/// fixtures so the pipeline can run without Poppler installed.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Total number of pages. Finite and known up front.
    fn page_count(&self) -> u32;

    /// Content digest of the source bytes, when one is available.
    fn fingerprint(&self) -> Option<String> {
        None
    }

    /// Render one page at the configured resolution. May be called in any
    /// order and more than once per index.
    async fn render_page(&self, index: u32) -> Result<PageImage, RasterizationError>;
}

/// Rasterizes scanned PDFs via pdftoppm, one page at a time.
#[derive(Debug)]
pub struct PdfRasterizer {
    // Scratch dir holds the input PDF and transient page images; removed on drop.
    scratch: TempDir,
    pdf_path: PathBuf,
    dpi: u32,
    page_count: u32,
    digest: String,
}

impl PdfRasterizer {
    /// Decode a document byte stream into a page source.
    ///
    /// Fails immediately if the bytes are not a PDF, the Poppler tools are
    /// missing, or the document cannot be read.
    pub async fn open(bytes: &[u8], dpi: u32) -> Result<Self, RasterizationError> {
        let kind = infer::get(bytes).map(|k| k.mime_type()).unwrap_or("unknown");
        if kind != "application/pdf" {
            return Err(RasterizationError::UnsupportedFormat(kind.to_string()));
        }

        let scratch = TempDir::new()?;
        let pdf_path = scratch.path().join("input.pdf");
        tokio::fs::write(&pdf_path, bytes).await?;

        let digest = hex::encode(Sha256::digest(bytes));
        let page_count = read_page_count(&pdf_path).await?;
        if page_count == 0 {
            return Err(RasterizationError::EmptyDocument);
        }

        tracing::debug!(pages = page_count, dpi, "opened PDF for rasterization");

        Ok(Self {
            scratch,
            pdf_path,
            dpi,
            page_count,
            digest,
        })
    }
}

#[async_trait]
impl PageSource for PdfRasterizer {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn fingerprint(&self) -> Option<String> {
        Some(self.digest.clone())
    }

    async fn render_page(&self, index: u32) -> Result<PageImage, RasterizationError> {
        if index >= self.page_count {
            return Err(RasterizationError::PageOutOfRange {
                index,
                page_count: self.page_count,
            });
        }

        // pdftoppm numbers pages from 1.
        let page = (index + 1).to_string();
        let prefix = self.scratch.path().join(format!("page-{index}"));

        let status = tokio::time::timeout(
            TOOL_TIMEOUT,
            Command::new("pdftoppm")
                .args(["-png", "-gray", "-r"])
                .arg(self.dpi.to_string())
                .args(["-f", &page, "-l", &page])
                .arg(&self.pdf_path)
                .arg(&prefix)
                .kill_on_drop(true)
                .status(),
        )
        .await
        .map_err(|_| RasterizationError::Timeout(TOOL_TIMEOUT.as_secs()))?;

        match status {
            Ok(s) if s.success() => {}
            Ok(_) => {
                return Err(RasterizationError::DecodeFailed(format!(
                    "pdftoppm failed on page {page}"
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RasterizationError::ToolNotFound(
                    "pdftoppm (install poppler-utils)".to_string(),
                ))
            }
            Err(e) => return Err(RasterizationError::Io(e)),
        }

        let image_path = find_page_image(&prefix, index + 1).ok_or_else(|| {
            RasterizationError::DecodeFailed(format!("no image produced for page {page}"))
        })?;

        let image = tokio::task::spawn_blocking(move || -> Result<GrayImage, RasterizationError> {
            let decoded = image::open(&image_path)
                .map_err(|e| RasterizationError::DecodeFailed(e.to_string()))?
                .into_luma8();
            // Keep scratch space bounded for large documents.
            let _ = std::fs::remove_file(&image_path);
            Ok(decoded)
        })
        .await
        .map_err(|e| RasterizationError::DecodeFailed(e.to_string()))??;

        Ok(PageImage::new(index, image))
    }
}

/// Read the page count via pdfinfo.
async fn read_page_count(pdf_path: &std::path::Path) -> Result<u32, RasterizationError> {
    let output = tokio::time::timeout(
        TOOL_TIMEOUT,
        Command::new("pdfinfo")
            .arg(pdf_path)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| RasterizationError::Timeout(TOOL_TIMEOUT.as_secs()))?;

    let output = match output {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RasterizationError::ToolNotFound(
                "pdfinfo (install poppler-utils)".to_string(),
            ))
        }
        Err(e) => return Err(RasterizationError::Io(e)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RasterizationError::DecodeFailed(format!(
            "pdfinfo failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            return rest.trim().parse().map_err(|_| {
                RasterizationError::DecodeFailed("unparseable page count".to_string())
            });
        }
    }

    Err(RasterizationError::DecodeFailed(
        "pdfinfo output missing page count".to_string(),
    ))
}

/// Locate the file pdftoppm produced. The page-number suffix is padded to
/// the document's digit width, so probe the plausible widths.
fn find_page_image(prefix: &std::path::Path, page_number: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let candidate =
            PathBuf::from(format!("{}-{:0width$}.png", prefix.display(), page_number, width = digits));
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}
