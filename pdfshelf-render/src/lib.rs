use std::convert::TryFrom;
use std::env;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfshelf_core::{
    DocumentBackend, DocumentProvider, DocumentRef, PageImage, RenderRequest, Result, ShelfError,
};
use tracing::{debug, instrument, warn};

pub const PDFIUM_LIBRARY_ENV: &str = "PDFSHELF_PDFIUM_LIBRARY_PATH";

/// Opens stored PDF bytes with pdfium.
pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> anyhow::Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    /// Parsing runs on tokio's blocking pool; pdfium calls are synchronous.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn open(&self, doc: &DocumentRef, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>> {
        let pdfium = Arc::clone(&self.pdfium);
        let doc = doc.clone();
        run_blocking(move || load_document(pdfium, doc, bytes)).await
    }
}

fn load_document(
    pdfium: Arc<Pdfium>,
    doc: DocumentRef,
    bytes: Vec<u8>,
) -> Result<Arc<dyn DocumentBackend>> {
    let document = pdfium
        .load_pdf_from_byte_vec(bytes, None)
        .map_err(|err| ShelfError::CorruptDocument {
            name: doc.name().to_owned(),
            reason: err.to_string(),
        })?;
    // SAFETY: the document borrows the bindings owned by `pdfium`. The
    // backend keeps that Arc in a field declared after `document`, and
    // struct fields drop in declaration order, so the bindings outlive the
    // document.
    let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    debug!(document = %doc, page_count, "parsed document");

    Ok(Arc::new(PdfiumDocument {
        document: Mutex::new(document),
        name: doc,
        page_count,
        pdfium,
    }))
}

/// Runs `f` on the blocking thread pool and waits for it.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ShelfError::Render(anyhow!("blocking task failed: {err}")))?
}

struct PdfiumDocument {
    document: Mutex<PdfDocument<'static>>,
    name: DocumentRef,
    page_count: usize,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn render_internal(&self, request: &RenderRequest) -> anyhow::Result<PageImage> {
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.zoom.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let width = u32::try_from(bitmap.width()).unwrap_or_default();
        let height = u32::try_from(bitmap.height()).unwrap_or_default();
        let pixels = bitmap.as_image().to_rgba8().into_raw();

        Ok(PageImage {
            page_index: request.page_index,
            zoom: request.zoom,
            width,
            height,
            png: encode_png(&pixels, width, height)?,
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    #[instrument(skip(self), fields(document = %self.name))]
    fn render_page(&self, request: RenderRequest) -> Result<PageImage> {
        if request.page_index >= self.page_count {
            return Err(ShelfError::OutOfRange {
                page: request.page_index,
                page_count: self.page_count,
            });
        }
        Ok(self.render_internal(&request)?)
    }
}

/// Encodes tightly packed RGBA8 pixels as PNG.
pub fn encode_png(pixels: &[u8], width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let expected = (width as usize) * (height as usize) * 4;
    if pixels.len() != expected {
        return Err(anyhow!(
            "pixel buffer holds {} bytes, expected {} for {}x{}",
            pixels.len(),
            expected,
            width,
            height
        ));
    }
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(pixels, width, height, ExtendedColorType::Rgba8)
        .context("failed to encode page as PNG")?;
    Ok(buffer)
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> anyhow::Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_png_produces_decodable_image() {
        let pixels = vec![
            255, 0, 0, 255, //
            0, 255, 0, 255, //
        ];
        let png = encode_png(&pixels, 2, 1).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[tokio::test]
    async fn blocking_work_runs_off_the_runtime_thread() {
        let caller = std::thread::current().id();
        let worker = run_blocking(|| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(caller, worker);
    }

    #[tokio::test]
    async fn blocking_work_propagates_errors() {
        let result: Result<()> = run_blocking(|| Err(ShelfError::NoDocumentOpen)).await;
        assert!(matches!(result, Err(ShelfError::NoDocumentOpen)));

        let result: Result<()> = run_blocking(|| panic!("parser crashed")).await;
        assert!(matches!(result, Err(ShelfError::Render(_))));
    }

    #[test]
    fn encode_png_rejects_mismatched_buffer() {
        assert!(encode_png(&[0, 0, 0], 1, 1).is_err());
    }
}
