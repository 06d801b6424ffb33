//! PDF page rendering for `read_page_as_image`.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

pub const MIN_DPI: u32 = 36;
pub const MAX_DPI: u32 = 600;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page must be >= 1 (got {0})")]
    InvalidPage(u32),

    #[error("dpi must be within {MIN_DPI}..={MAX_DPI} (got {0})")]
    InvalidDpi(u32),

    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("renderer failed: {0}")]
    Failed(String),
}

/// Renders a single page of a PDF to PNG bytes.
///
/// Implementations must be deterministic for identical inputs and must not
/// write anywhere on disk.
pub trait PageRenderer: Send + Sync {
    fn render(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, RenderError>;
}

pub(crate) fn validate_request(page: u32, dpi: u32) -> Result<(), RenderError> {
    if page == 0 {
        return Err(RenderError::InvalidPage(page));
    }
    if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
        return Err(RenderError::InvalidDpi(dpi));
    }
    Ok(())
}

/// Shells out to poppler's `pdftoppm`, capturing the PNG from stdout.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: PathBuf,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
        }
    }
}

impl PdftoppmRenderer {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, RenderError> {
        validate_request(page, dpi)?;
        let page_arg = page.to_string();
        let dpi_arg = dpi.to_string();

        debug!(pdf = %pdf.display(), page, dpi, "rendering pdf page");
        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-f", &page_arg, "-l", &page_arg, "-r", &dpi_arg])
            .arg(pdf)
            .output()
            .map_err(|e| RenderError::Unavailable(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(page, status = ?output.status.code(), "pdftoppm failed: {}", stderr.trim());
            return Err(RenderError::Failed(format!(
                "could not render page {page}: {}",
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(RenderError::Failed(format!("page {page} produced no image")));
        }
        Ok(output.stdout)
    }
}
