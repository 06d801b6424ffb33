//! Content-tree tools: `list_files`, `read_file`, `read_image`,
//! `read_page_as_image`.
//!
//! Charge order for reads: deadline, resolve, stat, memory check, read
//! quota, memory charge, then the actual read. A page render runs before
//! anything is charged, so a failed or oversized render costs nothing.

use std::fs;
use std::io::Read;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use super::page::{self, PageRenderer, RenderError};
use super::result::ImageAttachment;
use super::{ListFilesArgs, PathArgs, ReadPageArgs, ToolError, ToolKind};
use crate::sandbox::path::display_relative;
use crate::sandbox::Sandbox;

/// Upper bound on entries returned by one listing.
pub(crate) const MAX_LISTED_FILES: usize = 5_000;

pub(crate) fn list_files(sandbox: &Sandbox, args: &ListFilesArgs) -> Result<Value, ToolError> {
    sandbox.check_deadline()?;
    let dir = sandbox.resolve(&args.path)?;
    let meta = fs::metadata(&dir).map_err(|e| ToolError::io(&args.path, e))?;
    if !meta.is_dir() {
        return Err(ToolError::NotADirectory {
            path: args.path.clone(),
        });
    }

    let mut files = Vec::new();
    let mut truncated = false;
    walk(&dir, &mut files, &mut truncated).map_err(|e| ToolError::io(&args.path, e))?;

    let root = sandbox.content_root();
    let mut files: Vec<String> = files.iter().map(|p| display_relative(root, p)).collect();
    files.sort();

    Ok(json!({
        "path": display_relative(root, &dir),
        "files": files,
        "count": files.len(),
        "truncated": truncated,
    }))
}

// Symlinks are reported as entries but never traversed.
fn walk(dir: &Path, out: &mut Vec<std::path::PathBuf>, truncated: &mut bool) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        if out.len() >= MAX_LISTED_FILES {
            *truncated = true;
            return Ok(());
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), out, truncated)?;
        } else {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// Resolve a content file for reading and charge quotas for `size` bytes.
fn open_charged(
    sandbox: &mut Sandbox,
    requested: &str,
) -> Result<(std::path::PathBuf, u64), ToolError> {
    sandbox.check_deadline()?;
    let path = sandbox.resolve(requested)?;
    let meta = fs::metadata(&path).map_err(|e| ToolError::io(requested, e))?;
    if !meta.is_file() {
        return Err(ToolError::NotAFile {
            path: requested.to_string(),
        });
    }
    let size = meta.len();
    sandbox.check_memory(size)?;
    sandbox.charge_read()?;
    sandbox.charge_memory(size)?;
    Ok((path, size))
}

fn read_bounded(path: &Path, requested: &str, size: u64) -> Result<Vec<u8>, ToolError> {
    let file = fs::File::open(path).map_err(|e| ToolError::io(requested, e))?;
    let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
    file.take(size)
        .read_to_end(&mut bytes)
        .map_err(|e| ToolError::io(requested, e))?;
    Ok(bytes)
}

pub(crate) fn read_file(sandbox: &mut Sandbox, args: &PathArgs) -> Result<Value, ToolError> {
    let (path, size) = open_charged(sandbox, &args.path)?;
    let bytes = read_bounded(&path, &args.path, size)?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(json!({
        "path": display_relative(sandbox.content_root(), &path),
        "bytes": bytes.len(),
        "content": content,
    }))
}

pub(crate) fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub(crate) fn read_image(
    sandbox: &mut Sandbox,
    args: &PathArgs,
) -> Result<(Value, ImageAttachment), ToolError> {
    let mime = image_mime(Path::new(&args.path)).ok_or_else(|| ToolError::UnsupportedMedia {
        tool: ToolKind::ReadImage,
        path: args.path.clone(),
    })?;
    let (path, size) = open_charged(sandbox, &args.path)?;
    let bytes = read_bounded(&path, &args.path, size)?;
    let source = display_relative(sandbox.content_root(), &path);

    let payload = json!({
        "path": source,
        "mime_type": mime,
        "bytes": bytes.len(),
        "message": format!("Image loaded: {source}. It is attached below for you to analyze."),
    });
    let attachment = ImageAttachment {
        source,
        mime_type: mime.to_string(),
        data: BASE64.encode(&bytes),
        page: None,
    };
    Ok((payload, attachment))
}

pub(crate) fn read_page(
    sandbox: &mut Sandbox,
    renderer: &dyn PageRenderer,
    args: &ReadPageArgs,
) -> Result<(Value, ImageAttachment), ToolError> {
    page::validate_request(args.page, args.dpi).map_err(|e| ToolError::InvalidArguments {
        tool: ToolKind::ReadPage.to_string(),
        message: e.to_string(),
    })?;
    let is_pdf = Path::new(&args.path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(ToolError::UnsupportedMedia {
            tool: ToolKind::ReadPage,
            path: args.path.clone(),
        });
    }

    sandbox.check_deadline()?;
    let path = sandbox.resolve(&args.path)?;
    let meta = fs::metadata(&path).map_err(|e| ToolError::io(&args.path, e))?;
    if !meta.is_file() {
        return Err(ToolError::NotAFile {
            path: args.path.clone(),
        });
    }
    sandbox.check_read()?;

    let png = renderer
        .render(&path, args.page, args.dpi)
        .map_err(|e| match e {
            invalid @ (RenderError::InvalidPage(_) | RenderError::InvalidDpi(_)) => {
                ToolError::InvalidArguments {
                    tool: ToolKind::ReadPage.to_string(),
                    message: invalid.to_string(),
                }
            }
            other => ToolError::Render {
                message: other.to_string(),
            },
        })?;
    let png_bytes = png.len() as u64;
    sandbox.check_memory(png_bytes)?;
    sandbox.charge_read()?;
    sandbox.charge_memory(png_bytes)?;

    let source = display_relative(sandbox.content_root(), &path);
    let payload = json!({
        "path": source,
        "page": args.page,
        "dpi": args.dpi,
        "mime_type": "image/png",
        "bytes": png.len(),
        "message": format!("PDF page {} of {source} rendered. It is attached below for you to analyze.", args.page),
    });
    let attachment = ImageAttachment {
        source,
        mime_type: "image/png".to_string(),
        data: BASE64.encode(&png),
        page: Some(args.page),
    };
    Ok((payload, attachment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleLayout;
    use crate::sandbox::{QuotaKind, SandboxError, SandboxLimits};
    use std::time::Duration;

    struct FixedRenderer(Vec<u8>);

    impl PageRenderer for FixedRenderer {
        fn render(&self, _pdf: &Path, _page: u32, _dpi: u32) -> Result<Vec<u8>, RenderError> {
            Ok(self.0.clone())
        }
    }

    fn sandbox_with(files: &[(&str, &[u8])], reads: u32, memory: u64) -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let layout = BundleLayout::new(dir.path());
        fs::create_dir_all(&layout.content).unwrap();
        for (rel, bytes) in files {
            let path = layout.content.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
        let limits = SandboxLimits {
            max_file_reads: reads,
            max_duration: Duration::from_secs(60),
            max_memory_bytes: memory,
            max_output_bytes: memory,
        };
        let sandbox = Sandbox::new(&layout, limits).unwrap();
        (dir, sandbox)
    }

    fn path_args(path: &str) -> PathArgs {
        PathArgs {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_list_files_is_sorted_and_relative() {
        let (_dir, sandbox) = sandbox_with(
            &[("src/b.py", b"b"), ("src/a.py", b"a"), ("README.md", b"r")],
            5,
            1024,
        );
        let out = list_files(
            &sandbox,
            &ListFilesArgs {
                path: ".".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["files"], json!(["README.md", "src/a.py", "src/b.py"]));

        let out = list_files(
            &sandbox,
            &ListFilesArgs {
                path: "src".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["files"], json!(["src/a.py", "src/b.py"]));
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }

    #[test]
    fn test_list_files_on_file_is_not_a_directory() {
        let (_dir, sandbox) = sandbox_with(&[("a.txt", b"a")], 5, 1024);
        let err = list_files(
            &sandbox,
            &ListFilesArgs {
                path: "a.txt".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_a_directory");
    }

    #[cfg(unix)]
    #[test]
    fn test_list_files_does_not_traverse_symlinked_dirs() {
        let (dir, sandbox) = sandbox_with(&[("real/a.txt", b"a")], 5, 1024);
        std::os::unix::fs::symlink(
            dir.path().join("content/real"),
            dir.path().join("content/alias"),
        )
        .unwrap();
        let out = list_files(
            &sandbox,
            &ListFilesArgs {
                path: ".".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["files"], json!(["alias", "real/a.txt"]));
    }

    #[test]
    fn test_read_file_charges_read_and_memory() {
        let (_dir, mut sandbox) = sandbox_with(&[("a.txt", b"hello")], 5, 1024);
        let out = read_file(&mut sandbox, &path_args("a.txt")).unwrap();
        assert_eq!(out["content"], json!("hello"));
        let usage = sandbox.usage();
        assert_eq!(usage.reads_consumed, 1);
        assert_eq!(usage.bytes_read, 5);
    }

    #[test]
    fn test_read_file_lossy_utf8() {
        let (_dir, mut sandbox) = sandbox_with(&[("bin.dat", &[0x66, 0xff, 0x6f])], 5, 1024);
        let out = read_file(&mut sandbox, &path_args("bin.dat")).unwrap();
        assert_eq!(out["content"], json!("f\u{fffd}o"));
    }

    #[test]
    fn test_read_file_missing_does_not_charge() {
        let (_dir, mut sandbox) = sandbox_with(&[], 5, 1024);
        let err = read_file(&mut sandbox, &path_args("nope.txt")).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }

    #[test]
    fn test_read_file_over_memory_budget_does_not_charge_read() {
        let (_dir, mut sandbox) = sandbox_with(&[("big.txt", &[b'x'; 64])], 5, 32);
        let err = read_file(&mut sandbox, &path_args("big.txt")).unwrap_err();
        assert!(matches!(
            err,
            ToolError::Sandbox(SandboxError::QuotaExceeded {
                kind: QuotaKind::Memory,
                ..
            })
        ));
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }

    #[test]
    fn test_read_image_attaches_base64() {
        let (_dir, mut sandbox) = sandbox_with(&[("img/logo.PNG", &[1, 2, 3])], 5, 1024);
        let (payload, attachment) = read_image(&mut sandbox, &path_args("img/logo.PNG")).unwrap();
        assert_eq!(payload["mime_type"], json!("image/png"));
        assert!(payload.get("base64").is_none());
        assert_eq!(attachment.data, BASE64.encode([1u8, 2, 3]));
        assert_eq!(attachment.source, "img/logo.PNG");
    }

    #[test]
    fn test_read_image_rejects_unknown_extension_before_charging() {
        let (_dir, mut sandbox) = sandbox_with(&[("notes.txt", b"x")], 5, 1024);
        let err = read_image(&mut sandbox, &path_args("notes.txt")).unwrap_err();
        assert_eq!(err.kind(), "unsupported_media");
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }

    #[test]
    fn test_read_page_uses_renderer() {
        let (_dir, mut sandbox) = sandbox_with(&[("docs/spec.pdf", b"%PDF-1.4")], 5, 1024);
        let renderer = FixedRenderer(vec![0x89, b'P', b'N', b'G']);
        let args = ReadPageArgs {
            path: "docs/spec.pdf".to_string(),
            page: 2,
            dpi: 150,
        };
        let (payload, attachment) = read_page(&mut sandbox, &renderer, &args).unwrap();
        assert_eq!(payload["page"], json!(2));
        assert_eq!(attachment.page, Some(2));
        assert_eq!(sandbox.usage().reads_consumed, 1);
        assert_eq!(sandbox.usage().bytes_read, 4);
    }

    struct BrokenRenderer;

    impl PageRenderer for BrokenRenderer {
        fn render(&self, _pdf: &Path, _page: u32, _dpi: u32) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Failed("pdftoppm exited with status 1".to_string()))
        }
    }

    fn page_args(path: &str) -> ReadPageArgs {
        ReadPageArgs {
            path: path.to_string(),
            page: 1,
            dpi: 150,
        }
    }

    #[test]
    fn test_failed_render_is_not_charged() {
        let (_dir, mut sandbox) = sandbox_with(&[("a.pdf", b"%PDF")], 5, 1024);
        let err = read_page(&mut sandbox, &BrokenRenderer, &page_args("a.pdf")).unwrap_err();
        assert_eq!(err.kind(), "render_failed");
        assert_eq!(sandbox.usage().reads_consumed, 0);
        assert_eq!(sandbox.usage().bytes_read, 0);
    }

    #[test]
    fn test_oversized_render_is_not_charged() {
        let (_dir, mut sandbox) = sandbox_with(&[("a.pdf", b"%PDF")], 5, 16);
        let renderer = FixedRenderer(vec![0u8; 64]);
        let err = read_page(&mut sandbox, &renderer, &page_args("a.pdf")).unwrap_err();
        assert!(matches!(
            err,
            ToolError::Sandbox(SandboxError::QuotaExceeded {
                kind: QuotaKind::Memory,
                ..
            })
        ));
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }

    #[test]
    fn test_read_page_checks_read_quota_before_rendering() {
        let (_dir, mut sandbox) = sandbox_with(&[("a.pdf", b"%PDF")], 0, 1024);
        let err = read_page(&mut sandbox, &BrokenRenderer, &page_args("a.pdf")).unwrap_err();
        assert_eq!(err.kind(), "quota_exceeded");
    }

    #[test]
    fn test_read_page_rejects_page_zero() {
        let (_dir, mut sandbox) = sandbox_with(&[("a.pdf", b"%PDF")], 5, 1024);
        let renderer = FixedRenderer(Vec::new());
        let args = ReadPageArgs {
            path: "a.pdf".to_string(),
            page: 0,
            dpi: 150,
        };
        let err = read_page(&mut sandbox, &renderer, &args).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
        assert_eq!(sandbox.usage().reads_consumed, 0);
    }
}
