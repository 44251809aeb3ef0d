//! [`Source`]: the three content origins a command can reference, plus the
//! directory-walk convenience constructors used by callers that want to
//! turn a folder of files into a source list without re-deriving the
//! classification rules themselves.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SourceError;

/// URI schemes recognized as remote references that pass through for later
/// materialization instead of being treated as local paths.
pub const REMOTE_SCHEMES: &[&str] = &["http", "https", "gs"];

/// Directory names skipped by [`sources_from_directory`].
const SKIPPED_DIR_NAMES: &[&str] = &["node_modules", ".git", "__pycache__", ".pytest_cache"];

/// Lazily materializes the bytes behind a [`Source::File`] or
/// [`Source::Remote`]. Cloning a `Source` clones the `Arc`, not the bytes.
pub type ContentLoader = Arc<dyn Fn() -> std::io::Result<Vec<u8>> + Send + Sync>;

/// A single content origin: literal text, a local file, or a remote
/// reference. Identifier + variant together uniquely describe the origin.
#[derive(Clone)]
pub enum Source {
  Text {
    identifier: String,
    text: String,
  },
  File {
    identifier: String,
    path: PathBuf,
    mime: Option<String>,
    size_bytes: u64,
    loader: ContentLoader,
  },
  Remote {
    identifier: String,
    uri: String,
    mime: Option<String>,
    size_bytes: Option<u64>,
  },
}

impl fmt::Debug for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text { identifier, text } => f
        .debug_struct("Source::Text")
        .field("identifier", identifier)
        .field("len", &text.len())
        .finish(),
      Self::File { identifier, path, mime, size_bytes, .. } => f
        .debug_struct("Source::File")
        .field("identifier", identifier)
        .field("path", path)
        .field("mime", mime)
        .field("size_bytes", size_bytes)
        .finish(),
      Self::Remote { identifier, uri, mime, size_bytes } => f
        .debug_struct("Source::Remote")
        .field("identifier", identifier)
        .field("uri", uri)
        .field("mime", mime)
        .field("size_bytes", size_bytes)
        .finish(),
    }
  }
}

impl Source {
  /// Build a text source. The text itself is the identifier: two text
  /// sources with identical content are indistinguishable by design.
  pub fn from_text(text: impl Into<String>) -> Self {
    let text = text.into();
    Self::Text {
      identifier: text.clone(),
      text,
    }
  }

  /// Build a file source. Strict construction: fails immediately if `path`
  /// does not exist or its metadata cannot be read.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|e| {
      SourceError::new(format!("source path does not exist or is unreadable: {} ({e})", path.display()))
    })?;
    if !metadata.is_file() {
      return Err(SourceError::new(format!("source path is not a regular file: {}", path.display())));
    }
    let size_bytes = metadata.len();
    let mime = detect_mime(path);
    let owned = path.to_path_buf();
    let loader: ContentLoader = Arc::new(move || fs::read(&owned));
    Ok(Self::File {
      identifier: path.display().to_string(),
      path: path.to_path_buf(),
      mime,
      size_bytes,
      loader,
    })
  }

  /// Build a remote reference. Passed through uninspected; materialization
  /// happens later, outside the data model.
  pub fn from_uri(uri: impl Into<String>, mime: Option<String>, size_bytes: Option<u64>) -> Self {
    let uri = uri.into();
    Self::Remote {
      identifier: uri.clone(),
      uri,
      mime,
      size_bytes,
    }
  }

  /// Classify a raw string that might be a file path, a remote reference,
  /// or literal prompt text, applying the bare-filename heuristic: a bare
  /// filename (no path separator) that does not exist on disk is treated
  /// as text rather than raising, since it is more often a prompt-like
  /// string than a typo'd path. Returns `(source, heuristic_applied)` so
  /// callers can surface a diagnostic when the heuristic fired.
  pub fn from_raw(raw: &str) -> Result<(Self, bool), SourceError> {
    if let Some(scheme) = REMOTE_SCHEMES.iter().find(|s| raw.starts_with(&format!("{s}://"))) {
      let _ = scheme;
      return Ok((Self::from_uri(raw, None, None), false));
    }
    let path = Path::new(raw);
    if path.exists() {
      return Ok((Self::from_file(path)?, false));
    }
    let is_bare = !raw.contains('/') && !raw.contains('\\');
    if is_bare {
      return Ok((Self::from_text(raw), true));
    }
    Err(SourceError::new(format!("source path does not exist: {raw}")))
  }

  pub fn identifier(&self) -> &str {
    match self {
      Self::Text { identifier, .. } => identifier,
      Self::File { identifier, .. } => identifier,
      Self::Remote { identifier, .. } => identifier,
    }
  }

  pub fn mime(&self) -> Option<&str> {
    match self {
      Self::Text { .. } => Some("text/plain"),
      Self::File { mime, .. } => mime.as_deref(),
      Self::Remote { mime, .. } => mime.as_deref(),
    }
  }

  pub fn size_bytes(&self) -> u64 {
    match self {
      Self::Text { text, .. } => text.len() as u64,
      Self::File { size_bytes, .. } => *size_bytes,
      Self::Remote { size_bytes, .. } => size_bytes.unwrap_or(0),
    }
  }

  /// Load the backing bytes. Text sources clone their string; file sources
  /// read from disk; remote sources have no local bytes to load.
  pub fn load(&self) -> std::io::Result<Vec<u8>> {
    match self {
      Self::Text { text, .. } => Ok(text.clone().into_bytes()),
      Self::File { loader, .. } => loader(),
      Self::Remote { .. } => Ok(Vec::new()),
    }
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, Self::Remote { .. })
  }
}

/// Resolve a MIME type for `path` from its extension, falling back to a
/// magic-byte sniff of the first 512 bytes when the extension is unknown
/// or absent.
pub fn detect_mime(path: &Path) -> Option<String> {
  if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
    if let Some(mime) = mime_for_extension(&ext.to_ascii_lowercase()) {
      return Some(mime.to_string());
    }
  }
  sniff_magic_bytes(path)
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
  Some(match ext {
    "txt" => "text/plain",
    "md" => "text/markdown",
    "json" => "application/json",
    "csv" => "text/csv",
    "html" | "htm" => "text/html",
    "pdf" => "application/pdf",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "mp3" => "audio/mpeg",
    "wav" => "audio/wav",
    "mp4" => "video/mp4",
    _ => return None,
  })
}

fn sniff_magic_bytes(path: &Path) -> Option<String> {
  use std::io::Read;
  let mut file = fs::File::open(path).ok()?;
  let mut buf = [0u8; 512];
  let n = file.read(&mut buf).ok()?;
  let head = &buf[..n];

  if head.starts_with(b"\x89PNG\r\n\x1a\n") {
    return Some("image/png".to_string());
  }
  if head.starts_with(b"\xff\xd8\xff") {
    return Some("image/jpeg".to_string());
  }
  if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
    return Some("image/gif".to_string());
  }
  if head.starts_with(b"%PDF-") {
    return Some("application/pdf".to_string());
  }
  if head.starts_with(b"PK\x03\x04") {
    return Some("application/zip".to_string());
  }
  if std::str::from_utf8(head).is_ok() {
    return Some("text/plain".to_string());
  }
  None
}

/// Walk `dir` recursively (sorted, deterministic order) and build one
/// [`Source::File`] per regular file, skipping VCS/build noise directories.
pub fn sources_from_directory(dir: impl AsRef<Path>) -> Result<Vec<Source>, SourceError> {
  let mut paths = Vec::new();
  iter_files(dir.as_ref(), &mut paths)?;
  paths.sort();
  paths.into_iter().map(Source::from_file).collect()
}

fn iter_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SourceError> {
  let entries = fs::read_dir(dir)
    .map_err(|e| SourceError::new(format!("cannot read directory {}: {e}", dir.display())))?;
  for entry in entries {
    let entry = entry.map_err(|e| SourceError::new(format!("cannot read directory entry: {e}")))?;
    let path = entry.path();
    if path.is_dir() {
      if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if SKIPPED_DIR_NAMES.contains(&name) {
          continue;
        }
      }
      iter_files(&path, out)?;
    } else if path.is_file() {
      out.push(path);
    }
  }
  Ok(())
}
