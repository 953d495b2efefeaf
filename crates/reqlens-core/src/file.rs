//! Uploaded files
//!
//! A multipart parser upstream turns every file part into a
//! [`FileDescriptor`] and hands them over grouped by field name in a
//! [`FileBag`]. The request facade wraps each descriptor in an
//! [`UploadedFile`], which validates lazily against size and extension
//! constraints and collects failures instead of raising them.
//!
//! # Example
//!
//! ```rust
//! use reqlens_core::{FileDescriptor, FileValidationOptions, UploadedFile};
//!
//! let descriptor = FileDescriptor::new("avatar", "me.gif", "/tmp/upload_1", 4096)
//!     .content_type("image/gif");
//! let mut file = UploadedFile::new(descriptor);
//!
//! file.validate_with(&FileValidationOptions::new().size(1024).extnames(["png", "jpg"]));
//! assert!(!file.is_valid());
//! assert_eq!(file.errors().len(), 2);
//! ```

use crate::error::Result;
use crate::mime_table;
use crate::negotiate::mime_matches;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Size and extension constraints for an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidationOptions {
    /// Maximum size in bytes
    pub size: Option<u64>,
    /// Allowed extensions, without leading dots
    pub extnames: Option<Vec<String>>,
}

impl FileValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte ceiling
    pub fn size(mut self, bytes: u64) -> Self {
        self.size = Some(bytes);
        self
    }

    /// Set the extension allow-list
    pub fn extnames<I, S>(mut self, extnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extnames = Some(extnames.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.extnames.is_none()
    }
}

/// One uploaded file part, as produced by the multipart parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Form field the file was sent under
    pub field_name: String,
    /// File name reported by the client
    pub client_name: String,
    /// Where the parser streamed the content
    pub tmp_path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Top-level media type (`image`)
    pub media_type: Option<String>,
    /// Media subtype (`png`)
    pub subtype: Option<String>,
    /// Byte ceiling attached by validation options
    pub size_limit: Option<u64>,
    /// Extension allow-list attached by validation options
    pub allowed_extensions: Option<Vec<String>>,
}

impl FileDescriptor {
    pub fn new(
        field_name: impl Into<String>,
        client_name: impl Into<String>,
        tmp_path: impl Into<PathBuf>,
        size: u64,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            client_name: client_name.into(),
            tmp_path: tmp_path.into(),
            size,
            media_type: None,
            subtype: None,
            size_limit: None,
            allowed_extensions: None,
        }
    }

    /// Set the declared `Content-Type` of the part (`image/png; q=...`)
    pub fn content_type(mut self, content_type: &str) -> Self {
        let base = content_type.split(';').next().unwrap_or("").trim();
        if let Some((media_type, subtype)) = base.split_once('/') {
            self.media_type = Some(media_type.to_ascii_lowercase());
            self.subtype = Some(subtype.to_ascii_lowercase());
        }
        self
    }
}

/// Whether one allow-list entry admits an upload.
///
/// Entries with a `/` are media-type patterns (`image/png`, `image/*`)
/// matched against the declared type. Other entries are extensions; the
/// declared type, when there is one, must be the type the extension maps to.
fn entry_permits(entry: &str, extname: &str, content_type: Option<&str>) -> bool {
    let entry = entry.trim().trim_start_matches('.');
    if entry.contains('/') {
        return content_type
            .is_some_and(|ct| mime_matches(&entry.to_ascii_lowercase(), ct));
    }
    if !entry.eq_ignore_ascii_case(extname) {
        return false;
    }
    match (content_type, mime_table::lookup(entry)) {
        (Some(declared), Some(expected)) => declared.eq_ignore_ascii_case(expected),
        _ => true,
    }
}

/// Files grouped by form field, in the order the parser produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBag {
    fields: Vec<(String, Vec<FileDescriptor>)>,
}

impl FileBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file under its field name.
    pub fn insert(&mut self, descriptor: FileDescriptor) {
        match self
            .fields
            .iter_mut()
            .find(|(name, _)| *name == descriptor.field_name)
        {
            Some((_, files)) => files.push(descriptor),
            None => self
                .fields
                .push((descriptor.field_name.clone(), vec![descriptor])),
        }
    }

    /// Files uploaded under `field`, empty when none were.
    pub fn get(&self, field: &str) -> &[FileDescriptor] {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, files)| files.as_slice())
            .unwrap_or(&[])
    }

    /// Every file, field order then part order.
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.fields.iter().flat_map(|(_, files)| files.iter())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of files across all fields.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, files)| files.len()).sum()
    }
}

impl FromIterator<FileDescriptor> for FileBag {
    fn from_iter<I: IntoIterator<Item = FileDescriptor>>(iter: I) -> Self {
        let mut bag = FileBag::new();
        for descriptor in iter {
            bag.insert(descriptor);
        }
        bag
    }
}

/// Kind of a file validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileErrorKind {
    /// No file was uploaded for the field
    Required,
    /// The file exceeds the size limit
    Size,
    /// The extension is not in the allow-list
    Extname,
    /// Moving the file failed
    Fatal,
}

/// A file validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    /// Field name
    pub field: String,
    /// Failure kind (`size`, `extname`, ...)
    #[serde(rename = "type")]
    pub kind: FileErrorKind,
    /// Human-readable message
    pub message: String,
}

/// Lifecycle of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Moved,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MovedTo {
    file_name: String,
    file_path: PathBuf,
}

/// View over one uploaded file, or over its absence.
///
/// Absent views keep call sites branch-free: `request.file("logo")` always
/// returns something, and `exists()` says whether a file was actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    field_name: String,
    descriptor: Option<FileDescriptor>,
    errors: Vec<FileError>,
    validated: bool,
    moved: Option<MovedTo>,
}

impl UploadedFile {
    /// Wrap a descriptor produced by the multipart parser.
    pub fn new(descriptor: FileDescriptor) -> Self {
        Self {
            field_name: descriptor.field_name.clone(),
            descriptor: Some(descriptor),
            errors: Vec::new(),
            validated: false,
            moved: None,
        }
    }

    /// A view for a field that carried no file.
    pub fn absent(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            descriptor: None,
            errors: Vec::new(),
            validated: false,
            moved: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn client_name(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.client_name.as_str())
    }

    pub fn tmp_path(&self) -> Option<&Path> {
        self.descriptor.as_ref().map(|d| d.tmp_path.as_path())
    }

    /// Size in bytes, 0 when absent
    pub fn size(&self) -> u64 {
        self.descriptor.as_ref().map_or(0, |d| d.size)
    }

    pub fn media_type(&self) -> Option<&str> {
        self.descriptor.as_ref().and_then(|d| d.media_type.as_deref())
    }

    pub fn subtype(&self) -> Option<&str> {
        self.descriptor.as_ref().and_then(|d| d.subtype.as_deref())
    }

    /// `type/subtype` when both are known
    pub fn content_type(&self) -> Option<String> {
        Some(format!("{}/{}", self.media_type()?, self.subtype()?))
    }

    /// Lower-cased extension from the client name, else from the media type.
    pub fn extname(&self) -> Option<String> {
        let descriptor = self.descriptor.as_ref()?;
        Path::new(&descriptor.client_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(str::to_ascii_lowercase)
            .or_else(|| {
                self.content_type()
                    .and_then(|ct| mime_table::extension_for(&ct))
                    .map(str::to_string)
            })
    }

    pub fn size_limit(&self) -> Option<u64> {
        self.descriptor.as_ref().and_then(|d| d.size_limit)
    }

    pub fn allowed_extensions(&self) -> Option<&[String]> {
        self.descriptor
            .as_ref()
            .and_then(|d| d.allowed_extensions.as_deref())
    }

    /// Attach constraints the descriptor does not carry yet.
    ///
    /// Limits already present on the descriptor win over `options`.
    pub fn set_validation_options(&mut self, options: &FileValidationOptions) {
        let Some(descriptor) = self.descriptor.as_mut() else {
            return;
        };
        if descriptor.size_limit.is_none() {
            descriptor.size_limit = options.size;
        }
        if descriptor.allowed_extensions.is_none() {
            descriptor.allowed_extensions = options.extnames.clone();
        }
    }

    /// Run presence, size and extension checks once.
    ///
    /// Failures are appended to [`errors`](Self::errors); later calls are
    /// no-ops.
    pub fn validate(&mut self) {
        if self.validated {
            return;
        }
        self.validated = true;

        let Some(descriptor) = self.descriptor.as_ref() else {
            let message = format!("The {} must be a file", self.field_name);
            self.push_error(FileErrorKind::Required, message);
            return;
        };

        if let Some(limit) = descriptor.size_limit {
            if descriptor.size > limit {
                let message = format!("File size should be less than {}", format_bytes(limit));
                self.push_error(FileErrorKind::Size, message);
            }
        }

        if let Some(allowed) = self.allowed_extensions() {
            let extname = self.extname().unwrap_or_default();
            let content_type = self.content_type();
            let permitted = allowed
                .iter()
                .any(|entry| entry_permits(entry, &extname, content_type.as_deref()));
            if !permitted {
                let message = format!(
                    "Invalid file extension {}. Only {} are allowed",
                    extname,
                    allowed.join(", ")
                );
                self.push_error(FileErrorKind::Extname, message);
            }
        }
    }

    /// Attach `options`, then [`validate`](Self::validate).
    pub fn validate_with(&mut self, options: &FileValidationOptions) {
        self.set_validation_options(options);
        self.validate();
    }

    pub fn errors(&self) -> &[FileError] {
        &self.errors
    }

    /// True once validated without errors.
    pub fn is_valid(&self) -> bool {
        self.validated && self.errors.is_empty()
    }

    pub fn status(&self) -> FileStatus {
        if !self.errors.is_empty() {
            FileStatus::Error
        } else if self.moved.is_some() {
            FileStatus::Moved
        } else {
            FileStatus::Pending
        }
    }

    pub fn moved(&self) -> bool {
        self.moved.is_some()
    }

    /// Name the file was stored under after [`move_to`](Self::move_to)
    pub fn file_name(&self) -> Option<&str> {
        self.moved.as_ref().map(|m| m.file_name.as_str())
    }

    /// Full path the file was stored at after [`move_to`](Self::move_to)
    pub fn file_path(&self) -> Option<&Path> {
        self.moved.as_ref().map(|m| m.file_path.as_path())
    }

    /// Move the upload out of its temporary location into `dir`.
    ///
    /// Validates first; invalid or absent files are left in place. The
    /// client name is used when `name` is `None`. Returns whether the file
    /// was moved; I/O failures are recorded as a `fatal` error.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut avatar = request.file("avatar");
    /// if avatar.move_to("./uploads", Some("avatar.png")).await {
    ///     println!("stored at {:?}", avatar.file_path());
    /// }
    /// ```
    pub async fn move_to(&mut self, dir: impl AsRef<Path>, name: Option<&str>) -> bool {
        self.validate();
        if !self.errors.is_empty() || self.moved.is_some() {
            return false;
        }
        let Some(descriptor) = self.descriptor.as_ref() else {
            return false;
        };

        let file_name = sanitize_filename(name.unwrap_or(&descriptor.client_name));
        let file_path = dir.as_ref().join(&file_name);

        match relocate(&descriptor.tmp_path, dir.as_ref(), &file_path).await {
            Ok(()) => {
                self.moved = Some(MovedTo {
                    file_name,
                    file_path,
                });
                true
            }
            Err(err) => {
                trace_warn!(
                    field = %self.field_name,
                    path = %file_path.display(),
                    error = %err,
                    "failed to move uploaded file"
                );
                self.push_error(FileErrorKind::Fatal, format!("Unable to move file: {}", err));
                false
            }
        }
    }

    fn push_error(&mut self, kind: FileErrorKind, message: String) {
        self.errors.push(FileError {
            field: self.field_name.clone(),
            kind,
            message,
        });
    }
}

async fn relocate(from: &Path, dir: &Path, to: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // rename cannot cross filesystems
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

/// Strip path separators and parent references from a client file name.
fn sanitize_filename(filename: &str) -> String {
    filename
        .replace(['/', '\\'], "_")
        .replace("..", "_")
        .trim_start_matches('.')
        .to_string()
}

/// `2097152` -> `2MB`, `1536` -> `1.5KB`.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, UNITS[unit])
}

#[derive(Serialize)]
struct FileSummary<'a> {
    field_name: &'a str,
    client_name: Option<&'a str>,
    size: u64,
    #[serde(rename = "type")]
    media_type: Option<&'a str>,
    subtype: Option<&'a str>,
    extname: Option<String>,
    status: FileStatus,
    file_name: Option<&'a str>,
    errors: &'a [FileError],
}

impl Serialize for UploadedFile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FileSummary {
            field_name: &self.field_name,
            client_name: self.client_name(),
            size: self.size(),
            media_type: self.media_type(),
            subtype: self.subtype(),
            extname: self.extname(),
            status: self.status(),
            file_name: self.file_name(),
            errors: &self.errors,
        }
        .serialize(serializer)
    }
}
