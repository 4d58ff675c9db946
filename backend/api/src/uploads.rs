//! Multipart intake and the shared upload area.
//!
//! Files land under `UPLOAD_DIR/<subdir>/` with a `prefix-<millis>-<random>`
//! name and are served back from `/uploads/<subdir>/<name>`. Identity images
//! never enter that tree: they are staged under a separate, unserved
//! directory for the length of one verification call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    CampaignImage,
    CampaignVideo,
    Proof,
    PlatformLogo,
}

impl UploadKind {
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::CampaignImage => "campaigns/images",
            Self::CampaignVideo => "campaigns/videos",
            Self::Proof => "proofs",
            Self::PlatformLogo => "platform",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::CampaignImage => "image",
            Self::CampaignVideo => "video",
            Self::Proof => "proof",
            Self::PlatformLogo => "logo",
        }
    }

    /// Whether a part with this content type may be stored under this kind.
    pub fn accepts(&self, content_type: Option<&str>) -> bool {
        let ct = content_type.unwrap_or_default();
        match self {
            Self::CampaignImage | Self::PlatformLogo => ct.starts_with("image/"),
            Self::CampaignVideo => ct.starts_with("video/"),
            Self::Proof => {
                ct.starts_with("image/") || ct == "application/pdf" || ct.starts_with("text/")
            }
        }
    }
}

/// One file part of a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A fully buffered multipart body: text fields by name, file parts in order.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub async fn collect(mut multipart: Multipart) -> Result<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    if bytes.is_empty() {
                        continue;
                    }
                    form.files.push(FilePart {
                        field: name,
                        file_name: Some(file_name),
                        content_type,
                        bytes,
                    });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parts sent under `name`, also matching the `name[]` array spelling.
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FilePart> + 'a {
        self.files
            .iter()
            .filter(move |f| f.field == name || f.field.strip_suffix("[]") == Some(name))
    }

    pub fn file<'a>(&'a self, name: &'a str) -> Option<&'a FilePart> {
        self.files_named(name).next()
    }
}

/// `prefix-<millis>-<nine digits><.ext>`.
pub fn unique_name(prefix: &str, original: Option<&str>, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let ext = original
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{prefix}-{}-{suffix:09}{ext}", now.timestamp_millis())
}

/// A file written to the upload area.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    /// Public relative URL, e.g. `/uploads/proofs/proof-...pdf`.
    pub url: String,
}

/// A file written during a request, deleted when dropped unless kept.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    armed: bool,
}

impl TempUpload {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file on disk.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove staged upload: {e}"),
        }
    }
}

/// A request's worth of public uploads, removed again unless committed once
/// the owning record is stored.
#[derive(Debug, Default)]
pub struct StagedUploads {
    files: Vec<TempUpload>,
    urls: Vec<String>,
}

impl StagedUploads {
    pub fn urls(&self) -> Vec<String> {
        self.urls.clone()
    }

    pub fn commit(self) {
        for file in self.files {
            file.keep();
        }
    }
}

fn unsupported(part: &FilePart) -> ApiError {
    ApiError::field(
        &part.field,
        format!(
            "unsupported file type '{}'",
            part.content_type.as_deref().unwrap_or("unknown")
        ),
    )
}

async fn write_part(
    dir: &Path,
    prefix: &str,
    part: &FilePart,
    now: DateTime<Utc>,
) -> Result<(PathBuf, String)> {
    fs::create_dir_all(dir).await?;
    let name = unique_name(prefix, part.file_name.as_deref(), now);
    let path = dir.join(&name);
    fs::write(&path, &part.bytes).await?;
    debug!(path = %path.display(), bytes = part.bytes.len(), "Stored upload");
    Ok((path, name))
}

#[derive(Debug, Clone)]
pub struct UploadArea {
    root: PathBuf,
    staging: PathBuf,
}

impl UploadArea {
    /// `root` is served publicly; `staging` must live outside it.
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        for kind in [
            UploadKind::CampaignImage,
            UploadKind::CampaignVideo,
            UploadKind::Proof,
            UploadKind::PlatformLogo,
        ] {
            fs::create_dir_all(self.root.join(kind.subdir())).await?;
        }
        fs::create_dir_all(&self.staging).await?;
        Ok(())
    }

    pub async fn save(
        &self,
        kind: UploadKind,
        part: &FilePart,
        now: DateTime<Utc>,
    ) -> Result<StoredFile> {
        if !kind.accepts(part.content_type.as_deref()) {
            return Err(unsupported(part));
        }
        let (path, name) =
            write_part(&self.root.join(kind.subdir()), kind.prefix(), part, now).await?;
        Ok(StoredFile {
            path,
            url: format!("/uploads/{}/{name}", kind.subdir()),
        })
    }

    /// Write an identity image to the unserved staging directory. The caller
    /// owns the returned path and must remove it.
    pub async fn stage_identity_image(
        &self,
        part: &FilePart,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let is_image = part
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(unsupported(part));
        }
        let (path, _) = write_part(&self.staging, "kyc", part, now).await?;
        Ok(path)
    }

    pub async fn save_all<'a>(
        &self,
        kind: UploadKind,
        parts: impl Iterator<Item = &'a FilePart>,
        now: DateTime<Utc>,
    ) -> Result<StagedUploads> {
        let mut staged = StagedUploads::default();
        for part in parts {
            let stored = self.save(kind, part, now).await?;
            staged.files.push(TempUpload::new(stored.path));
            staged.urls.push(stored.url);
        }
        Ok(staged)
    }
}
