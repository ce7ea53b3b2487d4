use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use axum::extract::Multipart;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// URL prefix the upload directory is served under
pub const PUBLIC_PREFIX: &str = "/static/uploads";

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "pdf", "svg", "ai", "psd", "zip"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Document,
}

impl UploadKind {
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Image => IMAGE_EXTENSIONS,
            UploadKind::Document => DOCUMENT_EXTENSIONS,
        }
    }

    pub fn allows(&self, filename: &str) -> bool {
        extension(filename).is_some_and(|ext| self.allowed_extensions().contains(&ext.as_str()))
    }
}

/// Subdirectories of the upload root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Products,
    Services,
    Files,
}

impl Folder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Products => "products",
            Folder::Services => "services",
            Folder::Files => "files",
        }
    }
}

pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reduce a client-supplied file name to a safe ASCII name, keeping its extension
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };

    let clean = |part: &str| -> String {
        part.chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect()
    };

    let stem = clean(stem).trim_start_matches(['.', '_']).to_string();
    let stem = if stem.is_empty() { "upload".to_string() } else { stem };

    match ext.map(clean).filter(|e| !e.is_empty()) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Whether a public URL points inside `folder` of the store
pub fn in_folder(url: &str, folder: Folder) -> bool {
    url.strip_prefix(PUBLIC_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.split('/').next())
        == Some(folder.as_str())
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// A declared content type must be `image/*`; an absent or generic one is accepted
    pub fn is_image_content(&self) -> bool {
        match self.content_type.as_deref().map(str::parse::<mime::Mime>) {
            None => true,
            Some(Ok(m)) => m.type_() == mime::IMAGE || m == mime::APPLICATION_OCTET_STREAM,
            Some(Err(_)) => false,
        }
    }
}

/// Text fields and at most one file from a multipart body
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart, file_field: &str, max_bytes: usize) -> ApiResult<Self> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == file_field {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;

                if bytes.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge { max_bytes });
                }
                // browsers send an empty part when no file was chosen
                if !file_name.is_empty() && !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field '{name}': {e}")))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed value of a text field, `None` when absent or blank
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Parse an optional price field; blank and `null` mean "not given"
    pub fn price(&self, name: &str) -> ApiResult<Option<f64>> {
        match self.fields.get(name).map(|v| v.trim()) {
            None | Some("") | Some("null") => Ok(None),
            Some(raw) => match raw.parse::<f64>() {
                Ok(price) if price.is_finite() && price >= 0.0 => Ok(Some(price)),
                _ => Err(ApiError::Validation {
                    message: "Validation failed".to_string(),
                    details: json!({ name: ["Price must be a non-negative number."] }),
                }),
            },
        }
    }

    pub fn id(&self, name: &str) -> ApiResult<Option<i32>> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i32>()
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("{name} must be an integer"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub stored_name: String,
    pub public_url: String,
    pub path: PathBuf,
}

/// Filesystem store for uploaded images and documents
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate and write an upload under `folder` with a collision-free name
    pub async fn store(&self, folder: Folder, file: &UploadedFile, kind: UploadKind) -> ApiResult<StoredFile> {
        if !kind.allows(&file.file_name) {
            return Err(ApiError::Validation {
                message: "Invalid file format".to_string(),
                details: json!({ "allowed_formats": kind.allowed_extensions() }),
            });
        }
        if kind == UploadKind::Image && !file.is_image_content() {
            return Err(ApiError::bad_request("Uploaded file is not an image"));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(ApiError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }

        let stored_name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(&file.file_name));
        let dir = self.root.join(folder.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&stored_name);
        tokio::fs::write(&path, &file.bytes).await?;
        info!("Stored upload {} ({} bytes)", path.display(), file.bytes.len());

        Ok(StoredFile {
            public_url: format!("{PUBLIC_PREFIX}/{}/{stored_name}", folder.as_str()),
            stored_name,
            path,
        })
    }

    /// Map a public URL back to a path inside the store, refusing anything that escapes it
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let relative = Path::new(relative);
        if relative.components().all(|c| matches!(c, Component::Normal(_))) {
            Some(self.root.join(relative))
        } else {
            None
        }
    }

    /// Delete a stored file by its public URL; missing files are ignored
    pub async fn remove_url(&self, url: &str) {
        let Some(path) = self.path_for_url(url) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Removed upload {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove upload {}: {e}", path.display()),
        }
    }
}
