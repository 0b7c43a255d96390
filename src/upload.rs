use chrono::Utc;
use indicatif::HumanBytes;
use multipart::server::Multipart;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_FILE_SIZE: u64 = 150 * 1024 * 1024;
pub const MAX_FILES: usize = 10;
pub const FIELD_NAME: &str = "media";
pub const UPLOAD_ROUTE: &str = "/upload";
/// Response header carrying `UploadError::kind` on rejected uploads.
pub const UPLOAD_ERROR_HEADER: &str = "X-Upload-Error";
pub const SUCCESS_MESSAGE: &str = "Fichiers envoyés avec succès !";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("valid filename pattern"));

/// Per-request limits of the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_files: MAX_FILES,
        }
    }
}

/// Descriptor of one stored file, as listed in the manifest.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadedFile {
    #[serde(rename = "filename")]
    pub stored_name: String,
    #[serde(rename = "originalname")]
    pub original_name: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<UploadedFile>,
}

impl UploadResponse {
    pub fn new(files: Vec<UploadedFile>) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            files,
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Aucun fichier reçu.")]
    NoFiles,

    #[error("Trop de fichiers : {max} au maximum par envoi.")]
    TooManyFiles { max: usize },

    #[error("Champ inattendu : {field} (attendu : media)")]
    UnexpectedField { field: String },

    #[error("Seules les images et les vidéos sont acceptées ({filename} : {mime_type}).")]
    UnsupportedMediaType { filename: String, mime_type: String },

    #[error("Fichier trop volumineux : {filename} dépasse la limite de {}.", format_size(.limit))]
    FileTooLarge { filename: String, limit: u64 },

    #[error("Requête multipart invalide : {0}")]
    Malformed(String),

    #[error("Erreur interne lors de l'enregistrement des fichiers.")]
    Storage(#[from] io::Error),
}

impl UploadError {
    /// Stable code sent in `X-Upload-Error`.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::NoFiles => "no-files",
            UploadError::TooManyFiles { .. } => "too-many-files",
            UploadError::UnexpectedField { .. } => "unexpected-field",
            UploadError::UnsupportedMediaType { .. } => "unsupported-media-type",
            UploadError::FileTooLarge { .. } => "file-too-large",
            UploadError::Malformed(_) => "malformed-request",
            UploadError::Storage(_) => "storage-error",
        }
    }

    /// Every rejection is reported as a client error.
    pub fn status(&self) -> u16 {
        400
    }
}

pub fn format_size(bytes: &u64) -> String {
    HumanBytes(*bytes).to_string()
}

/// Keep only `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "").into_owned()
}

/// `<epoch-millis>-<sanitized name>`
pub fn stored_name(millis: i64, original: &str) -> String {
    format!("{millis}-{}", sanitize_filename(original))
}

pub fn is_allowed_media_type(mime: &str) -> bool {
    mime.starts_with("image/") || mime.starts_with("video/")
}

/// Extract the boundary of a `multipart/form-data` Content-Type value.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let mut parts = value.split(';');
    let essence = parts.next()?.trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parts.find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let val = val.trim().trim_matches('"');
        if val.is_empty() {
            None
        } else {
            Some(val.to_string())
        }
    })
}

/// Read a multipart body and store every `media` file part in `dir`.
///
/// The whole request fails on the first rejected part, and the files this
/// request already stored are removed. A part's declared type is checked
/// before any of its bytes is written.
pub fn store_uploads<R: Read>(
    body: R,
    boundary: &str,
    dir: &Path,
    limits: &UploadLimits,
) -> Result<Vec<UploadedFile>, UploadError> {
    let mut multipart = Multipart::with_body(body, boundary);
    let mut stored = Vec::new();

    match read_parts(&mut multipart, dir, limits, &mut stored) {
        Ok(()) if stored.is_empty() => Err(UploadError::NoFiles),
        Ok(()) => Ok(stored),
        Err(e) => {
            discard(dir, &stored);
            Err(e)
        }
    }
}

fn read_parts<R: Read>(
    multipart: &mut Multipart<R>,
    dir: &Path,
    limits: &UploadLimits,
    stored: &mut Vec<UploadedFile>,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart
        .read_entry()
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        // Text fields and empty file inputs carry no file
        let original_name = match field.headers.filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        if &*field.headers.name != FIELD_NAME {
            return Err(UploadError::UnexpectedField {
                field: field.headers.name.to_string(),
            });
        }
        if stored.len() >= limits.max_files {
            return Err(UploadError::TooManyFiles {
                max: limits.max_files,
            });
        }

        let mime_type = field
            .headers
            .content_type
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !is_allowed_media_type(&mime_type) {
            return Err(UploadError::UnsupportedMediaType {
                filename: original_name,
                mime_type,
            });
        }

        let (stored_name, size_bytes) =
            write_limited(&mut field.data, dir, &original_name, limits.max_file_size)?;
        stored.push(UploadedFile {
            stored_name,
            original_name,
            mime_type,
            size_bytes,
        });
    }
    Ok(())
}

/// Stream `data` into a fresh file; a file over `max_size` is deleted.
fn write_limited<R: Read>(
    data: &mut R,
    dir: &Path,
    original_name: &str,
    max_size: u64,
) -> Result<(String, u64), UploadError> {
    let (name, path, mut file) = create_unique(dir, original_name)?;
    let copied = io::copy(&mut data.take(max_size + 1), &mut file);
    drop(file);

    match copied {
        Ok(n) if n > max_size => {
            let _ = fs::remove_file(&path);
            Err(UploadError::FileTooLarge {
                filename: original_name.to_string(),
                limit: max_size,
            })
        }
        Ok(n) => Ok((name, n)),
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(UploadError::Storage(e))
        }
    }
}

/// Create `<millis>-<name>` without ever replacing an existing file; on a
/// clash the stamp moves forward one millisecond.
fn create_unique(dir: &Path, original_name: &str) -> Result<(String, PathBuf, File), UploadError> {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let name = stored_name(millis, original_name);
        let path = dir.join(&name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((name, path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => millis += 1,
            Err(e) => return Err(UploadError::Storage(e)),
        }
    }
}

fn discard(dir: &Path, stored: &[UploadedFile]) {
    for file in stored {
        let _ = fs::remove_file(dir.join(&file.stored_name));
    }
}
