use anyhow::{Context, Result};
use console::style;
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::gallery;
use crate::upload::{
    UPLOAD_ERROR_HEADER, UPLOAD_ROUTE, UploadError, UploadLimits, UploadResponse,
    boundary_from_content_type, store_uploads,
};

pub const DEFAULT_PORT: u16 = 3000;
pub const PUBLIC_DIR: &str = "public";
pub const UPLOAD_DIR: &str = "uploads";

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub port: u16,
    pub public_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub limits: UploadLimits,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            public_dir: PathBuf::from(PUBLIC_DIR),
            upload_dir: PathBuf::from(UPLOAD_DIR),
            limits: UploadLimits::default(),
        }
    }
}

/// Server state: resolved directories and upload limits. Nothing else is
/// shared between requests.
pub struct ServerState {
    pub public_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub limits: UploadLimits,
}

impl ServerState {
    /// Create the upload and public directories when absent, resolve them,
    /// and write a gallery page if the public directory has none.
    pub fn new(config: &ServeConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.upload_dir).with_context(|| {
            format!(
                "Impossible de créer le dossier d'envoi : {}",
                config.upload_dir.display()
            )
        })?;
        std::fs::create_dir_all(&config.public_dir).with_context(|| {
            format!(
                "Impossible de créer le dossier public : {}",
                config.public_dir.display()
            )
        })?;

        let public_dir = config
            .public_dir
            .canonicalize()
            .with_context(|| format!("Dossier introuvable : {}", config.public_dir.display()))?;
        let upload_dir = config
            .upload_dir
            .canonicalize()
            .with_context(|| format!("Dossier introuvable : {}", config.upload_dir.display()))?;

        gallery::ensure_index(&public_dir)?;

        Ok(Arc::new(Self {
            public_dir,
            upload_dir,
            limits: config.limits,
        }))
    }
}

/// MIME type from file extension.
fn mime_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_().as_str() == "text" {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("header is valid ASCII")
}

/// JSON error response helper.
fn json_error(status: u16, msg: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::json!({ "error": msg }).to_string();
    Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "application/json"))
}

/// Plain-text rejection of an upload, with its machine code.
fn upload_error(err: &UploadError) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(err.to_string())
        .with_status_code(StatusCode(err.status()))
        .with_header(header("Content-Type", "text/plain; charset=utf-8"))
        .with_header(header(UPLOAD_ERROR_HEADER, err.kind()))
}

/// Validate that a relative path doesn't escape the base dir.
pub fn safe_path(base: &Path, relative: &str) -> Option<PathBuf> {
    let clean = relative.replace('\\', "/");
    // Reject absolute paths and traversal
    if clean.starts_with('/') || clean.contains("..") {
        return None;
    }
    let full = base.join(&clean);
    // Verify it's actually under base
    if full.starts_with(base) {
        Some(full)
    } else {
        None
    }
}

/// Minimal URL decode (%XX and +).
pub fn urldecode(s: &str) -> String {
    let mut result = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(val) = u8::from_str_radix(
                &String::from_utf8_lossy(&bytes[i + 1..i + 3]),
                16,
            ) {
                result.push(val);
                i += 3;
                continue;
            }
        }
        if bytes[i] == b'+' {
            result.push(b' ');
        } else {
            result.push(bytes[i]);
        }
        i += 1;
    }
    String::from_utf8_lossy(&result).to_string()
}

fn content_type_of(req: &Request) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string())
}

/// Handle a single HTTP request.
pub fn handle_request(req: Request, state: &ServerState) {
    let url = req.url().to_string();
    let method = req.method().clone();
    let path = url.split('?').next().unwrap_or(&url);

    match (&method, path) {
        (&Method::Post, UPLOAD_ROUTE) => handle_upload(req, state),

        // Static file serving from the public directory
        (&Method::Get, _) => {
            let rel = urldecode(&path[1..]);
            let rel = if rel.is_empty() {
                "index.html".to_string()
            } else {
                rel
            };
            if let Some(full_path) = safe_path(&state.public_dir, &rel) {
                if full_path.is_file() {
                    match std::fs::File::open(&full_path) {
                        Ok(file) => {
                            let len = file.metadata().map(|m| m.len()).unwrap_or(0);
                            let resp = Response::from_file(file)
                                .with_header(header("Content-Type", &mime_type(&full_path)))
                                .with_header(header("Content-Length", &len.to_string()));
                            let _ = req.respond(resp);
                        }
                        Err(_) => {
                            let _ = req.respond(json_error(500, "Erreur lecture fichier"));
                        }
                    }
                } else {
                    let _ = req.respond(json_error(404, "Fichier introuvable"));
                }
            } else {
                let _ = req.respond(json_error(400, "Chemin invalide"));
            }
        }

        _ => {
            let _ = req.respond(json_error(405, "Méthode non supportée"));
        }
    }
}

fn handle_upload(mut req: Request, state: &ServerState) {
    let boundary = content_type_of(&req).and_then(|ct| boundary_from_content_type(&ct));
    let result = match boundary {
        Some(boundary) => store_uploads(
            req.as_reader(),
            &boundary,
            &state.upload_dir,
            &state.limits,
        ),
        None => Err(UploadError::Malformed("Content-Type multipart/form-data attendu".to_string())),
    };

    match result {
        Ok(files) => {
            for file in &files {
                println!(
                    "  {} {} {} {}  {}",
                    style("✔").green().bold(),
                    style(&file.original_name).white(),
                    style("→").dim(),
                    style(&file.stored_name).cyan(),
                    style(HumanBytes(file.size_bytes)).dim()
                );
            }
            match serde_json::to_string(&UploadResponse::new(files)) {
                Ok(body) => {
                    let resp = Response::from_string(body)
                        .with_header(header("Content-Type", "application/json"));
                    let _ = req.respond(resp);
                }
                Err(e) => {
                    let _ = req.respond(json_error(500, &e.to_string()));
                }
            }
        }
        Err(e) => {
            match &e {
                UploadError::Storage(io) => eprintln!(
                    "  {} Envoi refusé : {e} ({io})",
                    style("✘").red().bold()
                ),
                _ => eprintln!("  {} Envoi refusé : {e}", style("✘").red().bold()),
            }
            let _ = req.respond(upload_error(&e));
        }
    }
}

/// Start the HTTP server.
pub fn run_serve(config: &ServeConfig) -> Result<()> {
    let state = ServerState::new(config)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let server = Arc::new(
        Server::http(&addr)
            .map_err(|e| anyhow::anyhow!("Impossible de démarrer le serveur: {e}"))?,
    );

    let stopper = Arc::clone(&server);
    ctrlc::set_handler(move || stopper.unblock())?;

    println!(
        "  {} Galerie disponible sur {}",
        style("✔").green().bold(),
        style(format!("http://localhost:{}", config.port)).cyan().bold()
    );
    println!(
        "  {}  {}",
        style("Public").dim(),
        style(state.public_dir.display()).white()
    );
    println!(
        "  {}  {}",
        style("Envois").dim(),
        style(state.upload_dir.display()).white()
    );
    println!("  {} pour arrêter", style("Ctrl+C").yellow().bold());

    for req in server.incoming_requests() {
        let state = Arc::clone(&state);
        std::thread::spawn(move || {
            handle_request(req, &state);
        });
    }

    println!("  {} Serveur arrêté", style("✔").green().bold());
    Ok(())
}
