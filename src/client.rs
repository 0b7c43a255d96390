use anyhow::Result;
use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use thiserror::Error;

use crate::upload::{
    FIELD_NAME, MAX_FILE_SIZE, UPLOAD_ERROR_HEADER, UPLOAD_ROUTE, UploadResponse, format_size,
};

pub const DEFAULT_SERVER: &str = "http://localhost:3000";

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Veuillez sélectionner des fichiers à envoyer.")]
    NoFilesSelected,

    #[error("Le fichier « {name} » dépasse {} et ne peut pas être envoyé.", format_size(.limit))]
    FileTooLarge { name: String, limit: u64 },

    #[error("Impossible de lire {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Une erreur est survenue pendant l'envoi : {0}")]
    Transport(#[from] reqwest::Error),

    #[error("L'envoi a été interrompu.")]
    Interrupted,

    #[error("Échec de l'envoi : {message}")]
    Server {
        status: u16,
        kind: Option<String>,
        message: String,
    },

    #[error("Réponse du serveur illisible : {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl ClientError {
    /// Rejected locally, before any request was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::NoFilesSelected | ClientError::FileTooLarge { .. }
        )
    }
}

/// Bytes of the request body handed to the transport so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.sent as f64 / self.total as f64).min(1.0)
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Check the selection before anything is sent: at least one file, none
/// above `max_file_size`. One oversized file rejects the whole selection.
pub fn validate_selection(
    paths: &[PathBuf],
    max_file_size: u64,
) -> Result<Vec<SelectedFile>, ClientError> {
    if paths.is_empty() {
        return Err(ClientError::NoFilesSelected);
    }

    let mut selected = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = std::fs::metadata(path).map_err(|source| ClientError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let name = display_name(path);
        if meta.len() > max_file_size {
            return Err(ClientError::FileTooLarge {
                name,
                limit: max_file_size,
            });
        }
        selected.push(SelectedFile {
            path: path.clone(),
            name,
            size: meta.len(),
        });
    }
    Ok(selected)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Streaming `multipart/form-data` body with a known total length.
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Box<dyn Read + Send>>,
    len: u64,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        let stamp = chrono::Utc::now().timestamp_micros();
        let seq = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::with_boundary(format!(
            "----media-gallery-{stamp:x}-{:x}-{seq:x}",
            std::process::id()
        ))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            segments: Vec::new(),
            len: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact size of the encoded body, closing delimiter included.
    pub fn len(&self) -> u64 {
        self.len + self.closing().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Add a file under the `media` field; its type is guessed from the
    /// extension.
    pub fn add_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        self.add_reader(FIELD_NAME, &display_name(path), &content_type, file, len);
        Ok(())
    }

    pub fn add_bytes(&mut self, filename: &str, content_type: &str, data: Vec<u8>) {
        self.add_field_bytes(FIELD_NAME, filename, content_type, data);
    }

    pub fn add_field_bytes(
        &mut self,
        field: &str,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) {
        let len = data.len() as u64;
        self.add_reader(field, filename, content_type, Cursor::new(data), len);
    }

    fn add_reader(
        &mut self,
        field: &str,
        filename: &str,
        content_type: &str,
        reader: impl Read + Send + 'static,
        len: u64,
    ) {
        let head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            escape_quoted(field),
            escape_quoted(filename),
            content_type
        );
        self.len += head.len() as u64 + len + 2;
        self.segments.push(Box::new(Cursor::new(head.into_bytes())));
        self.segments.push(Box::new(reader));
        self.segments.push(Box::new(Cursor::new(b"\r\n".to_vec())));
    }

    fn closing(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }

    /// The whole body as one reader, with its length.
    pub fn into_reader(self) -> (Box<dyn Read + Send>, u64) {
        let len = self.len();
        let closing = Cursor::new(self.closing().into_bytes());
        let mut reader: Box<dyn Read + Send> = Box::new(io::empty());
        for segment in self.segments {
            reader = Box::new(reader.chain(segment));
        }
        (Box::new(reader.chain(closing)), len)
    }

    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        let (mut reader, len) = self.into_reader();
        let mut buf = Vec::with_capacity(len as usize);
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Percent-encode what would break a quoted header parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

enum Message {
    Progress(UploadProgress),
    Done(Result<UploadResponse, ClientError>),
}

/// Counts bytes as the transport pulls them from the body.
struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    tx: Sender<Message>,
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            let _ = self.tx.send(Message::Progress(UploadProgress {
                sent: self.sent,
                total: self.total,
            }));
        }
        Ok(n)
    }
}

pub fn upload_url(server: &str) -> String {
    format!("{}{UPLOAD_ROUTE}", server.trim_end_matches('/'))
}

/// Validate and upload `paths` to `server`.
pub fn upload_files(
    server: &str,
    paths: &[PathBuf],
    on_progress: impl FnMut(UploadProgress),
) -> Result<UploadResponse, ClientError> {
    let selected = validate_selection(paths, MAX_FILE_SIZE)?;
    send_files(server, &selected, on_progress)
}

pub fn send_files(
    server: &str,
    files: &[SelectedFile],
    on_progress: impl FnMut(UploadProgress),
) -> Result<UploadResponse, ClientError> {
    let mut body = MultipartBody::new();
    for file in files {
        body.add_file(&file.path)
            .map_err(|source| ClientError::Unreadable {
                path: file.path.clone(),
                source,
            })?;
    }
    send_body(&upload_url(server), body, on_progress)
}

/// POST `body` to `url`. Progress and the final result travel through one
/// channel, so every progress call happens before this returns. A success
/// is always preceded by a 100% report.
pub fn send_body(
    url: &str,
    body: MultipartBody,
    mut on_progress: impl FnMut(UploadProgress),
) -> Result<UploadResponse, ClientError> {
    let content_type = body.content_type();
    let (reader, total) = body.into_reader();
    let (tx, rx) = mpsc::channel();
    let reader = ProgressReader {
        inner: reader,
        sent: 0,
        total,
        tx: tx.clone(),
    };
    let url = url.to_string();

    std::thread::spawn(move || {
        let outcome = post(&url, content_type, reader, total);
        let _ = tx.send(Message::Done(outcome));
    });

    for message in rx {
        match message {
            Message::Progress(progress) => on_progress(progress),
            Message::Done(outcome) => {
                if outcome.is_ok() {
                    on_progress(UploadProgress { sent: total, total });
                }
                return outcome;
            }
        }
    }
    Err(ClientError::Interrupted)
}

fn post<R: Read + Send + 'static>(
    url: &str,
    content_type: String,
    reader: R,
    total: u64,
) -> Result<UploadResponse, ClientError> {
    let client = reqwest::blocking::Client::builder().build()?;
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(reqwest::blocking::Body::sized(reader, total))
        .send()?;

    let status = response.status();
    let kind = response
        .headers()
        .get(UPLOAD_ERROR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text()?;

    if status == reqwest::StatusCode::OK {
        Ok(serde_json::from_str(&text)?)
    } else {
        Err(ClientError::Server {
            status: status.as_u16(),
            kind,
            message: text,
        })
    }
}

/// `upload` command: validate, send with a progress bar, print the manifest.
pub fn run_upload(server: &str, paths: &[PathBuf]) -> Result<()> {
    let selected = validate_selection(paths, MAX_FILE_SIZE)?;
    let total: u64 = selected.iter().map(|f| f.size).sum();

    println!(
        "\n{}  {}\n",
        style("media-gallery").bold().cyan(),
        style("·").dim(),
    );
    println!(
        "  {}  {}",
        style("Serveur").dim(),
        style(upload_url(server)).white().bold()
    );
    println!(
        "  {} {}  {}  {}",
        style("Fichiers").dim(),
        style(selected.len()).green().bold(),
        style("·").dim(),
        style(HumanBytes(total)).white()
    );
    println!();

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.green/dark_gray} {pos:>3}%  {msg}")
            .unwrap()
            .progress_chars("━╸─"),
    );

    match send_files(server, &selected, |p| pb.set_position(p.percent() as u64)) {
        Ok(response) => {
            pb.finish_with_message(style("terminé").green().to_string());
            println!("  {} {}", style("✔").green().bold(), response.message);
            for file in &response.files {
                println!(
                    "    {} {} {}  {}",
                    style(&file.original_name).white(),
                    style("→").dim(),
                    style(&file.stored_name).cyan(),
                    style(HumanBytes(file.size_bytes)).dim()
                );
            }
            Ok(())
        }
        Err(e) => {
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.red/red} {pos:>3}%  {msg}")
                    .unwrap()
                    .progress_chars("━╸─"),
            );
            pb.abandon_with_message(style("échec").red().to_string());
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::{ServeConfig, ServerState, handle_request};
    use crate::upload::UploadLimits;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use tiny_http::Server;

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn tmpdir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "media_gallery_client_test_{}_{id}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn spawn_test_server(root: &Path, limits: UploadLimits) -> String {
        let config = ServeConfig {
            port: 0,
            public_dir: root.join("public"),
            upload_dir: root.join("uploads"),
            limits,
        };
        let state = ServerState::new(&config).unwrap();
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            for req in server.incoming_requests() {
                let state = Arc::clone(&state);
                std::thread::spawn(move || handle_request(req, &state));
            }
        });
        format!("http://127.0.0.1:{port}")
    }

    // --- validate_selection ---

    #[test]
    fn empty_selection_is_rejected() {
        let err = validate_selection(&[], MAX_FILE_SIZE).unwrap_err();
        assert!(matches!(err, ClientError::NoFilesSelected));
        assert!(err.is_validation());
    }

    #[test]
    fn oversized_file_aborts_whole_selection() {
        let tmp = tmpdir();
        std::fs::write(tmp.join("small.jpg"), vec![0u8; 10]).unwrap();
        std::fs::write(tmp.join("big.jpg"), vec![0u8; 100]).unwrap();

        let paths = vec![tmp.join("small.jpg"), tmp.join("big.jpg")];
        let err = validate_selection(&paths, 50).unwrap_err();
        match &err {
            ClientError::FileTooLarge { name, .. } => assert_eq!(name, "big.jpg"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("big.jpg"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn valid_selection_keeps_order_and_sizes() {
        let tmp = tmpdir();
        std::fs::write(tmp.join("a.jpg"), vec![0u8; 3]).unwrap();
        std::fs::write(tmp.join("b.mp4"), vec![0u8; 5]).unwrap();

        let paths = vec![tmp.join("a.jpg"), tmp.join("b.mp4")];
        let selected = validate_selection(&paths, MAX_FILE_SIZE).unwrap();
        assert_eq!(selected[0].name, "a.jpg");
        assert_eq!(selected[0].size, 3);
        assert_eq!(selected[1].name, "b.mp4");
        assert_eq!(selected[1].size, 5);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err =
            validate_selection(&[PathBuf::from("/nonexistent/x.jpg")], MAX_FILE_SIZE).unwrap_err();
        assert!(matches!(err, ClientError::Unreadable { .. }));
        assert!(!err.is_validation());
    }

    // --- MultipartBody ---

    #[test]
    fn body_length_matches_encoding() {
        let mut body = MultipartBody::with_boundary("XYZ");
        body.add_bytes("a.png", "image/png", b"abc".to_vec());
        body.add_bytes("b.mp4", "video/mp4", Vec::new());
        let len = body.len();
        let bytes = body.into_bytes().unwrap();
        assert_eq!(bytes.len() as u64, len);
    }

    #[test]
    fn body_layout() {
        let mut body = MultipartBody::with_boundary("XYZ");
        body.add_bytes("a \"b\".png", "image/png", b"abc".to_vec());
        assert_eq!(body.content_type(), "multipart/form-data; boundary=XYZ");
        let text = String::from_utf8(body.into_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            "--XYZ\r\nContent-Disposition: form-data; name=\"media\"; filename=\"a %22b%22.png\"\r\n\
             Content-Type: image/png\r\n\r\nabc\r\n--XYZ--\r\n"
        );
    }

    #[test]
    fn add_file_guesses_type() {
        let tmp = tmpdir();
        std::fs::write(tmp.join("clip.mp4"), b"data").unwrap();
        let mut body = MultipartBody::with_boundary("B");
        body.add_file(&tmp.join("clip.mp4")).unwrap();
        let text = String::from_utf8(body.into_bytes().unwrap()).unwrap();
        assert!(text.contains("filename=\"clip.mp4\""));
        assert!(text.contains("Content-Type: video/mp4"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn generated_boundaries_differ() {
        assert_ne!(MultipartBody::new().boundary(), MultipartBody::new().boundary());
    }

    // --- UploadProgress ---

    #[test]
    fn progress_fraction() {
        assert_eq!(UploadProgress { sent: 50, total: 200 }.percent(), 25.0);
        assert_eq!(UploadProgress { sent: 0, total: 0 }.fraction(), 1.0);
    }

    #[test]
    fn upload_url_joins_route() {
        assert_eq!(upload_url("http://h:3000"), "http://h:3000/upload");
        assert_eq!(upload_url("http://h:3000/"), "http://h:3000/upload");
    }

    // --- Integration: real server ---

    #[test]
    fn upload_reports_progress_then_manifest() {
        let tmp = tmpdir();
        let server = spawn_test_server(&tmp, UploadLimits::default());
        let file = tmp.join("photo.jpg");
        std::fs::write(&file, vec![42u8; 256 * 1024]).unwrap();

        let mut seen = Vec::new();
        let response = upload_files(&server, &[file], |p| seen.push(p)).unwrap();

        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].original_name, "photo.jpg");
        assert_eq!(response.files[0].mime_type, "image/jpeg");
        assert_eq!(response.files[0].size_bytes, 256 * 1024);
        assert!(tmp.join("uploads").join(&response.files[0].stored_name).exists());

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].sent <= w[1].sent));
        assert_eq!(seen.last().unwrap().fraction(), 1.0);
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn upload_surfaces_server_rejection() {
        let tmp = tmpdir();
        let server = spawn_test_server(
            &tmp,
            UploadLimits {
                max_file_size: 16,
                max_files: 10,
            },
        );
        let file = tmp.join("photo.png");
        std::fs::write(&file, vec![0u8; 64]).unwrap();

        let err = upload_files(&server, &[file], |_| {}).unwrap_err();
        match err {
            ClientError::Server { status, kind, message } => {
                assert_eq!(status, 400);
                assert_eq!(kind.as_deref(), Some("file-too-large"));
                assert!(message.contains("photo.png"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn upload_of_non_media_is_rejected_by_server() {
        let tmp = tmpdir();
        let server = spawn_test_server(&tmp, UploadLimits::default());
        let file = tmp.join("notes.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let err = upload_files(&server, &[file], |_| {}).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Server { ref kind, .. }
                if kind.as_deref() == Some("unsupported-media-type")
        ));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let tmp = tmpdir();
        let file = tmp.join("photo.jpg");
        std::fs::write(&file, b"jpg").unwrap();

        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = upload_files(&format!("http://127.0.0.1:{port}"), &[file], |_| {}).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
