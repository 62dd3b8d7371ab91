// src/api.rs
use crate::config::ClientConfig;
use crate::edit::EditRequest;
use crate::tasks::TaskStatus;
use crate::timeline::TimelineClip;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

// --- ERRORS ---

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid API url '{0}'")]
    InvalidUrl(String),
    #[error("file error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ApiError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// --- WIRE TYPES ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub message: String,
}

/// `GET /videos/`. Filenames only.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VideoLibrary {
    pub originals: Vec<String>,
    pub proxies: Vec<String>,
}

impl VideoLibrary {
    pub fn has_original(&self, name: &str) -> bool {
        self.originals.iter().any(|n| n == name)
    }

    pub fn has_proxy_for(&self, name: &str) -> bool {
        let proxy = proxy_name(name);
        self.proxies.iter().any(|n| *n == proxy)
    }
}

/// Reply of every endpoint that queues work on the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskAccepted {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskAccepted {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: None,
        }
    }

    pub fn into_task_id(self) -> Result<String, ApiError> {
        if self.task_id.trim().is_empty() {
            return Err(ApiError::MalformedResponse(
                "response carries no task_id".to_string(),
            ));
        }
        Ok(self.task_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

impl TaskStatusResponse {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            task_id: None,
            status,
            result: None,
        }
    }
}

/// Body of `POST /process-timeline/`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimelineRequest {
    pub clips: Vec<TimelineClip>,
    pub output_filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Original,
    Proxy,
}

impl MediaKind {
    fn path_segment(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Proxy => "proxy",
        }
    }
}

/// The backend stores the proxy of `X` as `proxy_X`.
pub fn proxy_name(name: &str) -> String {
    format!("proxy_{}", name)
}

fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = Url::parse(base_url).map_err(|_| ApiError::InvalidUrl(base_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Preview URL for the proxy of `name`.
pub fn proxy_url(base_url: &str, name: &str) -> String {
    let proxy = proxy_name(name);
    match endpoint_url(base_url, &["download", "proxy", &proxy]) {
        Ok(url) => url.to_string(),
        Err(_) => format!(
            "{}/download/proxy/{}",
            base_url.trim_end_matches('/'),
            proxy
        ),
    }
}

/// Name the upload is stored under on the backend.
pub fn upload_file_name(path: &Path) -> Result<String, ApiError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ApiError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })
}

pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        ApiError::MalformedResponse(format!("{}. Raw text: {:.200}", e, body))
    })
}

// --- CONTRACT ---

pub type ApiFuture<'a, T> = BoxFuture<'a, Result<T, ApiError>>;

/// The processing service as the editor sees it.
pub trait VideoApi: Send + Sync {
    fn health(&self) -> ApiFuture<'_, HealthResponse>;
    fn list_videos(&self) -> ApiFuture<'_, VideoLibrary>;
    fn upload_video(&self, file_name: String, bytes: Vec<u8>) -> ApiFuture<'_, TaskAccepted>;
    /// Uploads the file at `path` under its own name.
    fn upload_file(&self, path: PathBuf) -> ApiFuture<'_, TaskAccepted> {
        async move {
            let file_name = upload_file_name(&path)?;
            let bytes = tokio::fs::read(&path).await.map_err(ApiError::io(&path))?;
            self.upload_video(file_name, bytes).await
        }
        .boxed()
    }
    fn task_status(&self, task_id: String) -> ApiFuture<'_, TaskStatusResponse>;
    fn submit_edit(&self, request: EditRequest) -> ApiFuture<'_, TaskAccepted>;
    fn process_timeline(&self, request: TimelineRequest) -> ApiFuture<'_, TaskAccepted>;
    /// Streams a stored file to `dest`, returning the byte count.
    fn download(&self, kind: MediaKind, name: String, dest: PathBuf) -> ApiFuture<'_, u64>;
}

// --- HTTP IMPLEMENTATION ---

#[derive(Clone, Debug)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        // Fail early on a base URL we cannot build endpoints from.
        endpoint_url(&config.api_url, &[])?;
        // Transfers of whole videos may run far longer than the request
        // timeout, so the client only bounds connecting and stalled reads.
        // JSON calls get the full timeout per request.
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        endpoint_url(&self.base_url, segments)
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("[Api] request failed with {}: {}", status, body_preview(&body));
        Err(ApiError::Server {
            status: status.as_u16(),
            body,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;
        parse_body(&text)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        debug!("[Api] GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(segments)?;
        debug!("[Api] POST {}", url);
        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn post_form(&self, url: Url, form: Form) -> Result<TaskAccepted, ApiError> {
        let response = self.client.post(url).multipart(form).send().await?;
        Self::read_json(response).await
    }

    async fn stream_to_file(
        &self,
        kind: MediaKind,
        name: &str,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let url = self.url(&["download", kind.path_segment(), name])?;
        debug!("[Api] GET {} -> {:?}", url, dest);
        let response = Self::check_status(self.client.get(url).send().await?).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(ApiError::io(dest))?;
        match Self::write_body(response, &mut file, dest).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                if let Err(remove) = tokio::fs::remove_file(dest).await {
                    warn!("[Api] could not remove partial download {:?}: {}", dest, remove);
                }
                Err(e)
            }
        }
    }

    async fn write_body(
        response: Response,
        file: &mut tokio::fs::File,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(ApiError::io(dest))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(ApiError::io(dest))?;
        Ok(written)
    }
}

fn body_preview(body: &str) -> String {
    body.chars().take(80).collect()
}

impl VideoApi for HttpApi {
    fn health(&self) -> ApiFuture<'_, HealthResponse> {
        async move { self.get_json(&[""]).await }.boxed()
    }

    fn list_videos(&self) -> ApiFuture<'_, VideoLibrary> {
        async move { self.get_json(&["videos", ""]).await }.boxed()
    }

    fn upload_video(&self, file_name: String, bytes: Vec<u8>) -> ApiFuture<'_, TaskAccepted> {
        async move {
            let url = self.url(&["upload-video", ""])?;
            debug!("[Api] POST {} ({} bytes)", url, bytes.len());
            let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
            self.post_form(url, form).await
        }
        .boxed()
    }

    fn upload_file(&self, path: PathBuf) -> ApiFuture<'_, TaskAccepted> {
        async move {
            let file_name = upload_file_name(&path)?;
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(ApiError::io(&path))?;
            let length = file.metadata().await.map_err(ApiError::io(&path))?.len();
            let url = self.url(&["upload-video", ""])?;
            debug!("[Api] POST {} (streaming {:?}, {} bytes)", url, path, length);
            let part = Part::stream_with_length(reqwest::Body::from(file), length)
                .file_name(file_name);
            self.post_form(url, Form::new().part("file", part)).await
        }
        .boxed()
    }

    fn task_status(&self, task_id: String) -> ApiFuture<'_, TaskStatusResponse> {
        async move { self.get_json(&["task-status", &task_id]).await }.boxed()
    }

    fn submit_edit(&self, request: EditRequest) -> ApiFuture<'_, TaskAccepted> {
        async move { self.post_json(&["edit", ""], &request).await }.boxed()
    }

    fn process_timeline(&self, request: TimelineRequest) -> ApiFuture<'_, TaskAccepted> {
        async move { self.post_json(&["process-timeline", ""], &request).await }.boxed()
    }

    fn download(&self, kind: MediaKind, name: String, dest: PathBuf) -> ApiFuture<'_, u64> {
        async move { self.stream_to_file(kind, &name, &dest).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    // --- STAND-IN SERVER ---

    fn http_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
        .into_bytes()
    }

    fn head_only(content_length: usize) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: video/mp4\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            content_length
        )
        .into_bytes()
    }

    fn request_complete(raw: &[u8]) -> bool {
        let Some(head_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
        let body_len = raw.len() - (head_end + 4);
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        match content_length {
            Some(len) => body_len >= len,
            None if head.contains("transfer-encoding: chunked") => raw.ends_with(b"0\r\n\r\n"),
            None => true,
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        while !request_complete(&raw) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    /// Accepts one connection, answers with `chunks` spaced `gap` apart and
    /// hands back the raw request.
    async fn serve_once(chunks: Vec<Vec<u8>>, gap: Duration) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            for (i, chunk) in chunks.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                if socket.write_all(chunk).await.is_err() {
                    break;
                }
                let _ = socket.flush().await;
            }
            let _ = socket.shutdown().await;
            request
        });
        (base_url, handle)
    }

    async fn reply_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        serve_once(vec![http_response(status, body)], Duration::ZERO).await
    }

    fn api_at(base_url: &str, timeout_secs: u64) -> HttpApi {
        HttpApi::new(&ClientConfig {
            api_url: base_url.to_string(),
            request_timeout_secs: timeout_secs,
            ..ClientConfig::default()
        })
        .unwrap()
    }

    fn temp_path(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}_{}.mp4", prefix, uuid::Uuid::new_v4()))
    }

    // --- HTTP CONTRACT ---

    #[tokio::test]
    async fn test_list_videos_request() {
        let (base_url, server) =
            reply_once("200 OK", r#"{ "originals": ["a.mp4"], "proxies": ["proxy_a.mp4"] }"#).await;
        let library = api_at(&base_url, 5).list_videos().await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /videos/ HTTP/1.1\r\n"));
        assert!(library.has_proxy_for("a.mp4"));
    }

    #[tokio::test]
    async fn test_task_status_request() {
        let (base_url, server) = reply_once(
            "200 OK",
            r#"{ "task_id": "T1", "status": "SUCCESS", "result": "/videos/proxy_a.mp4" }"#,
        )
        .await;
        let response = api_at(&base_url, 5).task_status("T1".to_string()).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /task-status/T1 HTTP/1.1\r\n"));
        assert_eq!(response.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_upload_bytes_is_multipart_file_field() {
        let (base_url, server) = reply_once(
            "200 OK",
            r#"{ "message": "Video processing started.", "task_id": "T1" }"#,
        )
        .await;
        let accepted = api_at(&base_url, 5)
            .upload_video("clip.mp4".to_string(), b"fake frames".to_vec())
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /upload-video/ HTTP/1.1\r\n"));
        assert!(request.to_ascii_lowercase().contains("content-type: multipart/form-data"));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(r#"filename="clip.mp4""#));
        assert!(request.contains("fake frames"));
        assert_eq!(accepted.into_task_id().unwrap(), "T1");
    }

    #[tokio::test]
    async fn test_upload_file_streams_from_disk() {
        let path = temp_path("upload");
        std::fs::write(&path, b"frames from disk").unwrap();
        let (base_url, server) = reply_once("200 OK", r#"{ "task_id": "T2" }"#).await;

        let accepted = api_at(&base_url, 5).upload_file(path.clone()).await;
        let _ = std::fs::remove_file(&path);
        let request = server.await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(request.starts_with("POST /upload-video/ HTTP/1.1\r\n"));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(&format!(r#"filename="{}""#, name)));
        assert!(request.contains("frames from disk"));
        assert_eq!(accepted.unwrap().into_task_id().unwrap(), "T2");
    }

    #[tokio::test]
    async fn test_edit_posts_json() {
        let (base_url, server) = reply_once("200 OK", r#"{ "task_id": "E1" }"#).await;
        api_at(&base_url, 5)
            .submit_edit(EditRequest::cut("clip.mp4", 2.0, 7.0))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /edit/ HTTP/1.1\r\n"));
        assert!(request.contains(r#""edit_type":"cut""#));
    }

    #[tokio::test]
    async fn test_non_success_status_is_server_error() {
        let (base_url, server) = reply_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let result = api_at(&base_url, 5).list_videos().await;
        server.await.unwrap();

        match result {
            Err(ApiError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected a server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_writes_every_byte() {
        let dest = temp_path("download");
        let mut chunks = vec![head_only(10)];
        chunks.push(b"0123456789".to_vec());
        let (base_url, server) = serve_once(chunks, Duration::ZERO).await;

        let written = api_at(&base_url, 5)
            .download(MediaKind::Proxy, "proxy_clip.mp4".to_string(), dest.clone())
            .await
            .unwrap();
        let request = server.await.unwrap();
        let content = std::fs::read(&dest).unwrap();
        let _ = std::fs::remove_file(&dest);

        assert!(request.starts_with("GET /download/proxy/proxy_clip.mp4 HTTP/1.1\r\n"));
        assert_eq!(written, 10);
        assert_eq!(content, b"0123456789");
    }

    #[tokio::test]
    async fn test_slow_download_outlives_request_timeout() {
        let dest = temp_path("slow");
        let mut chunks = vec![head_only(10)];
        chunks.extend((0..5).map(|i| format!("{}{}", i, i).into_bytes()));
        // Five gaps of 400ms: the transfer takes twice the one-second timeout
        // while never stalling for a full second.
        let (base_url, server) = serve_once(chunks, Duration::from_millis(400)).await;

        let written = api_at(&base_url, 1)
            .download(MediaKind::Original, "clip.mp4".to_string(), dest.clone())
            .await;
        server.await.unwrap();
        let content = std::fs::read(&dest).unwrap_or_default();
        let _ = std::fs::remove_file(&dest);

        assert_eq!(written.unwrap(), 10);
        assert_eq!(content, b"0011223344");
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_no_file() {
        let dest = temp_path("truncated");
        let chunks = vec![head_only(100), b"only ten b".to_vec()];
        let (base_url, server) = serve_once(chunks, Duration::ZERO).await;

        let result = api_at(&base_url, 5)
            .download(MediaKind::Proxy, "proxy_clip.mp4".to_string(), dest.clone())
            .await;
        server.await.unwrap();

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert!(!dest.exists());
    }

    // --- PARSING ---

    #[test]
    fn test_proxy_url_convention() {
        assert_eq!(
            proxy_url("http://127.0.0.1:8000", "clip.mp4"),
            "http://127.0.0.1:8000/download/proxy/proxy_clip.mp4"
        );
        assert_eq!(
            proxy_url("http://api:8000/", "my clip.mp4"),
            "http://api:8000/download/proxy/proxy_my%20clip.mp4"
        );
    }

    #[test]
    fn test_endpoint_keeps_trailing_slash() {
        let url = endpoint_url("http://api:8000", &["videos", ""]).unwrap();
        assert_eq!(url.as_str(), "http://api:8000/videos/");
        let url = endpoint_url("http://api:8000/base/", &["task-status", "abc"]).unwrap();
        assert_eq!(url.as_str(), "http://api:8000/base/task-status/abc");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            endpoint_url("not a url", &["videos", ""]),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_missing_task_id_is_malformed() {
        let accepted: TaskAccepted = parse_body(r#"{ "message": "Video processing started." }"#).unwrap();
        assert!(matches!(
            accepted.into_task_id(),
            Err(ApiError::MalformedResponse(_))
        ));

        let accepted: TaskAccepted =
            parse_body(r#"{ "message": "Video processing started.", "task_id": "T1" }"#).unwrap();
        assert_eq!(accepted.into_task_id().unwrap(), "T1");
    }

    #[test]
    fn test_status_response_with_null_result() {
        let response: TaskStatusResponse =
            parse_body(r#"{ "task_id": "T1", "status": "PENDING", "result": null }"#).unwrap();
        assert_eq!(response.status, TaskStatus::Pending);
        assert!(response.result.is_none());
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        let result: Result<VideoLibrary, _> = parse_body("<html>502</html>");
        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
    }

    #[test]
    fn test_library_lookup() {
        let library = VideoLibrary {
            originals: vec!["clip.mp4".to_string()],
            proxies: vec!["proxy_clip.mp4".to_string()],
        };
        assert!(library.has_original("clip.mp4"));
        assert!(library.has_proxy_for("clip.mp4"));
        assert!(!library.has_proxy_for("other.mp4"));
    }
}
