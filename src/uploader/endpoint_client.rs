use async_trait::async_trait;
use rand::Rng;
use reqwest::{multipart, Client, Url};
use tokio::time::Duration;

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::source::{FileContent, RawFile};
use crate::validation::InputValidator;

pub const FILE_FIELD: &str = "data";
pub const FILENAME_FIELD: &str = "filename";
pub const FILESIZE_FIELD: &str = "filesize";
pub const FILETYPE_FIELD: &str = "filetype";
pub const USER_ID_FIELD: &str = "userId";

const FALLBACK_PART_TYPE: &str = "application/octet-stream";

pub const USER_ID_PREFIX: &str = "USR";
pub const USER_ID_RANDOM_LEN: usize = 9;

const USER_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Fresh correlation id for one request: `USR` plus 9 lowercase alphanumerics
pub fn generate_user_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..USER_ID_RANDOM_LEN)
        .map(|_| USER_ID_ALPHABET[rng.gen_range(0..USER_ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", USER_ID_PREFIX, suffix)
}

/// Everything one upload request carries
pub struct UploadPayload {
    pub file_name: String,
    pub file_size: u64,
    pub media_type: String,
    pub user_id: String,
    content: FileContent,
}

impl UploadPayload {
    pub async fn from_file(file: &dyn RawFile) -> AppResult<Self> {
        let content = file.open().await?;
        Ok(Self {
            file_name: file.name().to_string(),
            file_size: file.size(),
            media_type: file.media_type().to_string(),
            user_id: generate_user_id(),
            content,
        })
    }

    /// Text fields in the order they are written after the file part
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (FILENAME_FIELD, self.file_name.clone()),
            (FILESIZE_FIELD, self.file_size.to_string()),
            (FILETYPE_FIELD, self.media_type.clone()),
            (USER_ID_FIELD, self.user_id.clone()),
        ]
    }

    /// The form computes its own boundary; callers must not set a content-type header.
    pub fn into_form(self) -> AppResult<multipart::Form> {
        let text_fields = self.text_fields();

        let part = match self.content {
            FileContent::Bytes(bytes) => multipart::Part::bytes(bytes),
            FileContent::Stream(file) => multipart::Part::stream_with_length(file, self.file_size),
        }
        .file_name(self.file_name);

        // Unknown or unparseable declared types go out as opaque bytes; `filetype` keeps the original
        let part_type = if self.media_type.parse::<mime_guess::Mime>().is_ok() {
            self.media_type.as_str()
        } else {
            FALLBACK_PART_TYPE
        };
        let part = part.mime_str(part_type)?;

        let mut form = multipart::Form::new().part(FILE_FIELD, part);
        for (key, value) in text_fields {
            form = form.text(key, value);
        }

        Ok(form)
    }
}

/// What came back from the endpoint. The body is drained but never interpreted.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one payload and reports the HTTP outcome. Transport failures come
/// back as `AppError::Transport`.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(&self, payload: UploadPayload) -> AppResult<TransportResponse>;
}

/// HTTP client for the configured workflow endpoint
pub struct EndpointClient {
    client: Client,
    endpoint: Url,
}

impl EndpointClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        InputValidator::validate_endpoint_url(&config.endpoint_url)?;
        let endpoint = Url::parse(config.endpoint_url.trim())
            .map_err(|_| AppError::invalid_endpoint(&config.endpoint_url))?;

        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl UploadTransport for EndpointClient {
    async fn send(&self, payload: UploadPayload) -> AppResult<TransportResponse> {
        log::debug!(
            "POST {} ({}, {} bytes, userId {})",
            self.endpoint,
            payload.file_name,
            payload.file_size,
            payload.user_id
        );

        let form = payload.into_form()?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(AppError::transport)?;

        let status = response.status();
        let status_text = reason_phrase(&response);
        let body = response.text().await.map_err(AppError::transport)?;

        log::debug!(
            "Endpoint response {} (first 300 chars): {}",
            status,
            body.chars().take(300).collect::<String>()
        );

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            body,
        })
    }
}

/// The reason phrase the server actually sent. hyper only keeps it when it
/// differs from the standard one, so fall back to that.
fn reason_phrase(response: &reqwest::Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}
