use std::future::Future;
use std::pin::Pin;

use packmule_engine::{Transport, TransportError};
use packmule_model::FileEntry;
use reqwest::multipart;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// HTTP transport that POSTs multipart uploads to the collection server.
pub struct HttpTransport {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpTransport {
    /// Creates a transport for the server at `endpoint`
    /// (e.g. `http://localhost:5000`).
    ///
    /// No request timeout is configured. A server sitting on a large
    /// upload for a long time is normal operation, and failure handling
    /// belongs to the engine's retry policy.
    pub fn new(endpoint: &str) -> Self {
        let upload_url = format!("{}/api/upload", endpoint.trim_end_matches('/'));
        Self {
            client: reqwest::Client::new(),
            upload_url,
        }
    }
}

impl Transport for HttpTransport {
    fn upload<'a>(
        &'a self,
        file: &'a FileEntry,
        target_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            debug!(file = %file.relative_path, target = %target_path, "posting multipart upload");

            let handle = tokio::fs::File::open(&file.source).await?;
            let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
            let mime = if file.mime_type.is_empty() {
                "application/octet-stream"
            } else {
                file.mime_type.as_str()
            };
            let part = multipart::Part::stream_with_length(body, file.size)
                .file_name(file.name.clone())
                .mime_str(mime)
                .map_err(net_err)?;
            let form = multipart::Form::new()
                .part("file", part)
                .text("filepath", target_path.to_string());

            let response = self
                .client
                .post(&self.upload_url)
                .multipart(form)
                .send()
                .await
                .map_err(net_err)?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(net_err)?;
            interpret_response(status, &body)
        })
    }
}

fn net_err(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

/// Wire shape of the upload endpoint's JSON reply.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Maps a response to the transport outcome.
///
/// A 2xx status must carry a parseable JSON body: `success: true` is the
/// only acceptance, `success: false` is a server-side rejection with the
/// `error` field as the reason. For error statuses the message is the
/// JSON `error` field when the body parses and carries one, the raw body
/// when it is not JSON, and a generic `Server error (<status>)` otherwise.
fn interpret_response(status: u16, body: &str) -> Result<(), TransportError> {
    if (200..300).contains(&status) {
        let reply: ApiResponse = serde_json::from_str(body)
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;
        if reply.success {
            return Ok(());
        }
        let reason = reply
            .error
            .filter(|error| !error.is_empty())
            .unwrap_or_else(|| "upload failed".to_string());
        return Err(TransportError::Rejected(reason));
    }

    let message = match serde_json::from_str::<ApiResponse>(body) {
        Ok(reply) => match reply.error.filter(|error| !error.is_empty()) {
            Some(error) => error,
            None => format!("Server error ({status})"),
        },
        Err(_) if !body.is_empty() => body.to_string(),
        Err(_) => format!("Server error ({status})"),
    };
    Err(TransportError::Server { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_response() {
        assert!(interpret_response(200, r#"{"success":true}"#).is_ok());
    }

    #[test]
    fn rejection_carries_the_server_reason() {
        let err = interpret_response(200, r#"{"success":false,"error":"quota exceeded"}"#)
            .unwrap_err();
        assert!(matches!(&err, TransportError::Rejected(reason) if reason == "quota exceeded"));
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[test]
    fn rejection_without_reason_gets_a_default() {
        let err = interpret_response(201, r#"{"success":false}"#).unwrap_err();
        assert_eq!(err.to_string(), "upload failed");
    }

    #[test]
    fn unparseable_success_body_is_invalid() {
        let err = interpret_response(200, "<html>ok</html>").unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[test]
    fn error_status_prefers_the_json_error_field() {
        let err = interpret_response(500, r#"{"error":"disk full"}"#).unwrap_err();
        assert!(matches!(&err, TransportError::Server { status: 500, .. }));
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn error_status_with_json_but_no_error_field_stays_generic() {
        let err = interpret_response(502, r#"{"success":false}"#).unwrap_err();
        assert_eq!(err.to_string(), "Server error (502)");
    }

    #[test]
    fn error_status_falls_back_to_the_raw_body() {
        let err = interpret_response(503, "Service Unavailable").unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable");
    }

    #[test]
    fn error_status_with_empty_body_is_generic() {
        let err = interpret_response(504, "").unwrap_err();
        assert_eq!(err.to_string(), "Server error (504)");
    }

    #[test]
    fn empty_error_strings_are_ignored() {
        let err = interpret_response(500, r#"{"error":""}"#).unwrap_err();
        assert_eq!(err.to_string(), "Server error (500)");

        let err = interpret_response(200, r#"{"success":false,"error":""}"#).unwrap_err();
        assert_eq!(err.to_string(), "upload failed");
    }

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let transport = HttpTransport::new("http://localhost:5000/");
        assert_eq!(transport.upload_url, "http://localhost:5000/api/upload");

        let transport = HttpTransport::new("http://localhost:5000");
        assert_eq!(transport.upload_url, "http://localhost:5000/api/upload");
    }
}
