use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use super::Transport;
use super::error::TransportFailure;
use super::types::{
    CancelSignal, HttpResponse, Method, ProgressSink, RequestParts, TransferProgress,
};
use crate::config::FormConfig;

/// Default [`Transport`] backed by a shared `reqwest` client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_config(&FormConfig::default())
    }

    /// Create a transport with the given timeouts.
    pub fn with_config(config: &FormConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        request: RequestParts,
        cancel: CancelSignal,
        progress: ProgressSink,
    ) -> Result<HttpResponse, TransportFailure> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| TransportFailure::Setup {
            message: e.to_string(),
        })?;

        let mut builder = self.client.request(reqwest_method(request.method), url);
        if request.method != Method::Get {
            builder = builder.json(&request.body);
        }

        tokio::select! {
            () = cancel.cancelled() => Err(TransportFailure::Cancelled),
            result = execute(builder, &progress) => result,
        }
    }
}

async fn execute(
    builder: reqwest::RequestBuilder,
    progress: &ProgressSink,
) -> Result<HttpResponse, TransportFailure> {
    let response = builder.send().await.map_err(classify_send_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect::<BTreeMap<_, _>>();

    let total = response.content_length();
    let mut raw = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransportFailure::Network {
            message: e.to_string(),
        })?;
        raw.extend_from_slice(&chunk);
        let _ = progress.send(TransferProgress::new(raw.len() as u64, total));
    }

    let data = parse_body(&raw);
    if !(200..300).contains(&status) {
        return Err(TransportFailure::Response {
            status,
            headers,
            body: data,
        });
    }

    Ok(HttpResponse {
        data,
        status,
        headers,
    })
}

// Bodies are JSON when they parse as JSON; anything else is kept as text.
fn parse_body(raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

fn classify_send_error(error: reqwest::Error) -> TransportFailure {
    if error.is_builder() {
        TransportFailure::Setup {
            message: error.to_string(),
        }
    } else {
        TransportFailure::Network {
            message: error.to_string(),
        }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}
