use std::future::Future;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use turn_protocol::cancel::{is_cancelled, CancelSignal};

use crate::config::{normalize_endpoint, ApiConfig};
use crate::error::{parse_error_message, ApiError};
use crate::events::{WireEvent, WireStatus, WireUsage};
use crate::headers::build_headers;
use crate::payload::BackendRequest;
use crate::retry::{is_retryable_http_error, retry_delay, MAX_RETRIES};
use crate::sse::SseParser;

/// Cancel-aware HTTP/SSE client for one backend endpoint.
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
}

/// How a stream ended: the terminal status frame and its usage accounting,
/// when the backend sent one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamEnd {
    pub status: Option<WireStatus>,
    pub usage: WireUsage,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::from)?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        normalize_endpoint(&self.config.base_url)
    }

    pub fn header_map(&self) -> Result<HeaderMap, ApiError> {
        let headers = build_headers(&self.config)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &BackendRequest,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        validate_input_shape(request)?;

        let headers = self.header_map()?;
        Ok(self.http.post(self.endpoint()).headers(headers).json(request))
    }

    /// Issues the request, retrying transient failures with exponential
    /// backoff. Auth rejections surface immediately as `Unauthorized` so the
    /// caller can decide on a single refresh-and-retry.
    pub async fn send_with_retry(
        &self,
        request: &BackendRequest,
        cancel: &CancelSignal,
    ) -> Result<Response, ApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error: Option<String> = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancel) {
                return Err(ApiError::Cancelled);
            }

            let send = self.build_request(request)?.send();
            match cancellable(send, cancel).await? {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status);
                    let body = cancellable(response.text(), cancel)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if matches!(
                        status,
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                    ) {
                        return Err(ApiError::Unauthorized(message));
                    }

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        debug!(
                            status = status.as_u16(),
                            attempt, "retrying backend request after retryable status"
                        );
                        cancellable(tokio::time::sleep(retry_delay(attempt)), cancel).await?;
                        continue;
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(ApiError::RateLimited(message));
                    }
                    return Err(ApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < MAX_RETRIES {
                        debug!(attempt, error = %message, "retrying backend request after network error");
                        cancellable(tokio::time::sleep(retry_delay(attempt)), cancel).await?;
                        continue;
                    }
                }
            }
        }

        Err(ApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Streams one response, feeding each normalized wire event to
    /// `on_event` in arrival order. A backend failure frame terminates the
    /// stream with `StreamFailed` rather than leaving it open.
    pub async fn stream_with_handler<F>(
        &self,
        request: &BackendRequest,
        cancel: &CancelSignal,
        mut on_event: F,
    ) -> Result<StreamEnd, ApiError>
    where
        F: FnMut(WireEvent),
    {
        let response = self.send_with_retry(request, cancel).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::default();
        let mut end = StreamEnd::default();

        loop {
            let Some(chunk) = cancellable(bytes.next(), cancel).await? else {
                break;
            };
            if is_cancelled(cancel) {
                return Err(ApiError::Cancelled);
            }
            let chunk = chunk.map_err(ApiError::from)?;

            for event in parser.feed(&chunk) {
                match &event {
                    WireEvent::Failed { message } => {
                        warn!("backend response failed mid-stream");
                        return Err(ApiError::StreamFailed {
                            code: None,
                            message: message
                                .clone()
                                .unwrap_or_else(|| "backend response failed".to_owned()),
                        });
                    }
                    WireEvent::Error { code, message } => {
                        return Err(ApiError::StreamFailed {
                            code: code.clone(),
                            message: message
                                .clone()
                                .or_else(|| code.clone())
                                .unwrap_or_else(|| "backend reported an error".to_owned()),
                        });
                    }
                    WireEvent::Completed { status, usage } => {
                        end.status = Some(*status);
                        end.usage = *usage;
                    }
                    _ => {}
                }

                on_event(event);
            }
        }

        if is_cancelled(cancel) {
            return Err(ApiError::Cancelled);
        }

        Ok(end)
    }

    /// Collects a full stream in memory; convenience for tests and one-shot
    /// callers.
    pub async fn stream(
        &self,
        request: &BackendRequest,
        cancel: &CancelSignal,
    ) -> Result<(Vec<WireEvent>, StreamEnd), ApiError> {
        let mut events = Vec::new();
        let end = self
            .stream_with_handler(request, cancel, |event| events.push(event))
            .await?;
        Ok((events, end))
    }
}

fn validate_input_shape(request: &BackendRequest) -> Result<(), ApiError> {
    if request.input.is_array() {
        return Ok(());
    }

    Err(ApiError::Unknown(format!(
        "'input' must be a JSON array of input items, got {}",
        value_type_name(&request.input)
    )))
}

fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

async fn cancellable<F>(future: F, cancel: &CancelSignal) -> Result<F::Output, ApiError>
where
    F: Future,
{
    turn_protocol::cancel::await_or_cancel(future, cancel)
        .await
        .ok_or(ApiError::Cancelled)
}
