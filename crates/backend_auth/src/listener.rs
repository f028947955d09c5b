//! Single-use loopback listener for the authorization callback.
//!
//! The listener is bound before the authorize URL is built so the flow
//! state can carry the actual port. `wait_for_code` consumes the listener;
//! the socket is released the moment any outcome is reached.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;
use url::Url;

use turn_protocol::cancel::{is_cancelled, CancelSignal, CANCEL_POLL_INTERVAL};

use crate::error::AuthError;
use crate::oauth::CALLBACK_PATH;

const MAX_REQUEST_BYTES: usize = 8 * 1024;

const SUCCESS_PAGE: &str = "<html><body><h1>Login complete</h1>\
<p>You can close this tab and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Login failed</h1>\
<p>The callback could not be validated. Return to the terminal and retry.</p></body></html>";

pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

enum Callback {
    Code { code: String, state: Option<String> },
    Missing { state: Option<String> },
    Unrelated,
}

impl CallbackListener {
    /// Bind an ephemeral loopback port. Never exposed beyond 127.0.0.1.
    pub async fn bind() -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(AuthError::Bind)?;
        let port = listener.local_addr().map_err(AuthError::Bind)?.port();
        debug!(port, "callback listener bound");
        Ok(Self { listener, port })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until a callback with the expected state arrives, the window
    /// elapses, or the signal is set. Requests for other paths get a 404
    /// and the wait continues; a state mismatch ends the flow outright.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        window: Duration,
        cancel: &CancelSignal,
    ) -> Result<String, AuthError> {
        let deadline = Instant::now() + window;

        loop {
            if is_cancelled(cancel) {
                return Err(AuthError::Cancelled);
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(AuthError::FlowTimeout(window)),
            };

            let wait = CANCEL_POLL_INTERVAL.min(remaining);
            let (mut stream, _) = match tokio::time::timeout(wait, self.listener.accept()).await {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(_)) | Err(_) => continue,
            };

            let callback = match read_callback(&mut stream).await {
                Some(callback) => callback,
                None => continue,
            };

            match callback {
                Callback::Unrelated => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                Callback::Code { code, state } if state.as_deref() == Some(expected_state) => {
                    respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                    return Ok(code);
                }
                Callback::Code { .. } => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    return Err(AuthError::StateMismatch);
                }
                Callback::Missing { state } if state.as_deref() == Some(expected_state) => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    return Err(AuthError::MissingCode);
                }
                Callback::Missing { .. } => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    return Err(AuthError::StateMismatch);
                }
            }
        }
    }
}

async fn read_callback(stream: &mut TcpStream) -> Option<Callback> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        if buffer.len() >= MAX_REQUEST_BYTES {
            return None;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buffer);
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return Some(Callback::Unrelated);
    }

    let url = Url::parse(&format!("http://localhost{target}")).ok()?;
    if url.path() != CALLBACK_PATH {
        return Some(Callback::Unrelated);
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    Some(match code {
        Some(code) => Callback::Code { code, state },
        None => Callback::Missing { state },
    })
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    // The flow outcome is already decided; a failed write only affects the
    // browser tab.
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
