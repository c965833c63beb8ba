//! Single-shot loopback listener for the OAuth redirect
//!
//! Binds `127.0.0.1:0` so the OS picks a free port, serves `GET /callback`
//! once, hands the query parameters to the waiting login flow, and shuts
//! itself down. Every other path gets a 404 and changes nothing.
//!
//! The listener owns its port for its whole lifetime. Dropping it (after a
//! successful wait, an error, a timeout, or a cancelled future) signals
//! shutdown and aborts the server task, so the port is always released.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::CALLBACK_PATH;
use crate::error::{Error, Result};

/// How long the server gets to finish writing the success page after the
/// callback resolved, before its task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful</h1>\
You can close this window and return to the terminal.</body></html>";

/// Query parameters captured from the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams(HashMap<String, String>);

impl CallbackParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>,
    resolved: Arc<Notify>,
}

/// A bound, running loopback listener waiting for one redirect.
pub struct CallbackListener {
    addr: SocketAddr,
    params: Option<oneshot::Receiver<CallbackParams>>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind an ephemeral loopback port and start serving.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|e| Error::Listener(format!("failed to bind loopback port: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Listener(format!("failed to read bound address: {e}")))?;

        let (params_tx, params_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = CallbackState {
            sender: Arc::new(Mutex::new(Some(params_tx))),
            resolved: Arc::new(Notify::new()),
        };
        let resolved = state.resolved.clone();

        let app = Router::new()
            .route(CALLBACK_PATH, get(callback_handler))
            .fallback(not_found)
            .with_state(state);

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        _ = resolved.notified() => debug!("callback received, stopping listener"),
                        _ = shutdown_rx => debug!("callback listener released"),
                    }
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "callback listener error");
            }
        });

        debug!(%addr, "callback listener bound");
        Ok(Self {
            addr,
            params: Some(params_rx),
            shutdown: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The exact redirect URI to register and send to the token endpoint.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.addr)
    }

    /// Wait for the redirect. Resolves once; the listener is consumed and
    /// its port released before this returns.
    pub async fn wait(mut self) -> Result<CallbackParams> {
        let receiver = self
            .params
            .take()
            .ok_or_else(|| Error::Listener("callback already consumed".into()))?;
        let params = receiver
            .await
            .map_err(|_| Error::Listener("callback listener stopped before a redirect arrived".into()))?;

        if let Some(server) = self.server.take() {
            // The handler already triggered graceful shutdown; give it a
            // moment to flush the success page.
            let abort = server.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
                abort.abort();
            }
        }
        Ok(params)
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn callback_handler(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(CallbackParams(params));
        state.resolved.notify_one();
    }
    Html(SUCCESS_PAGE)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
