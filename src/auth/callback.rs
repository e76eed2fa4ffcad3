//! Single-use local HTTP listener for the OAuth browser redirect.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::exchange::AuthorizationCode;
use crate::config::{AuthConfig, RedirectTarget};
use crate::error::AuthError;
use crate::util::timeout::with_optional_timeout;

pub const SUCCESS_MESSAGE: &str =
    "Successfully got authorization code from the redirected url, you may now close this window";
pub const MISSING_CODE_MESSAGE: &str = "Authorization code not found";
pub const DUPLICATE_MESSAGE: &str = "Authorization code already received";
pub const EXPIRED_MESSAGE: &str = "Authorization window expired, restart the login";

/// Take-once slot for the handoff sender. The first valid request empties it.
type CodeSlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// Serves exactly one `GET <path>?code=...` and hands the code to [`wait`](Self::wait).
///
/// The port is bound directly; a port already in use surfaces as a bind error.
/// An IP literal host binds that address. `localhost` binds both loopback
/// families. Any other host name binds all interfaces.
#[derive(Debug)]
pub struct CallbackListener {
    local_addrs: Vec<SocketAddr>,
    path: String,
    code_rx: oneshot::Receiver<String>,
    shutdown_tx: watch::Sender<bool>,
    server: JoinHandle<std::io::Result<()>>,
    grace: Duration,
}

impl CallbackListener {
    /// Bind on the redirect URI's port and start serving.
    pub async fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let target = config.redirect_target()?;
        Self::bind(&target, config.shutdown_grace).await
    }

    pub async fn bind(target: &RedirectTarget, grace: Duration) -> Result<Self, AuthError> {
        let (primary, secondary) = bind_sockets(target).await?;
        let mut local_addrs = vec![primary.local_addr()?];
        if let Some(extra) = &secondary {
            local_addrs.push(extra.local_addr()?);
        }

        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let slot: CodeSlot = Arc::new(Mutex::new(Some(code_tx)));

        let app = Router::new()
            .route(&target.path, get(receive_code))
            .with_state(slot);

        let server = tokio::spawn(async move {
            let main = axum::serve(primary, app.clone())
                .with_graceful_shutdown(stop_requested(shutdown_rx.clone()))
                .into_future();
            match secondary {
                Some(extra) => {
                    let extra = axum::serve(extra, app)
                        .with_graceful_shutdown(stop_requested(shutdown_rx))
                        .into_future();
                    let (main, extra) = tokio::join!(main, extra);
                    main.and(extra)
                }
                None => main.await,
            }
        });

        tracing::debug!(addrs = ?local_addrs, path = %target.path, "Callback listener started");

        Ok(Self {
            local_addrs,
            path: target.path.clone(),
            code_rx,
            shutdown_tx,
            server,
            grace,
        })
    }

    /// First bound address. Its port is the one the redirect URI names.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addrs[0]
    }

    /// Every bound address, primary first.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Block until the code arrives, then shut the listener down.
    ///
    /// Shutdown only starts after the handoff (or the timeout). `None` waits forever.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<AuthorizationCode, AuthError> {
        let code_rx = &mut self.code_rx;
        let received = with_optional_timeout(timeout, async move {
            code_rx.await.map_err(|_| {
                AuthError::Callback("listener stopped before a code arrived".to_string())
            })
        })
        .await;

        // Late redirects are refused from here on.
        self.code_rx.close();
        self.shutdown().await;
        received.map(AuthorizationCode::new)
    }

    async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(self.grace, &mut self.server).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!(addrs = ?self.local_addrs, "Callback listener stopped")
            }
            Ok(Ok(Err(err))) => tracing::warn!(error = %err, "Callback listener exited with error"),
            Ok(Err(err)) => tracing::warn!(error = %err, "Callback listener task failed"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "Callback listener did not drain in time, aborting"
                );
                self.server.abort();
            }
        }
    }
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn bind_sockets(
    target: &RedirectTarget,
) -> Result<(TcpListener, Option<TcpListener>), AuthError> {
    let port = target.port;
    let bind_error =
        move |e: std::io::Error| AuthError::Callback(format!("could not bind port {port}: {e}"));

    if let Ok(ip) = target.host.parse::<IpAddr>() {
        let listener = TcpListener::bind((ip, target.port)).await.map_err(bind_error)?;
        return Ok((listener, None));
    }
    if !target.host.eq_ignore_ascii_case("localhost") {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, target.port))
            .await
            .map_err(bind_error)?;
        return Ok((listener, None));
    }

    let v4 = TcpListener::bind((Ipv4Addr::LOCALHOST, target.port))
        .await
        .map_err(bind_error)?;
    // Browsers may resolve localhost to ::1. Hosts without IPv6 loopback keep IPv4 only.
    let bound_port = v4.local_addr()?.port();
    let v6 = match TcpListener::bind((Ipv6Addr::LOCALHOST, bound_port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            tracing::debug!(error = %err, port = bound_port, "IPv6 loopback unavailable");
            None
        }
    };
    Ok((v4, v6))
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn receive_code(
    State(slot): State<CodeSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let Some(code) = params.get("code").filter(|code| !code.is_empty()) else {
        tracing::warn!("Redirect arrived without an authorization code");
        return (StatusCode::BAD_REQUEST, MISSING_CODE_MESSAGE);
    };

    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match sender {
        Some(tx) => match tx.send(code.clone()) {
            Ok(()) => (StatusCode::OK, SUCCESS_MESSAGE),
            Err(_) => {
                tracing::warn!("Authorization code arrived after the waiter gave up");
                (StatusCode::GONE, EXPIRED_MESSAGE)
            }
        },
        None => (StatusCode::CONFLICT, DUPLICATE_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn slot() -> (CodeSlot, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Mutex::new(Some(tx))), rx)
    }

    #[tokio::test]
    async fn code_is_handed_to_a_live_waiter() {
        let (slot, rx) = slot();
        let reply = receive_code(State(slot), params(&[("code", "abc")])).await;
        assert_eq!(reply, (StatusCode::OK, SUCCESS_MESSAGE));
        assert_eq!(rx.await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn code_after_waiter_dropped_is_gone() {
        let (slot, rx) = slot();
        drop(rx);
        let reply = receive_code(State(slot), params(&[("code", "late")])).await;
        assert_eq!(reply, (StatusCode::GONE, EXPIRED_MESSAGE));
    }

    #[tokio::test]
    async fn code_after_waiter_closed_is_gone() {
        let (slot, mut rx) = slot();
        rx.close();
        let reply = receive_code(State(slot), params(&[("code", "late")])).await;
        assert_eq!(reply, (StatusCode::GONE, EXPIRED_MESSAGE));
    }

    #[tokio::test]
    async fn empty_slot_is_a_conflict() {
        let slot: CodeSlot = Arc::new(Mutex::new(None));
        let reply = receive_code(State(slot), params(&[("code", "again")])).await;
        assert_eq!(reply, (StatusCode::CONFLICT, DUPLICATE_MESSAGE));
    }

    #[tokio::test]
    async fn blank_code_is_a_bad_request() {
        let (slot, _rx) = slot();
        let reply = receive_code(State(slot.clone()), params(&[("code", "")])).await;
        assert_eq!(reply, (StatusCode::BAD_REQUEST, MISSING_CODE_MESSAGE));
        assert!(slot.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn timed_out_wait_refuses_late_codes() {
        let target = RedirectTarget {
            host: "127.0.0.1".to_string(),
            port: 0,
            path: "/".to_string(),
        };
        let mut listener = CallbackListener::bind(&target, Duration::from_secs(1))
            .await
            .unwrap();
        let (code_tx, code_rx) = oneshot::channel();
        listener.code_rx = code_rx;
        let slot: CodeSlot = Arc::new(Mutex::new(Some(code_tx)));

        let err = listener
            .wait(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Timeout(50)));

        let reply = receive_code(State(slot), params(&[("code", "late")])).await;
        assert_eq!(reply, (StatusCode::GONE, EXPIRED_MESSAGE));
    }
}
