//! Graceful shutdown: signal handling, per-connection timeouts and a bounded drain.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{extract::ConnectInfo, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceExt;

/// Pause after a failed `accept` (e.g. fd exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
/// While draining, a connection with no handler running and no traffic for
/// this long is closed
const DRAIN_QUIET_PERIOD: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ShutdownSignalError {
    #[error("failed to install Ctrl+C handler: {0}")]
    CtrlC(#[source] io::Error),

    #[cfg(unix)]
    #[error("failed to install SIGTERM handler: {0}")]
    SigTerm(#[source] io::Error),
}

/// Resolves on SIGINT or SIGTERM
pub async fn listen() -> Result<(), ShutdownSignalError> {
    let ctrl_c = async { signal::ctrl_c().await.map_err(ShutdownSignalError::CtrlC) };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(ShutdownSignalError::SigTerm)?
            .recv()
            .await;
        Ok::<(), ShutdownSignalError>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), ShutdownSignalError>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            tracing::info!("ctrl_c signal received");
        }
        result = terminate => {
            result?;
            tracing::info!("terminate signal received");
        }
    };
    Ok(())
}

/// Like [`listen`], but a failure to install handlers only logs and never
/// triggers shutdown.
pub async fn shutdown_signal() {
    if let Err(e) = listen().await {
        tracing::error!(error = %e, "Shutdown signal handler unavailable");
        std::future::pending::<()>().await;
    }
}

/// Per-connection limits applied by [`serve`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionLimits {
    /// Time allowed for a client to deliver a complete request head
    pub read_timeout: Option<Duration>,
    /// A connection with no request in progress and no traffic for this long
    /// is closed
    pub idle_timeout: Option<Duration>,
}

/// Serve `app` until `signal` resolves, then stop accepting connections and
/// give in-flight requests at most `grace` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    limits: ConnectionLimits,
    signal: F,
    grace: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut http = http1::Builder::new();
    http.timer(TokioTimer::new());
    if let Some(read_timeout) = limits.read_timeout {
        http.header_read_timeout(read_timeout);
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    // every connection task holds a receiver; `closed()` fires once all are gone
    let (close_tx, close_rx) = watch::channel(());

    tokio::pin!(signal);
    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut signal => break,
        };

        let connection = ServerConnection {
            http: http.clone(),
            app: app.clone(),
            limits,
            remote_addr,
            stop: stop_rx.clone(),
            _close: close_rx.clone(),
        };
        tokio::spawn(connection.run(stream));
    }

    drop(listener);
    drop(close_rx);
    tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    let _ = stop_tx.send(true);

    if tokio::time::timeout(grace, close_tx.closed()).await.is_err() {
        tracing::warn!("Grace period elapsed; closing remaining connections");
    }
    Ok(())
}

struct ServerConnection {
    http: http1::Builder,
    app: Router,
    limits: ConnectionLimits,
    remote_addr: SocketAddr,
    stop: watch::Receiver<bool>,
    _close: watch::Receiver<()>,
}

impl ServerConnection {
    async fn run(self, stream: TcpStream) {
        let ServerConnection {
            http,
            app,
            limits,
            remote_addr,
            mut stop,
            _close,
        } = self;

        let activity = Activity::new();
        let io = TokioIo::new(TrackedStream {
            inner: stream,
            activity: activity.clone(),
        });

        let tracker = activity.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(remote_addr));
            let in_flight = InFlight::enter(tracker.clone());
            let app = app.clone();
            async move {
                let response = app.oneshot(request).await;
                drop(in_flight);
                response
            }
        });

        let conn = http.serve_connection(io, service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            let idle_limit = if draining {
                Some(DRAIN_QUIET_PERIOD)
            } else {
                limits.idle_timeout
            };

            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(remote_addr = %remote_addr, error = %e, "Connection closed with error");
                    }
                    break;
                }
                _ = stop.changed(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                _ = idle_expired(&activity, idle_limit) => {
                    tracing::debug!(remote_addr = %remote_addr, draining, "Closing idle connection");
                    break;
                }
            }
        }
    }
}

/// Last traffic time and number of running handlers for one connection
struct Activity {
    origin: Instant,
    last_active_ms: AtomicU64,
    in_flight: AtomicUsize,
}

impl Activity {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            last_active_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        })
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_active_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Relaxed) > 0
    }
}

struct InFlight(Arc<Activity>);

impl InFlight {
    fn enter(activity: Arc<Activity>) -> Self {
        activity.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(activity)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.0.touch();
    }
}

/// Resolves once the connection has had no running handler and no traffic
/// for `limit`. Never resolves without a limit.
async fn idle_expired(activity: &Activity, limit: Option<Duration>) {
    let Some(limit) = limit else {
        return std::future::pending().await;
    };
    loop {
        let wait = if activity.is_busy() {
            limit
        } else {
            let idle_for = activity.idle_for();
            if idle_for >= limit {
                return;
            }
            limit - idle_for
        };
        tokio::time::sleep(wait).await;
    }
}

/// TCP stream that records when bytes last moved in either direction
struct TrackedStream {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.activity.touch();
        }
        poll
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn(
        limits: ConnectionLimits,
    ) -> (SocketAddr, tokio::sync::oneshot::Sender<()>, tokio::task::JoinHandle<io::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/peer",
                get(|ConnectInfo(peer): ConnectInfo<SocketAddr>| async move { peer.ip().to_string() }),
            );
        let server = tokio::spawn(serve(
            listener,
            app,
            limits,
            async move {
                let _ = rx.await;
            },
            Duration::from_secs(1),
        ));
        (addr, tx, server)
    }

    /// Reads until the server closes the socket
    async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received).await;
        received
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let (addr, tx, server) = spawn(ConnectionLimits::default()).await;

        let body = reqwest::get(format!("http://{}/ping", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connect_info_reaches_handlers() {
        let (addr, _tx, _server) = spawn(ConnectionLimits::default()).await;

        let body = reqwest::get(format!("http://{}/peer", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_stalled_request_head_is_cut_off() {
        let (addr, _tx, _server) = spawn(ConnectionLimits {
            read_timeout: Some(Duration::from_millis(200)),
            idle_timeout: None,
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        // head never terminated with a blank line
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(3), read_until_closed(&mut stream))
            .await
            .expect("server kept a stalled connection open");
        assert!(!String::from_utf8_lossy(&received).contains("pong"));
    }

    #[tokio::test]
    async fn test_silent_connection_is_closed_after_idle_timeout() {
        let (addr, _tx, _server) = spawn(ConnectionLimits {
            read_timeout: None,
            idle_timeout: Some(Duration::from_millis(200)),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(3), read_until_closed(&mut stream))
            .await
            .expect("server kept an idle connection open");
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_keep_alive_connection_is_reused_then_closed_when_idle() {
        let (addr, _tx, _server) = spawn(ConnectionLimits {
            read_timeout: Some(Duration::from_secs(5)),
            idle_timeout: Some(Duration::from_millis(300)),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(3), read_until_closed(&mut stream))
            .await
            .expect("server kept an idle keep-alive connection open");
        let text = String::from_utf8_lossy(&received);
        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.ends_with("pong"));
    }

    #[tokio::test]
    async fn test_drain_closes_connections_that_never_sent_a_request() {
        let (addr, tx, server) = spawn(ConnectionLimits::default()).await;

        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // well under the one second grace
        assert!(started.elapsed() < Duration::from_millis(900));
    }
}
