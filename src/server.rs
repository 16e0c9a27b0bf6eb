//! Socket server exposing the monitor
//!
//! This module provides the service that listens for client connections,
//! answers session and reading requests, and broadcasts periodic status
//! events to subscribers.

mod handler;

use crate::config::Settings;
use crate::monitor::{Monitor, MonitorError};
use crate::protocol::ServerMessage;
use crate::transport::{SocketError, encode_server_message};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use uuid::Uuid;

use handler::handle_connection;

// Server result type using SocketError for structured error handling
type ServerResult<T> = std::result::Result<T, SocketError>;

pub struct SocketServer {
    inner: Arc<ServerInner>,
    listener: UnixListener,
}

impl SocketServer {
    pub fn new<P: AsRef<Path>>(socket_path: P, settings: &Settings) -> ServerResult<Self> {
        let socket_path = socket_path.as_ref();

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Remove existing socket file if it exists
        if socket_path.exists() {
            log::debug!("Removing stale socket {}", socket_path.display());
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                SocketError::Connection(format!(
                    "Service already running at socket: {}",
                    socket_path.display()
                ))
            } else {
                SocketError::Connection(format!("Failed to bind socket: {}", e))
            }
        })?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(socket_path)
                .map_err(|e| {
                    SocketError::Connection(format!("Failed to read socket metadata: {}", e))
                })?
                .permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(socket_path, permissions).map_err(|e| {
                SocketError::Connection(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        log::info!("Listening on {}", socket_path.display());

        let inner = Arc::new(ServerInner::new(
            Monitor::new(settings.buffer_capacity),
            settings,
        ));

        Ok(Self { inner, listener })
    }

    /// Serve until Ctrl-C or a shutdown request, then stop any session
    /// and remove the socket file
    pub async fn run(&mut self) -> ServerResult<()> {
        let inner = Arc::clone(&self.inner);
        let heartbeat = tokio::spawn(Self::heartbeat_monitor(Arc::clone(&self.inner)));

        let result = tokio::select! {
            _ = inner.shutdown_notify.notified() => {
                log::info!("Shutdown requested, stopping server");
                Ok(())
            }
            signal = tokio::signal::ctrl_c() => {
                log::info!("Interrupt received, stopping server");
                signal.map_err(SocketError::Io)
            }
            result = self.accept_loop() => result,
        };

        heartbeat.abort();
        inner.stop_monitoring().await;
        self.cleanup();
        result
    }

    /// Handle for requesting a graceful shutdown from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    async fn heartbeat_monitor(inner: Arc<ServerInner>) {
        let mut ticker = tokio::time::interval(inner.heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            inner.broadcast_status();
        }
    }

    async fn accept_loop(&mut self) -> ServerResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, inner).await {
                            log::warn!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    fn cleanup(&self) {
        let addr = self.listener.local_addr().ok();

        if let Some(path) = addr
            .as_ref()
            .and_then(|a| a.as_pathname())
            .filter(|p| p.exists())
            && let Err(e) = std::fs::remove_file(path)
        {
            log::warn!("Failed to remove socket file: {}", e);
        }
    }
}

#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<ServerInner>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.inner.shutdown_notify.notify_one();
    }
}

struct SubscriberHandle {
    id: Uuid,
    tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

/// Inner server state with all shared data
struct ServerInner {
    monitor: Arc<Monitor>,
    subscribers: Mutex<Vec<SubscriberHandle>>,

    start_time: Instant,
    read_timeout: Duration,
    heartbeat: Duration,

    shutdown_notify: Notify,
}

impl ServerInner {
    fn new(monitor: Monitor, settings: &Settings) -> Self {
        Self {
            monitor: Arc::new(monitor),
            subscribers: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            read_timeout: settings.read_timeout(),
            heartbeat: settings.heartbeat_interval(),
            shutdown_notify: Notify::new(),
        }
    }

    /// Monotonic timestamp in milliseconds since server start
    fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn add_subscriber(&self, id: Uuid, tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriberHandle { id, tx });
        log::debug!("Subscriber {} added", id);
    }

    fn remove_subscriber(&self, id: Uuid) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id != id);
        log::debug!("Subscriber {} removed", id);
    }

    /// Broadcast a typed event to all subscribers
    fn broadcast_event(&self, event: ServerMessage) {
        let bytes = match encode_server_message(&event) {
            Ok(json) => json.into_bytes(),
            Err(e) => {
                log::warn!("Failed to encode event: {}", e);
                return;
            }
        };

        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop subscribers whose connection has gone away
        subs.retain(|sub| sub.tx.send(bytes.clone()).is_ok());
    }

    /// Broadcast the current phase and reading to subscribers
    fn broadcast_status(&self) {
        // One lock acquisition so the phase and reading belong together
        let status = self.monitor.status();
        self.broadcast_event(ServerMessage::new_status_event(
            status.phase,
            status.pipeline.heart_rate,
            status.pipeline.total_samples,
            self.elapsed_ms(),
        ));
    }

    /// Stop the running session, joining its worker off the async runtime
    async fn stop_monitoring(&self) {
        let monitor = Arc::clone(&self.monitor);
        match tokio::task::spawn_blocking(move || monitor.stop_session()).await {
            Ok(Ok(())) | Ok(Err(MonitorError::NotRunning)) => {}
            Ok(Err(e)) => log::warn!("Failed to stop monitoring session: {}", e),
            Err(e) => log::warn!("Stop task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Phase;
    use crate::protocol::ClientMessage;
    use crate::transport::AsyncTransport;

    fn test_settings() -> Settings {
        Settings {
            heartbeat_ms: 50,
            ..Settings::default()
        }
    }

    type ServerTask = tokio::task::JoinHandle<ServerResult<()>>;

    fn start_server(
        dir: &tempfile::TempDir,
    ) -> (AsyncTransport, ShutdownHandle, ServerTask, std::path::PathBuf) {
        let path = dir.path().join("ecgmon.sock");
        let mut server = SocketServer::new(&path, &test_settings()).unwrap();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(async move { server.run().await });
        let client = AsyncTransport::new(path.to_string_lossy().to_string());
        (client, shutdown, task, path)
    }

    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecgmon.sock");
        let _server = SocketServer::new(&path, &test_settings()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecgmon.sock");
        std::fs::write(&path, b"stale").unwrap();

        assert!(SocketServer::new(&path, &test_settings()).is_ok());
    }

    #[tokio::test]
    async fn test_idle_service_answers_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (client, shutdown, task, path) = start_server(&dir);

        let request = ClientMessage::new_heart_rate();
        match client.send_request(&request).await.unwrap() {
            ServerMessage::HeartRate { id, bpm } => {
                assert_eq!(id, request.id());
                assert_eq!(bpm, None);
            }
            other => panic!("Wrong response: {:?}", other),
        }

        match client.send_request(&ClientMessage::new_samples()).await.unwrap() {
            ServerMessage::Samples { values, .. } => assert!(values.is_empty()),
            other => panic!("Wrong response: {:?}", other),
        }

        match client.send_request(&ClientMessage::new_status()).await.unwrap() {
            ServerMessage::Status {
                service_running,
                phase,
                source,
                heart_rate,
                ..
            } => {
                assert!(service_running);
                assert_eq!(phase, Phase::Idle);
                assert_eq!(source, None);
                assert_eq!(heart_rate, None);
            }
            other => panic!("Wrong response: {:?}", other),
        }

        shutdown.shutdown();
        task.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (client, shutdown, task, _) = start_server(&dir);

        match client.send_request(&ClientMessage::new_disconnect()).await.unwrap() {
            ServerMessage::Error { error, .. } => assert_eq!(error, "No active connection"),
            other => panic!("Wrong response: {:?}", other),
        }

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_missing_port_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (client, shutdown, task, _) = start_server(&dir);

        let request = ClientMessage::new_connect("/dev/ecgmon-test-missing-port".to_string(), 9600);
        match client.send_request(&request).await.unwrap() {
            ServerMessage::Error { error, .. } => {
                assert!(error.contains("/dev/ecgmon-test-missing-port"));
            }
            other => panic!("Wrong response: {:?}", other),
        }

        let request = ClientMessage::new_connect("/dev/ttyUSB0".to_string(), 1234);
        match client.send_request(&request).await.unwrap() {
            ServerMessage::Error { error, .. } => assert!(error.contains("1234")),
            other => panic!("Wrong response: {:?}", other),
        }

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ports_lists_baud_rates() {
        let dir = tempfile::tempdir().unwrap();
        let (client, shutdown, task, _) = start_server(&dir);

        let request = ClientMessage::Ports { id: Uuid::new_v4() };
        match client.send_request(&request).await.unwrap() {
            ServerMessage::Ports { baud_rates, .. } => {
                assert_eq!(baud_rates, vec![9600, 19200, 38400, 57600, 115200]);
            }
            other => panic!("Wrong response: {:?}", other),
        }

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_status_events() {
        let dir = tempfile::tempdir().unwrap();
        let (client, shutdown, task, _) = start_server(&dir);

        let mut conn = client.connect().await.unwrap();
        let request = ClientMessage::new_subscribe();
        conn.write_message(&request).await.unwrap();

        let mut subscribed = false;
        let mut events = 0;
        while events < 2 {
            let message = tokio::time::timeout(Duration::from_secs(5), conn.read_server_message())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            match message {
                ServerMessage::Subscribed { id } => {
                    assert_eq!(id, request.id());
                    subscribed = true;
                }
                ServerMessage::StatusEvent { phase, bpm, .. } => {
                    assert_eq!(phase, Phase::Idle);
                    assert_eq!(bpm, None);
                    events += 1;
                }
                other => panic!("Unexpected message: {:?}", other),
            }
        }
        assert!(subscribed);

        drop(conn);
        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }
}
