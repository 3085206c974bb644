//! TCP server implementation.
//!
//! A single loop task owns the listener and every connection's state. Each
//! connection gets a reader task that forwards bytes over one shared channel
//! and a writer task fed by its own bounded queue. Decoding, session changes
//! and command execution happen on the loop task, in arrival order. The loop
//! never waits on a socket: a connection whose queue is full is dropped.

use crate::command::Services;
use crate::config::NetworkConfig;
use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::session::{ConnectionId, Session};
use bytes::Bytes;
use cryptowallet_protocol::{Decoder, Encoder, DEFAULT_PORT, MAX_LINE_BYTES};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Capacity of the channel carrying read events to the loop.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Bytes read from a socket per read call.
    pub read_buffer_size: usize,
    /// Longest accepted request line.
    pub max_line_bytes: usize,
    /// Responses queued per connection before it is dropped.
    pub write_queue_size: usize,
    /// Limit for writing one response to a socket.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
            read_buffer_size: 2048,
            max_line_bytes: MAX_LINE_BYTES,
            write_queue_size: 64,
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

impl From<&NetworkConfig> for ServerConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            max_connections: network.max_connections,
            read_buffer_size: network.read_buffer_size,
            max_line_bytes: network.max_line_bytes,
            write_queue_size: network.write_queue_size,
            write_timeout: network.write_timeout(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl ServerStats {
    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub requests_total: u64,
    pub errors_total: u64,
}

/// What a reader task observed.
enum ReadEvent {
    Data(Bytes),
    Closed,
    Failed(std::io::Error),
}

/// Read event forwarded from a reader task to the loop.
struct ForwardedRead {
    id: ConnectionId,
    event: ReadEvent,
}

/// A registered connection. Only the loop task touches it.
///
/// Dropping it aborts both I/O tasks unless the writer was released with
/// [`Connection::flush_and_close`].
struct Connection {
    session: Session,
    decoder: Decoder,
    outbox: mpsc::Sender<Bytes>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Lets the writer drain the queued responses and close the socket once
    /// the connection is dropped.
    fn flush_and_close(&mut self) {
        self.writer.take();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = &self.writer {
            writer.abort();
        }
    }
}

/// TCP server for cryptowallet.
pub struct Server {
    config: ServerConfig,
    handler: CommandHandler,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    stopping: AtomicBool,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, services: Services) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: CommandHandler::new(services),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the loop on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Err(ServerError::ShuttingDown);
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", local_addr);

        let (event_tx, mut event_rx) = mpsc::channel::<ForwardedRead>(EVENT_CHANNEL_CAPACITY);
        let mut connections: HashMap<ConnectionId, Connection> = HashMap::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if connections.len() >= self.config.max_connections {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            next_id += 1;
                            let id = ConnectionId(next_id);
                            let connection = self.register(id, stream, addr, event_tx.clone());
                            connections.insert(id, connection);
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }

                Some(ForwardedRead { id, event }) = event_rx.recv() => {
                    match event {
                        ReadEvent::Data(data) => {
                            let Some(connection) = connections.get_mut(&id) else {
                                tracing::debug!("[{}] Dropping {} bytes for closed connection", id, data.len());
                                continue;
                            };
                            tracing::debug!("[{}] Received {} bytes", id, data.len());
                            connection.decoder.extend(&data);

                            if self.process(connection) {
                                self.remove(&mut connections, id);
                            }
                        }
                        ReadEvent::Closed => {
                            tracing::debug!("[{}] Connection closed by client", id);
                            self.remove(&mut connections, id);
                        }
                        ReadEvent::Failed(e) => {
                            tracing::debug!("[{}] Read error: {}", id, e);
                            self.remove(&mut connections, id);
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        let open = connections.len();
        connections.clear();
        self.stats.connections_active.store(0, Ordering::Relaxed);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Server stopped, closed {} connections", open);

        Ok(())
    }

    /// Sets up a freshly accepted socket and spawns its reader.
    fn register(
        &self,
        id: ConnectionId,
        stream: TcpStream,
        addr: SocketAddr,
        tx: mpsc::Sender<ForwardedRead>,
    ) -> Connection {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("[{}] Failed to set TCP_NODELAY: {}", id, e);
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Client connected: {} ({})", addr, id);

        let (read_half, write_half) = stream.into_split();
        let reader = Self::spawn_reader(id, read_half, self.config.read_buffer_size, tx);
        let (outbox, queue) = mpsc::channel(self.config.write_queue_size);
        let writer = Self::spawn_writer(id, write_half, queue, self.config.write_timeout);

        Connection {
            session: Session::new(id, addr),
            decoder: Decoder::with_max_line_bytes(self.config.max_line_bytes),
            outbox,
            reader,
            writer: Some(writer),
        }
    }

    /// Spawns a task that forwards everything read from the socket to the loop.
    fn spawn_reader(
        id: ConnectionId,
        mut reader: OwnedReadHalf,
        buffer_size: usize,
        tx: mpsc::Sender<ForwardedRead>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            loop {
                let event = match reader.read(&mut buf).await {
                    Ok(0) => ReadEvent::Closed,
                    Ok(n) => ReadEvent::Data(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => ReadEvent::Failed(e),
                };
                let last = !matches!(event, ReadEvent::Data(_));

                // Loop is gone or this was the final event
                if tx.send(ForwardedRead { id, event }).await.is_err() || last {
                    break;
                }
            }
        })
    }

    /// Spawns a task that writes queued responses to the socket in order.
    ///
    /// Ends on a write error or timeout, or after the queue closes. In the
    /// latter case the write side is shut down.
    fn spawn_writer(
        id: ConnectionId,
        mut writer: OwnedWriteHalf,
        mut queue: mpsc::Receiver<Bytes>,
        write_timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(bytes) = queue.recv().await {
                match tokio::time::timeout(write_timeout, writer.write_all(&bytes)).await {
                    Ok(Ok(())) => {
                        tracing::debug!("[{}] Wrote {} bytes", id, bytes.len());
                    }
                    Ok(Err(e)) => {
                        tracing::debug!("[{}] Write error: {}", id, e);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("[{}] Write timed out", id);
                        return;
                    }
                }
            }
            // Peer may already be gone
            let _ = writer.shutdown().await;
        })
    }

    /// Answers every complete line buffered for a connection.
    ///
    /// Returns true when the connection must be closed.
    fn process(&self, connection: &mut Connection) -> bool {
        let id = connection.session.id;

        loop {
            let response = match connection.decoder.decode_line() {
                Ok(Some(line)) => self.handler.handle_line(&mut connection.session, &line),
                Ok(None) => return false,
                Err(e) => self.handler.handle_protocol_error(&mut connection.session, e),
            };

            self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
            if !response.is_ok() {
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }

            let bytes = Encoder::encode_response(&response.text).freeze();
            match connection.outbox.try_send(bytes) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("[{}] Client is not reading responses, dropping", id);
                    return true;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("[{}] Writer gone", id);
                    return true;
                }
            }

            if connection.session.is_closing() {
                tracing::debug!("[{}] Session closing", id);
                connection.flush_and_close();
                return true;
            }
        }
    }

    fn remove(&self, connections: &mut HashMap<ConnectionId, Connection>, id: ConnectionId) {
        if let Some(connection) = connections.remove(&id) {
            self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(
                "Client disconnected: {} ({}, {} requests in {:.1?})",
                connection.session.remote_addr,
                id,
                connection.session.request_count(),
                connection.session.age()
            );
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing;
    use cryptowallet_core::{AssetCatalog, UserStore};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    const IO_TIMEOUT: Duration = Duration::from_secs(5);

    struct TestServer {
        server: Arc<Server>,
        addr: SocketAddr,
        task: JoinHandle<Result<(), ServerError>>,
        catalog: Arc<AssetCatalog>,
        store: Arc<UserStore>,
    }

    impl TestServer {
        async fn start(config: ServerConfig) -> Self {
            let (services, store, catalog) = testing::services();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let server = Arc::new(Server::new(config, services));
            let task = tokio::spawn({
                let server = server.clone();
                async move { server.serve(listener).await }
            });

            Self {
                server,
                addr,
                task,
                catalog,
                store,
            }
        }

        async fn connect(&self) -> TestClient {
            TestClient::connect(self.addr).await
        }

        async fn stop(self) -> Arc<Server> {
            self.server.shutdown();
            tokio::time::timeout(IO_TIMEOUT, self.task)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            self.server
        }
    }

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            Self {
                reader: BufReader::new(read_half),
                writer: write_half,
            }
        }

        async fn write_raw(&mut self, data: &[u8]) {
            self.writer.write_all(data).await.unwrap();
        }

        /// Reads one response body (lines up to the empty terminator line).
        async fn read_response(&mut self) -> String {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                let n = tokio::time::timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
                    .await
                    .unwrap()
                    .unwrap();
                assert!(n > 0, "connection closed mid-response");
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    return lines.join("\n");
                }
                lines.push(line.to_string());
            }
        }

        async fn send(&mut self, line: &str) -> String {
            self.write_raw(format!("{line}\n").as_bytes()).await;
            self.read_response().await
        }

        /// Returns true once the server has closed the connection.
        async fn is_closed(&mut self) -> bool {
            let mut line = String::new();
            match tokio::time::timeout(IO_TIMEOUT, self.reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Ok(Err(_)) => true,
                Ok(Ok(_)) | Err(_) => false,
            }
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_server_config_from_network() {
        let network = NetworkConfig {
            read_buffer_size: 64,
            write_queue_size: 8,
            write_timeout_secs: 3,
            ..Default::default()
        };
        let config = ServerConfig::from(&network);
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(config.write_queue_size, 8);
        assert_eq!(config.write_timeout, Duration::from_secs(3));
        assert_eq!(config.bind_addr.port(), 8888);
    }

    #[tokio::test]
    async fn test_wallet_scenario() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;

        assert_eq!(
            client.send("$ register alice pw1").await,
            "You have successfully registered in the system"
        );
        assert_eq!(
            client.send("$ login alice pw1").await,
            "You have successfully logged in as \"alice\""
        );
        assert_eq!(
            client.send("$ deposit-money 100").await,
            "You have successfully made a deposit of 100 USD"
        );
        assert_eq!(
            client.send("$ buy --offering=BTC --money=40").await,
            "You have successfully bought 2 of BTC"
        );

        let summary = client.send("$ get-wallet-summary").await;
        assert_eq!(
            summary,
            "Wallet Summary:\nCurrent balance = 60 USD\nCryptoCurrency: BTC, Current Quantity: 2"
        );

        assert!(server.store.contains("alice"));
        let server = server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;

        let response = client.send("hello").await;
        assert!(response.contains("should start with $"));
        let response = client.send("$ fly").await;
        assert!(response.contains("invalid command"));
        let response = client.send("$ list-offerings").await;
        assert!(response.contains("logged in"));

        let response = client.send("$ help").await;
        assert!(response.starts_with("You can choose from the following commands:"));

        let stats = server.server.stats().snapshot();
        assert_eq!(stats.requests_total, 4);
        assert_eq!(stats.errors_total, 3);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_closes_after_reply() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;

        // Anything after disconnect in the same packet is never answered
        client.write_raw(b"$ disconnect\n$ help\n").await;
        assert_eq!(
            client.read_response().await,
            "You have been disconnected from the server!"
        );
        assert!(client.is_closed().await);

        let stats = server.server.stats();
        wait_for(|| stats.connections_active.load(Ordering::Relaxed) == 0).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_pipelined_and_split_requests() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;

        client
            .write_raw(b"$ register bob pw\n$ login bob pw\n$ deposit-money 5\n")
            .await;
        assert!(client.read_response().await.contains("registered"));
        assert!(client.read_response().await.contains("logged in as \"bob\""));
        assert!(client.read_response().await.contains("deposit of 5 USD"));

        client.write_raw(b"$ withdraw").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_raw(b"-money 2\r\n").await;
        assert_eq!(
            client.read_response().await,
            "You have successfully withdrawn 2 USD"
        );
        server.stop().await;
    }

    #[tokio::test]
    async fn test_sessions_are_per_connection() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut first = server.connect().await;
        let mut second = server.connect().await;

        first.send("$ register carol pw").await;
        assert!(first.send("$ login carol pw").await.contains("logged in"));

        let response = second.send("$ get-wallet-summary").await;
        assert!(response.contains("logged in"));
        assert!(second.send("$ login carol pw").await.contains("logged in as"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_sequential_deposits_over_wire() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;
        client.send("$ register dave pw").await;
        client.send("$ login dave pw").await;

        let n = 20u32;
        for i in 1..=n {
            client.send(&format!("$ deposit-money {i}")).await;
        }
        let summary = client.send("$ get-wallet-summary").await;
        assert!(summary.contains(&format!("Current balance = {} USD", n * (n + 1) / 2)));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_overlong_line_rejected() {
        let config = ServerConfig {
            max_line_bytes: 32,
            ..Default::default()
        };
        let server = TestServer::start(config).await;
        let mut client = server.connect().await;

        let long = format!("$ register {} pw", "x".repeat(64));
        let response = client.send(&long).await;
        assert!(response.contains("too long"));
        assert!(client.send("$ help").await.contains("$ register"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 1,
            ..Default::default()
        };
        let server = TestServer::start(config).await;
        let mut first = server.connect().await;
        assert!(first.send("$ help").await.contains("$ help"));

        let mut second = server.connect().await;
        assert!(second.is_closed().await);

        // First connection is unaffected
        assert!(first.send("$ help").await.contains("$ help"));
        assert_eq!(server.server.stats().snapshot().connections_total, 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_client_that_never_reads_is_dropped() {
        let config = ServerConfig {
            write_queue_size: 4,
            ..Default::default()
        };
        let server = TestServer::start(config).await;

        // Floods requests and never reads a response
        let stream = TcpStream::connect(server.addr).await.unwrap();
        let (_unread, mut flood) = stream.into_split();
        let flooder = tokio::spawn(async move {
            let batch = "$ help\n".repeat(1000);
            for _ in 0..200 {
                if flood.write_all(batch.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut other = server.connect().await;
        assert!(other.send("$ help").await.contains("$ help"));

        let stats = server.server.stats();
        wait_for(|| stats.connections_active.load(Ordering::Relaxed) == 1).await;

        // Stop still wakes the loop
        server.stop().await;
        flooder.abort();
    }

    #[tokio::test]
    async fn test_responses_flushed_before_disconnect_close() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;

        client.write_raw(b"$ help\n$ help\n$ disconnect\n").await;
        assert!(client.read_response().await.contains("$ help"));
        assert!(client.read_response().await.contains("$ help"));
        assert_eq!(
            client.read_response().await,
            "You have been disconnected from the server!"
        );
        assert!(client.is_closed().await);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_prices_follow_catalog() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;
        client.send("$ register erin pw").await;
        client.send("$ login erin pw").await;

        server.catalog.replace(vec![
            cryptowallet_core::Offering::new("BTC", "Bitcoin", 50.0).unwrap(),
        ]);
        let listing = client.send("$ list-offerings").await;
        assert_eq!(listing, "Available Cryptocurrencies:\nBTC, Bitcoin: 50 USD");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_before_serve() {
        let (services, _, _) = testing::services();
        let server = Server::new(ServerConfig::default(), services);
        server.shutdown();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            server.serve(listener).await,
            Err(ServerError::ShuttingDown)
        ));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_closes_clients() {
        let server = TestServer::start(ServerConfig::default()).await;
        let mut client = server.connect().await;
        client.send("$ help").await;

        let server = server.stop().await;
        assert!(client.is_closed().await);
        assert_eq!(server.stats().snapshot().connections_active, 0);
    }
}
