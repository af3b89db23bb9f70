//! Server network layer: TCP accept loop, per-connection tasks and the
//! single event loop that drives the [`Session`].

use crate::session::{Disposition, Session};
use crate::store::{ConfigStore, ServerSettings};
use log::{debug, error, info, warn};
use shared::crypt::key_bytes;
use shared::transport::{read_line, write_line};
use shared::MAX_PLAYERS;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent from connection tasks and signal handlers to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    LineReceived { conn_id: u64, line: String },
    ConnectionClosed { conn_id: u64 },
    Reload,
    Shutdown,
}

/// Cloneable handle for asking a running server to reload or stop.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn reload(&self) {
        let _ = self.tx.send(ServerMessage::Reload);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ServerMessage::Shutdown);
    }
}

struct Connection {
    slot: u8,
    tx: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
}

/// Main server owning the listener, the session and every connection
pub struct Server {
    listener: TcpListener,
    session: Session,
    store: ConfigStore,
    connections: HashMap<u64, Connection>,
    slots: [Option<u64>; MAX_PLAYERS],
    next_conn_id: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        store: ConfigStore,
        settings: ServerSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            session: Session::new(settings),
            store,
            connections: HashMap::new(),
            slots: [None; MAX_PLAYERS],
            next_conn_id: 0,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that forwards each received line to the main loop
    fn spawn_reader(&self, conn_id: u64, read_half: OwnedReadHalf) -> JoinHandle<()> {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                match read_line(&mut reader).await {
                    Ok(Some(line)) => {
                        if server_tx
                            .send(ServerMessage::LineReceived { conn_id, line })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Read error on connection {}: {}", conn_id, e);
                        break;
                    }
                }
            }
            let _ = server_tx.send(ServerMessage::ConnectionClosed { conn_id });
        })
    }

    /// Spawns task that writes queued lines until its sender is dropped
    fn spawn_writer(conn_id: u64, mut write_half: OwnedWriteHalf) -> mpsc::UnboundedSender<String> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = write_line(&mut write_half, &line).await {
                    warn!("Failed to write to connection {}: {}", conn_id, e);
                    break;
                }
            }
        });
        tx
    }

    async fn accept(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let Some(slot) = self.session.connect(key_bytes(addr.ip())) else {
            info!("Refusing {}: server full", addr);
            if let Err(e) = write_line(&mut stream, &Session::full_notice()).await {
                debug!("Could not notify {}: {}", addr, e);
            }
            return;
        };

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        let (read_half, write_half) = stream.into_split();
        let tx = Self::spawn_writer(conn_id, write_half);
        let reader = self.spawn_reader(conn_id, read_half);

        self.slots[slot as usize - 1] = Some(conn_id);
        self.connections
            .insert(conn_id, Connection { slot, tx, reader });
        debug!("Connection {} from {} is slot {}", conn_id, addr, slot);
    }

    fn handle_line(&mut self, conn_id: u64, line: &str) {
        let Some(slot) = self.connections.get(&conn_id).map(|c| c.slot) else {
            return;
        };
        if self.session.handle_line(slot, line) == Disposition::Close {
            self.flush();
            self.close(conn_id);
        }
    }

    /// Frees the connection's slot. Lines already queued are still written.
    fn close(&mut self, conn_id: u64) {
        let Some(connection) = self.connections.remove(&conn_id) else {
            return;
        };
        connection.reader.abort();
        self.slots[connection.slot as usize - 1] = None;
        self.session.disconnect(connection.slot);
    }

    /// Hands every queued line to its connection's writer.
    fn flush(&mut self) {
        for out in self.session.drain_outbox() {
            let Some(conn_id) = self.slots.get(out.slot as usize - 1).copied().flatten() else {
                continue;
            };
            if let Some(connection) = self.connections.get(&conn_id) {
                debug!("slot {} -> {}", out.slot, out.line);
                let _ = connection.tx.send(out.line);
            }
        }
    }

    fn save(&mut self) {
        if let Err(e) = self.store.save(self.session.settings()) {
            error!("{}", e);
        }
    }

    fn reload(&mut self) {
        match self.store.load() {
            Ok(settings) => {
                if let Err(e) = settings.check() {
                    warn!("{}", e);
                }
                self.session.reload(settings);
            }
            Err(e) => error!("Reload failed: {}", e),
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        spawn_reload_listener(self.handle());
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept(stream, addr).await,
                        Err(e) => error!("Accept failed: {}", e),
                    }
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::LineReceived { conn_id, line }) => {
                            self.handle_line(conn_id, &line);
                        },
                        Some(ServerMessage::ConnectionClosed { conn_id }) => {
                            self.close(conn_id);
                        },
                        Some(ServerMessage::Reload) => self.reload(),
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },
            }

            self.flush();
            if self.session.take_save_request() {
                self.save();
            }
        }

        self.save();
        Ok(())
    }
}

#[cfg(unix)]
fn spawn_reload_listener(handle: ServerHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                warn!("Cannot listen for SIGHUP: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP");
            handle.reload();
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_handle: ServerHandle) {}
