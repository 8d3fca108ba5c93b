//! Server network layer handling datagram and stream traffic
//!
//! Socket I/O runs on dedicated tasks. Everything that touches game state is
//! funneled through one channel into [`Server::run`], which owns the engine
//! and answers messages strictly in arrival order.

use crate::engine::Engine;
use crate::store::GameStore;
use crate::transfer::TransferReply;
use chrono::Local;
use log::{debug, error, info, warn};
use shared::{Response, MAX_BUFFER_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// How long a stream peer may take to send its request line
pub const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived {
        data: Vec<u8>,
        addr: SocketAddr,
    },
    /// A stream request; the connection task waits on `reply`
    Transfer {
        request: String,
        peer: SocketAddr,
        reply: oneshot::Sender<TransferReply>,
    },
}

/// Messages sent from main server loop to the datagram sender
#[derive(Debug)]
pub enum OutboundMessage {
    SendDatagram { response: Response, addr: SocketAddr },
}

/// Game server bound to a datagram socket and a stream listener
pub struct Server<S: GameStore> {
    socket: Arc<UdpSocket>,
    listener: Option<TcpListener>,
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    engine: Engine<S>,
    verbose: bool,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl<S: GameStore + 'static> Server<S> {
    pub async fn bind(
        udp_addr: &str,
        tcp_addr: &str,
        engine: Engine<S>,
        verbose: bool,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(udp_addr).await?;
        let listener = TcpListener::bind(tcp_addr).await?;
        let udp_addr = socket.local_addr()?;
        let tcp_addr = listener.local_addr()?;
        info!("Server listening on {} (udp) and {} (tcp)", udp_addr, tcp_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket: Arc::new(socket),
            listener: Some(listener),
            udp_addr,
            tcp_addr,
            engine,
            verbose,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_datagram_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let data = buffer[..len].to_vec();
                        if let Err(e) =
                            server_tx.send(ServerMessage::DatagramReceived { data, addr })
                        {
                            error!("Failed to send datagram to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing datagram queue
    fn spawn_datagram_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendDatagram { response, addr } => {
                        let data = response.to_string();
                        if let Err(e) = socket.send_to(data.as_bytes(), addr).await {
                            error!("Failed to send reply to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that accepts stream connections, one task per peer
    fn spawn_stream_acceptor(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return,
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let server_tx = server_tx.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, peer, server_tx).await;
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        if self.verbose {
            info!(
                "Request from {}: {}",
                addr,
                String::from_utf8_lossy(data).trim_end()
            );
        }

        let response = self.engine.handle_datagram(data, Local::now());
        debug!("Reply to {}: {}", addr, response.to_string().trim_end());

        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendDatagram { response, addr })
        {
            error!("Failed to queue reply for sending: {}", e);
        }
    }

    fn handle_transfer(
        &mut self,
        request: &str,
        peer: SocketAddr,
        reply: oneshot::Sender<TransferReply>,
    ) {
        if self.verbose {
            info!("Transfer request from {}: {}", peer, request.trim_end());
        }

        let response = self.engine.handle_stream(request, Local::now());
        if reply.send(response).is_err() {
            warn!("Connection from {} closed before its reply was ready", peer);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> io::Result<()> {
        // Initialize concurrent tasks
        self.spawn_datagram_receiver();
        self.spawn_datagram_sender();
        self.spawn_stream_acceptor();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::DatagramReceived { data, addr } => {
                    self.handle_datagram(&data, addr);
                }
                ServerMessage::Transfer {
                    request,
                    peer,
                    reply,
                } => {
                    self.handle_transfer(&request, peer, reply);
                }
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Reads one request line, hands it to the main loop and writes the reply
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).take(MAX_BUFFER_SIZE as u64);
    let mut request = String::new();

    match timeout(STREAM_READ_TIMEOUT, reader.read_line(&mut request)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!("Failed to read request from {}: {}", peer, e);
            return;
        }
        Err(_) => {
            warn!("Connection from {} timed out", peer);
            return;
        }
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    let message = ServerMessage::Transfer {
        request,
        peer,
        reply: reply_tx,
    };
    if let Err(e) = server_tx.send(message) {
        error!("Failed to send transfer request to main loop: {}", e);
        return;
    }

    let reply = match reply_rx.await {
        Ok(reply) => reply,
        Err(_) => {
            error!("Main loop dropped the transfer for {}", peer);
            return;
        }
    };

    if let Err(e) = write_half.write_all(&reply.to_bytes()).await {
        warn!("Failed to send transfer to {}: {}", peer, e);
        return;
    }
    if let Err(e) = write_half.shutdown().await {
        debug!("Failed to close connection to {}: {}", peer, e);
    }
}
