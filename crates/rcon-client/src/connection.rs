use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::packet::{
    Packet, AUTH_FAILED_ID, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
};
use crate::{RconError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Seams ────────────────────────────────────────────────────────────────

/// An authenticated connection that can carry one command at a time.
#[async_trait]
pub trait Link: Send + 'static {
    /// Send `command` and wait for its response body.
    async fn exchange(&mut self, command: &str) -> Result<String>;

    /// Shut the connection down. Errors are ignored; the link is discarded.
    async fn close(&mut self);
}

/// Produces fresh, authenticated [`Link`]s.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: Link;

    /// Connect and run the authentication handshake.
    async fn connect(&self) -> Result<Self::Link>;
}

// ─── TCP ──────────────────────────────────────────────────────────────────

/// Connects to a Source RCON endpoint over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    password: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound for the handshake and for each command's response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Link = TcpLink;

    async fn connect(&self) -> Result<TcpLink> {
        let stream = within(self.timeout, async {
            TcpStream::connect(&self.address).await.map_err(RconError::from)
        })
        .await?;
        stream.set_nodelay(true)?;

        let mut link = TcpLink {
            stream,
            pending: Vec::new(),
            next_id: 1,
            timeout: self.timeout,
        };
        link.authenticate(&self.password).await?;
        debug!(address = %self.address, "rcon session authenticated");
        Ok(link)
    }
}

/// An authenticated RCON session on a TCP stream.
///
/// Inbound bytes collect in `pending` until a whole frame is there, so a
/// response cut off by a timeout is finished on the next exchange and then
/// skipped by id.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
    pending: Vec<u8>,
    next_id: i32,
    timeout: Duration,
}

impl TcpLink {
    async fn authenticate(&mut self, password: &str) -> Result<()> {
        let id = self.allocate_id();
        self.send(Packet::new(id, SERVERDATA_AUTH, password)).await?;
        let timeout = self.timeout;
        within(timeout, async {
            // Servers may send an empty RESPONSE_VALUE ahead of the verdict.
            loop {
                let packet = self.read_packet().await?;
                if packet.kind != SERVERDATA_AUTH_RESPONSE {
                    continue;
                }
                if packet.id == AUTH_FAILED_ID {
                    return Err(RconError::AuthRejected);
                }
                if packet.id == id {
                    return Ok(());
                }
            }
        })
        .await
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id == i32::MAX {
            1
        } else {
            self.next_id + 1
        };
        id
    }

    /// A write cut short leaves half a frame on the wire, so it gets its own
    /// error and the link is dropped.
    async fn send(&mut self, packet: Packet) -> Result<()> {
        let limit = self.timeout;
        tokio::time::timeout(limit, packet.write_to(&mut self.stream))
            .await
            .map_err(|_| RconError::WriteTimeout(limit))?
    }

    /// Cancel-safe: bytes already read stay in `pending` if the future is
    /// dropped.
    async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = Packet::take_from(&mut self.pending)? {
                return Ok(packet);
            }
            if self.stream.read_buf(&mut self.pending).await? == 0 {
                return Err(RconError::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn exchange(&mut self, command: &str) -> Result<String> {
        let id = self.allocate_id();
        self.send(Packet::new(id, SERVERDATA_EXECCOMMAND, command))
            .await?;
        let timeout = self.timeout;
        within(timeout, async {
            loop {
                let packet = self.read_packet().await?;
                if packet.id == id {
                    return Ok(packet.body);
                }
                debug!(
                    expected = id,
                    received = packet.id,
                    "discarding response to an earlier request"
                );
            }
        })
        .await
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

async fn within<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RconError::Timeout(limit))?
}
