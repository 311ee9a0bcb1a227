//! `rcon-client`: Source RCON over TCP with a single serialized command
//! channel that heals itself when the server drops the connection.
//!
//! # Architecture
//!
//! ```text
//! ResilientTransport::call("list")
//!     │   one caller at a time (async mutex)
//!     ▼
//! Connector::connect()   ← lazy connect + authenticate handshake
//!     │
//!     ▼
//! Link::exchange()       ← one request packet, one matching response
//!     │
//!     ▼
//! Packet                 ← little-endian length-prefixed frames
//! ```
//!
//! A connection that is terminated mid-call is replaced exactly once; the
//! command that was in flight is never sent again, the caller gets
//! [`RconError::CommandLost`] instead.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use rcon_client::{ResilientTransport, TcpConnector};
//!
//! let transport = ResilientTransport::new(TcpConnector::new("mc:25575", "secret"));
//! let body = transport.call("list").await?;
//! ```

pub mod connection;
pub mod error;
pub mod packet;
pub mod transport;

pub use connection::{Connector, Link, TcpConnector, TcpLink};
pub use error::RconError;
pub use packet::Packet;
pub use transport::{ReconnectPolicy, ResilientTransport};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RconError>;
