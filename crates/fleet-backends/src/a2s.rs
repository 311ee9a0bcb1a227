//! Steam server queries (A2S_PLAYER) over UDP.
//!
//! ```text
//! → FF FF FF FF 55 <challenge:i32le>      challenge starts at -1
//! ← FF FF FF FF 41 <challenge:4 bytes>    resend with this challenge
//! ← FF FF FF FF 44 <count:u8> <players…>
//! ```
//!
//! Valheim reports a count but never names, so only the count is read.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::capability::{PlayerCounter, PlayerList, PlayerLister};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

const SINGLE_PACKET: [u8; 4] = [0xFF; 4];
const SPLIT_PACKET: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];
const A2S_PLAYER: u8 = 0x55;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_PLAYER: u8 = 0x44;
const MAX_CHALLENGES: usize = 3;
const MAX_DATAGRAM: usize = 1400;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no answer from {address} within {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("could not resolve {0}")]
    Unresolved(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server keeps issuing challenges")]
    ChallengeLoop,
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone)]
pub struct A2sQuery {
    address: String,
    timeout: Duration,
}

impl A2sQuery {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn player_count(&self) -> Result<u32> {
        let target = self.resolve().await?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(target).await?;

        let mut challenge = [0xFF; 4];
        for _ in 0..MAX_CHALLENGES {
            socket.send(&player_request(challenge)).await?;
            let datagram = self.receive(&socket).await?;
            match parse_reply(&datagram)? {
                Reply::Challenge(next) => {
                    debug!(address = %self.address, "a2s challenge received");
                    challenge = next;
                }
                Reply::Players(count) => return Ok(count),
            }
        }
        Err(QueryError::ChallengeLoop)
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        tokio::net::lookup_host(&self.address)
            .await?
            .next()
            .ok_or_else(|| QueryError::Unresolved(self.address.clone()))
    }

    async fn receive(&self, socket: &UdpSocket) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| QueryError::Timeout {
                address: self.address.clone(),
                timeout: self.timeout,
            })??;
        buf.truncate(len);
        Ok(buf)
    }
}

fn player_request(challenge: [u8; 4]) -> Vec<u8> {
    let mut req = Vec::with_capacity(9);
    req.extend_from_slice(&SINGLE_PACKET);
    req.push(A2S_PLAYER);
    req.extend_from_slice(&challenge);
    req
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Challenge([u8; 4]),
    Players(u32),
}

fn parse_reply(datagram: &[u8]) -> Result<Reply> {
    if datagram.len() < 5 {
        return Err(QueryError::Malformed(format!(
            "{} byte datagram",
            datagram.len()
        )));
    }
    if datagram[..4] == SPLIT_PACKET {
        return Err(QueryError::Malformed(
            "split responses are not supported".to_string(),
        ));
    }
    if datagram[..4] != SINGLE_PACKET {
        return Err(QueryError::Malformed("unknown packet header".to_string()));
    }
    match datagram[4] {
        S2C_CHALLENGE if datagram.len() >= 9 => {
            let mut challenge = [0u8; 4];
            challenge.copy_from_slice(&datagram[5..9]);
            Ok(Reply::Challenge(challenge))
        }
        S2A_PLAYER if datagram.len() >= 6 => Ok(Reply::Players(u32::from(datagram[5]))),
        kind => Err(QueryError::Malformed(format!(
            "unexpected response type {kind:#04x} ({} bytes)",
            datagram.len()
        ))),
    }
}

#[async_trait]
impl PlayerCounter for A2sQuery {
    async fn count_players(&self) -> anyhow::Result<u32> {
        Ok(self.player_count().await?)
    }
}

#[async_trait]
impl PlayerLister for A2sQuery {
    async fn list_players(&self) -> anyhow::Result<PlayerList> {
        Ok(PlayerList::count_only(self.player_count().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_the_challenge() {
        assert_eq!(
            player_request([1, 2, 3, 4]),
            [0xFF, 0xFF, 0xFF, 0xFF, 0x55, 1, 2, 3, 4]
        );
    }

    #[test]
    fn parses_challenge_and_player_replies() {
        assert_eq!(
            parse_reply(&[0xFF, 0xFF, 0xFF, 0xFF, 0x41, 9, 8, 7, 6]).unwrap(),
            Reply::Challenge([9, 8, 7, 6])
        );
        // Two players, names empty as Valheim sends them.
        let players = [
            0xFF, 0xFF, 0xFF, 0xFF, 0x44, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0,
        ];
        assert_eq!(parse_reply(&players).unwrap(), Reply::Players(2));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_reply(&[1, 2]), Err(QueryError::Malformed(_))));
        assert!(matches!(
            parse_reply(&[0xFE, 0xFF, 0xFF, 0xFF, 0x44, 0]),
            Err(QueryError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply(&[0xFF, 0xFF, 0xFF, 0xFF, 0x49, 0]),
            Err(QueryError::Malformed(_))
        ));
    }

    /// Answers the first request with a challenge, then with `count`.
    async fn fake_server(count: u8) -> String {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let challenge = [0xAB, 0xCD, 0x01, 0x02];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let reply = if buf[5..len] == challenge {
                    vec![0xFF, 0xFF, 0xFF, 0xFF, 0x44, count]
                } else {
                    let mut r = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x41];
                    r.extend_from_slice(&challenge);
                    r
                };
                socket.send_to(&reply, peer).await.unwrap();
            }
        });
        address
    }

    #[tokio::test]
    async fn counts_players_through_the_challenge() {
        let address = fake_server(5).await;
        let query = A2sQuery::new(address);
        assert_eq!(query.player_count().await.unwrap(), 5);

        let list = query.list_players().await.unwrap();
        assert_eq!(list.count, 5);
        assert_eq!(list.display_names(), "<unknown>");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Bound but never answering.
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = A2sQuery::new(socket.local_addr().unwrap().to_string())
            .with_timeout(Duration::from_millis(50));
        let err = query.player_count().await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout { .. }), "got {err:?}");
    }
}
