use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::connection::{Connector, Link};
use crate::{RconError, Result};

// ─── ReconnectPolicy ──────────────────────────────────────────────────────

/// How a [`ResilientTransport`] replaces a terminated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause between dropping the stale link and the new handshake.
    pub backoff: Duration,
    /// Lifetime cap on reconnect attempts. `None` reconnects forever.
    pub max_reconnects: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(250),
            max_reconnects: None,
        }
    }
}

impl ReconnectPolicy {
    /// Reconnect at most `max` times over the transport's lifetime.
    pub fn bounded(max: u32) -> Self {
        Self {
            max_reconnects: Some(max),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

// ─── ResilientTransport ───────────────────────────────────────────────────

struct Session<L> {
    link: Option<L>,
    connected_once: bool,
    reconnects: u32,
}

/// Serializes commands over one RCON connection and replaces the connection
/// when the server drops it.
///
/// Callers share the transport (usually behind an `Arc`) and never see the
/// connection itself. Every call holds the internal lock for the full
/// round-trip, including any reconnect it triggers, so a slow server stalls
/// all callers of the same transport.
///
/// Commands are delivered at most once. When the link dies under a command
/// the transport reconnects, but the caller receives
/// [`RconError::CommandLost`] and decides whether to try again.
pub struct ResilientTransport<C: Connector> {
    connector: C,
    policy: ReconnectPolicy,
    session: Mutex<Session<C::Link>>,
}

impl<C: Connector> ResilientTransport<C> {
    pub fn new(connector: C) -> Self {
        Self::with_policy(connector, ReconnectPolicy::default())
    }

    pub fn with_policy(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            session: Mutex::new(Session {
                link: None,
                connected_once: false,
                reconnects: 0,
            }),
        }
    }

    /// Connect eagerly instead of on the first call.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_link(&mut session).await.map(|_| ())
    }

    /// Send `command` and return the response body.
    pub async fn call(&self, command: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        let link = self.ensure_link(&mut session).await?;

        match link.exchange(command).await {
            Ok(body) => Ok(body),
            Err(err) if err.is_connection_terminated() => {
                error!(command, error = %err, "rcon connection terminated");
                if let Some(mut stale) = session.link.take() {
                    stale.close().await;
                }
                self.reconnect(&mut session).await?;
                Err(RconError::CommandLost {
                    command: command.to_owned(),
                    source: Box::new(err),
                })
            }
            Err(err) => {
                warn!(command, error = %err, "rcon command failed");
                Err(err)
            }
        }
    }

    /// Reconnect attempts made so far.
    pub async fn reconnects(&self) -> u32 {
        self.session.lock().await.reconnects
    }

    async fn ensure_link<'s>(&self, session: &'s mut Session<C::Link>) -> Result<&'s mut C::Link> {
        if session.link.is_none() {
            if session.connected_once {
                // A previous reconnect failed; this handshake counts against the cap.
                self.reconnect(session).await?;
            } else {
                session.link = Some(self.connector.connect().await?);
                session.connected_once = true;
                info!("rcon connected");
            }
        }
        session.link.as_mut().ok_or(RconError::ConnectionClosed)
    }

    async fn reconnect(&self, session: &mut Session<C::Link>) -> Result<()> {
        if let Some(max) = self.policy.max_reconnects {
            if session.reconnects >= max {
                return Err(RconError::ReconnectExhausted {
                    attempts: session.reconnects,
                });
            }
        }
        session.reconnects += 1;
        warn!(attempt = session.reconnects, "reconnecting rcon");
        tokio::time::sleep(self.policy.backoff).await;

        match self.connector.connect().await {
            Ok(link) => {
                session.link = Some(link);
                info!(attempt = session.reconnects, "rcon reconnected");
                Ok(())
            }
            Err(err) => {
                error!(attempt = session.reconnects, error = %err, "reconnecting rcon");
                Err(err)
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    type Script = Arc<StdMutex<VecDeque<Result<String>>>>;

    /// Connector whose links replay a shared script of exchange outcomes.
    #[derive(Clone, Default)]
    struct ScriptedConnector {
        exchanges: Script,
        connect_failures: Arc<StdMutex<VecDeque<Option<RconError>>>>,
        connects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        sent: Arc<StdMutex<Vec<String>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn respond(self, outcome: Result<String>) -> Self {
            self.exchanges.lock().unwrap().push_back(outcome);
            self
        }

        /// Queue the outcome of the next connect attempts; `None` succeeds.
        fn connect_outcome(self, failure: Option<RconError>) -> Self {
            self.connect_failures.lock().unwrap().push_back(failure);
            self
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    struct ScriptedLink {
        connector: ScriptedConnector,
    }

    #[async_trait]
    impl Link for ScriptedLink {
        async fn exchange(&mut self, command: &str) -> Result<String> {
            let c = &self.connector;
            let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            c.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            c.in_flight.fetch_sub(1, Ordering::SeqCst);

            c.sent.lock().unwrap().push(command.to_owned());
            let next = c.exchanges.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(format!("ok: {command}")))
        }

        async fn close(&mut self) {
            self.connector.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Link = ScriptedLink;

        async fn connect(&self) -> Result<ScriptedLink> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let failure = self.connect_failures.lock().unwrap().pop_front().flatten();
            match failure {
                Some(err) => Err(err),
                None => Ok(ScriptedLink {
                    connector: self.clone(),
                }),
            }
        }
    }

    fn transport(connector: &ScriptedConnector, policy: ReconnectPolicy) -> ResilientTransport<ScriptedConnector> {
        ResilientTransport::with_policy(connector.clone(), policy.with_backoff(Duration::ZERO))
    }

    fn refused() -> RconError {
        RconError::Io(std::io::Error::from(ErrorKind::ConnectionRefused))
    }

    #[tokio::test]
    async fn first_call_connects_lazily() {
        let connector = ScriptedConnector::default();
        let transport = transport(&connector, ReconnectPolicy::default());
        assert_eq!(connector.connects(), 0);

        let body = transport.call("list").await.unwrap();
        assert_eq!(body, "ok: list");
        assert_eq!(connector.connects(), 1);

        transport.call("list").await.unwrap();
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn transient_failure_keeps_the_link() {
        let connector = ScriptedConnector::default()
            .respond(Err(RconError::Timeout(Duration::from_secs(1))));
        let transport = transport(&connector, ReconnectPolicy::default());

        let err = transport.call("list").await.unwrap_err();
        assert!(matches!(err, RconError::Timeout(_)));
        assert_eq!(connector.connects(), 1);
        assert_eq!(transport.reconnects().await, 0);

        assert_eq!(transport.call("list").await.unwrap(), "ok: list");
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn terminated_link_reconnects_once_without_replaying() {
        let connector = ScriptedConnector::default().respond(Err(RconError::ConnectionClosed));
        let transport = transport(&connector, ReconnectPolicy::default());

        let err = transport.call("restart").await.unwrap_err();
        assert!(matches!(err, RconError::CommandLost { ref command, .. } if command == "restart"));
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.reconnects().await, 1);
        // The lost command was not sent a second time.
        assert_eq!(*connector.sent.lock().unwrap(), vec!["restart".to_string()]);

        assert_eq!(transport.call("list").await.unwrap(), "ok: list");
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_surfaces_the_reconnect_error() {
        let connector = ScriptedConnector::default()
            .respond(Err(RconError::Io(std::io::Error::from(ErrorKind::ConnectionReset))))
            .connect_outcome(None)
            .connect_outcome(Some(refused()));
        let transport = transport(&connector, ReconnectPolicy::default());

        let err = transport.call("list").await.unwrap_err();
        assert!(matches!(err, RconError::Io(ref e) if e.kind() == ErrorKind::ConnectionRefused));
        assert_eq!(connector.connects(), 2);

        // The next call tries again and succeeds.
        assert_eq!(transport.call("list").await.unwrap(), "ok: list");
        assert_eq!(connector.connects(), 3);
        assert_eq!(transport.reconnects().await, 2);
    }

    #[tokio::test]
    async fn bounded_policy_fails_fast_once_exhausted() {
        let connector = ScriptedConnector::default()
            .respond(Err(RconError::ConnectionClosed))
            .connect_outcome(None)
            .connect_outcome(Some(refused()));
        let transport = transport(&connector, ReconnectPolicy::bounded(1));

        let err = transport.call("list").await.unwrap_err();
        assert!(matches!(err, RconError::Io(_)));
        assert_eq!(connector.connects(), 2);

        let err = transport.call("list").await.unwrap_err();
        assert!(matches!(err, RconError::ReconnectExhausted { attempts: 1 }));
        let err = transport.call("list").await.unwrap_err();
        assert!(matches!(err, RconError::ReconnectExhausted { .. }));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn initial_connect_failure_is_returned() {
        let connector = ScriptedConnector::default().connect_outcome(Some(RconError::AuthRejected));
        let transport = transport(&connector, ReconnectPolicy::bounded(0));

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, RconError::AuthRejected));
        // Never connected, so the retry is not a reconnect.
        transport.call("list").await.unwrap();
        assert_eq!(transport.reconnects().await, 0);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let connector = ScriptedConnector::default();
        let transport = Arc::new(transport(&connector, ReconnectPolicy::default()));

        let calls = (0..8).map(|i| {
            let transport = Arc::clone(&transport);
            async move { transport.call(&format!("say {i}")).await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(connector.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.sent.lock().unwrap().len(), 8);
    }
}
