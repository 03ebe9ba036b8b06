//! Transport session.
//!
//! Wraps exactly one duplex connection to the detection service. The
//! connection itself sits behind the `Connector`/`Connection` traits so the
//! session controller can be driven by a real websocket (`ws`) or by a scripted
//! fake in tests.
//!
//! State only moves forward within one connection:
//! `Idle -> Connecting -> Open -> Closing -> Closed`, or straight from
//! `Connecting`/`Open` to `Closed` when the peer or the network drops it.

pub mod ws;

use anyhow::Result;
use url::Url;

use crate::endpoint::Endpoint;
use crate::error::StreamError;

pub use ws::{WsConnection, WsConnector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl TransportState {
    /// Connecting or open: a connection exists or is being made.
    pub fn is_active(self) -> bool {
        matches!(self, TransportState::Connecting | TransportState::Open)
    }
}

/// Inbound activity on an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the service.
    Message(String),
    /// Peer or network closed the connection.
    Closed,
    /// Transport-level failure; treated as a close for reconnection.
    Error(String),
}

/// One established duplex connection.
pub trait Connection {
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Next inbound event, or `None` when nothing is pending. May block for a
    /// short, bounded poll interval, never indefinitely.
    fn poll(&mut self) -> Option<TransportEvent>;

    fn close(&mut self);
}

/// Establishes connections to resolved endpoints.
pub trait Connector {
    type Conn: Connection;

    fn connect(&mut self, url: &Url) -> Result<Self::Conn>;
}

pub struct TransportSession<C: Connector> {
    connector: C,
    state: TransportState,
    conn: Option<C::Conn>,
    endpoint: Option<Endpoint>,
    connections_opened: u64,
}

impl<C: Connector> TransportSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: TransportState::Idle,
            conn: None,
            endpoint: None,
            connections_opened: 0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Connect to `endpoint`. Any previous connection is closed first, so at
    /// most one connection exists per session.
    pub fn open(&mut self, endpoint: Endpoint) -> Result<(), StreamError> {
        if let Some(mut previous) = self.conn.take() {
            previous.close();
        }
        self.state = TransportState::Connecting;
        log::info!("connecting to {}", endpoint.url);
        match self.connector.connect(&endpoint.url) {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = TransportState::Open;
                self.connections_opened += 1;
                self.endpoint = Some(endpoint);
                Ok(())
            }
            Err(err) => {
                self.state = TransportState::Closed;
                self.endpoint = Some(endpoint);
                Err(StreamError::Connect(format!("{:#}", err)))
            }
        }
    }

    /// Send a text frame. Silently dropped unless the connection is open.
    pub fn send(&mut self, text: &str) -> bool {
        if self.state != TransportState::Open {
            return false;
        }
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        match conn.send_text(text) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("dropping outbound frame: {:#}", err);
                false
            }
        }
    }

    /// Next inbound event while open.
    pub fn poll(&mut self) -> Option<TransportEvent> {
        if self.state != TransportState::Open {
            return None;
        }
        self.conn.as_mut()?.poll()
    }

    /// Caller-initiated close: `Closing -> Closed`.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            self.state = TransportState::Closing;
            conn.close();
        }
        if self.state != TransportState::Idle {
            self.state = TransportState::Closed;
        }
    }

    /// Record an involuntary close. Returns false when the session was not
    /// active, so a close that follows an error is counted once.
    pub fn mark_closed(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.conn = None;
        self.state = TransportState::Closed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointResolver, NavigationContext};
    use anyhow::anyhow;

    struct NullConn;

    impl Connection for NullConn {
        fn send_text(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
        fn poll(&mut self) -> Option<TransportEvent> {
            None
        }
        fn close(&mut self) {}
    }

    struct FlakyConnector {
        fail: bool,
    }

    impl Connector for FlakyConnector {
        type Conn = NullConn;
        fn connect(&mut self, _url: &Url) -> Result<NullConn> {
            if self.fail {
                Err(anyhow!("connection refused"))
            } else {
                Ok(NullConn)
            }
        }
    }

    fn endpoint() -> Endpoint {
        EndpointResolver::default()
            .resolve(&NavigationContext::new("http://localhost:3000", "/take-phone"))
            .unwrap()
    }

    #[test]
    fn send_is_dropped_unless_open() {
        let mut session = TransportSession::new(FlakyConnector { fail: false });
        assert!(!session.send("early"));
        session.open(endpoint()).unwrap();
        assert_eq!(session.state(), TransportState::Open);
        assert!(session.send("frame"));
        session.close();
        assert_eq!(session.state(), TransportState::Closed);
        assert!(!session.send("late"));
    }

    #[test]
    fn failed_connect_ends_closed() {
        let mut session = TransportSession::new(FlakyConnector { fail: true });
        let err = session.open(endpoint()).unwrap_err();
        assert!(matches!(err, StreamError::Connect(_)));
        assert_eq!(session.state(), TransportState::Closed);
        assert_eq!(session.connections_opened(), 0);
    }

    #[test]
    fn involuntary_close_is_counted_once() {
        let mut session = TransportSession::new(FlakyConnector { fail: false });
        session.open(endpoint()).unwrap();
        assert!(session.mark_closed());
        assert!(!session.mark_closed());
    }
}
