//! Websocket connection over `tungstenite`.
//!
//! The socket is blocking with a short read timeout, so `poll` never holds the
//! event loop for longer than `poll_timeout`. `wss://` needs the `tls` feature.

use anyhow::{anyhow, Context, Result};
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::{Connection, Connector, TransportEvent};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct WsConnector {
    pub connect_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    fn connect(&mut self, url: &Url) -> Result<WsConnection> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("endpoint {} has no host", url))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("endpoint {} has no port", url))?;
        let addr = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {}:{}", host, port))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}:{}", host, port))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("connect to {}", addr))?;
        stream.set_nodelay(true).context("set TCP_NODELAY")?;
        stream
            .set_read_timeout(Some(self.connect_timeout))
            .context("set handshake timeout")?;
        let socket_handle = stream.try_clone().context("clone tcp stream")?;

        let (socket, response) = handshake(url, stream)?;
        socket_handle
            .set_read_timeout(Some(self.poll_timeout))
            .context("set poll timeout")?;
        log::info!("websocket open: {} (status {})", url, response.status());

        Ok(WsConnection { socket })
    }
}

#[cfg(feature = "tls")]
fn handshake(
    url: &Url,
    stream: TcpStream,
) -> Result<(WebSocket<MaybeTlsStream<TcpStream>>, tungstenite::handshake::client::Response)> {
    tungstenite::client_tls(url.as_str(), stream)
        .map_err(|e| anyhow!("websocket handshake with {} failed: {}", url, e))
}

#[cfg(not(feature = "tls"))]
fn handshake(
    url: &Url,
    stream: TcpStream,
) -> Result<(WebSocket<MaybeTlsStream<TcpStream>>, tungstenite::handshake::client::Response)> {
    if url.scheme() == "wss" {
        return Err(anyhow!(
            "endpoint {} needs TLS; rebuild with the `tls` feature",
            url
        ));
    }
    tungstenite::client(url.as_str(), MaybeTlsStream::Plain(stream))
        .map_err(|e| anyhow!("websocket handshake with {} failed: {}", url, e))
}

#[derive(Debug)]
pub struct WsConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    fn send_text(&mut self, text: &str) -> Result<()> {
        self.socket
            .send(Message::Text(text.into()))
            .context("send websocket text frame")
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Some(TransportEvent::Message(text.as_str().to_owned())),
            Ok(Message::Close(frame)) => {
                log::info!("websocket closed by peer: {:?}", frame);
                Some(TransportEvent::Closed)
            }
            Ok(Message::Binary(bytes)) => {
                log::debug!("ignoring {} byte binary frame", bytes.len());
                None
            }
            Ok(_) => None,
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                None
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Some(TransportEvent::Closed)
            }
            Err(e) => Some(TransportEvent::Error(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            log::debug!("websocket close: {}", e);
        }
        if let Err(e) = self.socket.flush() {
            log::debug!("websocket flush on close: {}", e);
        }
    }
}
