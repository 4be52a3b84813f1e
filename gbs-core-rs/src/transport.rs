//! Length-prefixed control connections
//!
//! Every control message is carried in its own frame: a 4-byte big-endian
//! length followed by the message text. Message boundaries therefore never
//! depend on how the underlying stream chunks its reads.

use crate::error::ChannelError;
use crate::protocol::Message;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

/// Default TCP port of the station
pub const DEFAULT_PORT: u16 = 8080;

/// Largest accepted frame payload
pub const MAX_FRAME_LEN: usize = 1024;

/// Byte stream a control connection can run over
pub trait ControlStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ControlStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Codec shared by both ends of a control connection
pub fn control_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Framed control connection
pub struct Connection {
    framed: Framed<Box<dyn ControlStream>, LengthDelimitedCodec>,
    peer: String,
}

impl Connection {
    /// Wrap an established stream
    pub fn new<S: ControlStream + 'static>(stream: S, peer: impl Into<String>) -> Self {
        let stream: Box<dyn ControlStream> = Box::new(stream);
        Self {
            framed: Framed::new(stream, control_codec()),
            peer: peer.into(),
        }
    }

    /// Open a TCP control connection to `addr`
    pub async fn connect(addr: SocketAddr) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, addr.to_string()))
    }

    /// Remote end, for logging
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one message as one frame
    pub async fn send(&mut self, msg: &Message) -> Result<(), ChannelError> {
        debug!("Transport: Sending \"{}\" to {}", msg, self.peer);
        self.framed.send(msg.to_bytes()).await?;
        Ok(())
    }

    /// Receive the next frame and decode it.
    ///
    /// A payload outside the vocabulary yields [`ChannelError::Protocol`] and
    /// leaves the connection usable.
    pub async fn recv(&mut self) -> Result<Message, ChannelError> {
        match self.framed.next().await {
            None => Err(ChannelError::Closed),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(frame)) => {
                let msg = Message::from_bytes(&frame)?;
                debug!("Transport: Received \"{}\" from {}", msg, self.peer);
                Ok(msg)
            }
        }
    }

    /// Flush and shut down the write half
    pub async fn close(&mut self) {
        if let Err(e) = SinkExt::<Bytes>::close(&mut self.framed).await {
            debug!("Transport: Error closing connection to {}: {}", self.peer, e);
        }
    }
}

/// Station-side handle to a registered drone's connection.
///
/// Every send and receive is bounded by `io_timeout`. The connection sits
/// behind its own lock so a probe's request/reply pair never interleaves with
/// a role broadcast.
pub struct NodeChannel {
    conn: Mutex<Connection>,
    io_timeout: Duration,
    peer: String,
}

impl NodeChannel {
    pub fn new(conn: Connection, io_timeout: Duration) -> Self {
        let peer = conn.peer().to_string();
        Self {
            conn: Mutex::new(conn),
            io_timeout,
            peer,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send a message within the I/O timeout
    pub async fn send(&self, msg: &Message) -> Result<(), ChannelError> {
        let mut conn = self.conn.lock().await;
        self.send_locked(&mut conn, msg).await
    }

    /// Send `STATUS_CHECK` and wait for `STATUS_OK`.
    ///
    /// Returns the telemetry carried by the reply, if any.
    pub async fn probe(&self) -> Result<Option<i64>, ChannelError> {
        let mut conn = self.conn.lock().await;
        self.send_locked(&mut conn, &Message::StatusCheck).await?;

        let reply = timeout(self.io_timeout, conn.recv())
            .await
            .map_err(|_| ChannelError::Timeout(self.io_timeout))??;

        match reply {
            Message::StatusOk { telemetry } => Ok(telemetry),
            other => Err(ChannelError::UnexpectedReply(other)),
        }
    }

    /// Close the connection; the drone observes end of stream
    pub async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if timeout(self.io_timeout, conn.close()).await.is_err() {
            debug!("Transport: Timed out closing connection to {}", self.peer);
        }
    }

    async fn send_locked(&self, conn: &mut Connection, msg: &Message) -> Result<(), ChannelError> {
        timeout(self.io_timeout, conn.send(msg))
            .await
            .map_err(|_| ChannelError::Timeout(self.io_timeout))?
    }
}
