//! Connections to a TenantDB server.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tenantdb_core::{CoreError, CoreResult};
use tenantdb_protocol::{
    decode_frame, encode_frame, read_frame, write_frame, MessageHandler, MessageType,
    ProtocolError, ProtocolMessage,
};

/// A request/response channel to a server.
///
/// At most one request is in flight at a time; every method takes
/// `&mut self`.
pub trait Connection {
    /// Sends a message that has no response.
    fn send(&mut self, message: &ProtocolMessage) -> CoreResult<()>;

    /// Sends a request and waits for its response.
    fn request(&mut self, message: &ProtocolMessage) -> CoreResult<ProtocolMessage>;

    /// Sends a request and turns an error response into a `CoreError`.
    fn call(&mut self, message: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
        match self.request(message)? {
            ProtocolMessage::Error(err) => Err(err.into_core()),
            reply => Ok(reply),
        }
    }
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn send(&mut self, message: &ProtocolMessage) -> CoreResult<()> {
        (**self).send(message)
    }

    fn request(&mut self, message: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
        (**self).request(message)
    }
}

/// Error for a response of the wrong type.
pub(crate) fn unexpected(expected: MessageType, actual: &ProtocolMessage) -> CoreError {
    ProtocolError::UnexpectedMessage {
        expected: expected.code(),
        actual: actual.type_code(),
    }
    .into()
}

/// A connection over TCP using the frame codec.
#[derive(Debug)]
pub struct TcpConnection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpConnection {
    /// Connects to a server.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the connection cannot be established.
    pub fn connect(addr: impl ToSocketAddrs) -> CoreResult<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| CoreError::transport(format!("connect failed: {e}")))?;
        Self::from_stream(stream)
    }

    /// Wraps an established stream.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the stream cannot be configured.
    pub fn from_stream(stream: TcpStream) -> CoreResult<Self> {
        stream
            .set_nodelay(true)
            .map_err(|e| CoreError::transport(e.to_string()))?;
        let reader = stream
            .try_clone()
            .map_err(|e| CoreError::transport(e.to_string()))?;
        Ok(Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(stream),
        })
    }

    /// Sets the read timeout for responses.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket rejects the timeout.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> CoreResult<()> {
        self.reader
            .get_ref()
            .set_read_timeout(timeout)
            .map_err(|e| CoreError::transport(e.to_string()))
    }

    /// Shuts down both directions of the stream.
    pub fn shutdown(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

impl Connection for TcpConnection {
    fn send(&mut self, message: &ProtocolMessage) -> CoreResult<()> {
        write_frame(&mut self.writer, message)?;
        Ok(())
    }

    fn request(&mut self, message: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
        write_frame(&mut self.writer, message)?;
        read_frame(&mut self.reader)?
            .ok_or_else(|| CoreError::transport("connection closed by server"))
    }
}

/// An in-process connection to a message handler.
///
/// Messages still pass through the frame codec, so loopback traffic is
/// encoded exactly as it would be on a socket.
#[derive(Debug)]
pub struct LoopbackConnection<H: MessageHandler> {
    handler: H,
}

impl<H: MessageHandler> LoopbackConnection<H> {
    /// Creates a connection to `handler`.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// The handler behind this connection.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the connection and returns the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    fn deliver(&mut self, message: &ProtocolMessage) -> CoreResult<Option<ProtocolMessage>> {
        let message = through_codec(message)?;
        match self.handler.handle(message) {
            Some(reply) => through_codec(&reply).map(Some),
            None => Ok(None),
        }
    }
}

impl<H: MessageHandler> Connection for LoopbackConnection<H> {
    fn send(&mut self, message: &ProtocolMessage) -> CoreResult<()> {
        self.deliver(message).map(|_| ())
    }

    fn request(&mut self, message: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
        self.deliver(message)?.ok_or_else(|| {
            CoreError::protocol(format!(
                "no response to message type {}",
                message.type_code()
            ))
        })
    }
}

fn through_codec(message: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
    let frame = encode_frame(message)?;
    let (decoded, _) = decode_frame(&frame)?;
    Ok(decoded)
}
