//! TCP client for a running viewscope inspection server.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use viewscope_server::{request_line, Grammar};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection without a response (unknown command or no focused window)")]
    EmptyResponse,
}

/// One-shot client: every request opens a fresh connection, as the server
/// answers a single request per connection.
pub struct InspectorClient {
    addr: String,
    timeout: Option<Duration>,
}

impl InspectorClient {
    pub fn new(addr: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send `command` and collect the whole response.
    pub fn request(&self, command: &str, grammar: Grammar) -> Result<Vec<u8>, ClientError> {
        let mut stream = self.connect()?;
        stream.set_read_timeout(self.timeout)?;
        stream.write_all(request_line(command, grammar).as_bytes())?;
        stream.flush()?;
        // Half-close so the server sees the end of our request.
        let _ = stream.shutdown(Shutdown::Write);

        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        tracing::debug!(addr = %self.addr, bytes = response.len(), "response received");

        if response.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        Ok(response)
    }

    fn connect(&self) -> Result<TcpStream, ClientError> {
        let connect_err = |source| ClientError::Connect {
            addr: self.addr.clone(),
            source,
        };

        let Some(timeout) = self.timeout else {
            return TcpStream::connect(&self.addr).map_err(connect_err);
        };

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "address did not resolve");
        for addr in self.addr.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = err,
            }
        }
        Err(connect_err(last_err))
    }
}
