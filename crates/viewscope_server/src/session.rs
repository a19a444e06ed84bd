//! One request, one response, then close.

use std::io::{self, BufWriter, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::{Command, Registry, Request, Serializer, ServerConfig, SessionError};

/// How long a finished session keeps reading the client's leftover bytes.
const LINGER_TIMEOUT: Duration = Duration::from_millis(100);

/// Most leftover bytes discarded before the socket is closed anyway.
const LINGER_LIMIT: u64 = 64 * 1024;

/// What every connection worker needs, shared across workers.
pub(crate) struct SessionContext {
    pub(crate) registry: Arc<Registry>,
    pub(crate) serializer: Serializer,
    pub(crate) config: ServerConfig,
}

impl SessionContext {
    /// Serve `stream` and close it, whatever the outcome.
    pub(crate) fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        match handle_connection(&stream, &self.registry, &self.serializer, &self.config) {
            Ok(()) => tracing::debug!(%peer, "request served"),
            Err(err @ SessionError::UnknownCommand(_)) => {
                tracing::info!(%peer, %err, "request rejected")
            }
            Err(err) => tracing::warn!(%peer, %err, "request failed"),
        }
        // Write side only: the response is already queued and must still
        // reach the client.
        let _ = stream.shutdown(Shutdown::Write);
        drain_unread(&stream);
    }
}

/// Discard request bytes past the first line. Closing with unread input
/// makes the kernel reset the connection, which can drop the response tail.
fn drain_unread(stream: &TcpStream) {
    if stream.set_read_timeout(Some(LINGER_TIMEOUT)).is_err() {
        return;
    }
    match io::copy(&mut Read::take(stream, LINGER_LIMIT), &mut io::sink()) {
        Ok(discarded) if discarded > 0 => {
            tracing::trace!(discarded, "discarded unread request bytes")
        }
        _ => {}
    }
}

/// Read one request line from `stream` and answer it.
///
/// Unknown commands and a missing focus write nothing. The caller owns
/// teardown of the socket.
pub fn handle_connection(
    stream: &TcpStream,
    registry: &Registry,
    serializer: &Serializer,
    config: &ServerConfig,
) -> Result<(), SessionError> {
    stream.set_read_timeout(config.read_timeout())?;
    let request = Request::read_from(stream, config.max_request_len)?;
    tracing::debug!(command = ?request.command, grammar = ?request.grammar, "request");

    match request.command {
        Command::PrintHierarchy => {
            let root = registry.focused().ok_or(SessionError::NoFocusedRoot)?;
            let mut out = BufWriter::new(stream);
            serializer.serialize(&root, request.grammar, &mut out)?;
            Ok(())
        }
        Command::Unknown(name) => Err(SessionError::UnknownCommand(name)),
    }
}
