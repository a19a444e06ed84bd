//! TCP inspection server: accept loop, worker dispatch and lifecycle.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use viewscope_core::NodeHandle;

use crate::session::SessionContext;
use crate::{
    CaptureCoordinator, PngCapture, Registry, RenderCapture, Serializer, ServerConfig,
    ServerError, WorkerPool, LISTEN_BACKLOG,
};

/// Idle wait between polls of the non-blocking listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

struct Running {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
    pool: Arc<WorkerPool>,
}

/// Serves the focused hierarchy to TCP clients.
///
/// Connections are accepted on a background thread and handled by a fixed
/// pool of workers; node reads are posted to each root's owner thread.
pub struct ViewServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    capture: Arc<dyn RenderCapture>,
    running: Mutex<Option<Running>>,
}

impl ViewServer {
    /// A stopped server using [`PngCapture`].
    pub fn new(config: ServerConfig) -> Self {
        Self::with_capture(config, Arc::new(PngCapture))
    }

    pub fn with_capture(config: ServerConfig, capture: Arc<dyn RenderCapture>) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
            capture,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Bound address while running. Reports the real port when configured
    /// with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map_or(0, |running| running.pool.in_flight())
    }

    /// Bind and start accepting. Returns `Ok(false)` if already running.
    pub fn start(&self) -> Result<bool, ServerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(false);
        }

        let addr = self.config.bind_addr();
        let listener = bind_listener(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let pool = Arc::new(WorkerPool::new(self.config.max_connections)?);
        let shutdown = Arc::new(AtomicBool::new(false));
        let session = Arc::new(SessionContext {
            registry: Arc::clone(&self.registry),
            serializer: Serializer::new(CaptureCoordinator::new(), Arc::clone(&self.capture)),
            config: self.config.clone(),
        });

        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let pool = Arc::clone(&pool);
            thread::Builder::new()
                .name(format!("viewscope-acceptor [port={}]", local_addr.port()))
                .spawn(move || accept_loop(listener, &shutdown, &pool, &session))
                .map_err(|source| ServerError::Spawn {
                    role: "acceptor",
                    source,
                })?
        };

        tracing::info!(%local_addr, workers = pool.capacity(), "view server listening");
        *running = Some(Running {
            local_addr,
            shutdown,
            acceptor,
            pool,
        });
        Ok(true)
    }

    /// Stop accepting, close active connections and clear the registry.
    ///
    /// Returns `false` if the server was not running; the registry is
    /// cleared either way.
    pub fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let stopped = match running {
            Some(running) => {
                running.shutdown.store(true, Ordering::SeqCst);
                running.pool.shutdown_now();
                if running.acceptor.join().is_err() {
                    tracing::warn!("acceptor thread panicked");
                }
                tracing::info!(local_addr = %running.local_addr, "view server stopped");
                true
            }
            None => false,
        };
        self.registry.clear();
        stopped
    }

    /// True between a successful `start` and `stop`, as long as the accept
    /// loop is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.acceptor.is_finished())
    }

    pub fn add_root(&self, root: NodeHandle, name: impl Into<String>) {
        self.registry.add_root(root, name);
    }

    pub fn remove_root(&self, root: &NodeHandle) {
        self.registry.remove_root(root);
    }

    pub fn set_focused(&self, root: Option<NodeHandle>) {
        self.registry.set_focused(root);
    }

    pub fn focused(&self) -> Option<NodeHandle> {
        self.registry.focused()
    }
}

impl Drop for ViewServer {
    fn drop(&mut self) {
        if self.running.lock().is_some() {
            self.stop();
        }
    }
}

/// Bind the first usable address of `addr` with a [`LISTEN_BACKLOG`] queue.
fn bind_listener(addr: &str) -> io::Result<TcpListener> {
    let mut last_err = None;
    for addr in addr.to_socket_addrs()? {
        match listen_on(addr) {
            Ok(listener) => return Ok(listener),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
    }))
}

fn listen_on(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    // SO_REUSEADDR, as std sets it on unix.
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

fn accept_loop(
    listener: TcpListener,
    shutdown: &AtomicBool,
    pool: &WorkerPool,
    session: &Arc<SessionContext>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                // Accepted sockets may inherit non-blocking mode; workers
                // read synchronously.
                if let Err(err) = stream.set_nonblocking(false) {
                    tracing::warn!(%peer, %err, "could not configure connection");
                    continue;
                }

                let session = Arc::clone(session);
                if let Err(rejected) =
                    pool.try_dispatch(stream, move |stream| session.serve(stream, peer))
                {
                    tracing::debug!(%peer, %rejected, "connection closed unserved");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    tracing::debug!("accept loop exited");
}
