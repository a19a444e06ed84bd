//! Fixed-size pool of connection workers.
//!
//! Admission is bounded by the worker count: a connection is either handed to
//! a worker straight away or rejected and closed. Nothing waits in a queue
//! for a free worker.

use std::collections::HashMap;
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use parking_lot::Mutex;
use viewscope_core::panic_message;

use crate::ServerError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a connection was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    Saturated,
    ShutDown,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::Saturated => f.write_str("all workers busy"),
            Rejected::ShutDown => f.write_str("pool shut down"),
        }
    }
}

#[derive(Default)]
struct Shared {
    in_flight: AtomicUsize,
    closed: AtomicBool,
    /// Clones of every admitted socket, so shutdown can unblock their workers.
    connections: Mutex<HashMap<u64, TcpStream>>,
}

pub struct WorkerPool {
    capacity: usize,
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    shared: Arc<Shared>,
    next_connection: AtomicU64,
}

impl WorkerPool {
    /// Spawn `size` named worker threads.
    pub fn new(size: usize) -> Result<Self, ServerError> {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        for index in 0..size {
            let rx = Arc::clone(&rx);
            thread::Builder::new()
                .name(format!("viewscope-worker-{index}"))
                .spawn(move || worker_loop(&rx))
                .map_err(|source| ServerError::Spawn {
                    role: "worker",
                    source,
                })?;
        }

        Ok(Self {
            capacity: size,
            queue: Mutex::new(Some(tx)),
            shared: Arc::new(Shared::default()),
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Connections admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Run `handler` on a free worker, or close `stream` and reject it.
    pub fn try_dispatch(
        &self,
        stream: TcpStream,
        handler: impl FnOnce(TcpStream) + Send + 'static,
    ) -> Result<(), Rejected> {
        let Some(queue) = self.queue.lock().clone() else {
            close(&stream);
            return Err(Rejected::ShutDown);
        };

        let admitted = self
            .shared
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !admitted {
            close(&stream);
            return Err(Rejected::Saturated);
        }

        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        match stream.try_clone() {
            Ok(tracked) => {
                self.shared.connections.lock().insert(id, tracked);
            }
            Err(err) => tracing::debug!(%err, "connection not tracked for shutdown"),
        }

        let slot = Slot {
            id,
            shared: Arc::clone(&self.shared),
        };
        let job: Job = Box::new(move || {
            let slot = slot;
            if slot.shared.closed.load(Ordering::SeqCst) {
                close(&stream);
                return;
            }
            handler(stream);
        });

        // A send failure drops the job, which releases the slot and closes
        // the socket.
        queue.send(job).map_err(|_| Rejected::ShutDown)
    }

    /// Stop accepting work and force-close every admitted connection.
    ///
    /// Workers are not joined; one blocked on an owner thread that never
    /// answers exits once that wait ends.
    pub fn shutdown_now(&self) {
        self.queue.lock().take();
        self.shared.closed.store(true, Ordering::SeqCst);

        let connections: Vec<TcpStream> = self
            .shared
            .connections
            .lock()
            .drain()
            .map(|(_, stream)| stream)
            .collect();
        tracing::debug!(count = connections.len(), "closing active connections");
        for stream in &connections {
            close(stream);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

/// Releases an admission slot when the job finishes, panics or is dropped.
struct Slot {
    id: u64,
    shared: Arc<Shared>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.connections.lock().remove(&self.id);
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = rx.lock().recv();
        let Ok(job) = job else {
            break;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::warn!(
                panic = panic_message(payload.as_ref()),
                "connection handler panicked"
            );
        }
    }
    tracing::trace!("worker exiting");
}

fn close(stream: &TcpStream) {
    // Already-closed sockets report NotConnected; nothing to do then.
    let _ = stream.shutdown(Shutdown::Both);
}
