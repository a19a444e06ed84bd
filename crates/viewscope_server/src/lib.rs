//! Embedded inspection server for live viewscope hierarchies.
//!
//! A host registers its window roots, marks one as focused, and the server
//! streams that tree to any TCP client that asks. Node reads always run on
//! the tree's owner thread; the server's own threads only ever hold
//! [`NodeHandle`](viewscope_core::NodeHandle)s.
//!
//! # Quick start
//!
//! ```no_run
//! use viewscope_core::{Block, OwnerLoop, Rect};
//! use viewscope_server::{inspector, ServerConfig};
//!
//! let owner = OwnerLoop::new();
//! let root = Block::new("app.MainWindow")
//!     .with_bounds(Rect::new(0, 0, 800, 600))
//!     .into_ref();
//!
//! let service = inspector(ServerConfig::default());
//! let handle = owner.attach(&root);
//! service.add_root(handle.clone(), "Main");
//! service.set_focused(Some(handle));
//!
//! // The UI thread keeps draining posted captures, e.g. once per frame:
//! owner.run_pending();
//! ```
//!
//! Then, from a shell: `echo "print json" | nc 127.0.0.1 4545`.

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod grammar;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod serializer;
pub mod server;
pub mod service;
pub mod session;

pub use capture::{
    encode_data_uri, BackgroundCapture, ChildVisibilityGuard, PngCapture, RenderCapture,
    DATA_URI_PREFIX,
};
pub use config::{ServerConfig, DEFAULT_PORT, LISTEN_BACKLOG, MAX_CONNECTIONS};
pub use coordinator::{CaptureCoordinator, CaptureTask};
pub use error::{CaptureError, ProtocolError, SerializeError, ServerError, SessionError};
pub use grammar::Grammar;
pub use pool::{Rejected, WorkerPool};
pub use protocol::{request_line, Command, Request, PRINT_COMMAND};
pub use registry::{window_name, Registry, RegistryEvent};
pub use serializer::Serializer;
pub use server::ViewServer;
pub use service::{inspector, InspectorService, NoopServer};
pub use session::handle_connection;
