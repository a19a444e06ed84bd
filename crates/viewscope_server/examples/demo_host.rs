//! A toy host: one window whose progress bar grows every frame, served on
//! the default port.
//!
//! Run it, then from another shell:
//!
//! ```text
//! cargo run -p viewscope_cli -- --json
//! ```
//!
//! `RUST_LOG=viewscope_server=debug` shows each connection.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use viewscope_core::{
    Block, Edges, NodeRef, OwnerLoop, Rect, ResourceId, SolidDrawable, Srgba, TreeNode,
};
use viewscope_server::{window_name, ServerConfig, ViewServer};

const WIDTH: i32 = 320;
const FRAME: Duration = Duration::from_millis(16);

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let owner = OwnerLoop::new();

    let progress = Rc::new(
        Block::new("demo.ProgressBar")
            .with_resource_id(ResourceId::new("demo", "id", "progress"))
            .with_bounds(Rect::new(16, 64, 0, 8))
            .fill(Srgba::new(0x3d, 0x8b, 0xfd, 0xff)),
    );
    let bar: NodeRef = progress.clone();

    let root = Block::new("demo.MainWindow")
        .with_bounds(Rect::from_size(WIDTH, 96))
        .background_color(Srgba::new(0x1e, 0x1e, 0x2e, 0xff))
        .child(
            Block::new("demo.TitleBar")
                .with_bounds(Rect::from_size(WIDTH, 32))
                .with_padding(Edges::ltrb(8, 4, 8, 4))
                .with_background(SolidDrawable::new(Srgba::new(0x31, 0x32, 0x44, 0xff)))
                .decor(),
        )
        .child_ref(bar)
        .into_ref();

    let server = ViewServer::new(ServerConfig::default());
    if let Err(err) = server.start() {
        tracing::error!(%err, "could not start the inspector");
        return;
    }

    let handle = owner.attach(&root);
    let name = window_name(Some("Demo"), root.type_name(), root.hash_code());
    server.add_root(handle.clone(), name);
    server.set_focused(Some(handle));

    let mut frame = 0;
    loop {
        frame = (frame + 1) % (WIDTH - 32);
        progress.set_bounds(Rect::new(16, 64, frame, 8));
        owner.run_pending();
        thread::sleep(FRAME);
    }
}
