//! Fixtures for end-to-end tests: an owner thread holding a live tree, and a
//! bare-bones wire client.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use viewscope_core::{Block, NodeHandle, NodeRef, OwnerLoop, Poster};

/// Owner threads get a main-thread-sized stack; deep test trees are dropped
/// recursively there.
const OWNER_STACK_SIZE: usize = 32 * 1024 * 1024;

thread_local! {
    static ROOT: RefCell<Option<Rc<Block>>> = const { RefCell::new(None) };
}

/// A dedicated UI-style thread that owns a [`Block`] tree and runs its
/// [`OwnerLoop`] until dropped.
pub struct OwnerThread {
    poster: Poster,
    root: NodeHandle,
    thread: Option<JoinHandle<()>>,
}

impl OwnerThread {
    /// Build the tree on a new owner thread.
    pub fn spawn(build: impl FnOnce() -> Block + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("viewscope-test-owner".into())
            .stack_size(OWNER_STACK_SIZE)
            .spawn(move || {
                let owner = OwnerLoop::new();
                let root = Rc::new(build());
                let node: NodeRef = root.clone();
                let handle = owner.attach(&node);
                ROOT.with(|slot| *slot.borrow_mut() = Some(root));
                tx.send((owner.poster(), handle))
                    .expect("test thread waits for the root");
                owner.run();
                ROOT.with(|slot| slot.borrow_mut().take());
            })
            .expect("owner thread should spawn");

        let (poster, root) = rx.recv().expect("owner thread should start");
        Self {
            poster,
            root,
            thread: Some(thread),
        }
    }

    /// Handle to the root node.
    pub fn root(&self) -> NodeHandle {
        self.root.clone()
    }

    pub fn poster(&self) -> &Poster {
        &self.poster
    }

    /// Run `f` against the root on the owner thread and wait for its result.
    pub fn with_root<T: Send + 'static>(
        &self,
        f: impl FnOnce(&Rc<Block>) -> T + Send + 'static,
    ) -> T {
        let (tx, rx) = mpsc::channel();
        self.poster
            .post(move || {
                let value = ROOT.with(|slot| {
                    let root = slot.borrow();
                    f(root.as_ref().expect("root is set while the loop runs"))
                });
                let _ = tx.send(value);
            })
            .expect("owner loop should be running");
        rx.recv().expect("owner task should complete")
    }

    /// Park the owner thread until the returned guard is dropped.
    ///
    /// Returns once the owner is actually parked. The guard must be dropped
    /// before the `OwnerThread`, which joins the thread.
    pub fn block(&self) -> OwnerBlock {
        let (parked_tx, parked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        self.poster
            .post(move || {
                let _ = parked_tx.send(());
                let _ = release_rx.recv();
            })
            .expect("owner loop should be running");
        parked_rx.recv().expect("owner should park");
        OwnerBlock {
            _release: release_tx,
        }
    }
}

impl Drop for OwnerThread {
    fn drop(&mut self) {
        let _ = self.poster.quit();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Keeps an owner thread parked; dropping it lets the loop continue.
pub struct OwnerBlock {
    _release: mpsc::Sender<()>,
}

/// Send one request line and read the response until the server closes.
pub fn request(addr: SocketAddr, line: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).expect("should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("timeout should apply");
    stream
        .write_all(line.as_bytes())
        .expect("request should send");
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    response
}

/// [`request`], as text.
pub fn request_text(addr: SocketAddr, line: &str) -> String {
    String::from_utf8(request(addr, line)).expect("response should be UTF-8")
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        thread::sleep(Duration::from_millis(10));
    }
}
