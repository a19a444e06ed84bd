//! Owner-thread task loop and thread-bound node handles.
//!
//! A node tree belongs to the thread that built it. That thread runs an
//! [`OwnerLoop`], either blocking in [`OwnerLoop::run`] or draining it once
//! per frame with [`OwnerLoop::run_pending`]. Any other thread reaches the
//! tree by posting closures through a [`Poster`]; tasks run in FIFO order.
//!
//! [`NodeHandle`]s are the only node references that may leave the owner
//! thread. They resolve back to the node only on the owner thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, ThreadId};

use thiserror::Error;

use crate::{NodeRef, TreeNode};

/// A unit of work for the owner thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Quit,
}

/// The owner loop has been dropped; nothing will run posted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("owner loop is closed")]
pub struct LoopClosed;

/// Cheap, thread-safe sender of tasks to one owner thread.
#[derive(Clone)]
pub struct Poster {
    tx: mpsc::Sender<Message>,
    owner: ThreadId,
}

impl Poster {
    /// Queue `task` behind everything already posted.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), LoopClosed> {
        self.tx
            .send(Message::Run(Box::new(task)))
            .map_err(|_| LoopClosed)
    }

    /// Ask a blocking [`OwnerLoop::run`] to return once earlier tasks ran.
    pub fn quit(&self) -> Result<(), LoopClosed> {
        self.tx.send(Message::Quit).map_err(|_| LoopClosed)
    }

    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl fmt::Debug for Poster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster").field("owner", &self.owner).finish()
    }
}

/// The receiving end of an owner thread's task queue.
///
/// Bound to the thread that created it, and not `Send`.
pub struct OwnerLoop {
    rx: mpsc::Receiver<Message>,
    poster: Poster,
    quit_requested: Cell<bool>,
    _not_send: PhantomData<Rc<()>>,
}

impl OwnerLoop {
    /// Create a loop owned by the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            rx,
            poster: Poster {
                tx,
                owner: thread::current().id(),
            },
            quit_requested: Cell::new(false),
            _not_send: PhantomData,
        }
    }

    pub fn poster(&self) -> Poster {
        self.poster.clone()
    }

    /// Register `node` and return a handle other threads can hold.
    pub fn attach(&self, node: &NodeRef) -> NodeHandle {
        NodeHandle::register(node, self.poster.clone())
    }

    /// Run every task queued so far without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Run(task) => {
                    execute(task);
                    ran += 1;
                }
                Message::Quit => self.quit_requested.set(true),
            }
        }
        ran
    }

    /// Block running tasks until [`Poster::quit`] is received.
    pub fn run(&self) {
        if self.quit_requested.replace(false) {
            return;
        }
        // The loop holds a sender itself, so recv only fails if that is gone.
        while let Ok(message) = self.rx.recv() {
            match message {
                Message::Run(task) => execute(task),
                Message::Quit => break,
            }
        }
    }
}

impl Default for OwnerLoop {
    fn default() -> Self {
        Self::new()
    }
}

fn execute(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        tracing::warn!(
            panic = panic_message(payload.as_ref()),
            "owner task panicked"
        );
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Process-unique identity of an attached node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Dead entries are swept every this many registrations.
const SWEEP_INTERVAL: usize = 256;

#[derive(Default)]
struct NodeTable {
    nodes: HashMap<NodeId, Weak<dyn TreeNode>>,
    by_addr: HashMap<usize, NodeId>,
    since_sweep: usize,
}

impl NodeTable {
    fn insert(&mut self, node: &NodeRef) -> NodeId {
        let addr = Rc::as_ptr(node).cast::<()>() as usize;
        if let Some(&id) = self.by_addr.get(&addr) {
            if self.nodes.get(&id).is_some_and(|weak| weak.strong_count() > 0) {
                return id;
            }
        }

        self.sweep_if_due();
        let id = NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed));
        self.nodes.insert(id, Rc::downgrade(node));
        self.by_addr.insert(addr, id);
        id
    }

    fn get(&self, id: NodeId) -> Option<NodeRef> {
        self.nodes.get(&id)?.upgrade()
    }

    fn sweep_if_due(&mut self) {
        self.since_sweep += 1;
        if self.since_sweep < SWEEP_INTERVAL {
            return;
        }
        self.since_sweep = 0;
        self.nodes.retain(|_, weak| weak.strong_count() > 0);
        let nodes = &self.nodes;
        self.by_addr.retain(|_, id| nodes.contains_key(id));
    }
}

thread_local! {
    static NODE_TABLE: RefCell<NodeTable> = RefCell::new(NodeTable::default());
}

/// A `Send + Sync` reference to a node on its owner thread.
///
/// Handles compare equal when they name the same node. Holding a handle does
/// not keep the node alive.
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    poster: Poster,
}

impl NodeHandle {
    fn register(node: &NodeRef, poster: Poster) -> Self {
        let id = NODE_TABLE.with(|table| table.borrow_mut().insert(node));
        Self { id, poster }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Poster for the owner thread of this node.
    pub fn poster(&self) -> &Poster {
        &self.poster
    }

    /// The node itself. `None` off the owner thread or once the node is gone.
    pub fn resolve(&self) -> Option<NodeRef> {
        if !self.poster.is_owner_thread() {
            return None;
        }
        NODE_TABLE.with(|table| table.borrow().get(self.id))
    }

    /// Handle for another node of the same tree, e.g. a child.
    ///
    /// Returns `None` off the owner thread.
    pub fn adopt(&self, node: &NodeRef) -> Option<NodeHandle> {
        if !self.poster.is_owner_thread() {
            return None;
        }
        Some(Self::register(node, self.poster.clone()))
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id.0)
            .field("owner", &self.poster.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, Rect};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn node() -> NodeRef {
        Rc::new(Block::new("test.Node").with_bounds(Rect::from_size(10, 10)))
    }

    #[test]
    fn tasks_run_in_post_order() {
        let owner = OwnerLoop::new();
        let poster = owner.poster();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            poster.post(move || tx.send(i).unwrap()).unwrap();
        }

        assert_eq!(owner.run_pending(), 5);
        let order: Vec<i32> = rx.try_iter().collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn posts_from_other_threads_run_on_owner() {
        let owner = OwnerLoop::new();
        let poster = owner.poster();
        let owner_id = thread::current().id();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            poster
                .post(move || tx.send(thread::current().id()).unwrap())
                .unwrap();
            poster.quit().unwrap();
        })
        .join()
        .unwrap();

        owner.run();
        assert_eq!(rx.recv().unwrap(), owner_id);
    }

    #[test]
    fn panicking_task_does_not_stop_the_loop() {
        let owner = OwnerLoop::new();
        let poster = owner.poster();
        let ran = Arc::new(AtomicUsize::new(0));

        poster.post(|| panic!("boom")).unwrap();
        let counter = Arc::clone(&ran);
        poster
            .post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(owner.run_pending(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn posting_to_dropped_loop_fails() {
        let owner = OwnerLoop::new();
        let poster = owner.poster();
        drop(owner);
        assert_eq!(poster.post(|| {}), Err(LoopClosed));
    }

    #[test]
    fn quit_seen_by_run_pending_ends_next_run() {
        let owner = OwnerLoop::new();
        owner.poster().quit().unwrap();
        owner.run_pending();
        // Returns immediately instead of blocking forever.
        owner.run();
    }

    #[test]
    fn handle_resolves_on_owner_thread_only() {
        let owner = OwnerLoop::new();
        let node = node();
        let handle = owner.attach(&node);

        assert!(Rc::ptr_eq(&handle.resolve().unwrap(), &node));

        let remote = handle.clone();
        let resolved_elsewhere = thread::spawn(move || remote.resolve().is_some())
            .join()
            .unwrap();
        assert!(!resolved_elsewhere);
    }

    #[test]
    fn attaching_twice_yields_equal_handles() {
        let owner = OwnerLoop::new();
        let node = node();
        let a = owner.attach(&node);
        let b = owner.attach(&node);
        assert_eq!(a, b);
        assert_ne!(a, owner.attach(&self::node()));
    }

    #[test]
    fn handle_does_not_keep_node_alive() {
        let owner = OwnerLoop::new();
        let node = node();
        let handle = owner.attach(&node);
        drop(node);
        assert!(handle.resolve().is_none());
    }

    #[test]
    fn adopt_shares_owner() {
        let owner = OwnerLoop::new();
        let root = owner.attach(&node());
        let child = node();
        let child_handle = root.adopt(&child).unwrap();
        assert_eq!(child_handle.poster().owner_thread(), thread::current().id());
        assert!(Rc::ptr_eq(&child_handle.resolve().unwrap(), &child));
    }
}
