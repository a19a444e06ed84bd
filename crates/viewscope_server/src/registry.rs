//! Process-wide set of inspectable roots and the focused one.

use std::collections::HashMap;
use std::sync::mpsc;

use parking_lot::{Mutex, RwLock};
use viewscope_core::NodeHandle;

/// Change notifications delivered to [`Registry::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    RootsChanged,
    FocusChanged,
}

/// Roots known to the inspector, keyed by node identity.
///
/// Readers (connection workers) and writers (the host) may run on any thread.
#[derive(Default)]
pub struct Registry {
    roots: RwLock<HashMap<NodeHandle, String>>,
    focused: RwLock<Option<NodeHandle>>,
    listeners: Mutex<Vec<mpsc::Sender<RegistryEvent>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `root` under `name`, replacing any earlier name for it.
    pub fn add_root(&self, root: NodeHandle, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(root = ?root, %name, "root added");
        self.roots.write().insert(root, name);
        self.notify(RegistryEvent::RootsChanged);
    }

    /// Unregister `root`. Removing an unknown root is a no-op.
    pub fn remove_root(&self, root: &NodeHandle) {
        let removed = self.roots.write().remove(root).is_some();
        tracing::debug!(root = ?root, removed, "root removed");
        self.notify(RegistryEvent::RootsChanged);
    }

    /// Replace the focused root. `None` clears it.
    ///
    /// The focused root need not be registered.
    pub fn set_focused(&self, root: Option<NodeHandle>) {
        *self.focused.write() = root;
        self.notify(RegistryEvent::FocusChanged);
    }

    pub fn focused(&self) -> Option<NodeHandle> {
        self.focused.read().clone()
    }

    pub fn name_of(&self, root: &NodeHandle) -> Option<String> {
        self.roots.read().get(root).cloned()
    }

    /// Snapshot of every registered root with its name.
    pub fn roots(&self) -> Vec<(NodeHandle, String)> {
        self.roots
            .read()
            .iter()
            .map(|(root, name)| (root.clone(), name.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }

    /// Forget every root and the focus.
    pub fn clear(&self) {
        self.roots.write().clear();
        *self.focused.write() = None;
        self.notify(RegistryEvent::RootsChanged);
        self.notify(RegistryEvent::FocusChanged);
    }

    /// Receive every later change. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners.lock().push(tx);
        rx
    }

    fn notify(&self, event: RegistryEvent) {
        self.listeners
            .lock()
            .retain(|listener| listener.send(event.clone()).is_ok());
    }
}

/// Registry name for a window root: `Title(type)` when titled, otherwise
/// `type/0x<identity>`.
pub fn window_name(title: Option<&str>, type_name: &str, identity: u64) -> String {
    match title {
        Some(title) if !title.is_empty() => format!("{title}({type_name})"),
        _ => format!("{type_name}/0x{identity:x}"),
    }
}
