//! Runs node reads on the owner thread and hands results back to workers.
//!
//! Every failure on the way (node gone, loop closed, capture error, panic,
//! task dropped unrun) surfaces as an absent value, never as a worker error.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use viewscope_core::{panic_message, NodeHandle, NodeRef, TreeNode};

use crate::CaptureError;

/// Posts capture work to a node's owner thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureCoordinator;

impl CaptureCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Run `work` against the node behind `node` on its owner thread.
    ///
    /// Returns immediately; the value is collected with [`CaptureTask::wait`].
    pub fn run_on_owner<T, F>(
        &self,
        node: &NodeHandle,
        label: &'static str,
        work: F,
    ) -> CaptureTask<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TreeNode) -> Result<Option<T>, CaptureError> + Send + 'static,
    {
        self.dispatch(node, label, move |_, resolved| work(&**resolved))
    }

    /// Handles for the node's children, read once in index order.
    pub fn children(&self, node: &NodeHandle) -> CaptureTask<Vec<NodeHandle>> {
        self.dispatch(node, "children", |handle, resolved| {
            let children = (0..resolved.child_count())
                .filter_map(|index| resolved.child_at(index))
                .filter_map(|child| handle.adopt(&child))
                .collect();
            Ok(Some(children))
        })
    }

    fn dispatch<T, F>(&self, node: &NodeHandle, label: &'static str, work: F) -> CaptureTask<T>
    where
        T: Send + 'static,
        F: FnOnce(&NodeHandle, &NodeRef) -> Result<Option<T>, CaptureError> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let handle = node.clone();
        let posted = node.poster().post(move || {
            let value = match handle.resolve() {
                Some(resolved) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| work(&handle, &resolved))) {
                        Ok(Ok(value)) => value,
                        Ok(Err(err)) => {
                            tracing::debug!(
                                capture = label,
                                node = ?handle,
                                %err,
                                "capture failed"
                            );
                            None
                        }
                        Err(payload) => {
                            tracing::warn!(
                                capture = label,
                                node = ?handle,
                                panic = panic_message(payload.as_ref()),
                                "capture panicked"
                            );
                            None
                        }
                    }
                }
                None => {
                    tracing::debug!(capture = label, node = ?handle, "node is gone");
                    None
                }
            };
            // The waiter may already be gone; its connection died.
            let _ = tx.send(value);
        });

        match posted {
            Ok(()) => CaptureTask {
                rx: Some(rx),
                label,
            },
            Err(err) => {
                tracing::debug!(capture = label, node = ?node, %err, "capture not posted");
                CaptureTask { rx: None, label }
            }
        }
    }
}

/// A capture in flight on some owner thread.
pub struct CaptureTask<T> {
    rx: Option<mpsc::Receiver<Option<T>>>,
    label: &'static str,
}

impl<T> CaptureTask<T> {
    /// Block until the owner thread has run the capture.
    ///
    /// `None` when the capture failed or could never run.
    pub fn wait(self) -> Option<T> {
        let rx = self.rx?;
        match rx.recv() {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(capture = self.label, "capture dropped before running");
                None
            }
        }
    }
}

impl<T> fmt::Debug for CaptureTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureTask")
            .field("label", &self.label)
            .field("posted", &self.rx.is_some())
            .finish()
    }
}
