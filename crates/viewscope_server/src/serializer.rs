//! Depth-first walk that streams a hierarchy to a writer.

use std::io::Write;
use std::sync::Arc;

use viewscope_core::NodeHandle;

use crate::grammar::NodeWriter;
use crate::{CaptureCoordinator, Grammar, RenderCapture, SerializeError};

/// Streams node trees in either [`Grammar`].
///
/// Node reads happen on the owner thread through the coordinator; the walk
/// itself runs on the calling (worker) thread.
pub struct Serializer {
    coordinator: CaptureCoordinator,
    capture: Arc<dyn RenderCapture>,
}

impl Serializer {
    pub fn new(coordinator: CaptureCoordinator, capture: Arc<dyn RenderCapture>) -> Self {
        Self {
            coordinator,
            capture,
        }
    }

    /// Write `root` and its descendants to `out`.
    ///
    /// Fields that cannot be captured are left out; only a failing writer
    /// aborts the walk. `out` is flushed but not closed.
    pub fn serialize<W: Write>(
        &self,
        root: &NodeHandle,
        grammar: Grammar,
        out: &mut W,
    ) -> Result<(), SerializeError> {
        // Explicit stack: tree depth is bounded by the host, not by the
        // worker's call stack.
        let mut stack = vec![self.open_node(root, grammar, out)?];
        while let Some(frame) = stack.last_mut() {
            match frame.children.next() {
                Some(child) => {
                    if frame.written > 0 {
                        frame.writer.separate(out)?;
                    }
                    frame.written += 1;
                    let child = self.open_node(&child, grammar, out)?;
                    stack.push(child);
                }
                None => {
                    if let Some(done) = stack.pop() {
                        done.writer.close(out, done.written)?;
                    }
                }
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Write a node's own fields and open its child list.
    fn open_node<W: Write>(
        &self,
        node: &NodeHandle,
        grammar: Grammar,
        out: &mut W,
    ) -> Result<Frame, SerializeError> {
        // All four captures are queued before the first wait so the owner
        // thread can run them back to back.
        let properties = self
            .coordinator
            .run_on_owner(node, "properties", |node| Ok(Some(node.describe())));
        let capture = Arc::clone(&self.capture);
        let background = self.coordinator.run_on_owner(node, "background", move |node| {
            if node.bounds().is_empty() {
                return Ok(None);
            }
            capture.capture_background(node)
        });
        let capture = Arc::clone(&self.capture);
        let content = self.coordinator.run_on_owner(node, "content", move |node| {
            if node.bounds().is_empty() {
                return Ok(None);
            }
            capture.capture_content(node)
        });
        let children = self.coordinator.children(node);

        let mut writer = NodeWriter::new(grammar);
        let properties = properties.wait();
        if properties.is_none() {
            tracing::debug!(node = ?node, "properties unavailable");
        }
        writer.open(out, properties.as_ref())?;
        if let Some(background) = background.wait() {
            writer.background(out, &background)?;
        }
        if let Some(content) = content.wait() {
            writer.content(out, &content)?;
        }
        out.flush()?;

        let children = children.wait().unwrap_or_default();
        writer.begin_children(out)?;
        Ok(Frame {
            writer,
            children: children.into_iter(),
            written: 0,
        })
    }
}

/// A node whose child list is open on the output.
struct Frame {
    writer: NodeWriter,
    children: std::vec::IntoIter<NodeHandle>,
    written: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;
    use std::rc::{Rc, Weak};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use viewscope_core::{
        Block, Canvas, Drawable, NodeError, NodeRef, OwnerLoop, Rect, SolidDrawable, Srgba,
        TreeNode, Visibility,
    };

    use crate::{BackgroundCapture, CaptureError, PngCapture};

    fn serializer() -> Serializer {
        Serializer::new(CaptureCoordinator::new(), Arc::new(PngCapture))
    }

    /// Serialize on a worker thread while this thread serves as the owner.
    fn serialize_tree(root: &NodeRef, grammar: Grammar) -> String {
        let owner = OwnerLoop::new();
        let handle = owner.attach(root);
        let worker = thread::spawn(move || {
            let mut out = Vec::new();
            serializer().serialize(&handle, grammar, &mut out).unwrap();
            String::from_utf8(out).unwrap()
        });
        while !worker.is_finished() {
            owner.run_pending();
        }
        worker.join().unwrap()
    }

    fn two_children() -> NodeRef {
        Block::new("app.Root")
            .with_bounds(Rect::new(0, 0, 100, 50))
            .child(Block::new("app.A").with_bounds(Rect::new(0, 0, 50, 50)))
            .child(Block::new("app.B").with_bounds(Rect::new(50, 0, 50, 50)))
            .into_ref()
    }

    #[test]
    fn object_grammar_lists_children_in_order() {
        let text = serialize_tree(&two_children(), Grammar::Object);

        assert!(text.starts_with("{ 'name':'app.Root'"));
        assert!(text.ends_with("]}]}"));
        let a = text.find("'bounds':[0,0,50,50]").unwrap();
        let b = text.find("'bounds':[50,0,50,50]").unwrap();
        assert!(a < b);
        assert_eq!(text.matches("'children':[").count(), 3);
        assert!(text.contains("'children':[]},{ 'name':'app.B'"));
    }

    #[test]
    fn tag_grammar_nests_children() {
        let text = serialize_tree(&two_children(), Grammar::Tag);

        assert!(text.starts_with("<node name=\"app.Root\""));
        assert!(text.ends_with("</children>\n</node>"));
        assert_eq!(text.matches("<node ").count(), 3);
        assert_eq!(text.matches("</node>").count(), 3);
        assert!(text.contains("</node>\n<node name=\"app.B\""));
    }

    #[test]
    fn captures_are_included_when_present() {
        let root = Block::new("app.Root")
            .with_bounds(Rect::from_size(4, 4))
            .background_color(Srgba::new(0, 0, 0, 255))
            .child(
                Block::new("app.Image")
                    .with_bounds(Rect::from_size(2, 2))
                    .with_background(SolidDrawable::new(Srgba::new(0, 255, 0, 255)))
                    .fill(Srgba::new(255, 0, 0, 255)),
            )
            .into_ref();

        let text = serialize_tree(&root, Grammar::Object);
        assert!(text.contains("'backgroundColor':'#000000ff'"));
        assert!(text.contains("'backgroundImage':'data:image/png;base64,"));
        assert!(text.contains("'content':'data:image/png;base64,"));
        assert!(text.contains("'drawablePadding':[0,0,0,0]"));
    }

    #[test]
    fn hidden_nodes_keep_properties_but_no_images() {
        let root = Block::new("app.Root")
            .with_bounds(Rect::from_size(4, 4))
            .background_color(Srgba::new(0, 0, 0, 255))
            .fill(Srgba::new(255, 0, 0, 255))
            .with_visibility(Visibility::Gone)
            .into_ref();

        let text = serialize_tree(&root, Grammar::Object);
        assert!(text.contains("'visibility':0"));
        assert!(!text.contains("backgroundColor"));
        assert!(!text.contains("'content'"));
    }

    #[test]
    fn vanished_root_still_yields_a_well_formed_node() {
        let owner = OwnerLoop::new();
        let root = Block::new("app.Root").into_ref();
        let handle = owner.attach(&root);
        drop(root);

        let worker = thread::spawn(move || {
            let mut out = Vec::new();
            serializer()
                .serialize(&handle, Grammar::Object, &mut out)
                .unwrap();
            String::from_utf8(out).unwrap()
        });
        while !worker.is_finished() {
            owner.run_pending();
        }
        assert_eq!(worker.join().unwrap(), "{ 'children':[]}");
    }

    /// Background that detaches the parent's last child while being drawn.
    struct DetachLastSibling(Rc<RefCell<Weak<Block>>>);

    impl Drawable for DetachLastSibling {
        fn draw(&self, _: &mut dyn Canvas, _: Rect) -> Result<(), NodeError> {
            if let Some(parent) = self.0.borrow().upgrade() {
                parent.remove_child(parent.child_count() - 1);
            }
            Ok(())
        }
    }

    #[test]
    fn child_removed_during_walk_is_emitted_empty() {
        let parent_slot = Rc::new(RefCell::new(Weak::new()));
        let parent = Rc::new(
            Block::new("app.Root")
                .child(
                    Block::new("app.A")
                        .with_bounds(Rect::from_size(2, 2))
                        .with_background(DetachLastSibling(Rc::clone(&parent_slot))),
                )
                .child(Block::new("app.B")),
        );
        *parent_slot.borrow_mut() = Rc::downgrade(&parent);
        let root: NodeRef = parent;

        let text = serialize_tree(&root, Grammar::Object);
        assert!(text.contains("'name':'app.A'"));
        assert!(!text.contains("app.B"));
        assert!(text.ends_with(",{ 'children':[]}]}"));
    }

    #[derive(Default)]
    struct CountingCapture {
        calls: AtomicUsize,
    }

    impl RenderCapture for CountingCapture {
        fn capture_background(
            &self,
            _: &dyn TreeNode,
        ) -> Result<Option<BackgroundCapture>, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn capture_content(&self, _: &dyn TreeNode) -> Result<Option<String>, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[test]
    fn zero_size_nodes_never_reach_the_capture() {
        let root = Block::new("app.Root")
            .with_bounds(Rect::from_size(4, 4))
            .child(
                Block::new("app.Collapsed")
                    .with_bounds(Rect::new(0, 0, 0, 10))
                    .background_color(Srgba::new(255, 0, 0, 255))
                    .fill(Srgba::new(255, 0, 0, 255)),
            )
            .into_ref();

        let counting = Arc::new(CountingCapture::default());
        let owner = OwnerLoop::new();
        let handle = owner.attach(&root);
        let capture: Arc<dyn RenderCapture> = counting.clone();
        let worker = thread::spawn(move || {
            let mut out = Vec::new();
            Serializer::new(CaptureCoordinator::new(), capture)
                .serialize(&handle, Grammar::Object, &mut out)
                .unwrap();
        });
        while !worker.is_finished() {
            owner.run_pending();
        }
        worker.join().unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);

        let text = serialize_tree(&root, Grammar::Object);
        assert!(text.contains("'bounds':[0,0,0,10]"));
        assert!(!text.contains("backgroundColor"));
        assert!(!text.contains("'content'"));
    }

    #[test]
    fn deep_chain_is_walked_without_recursion() {
        let depth = 3000;
        let mut levels = vec![Rc::new(Block::new("app.Leaf"))];
        for _ in 0..depth {
            let inner: NodeRef = levels[levels.len() - 1].clone();
            levels.push(Rc::new(Block::new("app.Level").child_ref(inner)));
        }
        let root: NodeRef = levels[depth].clone();

        let text = serialize_tree(&root, Grammar::Object);
        assert_eq!(text.matches("'name':").count(), depth + 1);
        assert!(text.ends_with(&"]}".repeat(depth + 1)));

        // Unlink so dropping the chain does not recurse on this thread.
        drop(root);
        for level in &levels {
            level.remove_child(0);
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_aborts_walk() {
        let owner = OwnerLoop::new();
        let root = two_children();
        let handle = owner.attach(&root);

        let worker = thread::spawn(move || {
            serializer()
                .serialize(&handle, Grammar::Tag, &mut FailingWriter)
                .is_err()
        });
        while !worker.is_finished() {
            owner.run_pending();
        }
        assert!(worker.join().unwrap());
    }
}
