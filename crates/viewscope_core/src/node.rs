//! The capability interface every inspectable node implements.
//!
//! Nodes are owned by a single thread. All methods here must only ever be
//! called on that thread; the server reaches them exclusively through tasks
//! posted to the owner (see [`crate::owner`]).

use std::fmt;
use std::rc::Rc;

use palette::Srgba;
use thiserror::Error;

use crate::{Canvas, Edges, Rect};

/// Shared reference to a node on its owner thread.
pub type NodeRef = Rc<dyn TreeNode>;

/// Faults raised by node capabilities.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("paint failed: {0}")]
    Paint(String),
}

/// Whether a node is drawn and whether it takes part in layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    #[default]
    Visible,
    /// Laid out but not drawn.
    Invisible,
    /// Neither laid out nor drawn.
    Gone,
}

impl Visibility {
    /// Wire code: visible = 1, invisible = -1, gone = 0.
    pub fn code(self) -> i32 {
        match self {
            Visibility::Visible => 1,
            Visibility::Invisible => -1,
            Visibility::Gone => 0,
        }
    }
}

/// Human-readable identifier of a node, e.g. `[@app:id/title]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub package: String,
    pub kind: String,
    pub entry: String,
}

impl ResourceId {
    pub fn new(
        package: impl Into<String>,
        kind: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            kind: kind.into(),
            entry: entry.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[@{}:{}/{}]", self.package, self.kind, self.entry)
    }
}

/// Something that knows how to paint itself, typically a node background.
pub trait Drawable {
    /// Insets the drawable asks its node to apply to content.
    fn padding(&self) -> Edges<i32> {
        Edges::default()
    }

    /// Paint into `bounds`, in canvas coordinates.
    fn draw(&self, canvas: &mut dyn Canvas, bounds: Rect) -> Result<(), NodeError>;
}

/// A node background: a flat colour or a painted drawable.
#[derive(Clone)]
pub enum Background {
    Color(Srgba<u8>),
    Painted(Rc<dyn Drawable>),
}

impl Background {
    pub fn padding(&self) -> Edges<i32> {
        match self {
            Background::Color(_) => Edges::default(),
            Background::Painted(drawable) => drawable.padding(),
        }
    }
}

impl fmt::Debug for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Background::Color(color) => f.debug_tuple("Color").field(color).finish(),
            Background::Painted(_) => f.write_str("Painted(..)"),
        }
    }
}

/// Plain-data description of a node, safe to send off the owner thread.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeProperties {
    pub type_name: String,
    pub resource_id: Option<ResourceId>,
    pub hash_code: u64,
    pub bounds: Rect,
    pub padding: Edges<i32>,
    pub margin: Option<Edges<i32>>,
    pub drawable_padding: Option<Edges<i32>>,
    pub visibility: Visibility,
}

/// A node in an owner-thread UI hierarchy.
///
/// Only `type_name`, `bounds`, `visibility` and `set_visibility` are
/// required; everything else has a leaf-node default.
pub trait TreeNode: 'static {
    /// Implementation type, reported as the node's `name`.
    fn type_name(&self) -> &str;

    fn resource_id(&self) -> Result<Option<ResourceId>, NodeError> {
        Ok(None)
    }

    /// Position relative to the parent, plus size.
    fn bounds(&self) -> Rect;

    fn padding(&self) -> Edges<i32> {
        Edges::default()
    }

    /// Margins requested from the parent layout, if the layout has any.
    fn margin(&self) -> Option<Edges<i32>> {
        None
    }

    fn visibility(&self) -> Visibility;

    fn set_visibility(&self, visibility: Visibility);

    fn background(&self) -> Option<Background> {
        None
    }

    /// Current scroll position of the node's content.
    fn scroll_offset(&self) -> (i32, i32) {
        (0, 0)
    }

    fn child_count(&self) -> usize {
        0
    }

    fn child_at(&self, _index: usize) -> Option<NodeRef> {
        None
    }

    /// Paint this node's own content, without children, at the canvas origin.
    fn paint_self(&self, _canvas: &mut dyn Canvas) -> Result<(), NodeError> {
        Ok(())
    }

    /// Whether content capture applies to this node at all. Window decor
    /// roots return `false`: their content is their children.
    fn captures_content(&self) -> bool {
        true
    }

    fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    /// Identity hash, stable for the lifetime of the node.
    fn hash_code(&self) -> u64 {
        (self as *const Self).cast::<()>() as usize as u64
    }

    fn describe(&self) -> NodeProperties {
        let resource_id = self.resource_id().unwrap_or_else(|err| {
            tracing::debug!(node = self.type_name(), %err, "resource id not resolved");
            None
        });

        NodeProperties {
            type_name: self.type_name().to_string(),
            resource_id,
            hash_code: self.hash_code(),
            bounds: self.bounds(),
            padding: self.padding(),
            margin: self.margin(),
            drawable_padding: self.background().map(|bg| bg.padding()),
            visibility: self.visibility(),
        }
    }
}
