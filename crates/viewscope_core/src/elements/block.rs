//! General-purpose container node with background, fill and children.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use palette::Srgba;

use crate::{
    Background, Canvas, Drawable, Edges, NodeError, NodeRef, Rect, ResourceId, TreeNode,
    Visibility,
};

type Painter = Rc<dyn Fn(&mut dyn Canvas, Rect) -> Result<(), NodeError>>;

/// A rectangular node, analogous to a view group.
///
/// Configured with a builder; visibility, bounds and children stay mutable
/// through `&self` so the owner thread can change a shared tree.
///
/// ```ignore
/// let root = Block::new("app.MainLayout")
///     .with_bounds(Rect::new(0, 0, 100, 50))
///     .background_color(Srgba::new(255, 255, 255, 255))
///     .child(Block::new("app.Header").with_bounds(Rect::new(0, 0, 100, 10)))
///     .into_ref();
/// ```
pub struct Block {
    type_name: String,
    resource_id: Option<ResourceId>,
    bounds: Cell<Rect>,
    padding: Edges<i32>,
    margin: Option<Edges<i32>>,
    visibility: Cell<Visibility>,
    background: Option<Background>,
    painter: Option<Painter>,
    scroll: Cell<(i32, i32)>,
    captures_content: bool,
    children: RefCell<Vec<NodeRef>>,
}

impl Block {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            resource_id: None,
            bounds: Cell::new(Rect::default()),
            padding: Edges::default(),
            margin: None,
            visibility: Cell::new(Visibility::Visible),
            background: None,
            painter: None,
            scroll: Cell::new((0, 0)),
            captures_content: true,
            children: RefCell::new(Vec::new()),
        }
    }

    pub fn with_resource_id(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_bounds(self, bounds: Rect) -> Self {
        self.bounds.set(bounds);
        self
    }

    pub fn with_padding(mut self, padding: Edges<i32>) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_margin(mut self, margin: Edges<i32>) -> Self {
        self.margin = Some(margin);
        self
    }

    pub fn with_visibility(self, visibility: Visibility) -> Self {
        self.visibility.set(visibility);
        self
    }

    pub fn background_color(mut self, color: Srgba<u8>) -> Self {
        self.background = Some(Background::Color(color));
        self
    }

    pub fn with_background(mut self, drawable: impl Drawable + 'static) -> Self {
        self.background = Some(Background::Painted(Rc::new(drawable)));
        self
    }

    /// Paint the whole node with `color` as its own content.
    pub fn fill(self, color: Srgba<u8>) -> Self {
        self.paint_with(move |canvas, bounds| {
            canvas.fill_rect(bounds, color);
            Ok(())
        })
    }

    /// Custom content painter, called with the node's local bounds.
    pub fn paint_with(
        mut self,
        painter: impl Fn(&mut dyn Canvas, Rect) -> Result<(), NodeError> + 'static,
    ) -> Self {
        self.painter = Some(Rc::new(painter));
        self
    }

    pub fn scroll(self, x: i32, y: i32) -> Self {
        self.scroll.set((x, y));
        self
    }

    /// Mark as window decor: content capture skips it.
    pub fn decor(mut self) -> Self {
        self.captures_content = false;
        self
    }

    pub fn child(self, child: Block) -> Self {
        self.children.borrow_mut().push(Rc::new(child));
        self
    }

    pub fn child_ref(self, child: NodeRef) -> Self {
        self.children.borrow_mut().push(child);
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Rc::new(self)
    }

    pub fn set_bounds(&self, bounds: Rect) {
        self.bounds.set(bounds);
    }

    pub fn push_child(&self, child: NodeRef) {
        self.children.borrow_mut().push(child);
    }

    pub fn remove_child(&self, index: usize) -> Option<NodeRef> {
        let mut children = self.children.borrow_mut();
        (index < children.len()).then(|| children.remove(index))
    }
}

impl TreeNode for Block {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn resource_id(&self) -> Result<Option<ResourceId>, NodeError> {
        Ok(self.resource_id.clone())
    }

    fn bounds(&self) -> Rect {
        self.bounds.get()
    }

    fn padding(&self) -> Edges<i32> {
        self.padding
    }

    fn margin(&self) -> Option<Edges<i32>> {
        self.margin
    }

    fn visibility(&self) -> Visibility {
        self.visibility.get()
    }

    fn set_visibility(&self, visibility: Visibility) {
        self.visibility.set(visibility);
    }

    fn background(&self) -> Option<Background> {
        self.background.clone()
    }

    fn scroll_offset(&self) -> (i32, i32) {
        self.scroll.get()
    }

    fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    fn child_at(&self, index: usize) -> Option<NodeRef> {
        self.children.borrow().get(index).cloned()
    }

    fn paint_self(&self, canvas: &mut dyn Canvas) -> Result<(), NodeError> {
        let Some(painter) = &self.painter else {
            return Ok(());
        };
        let bounds = self.bounds.get();
        painter(canvas, Rect::from_size(bounds.width, bounds.height))
    }

    fn captures_content(&self) -> bool {
        self.captures_content
    }
}

/// A drawable that floods its bounds with one colour.
#[derive(Debug, Clone, Copy)]
pub struct SolidDrawable {
    pub color: Srgba<u8>,
    pub padding: Edges<i32>,
}

impl SolidDrawable {
    pub fn new(color: Srgba<u8>) -> Self {
        Self {
            color,
            padding: Edges::default(),
        }
    }

    pub fn with_padding(mut self, padding: Edges<i32>) -> Self {
        self.padding = padding;
        self
    }
}

impl Drawable for SolidDrawable {
    fn padding(&self) -> Edges<i32> {
        self.padding
    }

    fn draw(&self, canvas: &mut dyn Canvas, bounds: Rect) -> Result<(), NodeError> {
        canvas.fill_rect(bounds, self.color);
        Ok(())
    }
}
