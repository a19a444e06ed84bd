//! Background and content captures rendered to PNG data URIs.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use image::ImageFormat;
use palette::Srgba;
use viewscope_core::{
    Background, Canvas, NodeRef, Pixmap, Rect, TouchTracker, TreeNode, Visibility,
};

use crate::CaptureError;

pub const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// What a node's background looks like.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundCapture {
    Color(Srgba<u8>),
    /// PNG data URI of the rendered background.
    Image(String),
}

/// Renders node visuals on the owner thread.
///
/// `Ok(None)` means there is nothing to show; errors are logged by the
/// caller and reported the same way.
pub trait RenderCapture: Send + Sync {
    fn capture_background(
        &self,
        node: &dyn TreeNode,
    ) -> Result<Option<BackgroundCapture>, CaptureError>;

    /// The node's own painting, without its children.
    fn capture_content(&self, node: &dyn TreeNode) -> Result<Option<String>, CaptureError>;
}

/// Captures into an offscreen [`Pixmap`], encoded as PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCapture;

impl RenderCapture for PngCapture {
    fn capture_background(
        &self,
        node: &dyn TreeNode,
    ) -> Result<Option<BackgroundCapture>, CaptureError> {
        let bounds = node.bounds();
        if bounds.is_empty() || node.visibility() != Visibility::Visible {
            return Ok(None);
        }

        let drawable = match node.background() {
            None => return Ok(None),
            Some(Background::Color(color)) if color.alpha == 0 => return Ok(None),
            Some(Background::Color(color)) => return Ok(Some(BackgroundCapture::Color(color))),
            Some(Background::Painted(drawable)) => drawable,
        };

        let Some(mut pixmap) = Pixmap::try_new(bounds.width, bounds.height) else {
            return Ok(None);
        };
        let (scroll_x, scroll_y) = node.scroll_offset();
        pixmap.translate(scroll_x, scroll_y);
        drawable.draw(&mut pixmap, Rect::from_size(bounds.width, bounds.height))?;

        Ok(Some(BackgroundCapture::Image(encode_data_uri(pixmap)?)))
    }

    fn capture_content(&self, node: &dyn TreeNode) -> Result<Option<String>, CaptureError> {
        if !node.captures_content() || node.visibility() != Visibility::Visible {
            return Ok(None);
        }

        let bounds = node.bounds();
        let Some(mut pixmap) = Pixmap::try_new(bounds.width, bounds.height) else {
            return Ok(None);
        };

        let touched = {
            let _hidden = ChildVisibilityGuard::hide_children(node);
            let mut tracker = TouchTracker::new(&mut pixmap);
            node.paint_self(&mut tracker)?;
            tracker.was_touched()
        };
        if !touched {
            return Ok(None);
        }

        encode_data_uri(pixmap).map(Some)
    }
}

/// Hides a node's visible children for as long as it lives.
///
/// Dropping it, including during unwinding, puts back each child's previous
/// visibility.
pub struct ChildVisibilityGuard {
    saved: Vec<(NodeRef, Visibility)>,
}

impl ChildVisibilityGuard {
    pub fn hide_children(parent: &dyn TreeNode) -> Self {
        let count = parent.child_count();
        let mut guard = Self {
            saved: Vec::with_capacity(count),
        };
        // Each child is recorded before it is touched, so a panic partway
        // through still restores the ones already hidden.
        for index in 0..count {
            let Some(child) = parent.child_at(index) else {
                continue;
            };
            let previous = child.visibility();
            guard.saved.push((NodeRef::clone(&child), previous));
            if previous == Visibility::Visible {
                child.set_visibility(Visibility::Invisible);
            }
        }
        guard
    }
}

impl Drop for ChildVisibilityGuard {
    fn drop(&mut self) {
        for (child, previous) in &self.saved {
            child.set_visibility(*previous);
        }
    }
}

/// Encode the pixmap as PNG and wrap it in a data URI.
///
/// The pixmap is consumed; its buffer is freed before the URI is returned.
pub fn encode_data_uri(pixmap: Pixmap) -> Result<String, CaptureError> {
    let mut png = Vec::new();
    pixmap
        .into_image()
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + png.len().div_ceil(3) * 4);
    uri.push_str(DATA_URI_PREFIX);
    STANDARD_NO_PAD.encode_string(&png, &mut uri);
    Ok(uri)
}
