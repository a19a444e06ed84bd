//! Host-side primitives for viewscope.
//!
//! A tree of [`TreeNode`]s is owned by exactly one thread. Other threads never
//! touch nodes directly: they hold [`NodeHandle`]s and post work to the owner
//! through a [`Poster`], which the owner drains from its [`OwnerLoop`].

pub mod canvas;
pub mod elements;
pub mod geometry;
pub mod node;
pub mod owner;

pub use canvas::*;
pub use elements::*;
pub use geometry::*;
pub use node::*;
pub use owner::*;

// Re-export the colour type used across the node API
pub use palette::Srgba;
