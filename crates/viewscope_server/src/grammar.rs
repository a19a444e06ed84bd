//! The two textual encodings of a hierarchy.
//!
//! Both are written incrementally, one node fragment at a time, so a partial
//! response is still a readable prefix of the whole.
//!
//! Object grammar, one node:
//!
//! ```text
//! { 'name':'app.Root', 'id':'[@app:id/root]', 'hashCode':'42', 'bounds':[0,0,100,50],
//!   'padding':[0,0,0,0], 'visibility':1, 'backgroundColor':'#ffffffff', 'children':[...]}
//! ```
//!
//! Tag grammar, one node:
//!
//! ```text
//! <node name="app.Root" id="[@app:id/root]" hashCode="42" visibility="1">
//! <bounds left="0" top="0" width="100" height="50"/>
//! <padding left="0" top="0" right="0" bottom="0"/>
//! <background color="#ffffffff"/>
//! <children>
//! ...
//! </children>
//! </node>
//! ```

use std::io::{self, Write};

use palette::Srgba;
use viewscope_core::{Edges, NodeProperties};

use crate::BackgroundCapture;

/// Request parameter that selects [`Grammar::Object`].
pub const OBJECT_GRAMMAR_PARAMETER: &str = "json";

/// Output encoding, chosen per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Grammar {
    #[default]
    Tag,
    Object,
}

impl Grammar {
    /// Exactly `json`, in any case, selects the object grammar; anything
    /// else is ignored. A trailing `\r` from a CRLF line is tolerated.
    pub fn from_parameter(parameter: &str) -> Self {
        let parameter = parameter.strip_suffix('\r').unwrap_or(parameter);
        if parameter.eq_ignore_ascii_case(OBJECT_GRAMMAR_PARAMETER) {
            Grammar::Object
        } else {
            Grammar::Tag
        }
    }
}

/// Writes the fragments of a single node.
///
/// Call order: `open`, any of `background`/`content`, `begin_children`,
/// then the children separated by `separate`, then `close`.
pub(crate) struct NodeWriter {
    grammar: Grammar,
    wrote_field: bool,
}

impl NodeWriter {
    pub(crate) fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            wrote_field: false,
        }
    }

    pub(crate) fn open(
        &mut self,
        out: &mut impl Write,
        properties: Option<&NodeProperties>,
    ) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => {
                out.write_all(b"{")?;
                if let Some(properties) = properties {
                    self.field(out)?;
                    write_object_properties(out, properties)?;
                }
                Ok(())
            }
            Grammar::Tag => match properties {
                Some(p) => {
                    writeln!(
                        out,
                        "<node name=\"{}\" id=\"{}\" hashCode=\"{}\" visibility=\"{}\">",
                        escape_tag(&p.type_name),
                        escape_tag(&resource_label(p)),
                        p.hash_code,
                        p.visibility.code()
                    )?;
                    let b = p.bounds;
                    writeln!(
                        out,
                        "<bounds left=\"{}\" top=\"{}\" width=\"{}\" height=\"{}\"/>",
                        b.x, b.y, b.width, b.height
                    )?;
                    write_tag_edges(out, "padding", p.padding)?;
                    if let Some(margin) = p.margin {
                        write_tag_edges(out, "margin", margin)?;
                    }
                    if let Some(padding) = p.drawable_padding {
                        write_tag_edges(out, "drawablePadding", padding)?;
                    }
                    Ok(())
                }
                None => out.write_all(b"<node>\n"),
            },
        }
    }

    pub(crate) fn background(
        &mut self,
        out: &mut impl Write,
        background: &BackgroundCapture,
    ) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => {
                self.field(out)?;
                match background {
                    BackgroundCapture::Color(color) => {
                        write!(out, "'backgroundColor':'{}'", hex_color(*color))
                    }
                    BackgroundCapture::Image(uri) => {
                        write!(out, "'backgroundImage':'{}'", escape_object(uri))
                    }
                }
            }
            Grammar::Tag => match background {
                BackgroundCapture::Color(color) => {
                    writeln!(out, "<background color=\"{}\"/>", hex_color(*color))
                }
                BackgroundCapture::Image(uri) => {
                    writeln!(out, "<background image=\"{}\"/>", escape_tag(uri))
                }
            },
        }
    }

    pub(crate) fn content(&mut self, out: &mut impl Write, uri: &str) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => {
                self.field(out)?;
                write!(out, "'content':'{}'", escape_object(uri))
            }
            Grammar::Tag => writeln!(out, "<content image=\"{}\"/>", escape_tag(uri)),
        }
    }

    pub(crate) fn begin_children(&mut self, out: &mut impl Write) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => {
                self.field(out)?;
                out.write_all(b"'children':[")
            }
            Grammar::Tag => out.write_all(b"<children>\n"),
        }
    }

    /// Between two sibling nodes.
    pub(crate) fn separate(&self, out: &mut impl Write) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => out.write_all(b","),
            Grammar::Tag => out.write_all(b"\n"),
        }
    }

    pub(crate) fn close(&self, out: &mut impl Write, child_count: usize) -> io::Result<()> {
        match self.grammar {
            Grammar::Object => out.write_all(b"]}"),
            Grammar::Tag if child_count > 0 => out.write_all(b"\n</children>\n</node>"),
            Grammar::Tag => out.write_all(b"</children>\n</node>"),
        }
    }

    /// Separator before an object field.
    fn field(&mut self, out: &mut impl Write) -> io::Result<()> {
        let prefix: &[u8] = if self.wrote_field { b", " } else { b" " };
        self.wrote_field = true;
        out.write_all(prefix)
    }
}

fn write_object_properties(out: &mut impl Write, p: &NodeProperties) -> io::Result<()> {
    let b = p.bounds;
    write!(
        out,
        "'name':'{}', 'id':'{}', 'hashCode':'{}', 'bounds':[{},{},{},{}], 'padding':{}",
        escape_object(&p.type_name),
        escape_object(&resource_label(p)),
        p.hash_code,
        b.x,
        b.y,
        b.width,
        b.height,
        object_edges(p.padding)
    )?;
    if let Some(margin) = p.margin {
        write!(out, ", 'margin':{}", object_edges(margin))?;
    }
    if let Some(padding) = p.drawable_padding {
        write!(out, ", 'drawablePadding':{}", object_edges(padding))?;
    }
    write!(out, ", 'visibility':{}", p.visibility.code())
}

fn write_tag_edges(out: &mut impl Write, tag: &str, edges: Edges<i32>) -> io::Result<()> {
    writeln!(
        out,
        "<{tag} left=\"{}\" top=\"{}\" right=\"{}\" bottom=\"{}\"/>",
        edges.left, edges.top, edges.right, edges.bottom
    )
}

fn object_edges(edges: Edges<i32>) -> String {
    let [l, t, r, b] = edges.to_ltrb();
    format!("[{l},{t},{r},{b}]")
}

/// `[@pkg:type/entry]`, or empty when the node has no identifier.
fn resource_label(p: &NodeProperties) -> String {
    p.resource_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn hex_color(color: Srgba<u8>) -> String {
    format!(
        "#{:02x}{:02x}{:02x}{:02x}",
        color.red, color.green, color.blue, color.alpha
    )
}

fn escape_object(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
