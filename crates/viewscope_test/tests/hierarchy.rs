//! Hierarchy dumps over a real socket, with the tree on its own owner thread.

use serde_json::{json, Value};
use viewscope_core::{
    Block, Edges, NodeError, Rect, ResourceId, SolidDrawable, Srgba, TreeNode, Visibility,
};
use viewscope_server::{ServerConfig, ViewServer, DATA_URI_PREFIX};
use viewscope_test::{request_text, OwnerThread};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn serve(owner: &OwnerThread) -> ViewServer {
    init_tracing();
    let server = ViewServer::new(ServerConfig::default().with_port(0));
    server.start().expect("server should start");
    server.add_root(owner.root(), "main");
    server.set_focused(Some(owner.root()));
    server
}

/// The object grammar is JSON with single quotes; node names and data URIs
/// never contain quotes themselves.
fn dump_object(server: &ViewServer) -> Value {
    let text = request_text(server.local_addr().unwrap(), "print json\n");
    serde_json::from_str(&text.replace('\'', "\"")).expect("object grammar should be well formed")
}

fn red() -> Srgba<u8> {
    Srgba::new(255, 0, 0, 255)
}

fn root_with_two_children() -> Block {
    Block::new("app.Root")
        .with_bounds(Rect::new(0, 0, 100, 50))
        .child(Block::new("app.A").with_bounds(Rect::new(0, 0, 50, 50)))
        .child(Block::new("app.B").with_bounds(Rect::new(50, 0, 50, 50)))
}

#[test]
fn object_grammar_lists_children_in_index_order() {
    let owner = OwnerThread::spawn(root_with_two_children);
    let server = serve(&owner);

    let root = dump_object(&server);
    assert_eq!(root["name"], "app.Root");
    assert_eq!(root["bounds"], json!([0, 0, 100, 50]));
    assert_eq!(root["visibility"], 1);

    let children = root["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["name"], "app.A");
    assert_eq!(children[0]["bounds"], json!([0, 0, 50, 50]));
    assert_eq!(children[1]["name"], "app.B");
    assert_eq!(children[1]["bounds"], json!([50, 0, 50, 50]));
    assert_eq!(children[1]["children"], json!([]));
}

#[test]
fn node_properties_are_reported() {
    let owner = OwnerThread::spawn(|| {
        Block::new("app.Title")
            .with_resource_id(ResourceId::new("app", "id", "title"))
            .with_bounds(Rect::new(4, 8, 20, 10))
            .with_padding(Edges::ltrb(1, 2, 3, 4))
            .with_margin(Edges::all(6))
            .child(Block::new("app.Hidden").with_visibility(Visibility::Invisible))
            .child(Block::new("app.Gone").with_visibility(Visibility::Gone))
    });
    let server = serve(&owner);

    let root = dump_object(&server);
    assert_eq!(root["id"], "[@app:id/title]");
    assert_eq!(root["bounds"], json!([4, 8, 20, 10]));
    assert_eq!(root["padding"], json!([1, 2, 3, 4]));
    assert_eq!(root["margin"], json!([6, 6, 6, 6]));
    assert!(root.get("drawablePadding").is_none());
    assert!(root["hashCode"].as_str().unwrap().parse::<u64>().is_ok());
    assert_eq!(root["children"][0]["visibility"], -1);
    assert_eq!(root["children"][1]["visibility"], 0);
    assert_eq!(root["children"][1]["id"], "");
}

#[test]
fn tag_grammar_is_the_default() {
    let owner = OwnerThread::spawn(root_with_two_children);
    let server = serve(&owner);

    let text = request_text(server.local_addr().unwrap(), "print\n");
    assert!(text.starts_with("<node name=\"app.Root\""));
    assert!(text.contains("<bounds left=\"50\" top=\"0\" width=\"50\" height=\"50\"/>"));
    assert_eq!(text.matches("<node ").count(), 3);
    assert_eq!(text.matches("</node>").count(), 3);
    assert!(text.ends_with("</node>"));
}

#[test]
fn command_and_parameter_ignore_case() {
    let owner = OwnerThread::spawn(root_with_two_children);
    let server = serve(&owner);

    let text = request_text(server.local_addr().unwrap(), "PRINT Json\r\n");
    assert!(text.starts_with("{ 'name':'app.Root'"));
}

#[test]
fn backgrounds_and_content_are_captured() {
    let owner = OwnerThread::spawn(|| {
        Block::new("app.Root")
            .with_bounds(Rect::from_size(8, 8))
            .background_color(Srgba::new(0x12, 0x34, 0x56, 0xff))
            .child(
                Block::new("app.Image")
                    .with_bounds(Rect::from_size(4, 4))
                    .with_background(SolidDrawable::new(red()).with_padding(Edges::all(2)))
                    .fill(Srgba::new(0, 0, 255, 255)),
            )
    });
    let server = serve(&owner);

    let root = dump_object(&server);
    assert_eq!(root["backgroundColor"], "#123456ff");
    assert_eq!(root["drawablePadding"], json!([0, 0, 0, 0]));

    let image = &root["children"][0];
    assert_eq!(image["drawablePadding"], json!([2, 2, 2, 2]));
    assert!(image["backgroundImage"].as_str().unwrap().starts_with(DATA_URI_PREFIX));
    assert!(image["content"].as_str().unwrap().starts_with(DATA_URI_PREFIX));
}

#[test]
fn zero_size_and_untouched_nodes_have_no_images() {
    let owner = OwnerThread::spawn(|| {
        Block::new("app.Root")
            .with_bounds(Rect::from_size(8, 8))
            .child(
                Block::new("app.Collapsed")
                    .with_bounds(Rect::new(0, 0, 0, 8))
                    .with_background(SolidDrawable::new(red()))
                    .fill(red()),
            )
            .child(Block::new("app.Blank").with_bounds(Rect::from_size(8, 8)))
            .child(
                Block::new("app.Decor")
                    .with_bounds(Rect::from_size(8, 8))
                    .fill(red())
                    .decor(),
            )
    });
    let server = serve(&owner);

    let root = dump_object(&server);
    for child in root["children"].as_array().unwrap() {
        assert!(child.get("backgroundImage").is_none(), "{}", child["name"]);
        assert!(child.get("content").is_none(), "{}", child["name"]);
    }
    assert_eq!(root["children"][0]["bounds"], json!([0, 0, 0, 8]));
}

#[test]
fn failed_paint_restores_child_visibility() {
    let owner = OwnerThread::spawn(|| {
        Block::new("app.Broken")
            .with_bounds(Rect::from_size(8, 8))
            .paint_with(|_, _| Err(NodeError::Paint("no glyphs".into())))
            .child(Block::new("app.Visible"))
            .child(Block::new("app.Gone").with_visibility(Visibility::Gone))
    });
    let server = serve(&owner);

    let root = dump_object(&server);
    assert!(root.get("content").is_none());
    assert_eq!(root["children"][0]["visibility"], 1);

    let after = owner.with_root(|root| {
        (0..root.child_count())
            .map(|i| root.child_at(i).unwrap().visibility())
            .collect::<Vec<_>>()
    });
    assert_eq!(after, vec![Visibility::Visible, Visibility::Gone]);
}

#[test]
fn panicking_paint_restores_child_visibility() {
    let owner = OwnerThread::spawn(|| {
        Block::new("app.Exploding")
            .with_bounds(Rect::from_size(8, 8))
            .paint_with(|_, _| panic!("paint exploded"))
            .child(Block::new("app.Visible"))
    });
    let server = serve(&owner);

    let root = dump_object(&server);
    assert!(root.get("content").is_none());
    assert_eq!(root["children"][0]["name"], "app.Visible");

    let visibility = owner.with_root(|root| root.child_at(0).unwrap().visibility());
    assert_eq!(visibility, Visibility::Visible);

    // The owner loop survived the panic and keeps serving.
    assert_eq!(dump_object(&server)["name"], "app.Exploding");
}

#[test]
fn tree_changes_show_up_in_the_next_dump() {
    let owner = OwnerThread::spawn(root_with_two_children);
    let server = serve(&owner);
    assert_eq!(dump_object(&server)["children"].as_array().unwrap().len(), 2);

    owner.with_root(|root| {
        root.push_child(
            Block::new("app.C")
                .with_bounds(Rect::new(0, 50, 100, 10))
                .into_ref(),
        );
        root.set_bounds(Rect::new(0, 0, 100, 60));
    });

    let root = dump_object(&server);
    assert_eq!(root["bounds"], json!([0, 0, 100, 60]));
    assert_eq!(root["children"][2]["name"], "app.C");
}

#[test]
fn deep_trees_are_fully_walked() {
    const DEPTH: usize = 5000;
    let owner = OwnerThread::spawn(|| {
        (0..DEPTH).fold(Block::new("app.Leaf"), |inner, depth| {
            Block::new(format!("app.Level{depth}")).child(inner)
        })
    });
    let server = serve(&owner);

    let text = request_text(server.local_addr().unwrap(), "print json\n");
    assert_eq!(text.matches("'name':").count(), DEPTH + 1);
    assert!(text.ends_with(&"]}".repeat(DEPTH + 1)));

    let text = request_text(server.local_addr().unwrap(), "print\n");
    assert_eq!(text.matches("</node>").count(), DEPTH + 1);

    // The server is still up after the deep walks.
    assert!(server.is_running());
}
