//! Text rendering of the device tree and property tables

use halscope_core::{BusClass, DeviceNode, DeviceTree};
use serde_json::{json, Map, Value};
use std::fmt::Write;

use crate::config::DisplayConfig;

/// Render the tree as an indented outline, one device per line
pub fn render_tree(tree: &DeviceTree, display: &DisplayConfig, bus_key: &str) -> String {
    let mut out = String::new();
    render_node(tree, tree.root(), 0, display, bus_key, &mut out);
    out
}

fn render_node(
    tree: &DeviceTree,
    node: &DeviceNode,
    depth: usize,
    display: &DisplayConfig,
    bus_key: &str,
    out: &mut String,
) {
    let bus = node.bus_class(bus_key);
    let hidden = display.hide_virtual && bus == Some(BusClass::Unknown);
    let child_depth = if hidden { depth } else { depth + 1 };

    if !hidden {
        let _ = write!(out, "{}{}", "  ".repeat(depth), node.label());
        if let Some(bus) = &bus {
            let _ = write!(out, " [{}]", bus.display_name());
        }
        if depth > 0 {
            let _ = write!(out, " ({})", node.id());
        }
        out.push('\n');
    }

    for &child in node.children() {
        if let Some(child) = tree.node(child) {
            render_node(tree, child, child_depth, display, bus_key, out);
        }
    }
}

/// Render a device's properties as a sorted key/type/value table
pub fn render_properties(node: &DeviceNode) -> String {
    let rows: Vec<(&str, &str, String)> = node
        .properties()
        .iter()
        .map(|(k, v)| (k.as_str(), v.type_name(), v.to_string()))
        .collect();

    let key_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max("Key".len());
    let type_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max("Type".len());

    let mut out = String::new();
    let _ = writeln!(out, "{}", node.id());
    let _ = writeln!(out, "  {:key_width$}  {:type_width$}  Value", "Key", "Type");
    for (key, ty, value) in rows {
        let _ = writeln!(out, "  {:key_width$}  {:type_width$}  {}", key, ty, value);
    }
    out
}

/// JSON snapshot of one device
pub fn node_json(node: &DeviceNode, tree: &DeviceTree) -> Value {
    let properties: Map<String, Value> = node
        .properties()
        .iter()
        .map(|(k, v)| {
            let value = serde_json::to_value(v).unwrap_or(Value::Null);
            (k.clone(), value)
        })
        .collect();

    let children: Vec<&str> = node
        .children()
        .iter()
        .filter_map(|&c| tree.node(c))
        .map(|c| c.id().as_str())
        .collect();

    json!({
        "udi": node.id(),
        "parent": tree.parent_of(node.id()).map(|p| p.id().as_str()),
        "children": children,
        "properties": properties,
    })
}
