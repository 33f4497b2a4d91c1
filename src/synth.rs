//! Canonical generated description synthesis
//!
//! Turns the declaration stream collected from all units into one document
//! whose bytes depend only on the set of declarations, never on the order
//! units were processed in.

use crate::ast::{self, Node, NodeKind};
use crate::compiler::{self, Corpus};
use crate::error::{DeclextractError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Banner and includes placed ahead of the sorted body
///
/// Some kernel headers do not compile unless these are included first, so
/// they are added after sorting.
pub const HEADER: &str = "\
# Code generated by syz-declextract. DO NOT EDIT.

include <include/vdso/bits.h>
include <include/linux/types.h>
";

/// Rank of each node kind in the generated document
pub fn kind_order(node: &Node) -> usize {
    match node.kind() {
        NodeKind::Comment => 0,
        NodeKind::Include => 1,
        NodeKind::IntFlags => 2,
        NodeKind::Resource => 3,
        NodeKind::TypeDef => 4,
        NodeKind::Call => 5,
        NodeKind::Struct => 6,
        NodeKind::NewLine => 7,
    }
}

/// Sort, deduplicate and disambiguate the collected nodes
pub fn canonicalize(nodes: Vec<Node>) -> Vec<Node> {
    let before = nodes.len();
    let mut keyed: Vec<(String, Node)> = nodes
        .into_iter()
        .map(|n| (ast::serialize_node(&n), n))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    let mut nodes: Vec<Node> = keyed.into_iter().map(|(_, n)| n).collect();
    nodes.sort_by_key(kind_order);
    tracing::debug!("deduplicated {} nodes into {}", before, nodes.len());

    // A suffixed name must not shadow a call that already carries it.
    let mut taken: HashSet<String> = nodes
        .iter()
        .filter(|n| n.kind() == NodeKind::Call)
        .map(|n| n.name().to_string())
        .collect();
    let mut prev_call = String::new();
    let mut prev_index = 0;
    for node in nodes.iter_mut() {
        if let Node::Call(call) = node {
            if call.name == prev_call {
                let mut name = format!("{prev_call}{prev_index}");
                while taken.contains(&name) {
                    prev_index += 1;
                    name = format!("{prev_call}{prev_index}");
                }
                prev_index += 1;
                taken.insert(name.clone());
                call.name = name;
            } else {
                prev_call = call.name.clone();
                prev_index = 0;
            }
        }
    }
    nodes
}

/// Build the generated document from the collected nodes
pub fn finish_descriptions(nodes: Vec<Node>) -> Result<Vec<Node>> {
    let mut desc = ast::parse(HEADER, "")
        .map_err(|e| DeclextractError::TypeCheck(format!("bad header: {e}")))?
        .nodes;
    desc.extend(canonicalize(nodes));
    Ok(desc)
}

/// Write the document to `path`
pub fn write_descriptions(path: &Path, nodes: &[Node]) -> Result<()> {
    let text = ast::format(nodes);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| DeclextractError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| DeclextractError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("wrote {} nodes to {}", nodes.len(), path.display());
    Ok(())
}

/// Drop generated declarations that nothing in the full corpus uses
///
/// `corpus` must contain the manual descriptions and the already written
/// generated file named `auto_file`, since generated declarations may refer
/// to manually defined types and vice versa.
pub fn remove_unused(nodes: &mut Vec<Node>, corpus: &Corpus, auto_file: &str) -> Result<usize> {
    let unused: HashSet<(NodeKind, String)> = compiler::collect_unused(corpus)?
        .into_iter()
        .filter(|u| u.pos.file == auto_file)
        .map(|u| (u.kind, u.name))
        .collect();
    let before = nodes.len();
    nodes.retain(|n| !unused.contains(&(n.kind(), n.name().to_string())));
    let removed = before - nodes.len();
    tracing::info!("removed {} unused declarations", removed);
    Ok(removed)
}
