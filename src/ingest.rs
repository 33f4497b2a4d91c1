//! Ingestion of per-file extraction output
//!
//! Parses each fragment, rewrites include paths into the source tree,
//! expands syscall declarations to every syscall name their entry point
//! implements and turns `INTERFACE:` annotations into registry records.

use crate::ast::{self, Call, Node};
use crate::error::{DeclextractError, Result};
use crate::interfaces::{Interface, Registry, SYSCALL_KIND};
use crate::paths;
use crate::syscall_table::IdentityMap;
use std::path::Path;

/// Prefix marking an interface annotation comment
pub const INTERFACE_MARKER: &str = "INTERFACE:";

/// Variant assigned to syscalls extracted without one
pub const AUTO_VARIANT: &str = "$auto";

/// Sequential reducer over extraction results
pub struct Ingestor<'a> {
    identities: &'a IdentityMap,
    kernel_src: &'a Path,
    kernel_obj: &'a Path,
    nodes: Vec<Node>,
    registry: Registry,
}

impl<'a> Ingestor<'a> {
    pub fn new(identities: &'a IdentityMap, kernel_src: &'a Path, kernel_obj: &'a Path) -> Self {
        Self {
            identities,
            kernel_src,
            kernel_obj,
            nodes: Vec::new(),
            registry: Registry::new(),
        }
    }

    /// Parse one extraction output; `file` is the source-relative unit path
    pub fn ingest(&mut self, output: &str, file: &str) -> Result<()> {
        let desc = ast::parse(output, "").map_err(|e| DeclextractError::Parse {
            file: file.to_string(),
            message: format!("{}\n{}", e, output),
        })?;
        self.append_nodes(desc.nodes, file)
    }

    /// Transform parsed nodes and collect them
    pub fn append_nodes(&mut self, nodes: Vec<Node>, file: &str) -> Result<()> {
        for node in nodes {
            match node {
                Node::Call(call) => {
                    // SYSCALL_DEFINE1(setuid16, ...) is listed as setuid in the tables.
                    self.nodes.extend(rename_syscall(&call, self.identities));
                }
                Node::Include(mut include) => {
                    include.file = self.rewrite_include(&include.file);
                    self.nodes.push(Node::Include(include));
                }
                Node::Comment(comment) if comment.text.starts_with(INTERFACE_MARKER) => {
                    for iface in parse_annotation(&comment.text, file, self.identities)? {
                        self.registry.merge(iface)?;
                    }
                }
                Node::Comment(_)
                | Node::IntFlags(_)
                | Node::Resource(_)
                | Node::TypeDef(_)
                | Node::Struct(_)
                | Node::NewLine(_) => self.nodes.push(node),
            }
        }
        Ok(())
    }

    fn rewrite_include(&self, include: &str) -> String {
        // Absolute includes still resolve inside the build tree.
        let joined = paths::clean(&self.kernel_obj.join(include.trim_start_matches('/')));
        match paths::relative_to(self.kernel_src, &joined) {
            Some(rel) => paths::to_slash(&rel),
            None => include.to_string(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Hand over the collected declarations and interfaces
    pub fn finish(self) -> (Vec<Node>, Registry) {
        (self.nodes, self.registry)
    }
}

/// Clone a call once per syscall name its entry point implements
///
/// Returns nothing when the entry point has no syscall on supported arches.
pub fn rename_syscall(call: &Call, identities: &IdentityMap) -> Vec<Node> {
    let Some(names) = identities.get(&call.call_name) else {
        return Vec::new();
    };
    let variant = match call.name.strip_prefix(call.call_name.as_str()) {
        Some(v) if !v.is_empty() => v,
        _ => AUTO_VARIANT,
    };
    names
        .iter()
        .map(|name| {
            let mut renamed = call.clone();
            renamed.name = format!("{name}{variant}");
            renamed.call_name = name.clone();
            Node::Call(renamed)
        })
        .collect()
}

/// Parse an `INTERFACE: kind name const func access` annotation
///
/// `-` marks an absent field. Syscall annotations name an entry point and
/// expand to one record per syscall name it implements.
pub fn parse_annotation(
    text: &str,
    file: &str,
    identities: &IdentityMap,
) -> Result<Vec<Interface>> {
    let mut fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(DeclextractError::MalformedAnnotation {
            text: text.to_string(),
        });
    }
    for field in fields.iter_mut() {
        if *field == "-" {
            *field = "";
        }
    }
    let iface = Interface {
        kind: fields[1].to_string(),
        name: fields[2].to_string(),
        files: vec![file.to_string()],
        identifying_const: fields[3].to_string(),
        func: fields[4].to_string(),
        access: fields[5].to_string(),
        ..Default::default()
    };
    if iface.kind != SYSCALL_KIND {
        return Ok(vec![iface]);
    }
    let names = identities.get(&iface.name).map(Vec::as_slice).unwrap_or_default();
    Ok(names
        .iter()
        .map(|name| Interface {
            name: name.clone(),
            identifying_const: format!("__NR_{name}"),
            ..iface.clone()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn identities() -> IdentityMap {
        IdentityMap::from([
            (
                "setuid16".to_string(),
                vec!["setuid".to_string(), "setuid32".to_string()],
            ),
            ("read".to_string(), vec!["read".to_string()]),
        ])
    }

    fn ingest(text: &str, file: &str) -> (Vec<Node>, Registry) {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/src"), Path::new("/build"));
        ing.ingest(text, file).unwrap();
        ing.finish()
    }

    fn call_names(nodes: &[Node]) -> Vec<&str> {
        nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Call)
            .map(Node::name)
            .collect()
    }

    #[test]
    fn test_syscall_expanded_to_all_names() {
        let (nodes, _) = ingest("setuid16$variant(uid uid)\n", "kernel/uid16.c");
        assert_eq!(call_names(&nodes), vec!["setuid$variant", "setuid32$variant"]);
        let Node::Call(call) = &nodes[1] else {
            panic!("expected call");
        };
        assert_eq!(call.call_name, "setuid32");
    }

    #[test]
    fn test_syscall_without_variant_gets_auto() {
        let (nodes, _) = ingest("read(fd fd, buf buffer[out])\n", "fs/read_write.c");
        assert_eq!(call_names(&nodes), vec!["read$auto"]);
    }

    #[test]
    fn test_unknown_entry_point_dropped() {
        let (nodes, _) = ingest("sparc_only$x(a int32)\nfoo = A\n", "arch/sparc/x.c");
        assert!(call_names(&nodes).is_empty());
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_include_rewritten_into_source_tree() {
        let (nodes, _) = ingest(
            "include <include/uapi/linux/fs.h>\ninclude </elsewhere/x.h>\n",
            "fs/ioctl.c",
        );
        assert_eq!(
            nodes[0].name(),
            "../build/include/uapi/linux/fs.h"
        );
        assert_eq!(nodes[1].name(), "../build/elsewhere/x.h");
    }

    #[test]
    fn test_include_same_tree_is_source_relative() {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/linux"), Path::new("/linux"));
        ing.ingest("include <include/linux/types.h>\n", "x.c").unwrap();
        assert_eq!(ing.nodes()[0].name(), "include/linux/types.h");
    }

    #[test]
    fn test_include_rewrite_failure_keeps_path() {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/linux"), Path::new("obj"));
        ing.ingest("include <include/linux/types.h>\n", "x.c").unwrap();
        assert_eq!(ing.nodes()[0].name(), "include/linux/types.h");
    }

    #[test]
    fn test_annotation_becomes_interface() {
        let (nodes, reg) = ingest(
            "# INTERFACE: IOCTL FOO FOO_CONST foo_ioctl -\n# regular comment\n",
            "drivers/foo.c",
        );
        assert_eq!(nodes.len(), 1, "annotation comments are consumed");
        let iface = reg.get("IOCTL/FOO").unwrap();
        assert_eq!(iface.identifying_const, "FOO_CONST");
        assert_eq!(iface.func, "foo_ioctl");
        assert_eq!(iface.access, "");
        assert_eq!(iface.files, vec!["drivers/foo.c"]);
    }

    #[test]
    fn test_syscall_annotation_expands() {
        let (_, reg) = ingest(
            "# INTERFACE: SYSCALL setuid16 - setuid16 admin\n",
            "kernel/uid16.c",
        );
        assert_eq!(reg.len(), 2);
        assert_eq!(
            reg.get("SYSCALL/setuid32").unwrap().identifying_const,
            "__NR_setuid32"
        );
        assert_eq!(reg.get("SYSCALL/setuid").unwrap().access, "admin");
    }

    #[test]
    fn test_unknown_syscall_annotation_ignored() {
        let (_, reg) = ingest("# INTERFACE: SYSCALL nosuch - nosuch -\n", "x.c");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_malformed_annotation_is_fatal() {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/src"), Path::new("/build"));
        let err = ing
            .ingest("# INTERFACE: IOCTL FOO FOO_CONST\n", "x.c")
            .unwrap_err();
        assert!(matches!(err, DeclextractError::MalformedAnnotation { .. }));
    }

    #[test]
    fn test_parse_failure_names_unit() {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/src"), Path::new("/build"));
        let err = ing.ingest("??? garbage\n", "net/bad.c").unwrap_err();
        match err {
            DeclextractError::Parse { file, message } => {
                assert_eq!(file, "net/bad.c");
                assert!(message.contains("??? garbage"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_annotations_fail() {
        let ids = identities();
        let mut ing = Ingestor::new(&ids, Path::new("/src"), Path::new("/build"));
        ing.ingest("# INTERFACE: IOCTL FOO A f r\n", "a.c").unwrap();
        let err = ing
            .ingest("# INTERFACE: IOCTL FOO B f r\n", "b.c")
            .unwrap_err();
        assert!(matches!(err, DeclextractError::IdentityConflict { .. }));
        let kept = ing.registry().get("IOCTL/FOO").unwrap();
        assert_eq!(kept.identifying_const, "A");
        assert_eq!(kept.files, vec!["a.c"]);
    }
}
