//! Corpus-level checks over description files
//!
//! Provides the two whole-corpus queries the pipeline needs: which constants
//! each file uses, and which declarations nothing reaches. Both operate on an
//! explicit [`Corpus`] so callers decide exactly which files participate.

use crate::ast::{self, Description, Node, NodeKind, Pos};
use crate::error::{DeclextractError, Result};
use crate::paths;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Parsed description files keyed by file name, in name order
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub files: BTreeMap<String, Description>,
}

impl Corpus {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.files.values().flat_map(|d| d.nodes.iter())
    }

    /// Parse named in-memory sources
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let mut corpus = Corpus::default();
        for (file, text) in sources {
            let desc = ast::parse(text, file).map_err(|e| DeclextractError::Parse {
                file: file.to_string(),
                message: e.to_string(),
            })?;
            corpus.files.insert(file.to_string(), desc);
        }
        Ok(corpus)
    }
}

/// Parse every `*.txt` description in `dir`
pub fn parse_glob(dir: &Path) -> Result<Corpus> {
    let entries = fs::read_dir(dir).map_err(|e| {
        DeclextractError::TypeCheck(format!("failed to read {}: {}", dir.display(), e))
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| DeclextractError::TypeCheck(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();

    let mut corpus = Corpus::default();
    for path in files {
        let name = paths::to_slash(&path);
        let text = fs::read_to_string(&path)
            .map_err(|e| DeclextractError::TypeCheck(format!("failed to read {name}: {e}")))?;
        let desc = ast::parse(&text, &name).map_err(|e| DeclextractError::Parse {
            file: name.clone(),
            message: e.to_string(),
        })?;
        corpus.files.insert(name, desc);
    }
    tracing::debug!("parsed {} description files", corpus.files.len());
    Ok(corpus)
}

/// Whether an identifier names a constant (upper-case by convention)
pub fn is_const_name(ident: &str) -> bool {
    ident.chars().any(|c| c.is_ascii_uppercase())
        && ident
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Constants referenced by each file of the corpus
///
/// Every real syscall contributes its `__NR_` number; pseudo-syscalls
/// (`syz_*`) have none.
pub fn extract_consts(corpus: &Corpus) -> BTreeMap<String, BTreeSet<String>> {
    let mut out = BTreeMap::new();
    for (file, desc) in &corpus.files {
        let mut consts = BTreeSet::new();
        for node in &desc.nodes {
            if let Node::Call(call) = node {
                if !call.call_name.starts_with("syz_") {
                    consts.insert(format!("__NR_{}", call.call_name));
                }
            }
            consts.extend(
                node.references()
                    .into_iter()
                    .filter(|ident| is_const_name(ident))
                    .map(str::to_string),
            );
        }
        out.insert(file.clone(), consts);
    }
    out
}

/// A declaration nothing reachable from a syscall refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unused {
    pub pos: Pos,
    pub kind: NodeKind,
    pub name: String,
}

/// Type declarations not transitively reachable from any syscall
///
/// Fails if the corpus redeclares a name, since reachability is undefined
/// for ambiguous names.
pub fn collect_unused(corpus: &Corpus) -> Result<Vec<Unused>> {
    let mut types: HashMap<&str, &Node> = HashMap::new();
    let mut calls: HashMap<&str, &Pos> = HashMap::new();
    for node in corpus.nodes() {
        let (pos, kind, name) = node.info();
        let prev = match kind {
            NodeKind::Comment | NodeKind::Include | NodeKind::NewLine => continue,
            NodeKind::Call => calls.insert(name, pos),
            NodeKind::IntFlags | NodeKind::Resource | NodeKind::TypeDef | NodeKind::Struct => {
                types.insert(name, node).map(Node::pos)
            }
        };
        if let Some(prev) = prev {
            return Err(DeclextractError::TypeCheck(format!(
                "{}:{}: {} {} redeclared, previously declared at {}:{}",
                pos.file, pos.line, kind, name, prev.file, prev.line
            )));
        }
    }

    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = corpus
        .nodes()
        .filter(|n| n.kind() == NodeKind::Call)
        .flat_map(Node::references)
        .collect();
    while let Some(name) = queue.pop() {
        let Some(node) = types.get(name) else {
            continue;
        };
        if reached.insert(name) {
            queue.extend(node.references());
        }
    }

    let unused = corpus
        .nodes()
        .filter(|n| {
            matches!(
                n.kind(),
                NodeKind::IntFlags | NodeKind::Resource | NodeKind::TypeDef | NodeKind::Struct
            ) && !reached.contains(n.name())
        })
        .map(|n| Unused {
            pos: n.pos().clone(),
            kind: n.kind(),
            name: n.name().to_string(),
        })
        .collect();
    Ok(unused)
}
