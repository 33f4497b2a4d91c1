//! Kernel interface registry
//!
//! Interfaces are announced by `INTERFACE:` annotations in the extracted
//! descriptions. The same interface is typically seen from several
//! translation units; records are merged by identity during ingestion and
//! finalized once into a sorted list.

use crate::compiler::{self, Corpus};
use crate::error::{DeclextractError, Result};
use crate::subsystem::{Crash, Extractor};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

/// Interface kind whose names are syscall entry points
pub const SYSCALL_KIND: &str = "SYSCALL";

/// Access class used when an annotation does not specify one
pub const UNKNOWN_ACCESS: &str = "unknown";

/// One kernel-exposed interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub kind: String,
    pub name: String,
    pub files: Vec<String>,
    pub func: String,
    pub access: String,
    pub subsystems: Vec<String>,
    pub manual_descriptions: bool,
    pub auto_descriptions: bool,
    pub identifying_const: String,
}

impl Interface {
    /// Identity key, `KIND/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// Identity-keyed interface collection
#[derive(Debug, Default)]
pub struct Registry {
    interfaces: HashMap<String, Interface>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Interface> {
        self.interfaces.get(id)
    }

    /// Merge a record into the registry
    ///
    /// Records sharing an identity must agree on the identifying constant.
    /// File lists are concatenated. Other scalar fields that disagree are
    /// resolved independently of arrival order: a non-empty value beats an
    /// empty one, otherwise the smaller value wins.
    pub fn merge(&mut self, iface: Interface) -> Result<()> {
        let prev = match self.interfaces.entry(iface.id()) {
            Entry::Vacant(slot) => {
                slot.insert(iface);
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };
        let id = iface.id();
        if prev.identifying_const != iface.identifying_const {
            return Err(DeclextractError::IdentityConflict {
                id,
                incoming: iface.identifying_const,
                previous: prev.identifying_const.clone(),
            });
        }
        prev.files.extend(iface.files);
        merge_scalar(&id, "func", &mut prev.func, iface.func);
        merge_scalar(&id, "access", &mut prev.access, iface.access);
        Ok(())
    }

    /// Produce the final, sorted interface list
    ///
    /// Deduplicates file lists, resolves owning subsystems, defaults the
    /// access class and marks which description corpora mention each
    /// interface's identifying constant.
    pub fn finish(
        self,
        extractor: &Extractor,
        corpus: &Corpus,
        auto_file: &str,
    ) -> Vec<Interface> {
        let mut interfaces: Vec<Interface> = self
            .interfaces
            .into_values()
            .map(|mut iface| {
                iface.files.sort();
                iface.files.dedup();
                let crashes: Vec<Crash> = iface
                    .files
                    .iter()
                    .map(|file| Crash {
                        guilty_path: file.clone(),
                    })
                    .collect();
                iface.subsystems = extractor.extract(&crashes);
                iface.subsystems.sort();
                if iface.access.is_empty() {
                    iface.access = UNKNOWN_ACCESS.to_string();
                }
                iface
            })
            .collect();
        interfaces.sort_by_key(Interface::id);
        check_description_presence(&mut interfaces, corpus, auto_file);
        interfaces
    }
}

fn merge_scalar(id: &str, field: &str, prev: &mut String, incoming: String) {
    if *prev == incoming {
        return;
    }
    if !prev.is_empty() && !incoming.is_empty() {
        tracing::warn!(
            "interface {} has different {} values: {} vs {}",
            id,
            field,
            incoming,
            prev
        );
    }
    if prev.is_empty() || (!incoming.is_empty() && incoming < *prev) {
        *prev = incoming;
    }
}

/// Set the manual/auto description flags from the corpus constants
pub fn check_description_presence(
    interfaces: &mut [Interface],
    corpus: &Corpus,
    auto_file: &str,
) {
    let mut auto = BTreeSet::new();
    let mut manual = BTreeSet::new();
    for (file, consts) in compiler::extract_consts(corpus) {
        if file == auto_file {
            auto.extend(consts);
        } else {
            manual.extend(consts);
        }
    }
    for iface in interfaces.iter_mut() {
        if auto.contains(&iface.identifying_const) {
            iface.auto_descriptions = true;
        }
        if manual.contains(&iface.identifying_const) {
            iface.manual_descriptions = true;
        }
    }
}

/// Render interfaces as tab-separated lines
pub fn serialize_interfaces(interfaces: &[Interface]) -> String {
    let mut w = String::new();
    for iface in interfaces {
        let _ = write!(
            w,
            "{}\t{}\tfunc:{}\taccess:{}\tmanual_desc:{}\tauto_desc:{}",
            iface.kind,
            iface.name,
            iface.func,
            iface.access,
            iface.manual_descriptions,
            iface.auto_descriptions
        );
        for file in &iface.files {
            let _ = write!(w, "\tfile:{file}");
        }
        for subsystem in &iface.subsystems {
            let _ = write!(w, "\tsubsystem:{subsystem}");
        }
        w.push('\n');
    }
    w
}
