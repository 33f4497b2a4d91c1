//! Syscall identity resolution from kernel `.tbl` files
//!
//! Functions defined with `SYSCALL_DEFINE` are referred to by their entry
//! point name, while the fuzzer needs the syscall names exposed to user
//! space. The per-arch tables map between the two:
//!
//! ```text
//! 288      common  accept4                 sys_accept4
//! ```
//!
//! The mapping is many-to-many. For every syscall name we pick one entry
//! point, preferring the build target arch, then 64-bit entries, then arch
//! name order so the result is deterministic.

use crate::error::{DeclextractError, Result};
use crate::targets::{Arch, LINUX_ARCHES};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Pseudo-syscall that is emitted by the extraction tool under its own name
pub const GENETLINK_FAMILY_ID: &str = "syz_genetlink_get_family_id";

/// Entry point name → syscall names, canonical first
pub type IdentityMap = HashMap<String, Vec<String>>;

/// One (entry point, syscall) pair read from a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallTableEntry {
    pub entry_point: String,
    pub arch: String,
    pub syscall: String,
    pub is_64bit: bool,
}

/// Parse one table line, returning `None` for lines that do not describe a
/// usable syscall
pub fn parse_table_line(line: &str, arch: &str) -> Option<SyscallTableEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 || fields[0].starts_with('#') {
        return None;
    }
    let group = fields[1];
    let syscall = fields[2];
    let entry_point = fields[3].strip_prefix("sys_").unwrap_or(fields[3]);
    if syscall.starts_with("unused") || entry_point == "-" || is_excluded(group, syscall) {
        return None;
    }
    Some(SyscallTableEntry {
        entry_point: entry_point.to_string(),
        arch: arch.to_string(),
        syscall: syscall.to_string(),
        is_64bit: group == "common" || group.contains("64"),
    })
}

fn is_excluded(group: &str, syscall: &str) -> bool {
    // powerpc "spu" defines calls (utimesat) that exist on none of our arches.
    group == "spu"
        // arm64 pulls scripts/syscall.tbl, which lists llseek for 32-bit only.
        || syscall == "llseek"
        // Not fuzzed.
        || syscall == "reboot"
}

/// Read all syscall tables of the supported arches under `kernel_src`
pub fn read_syscall_map(kernel_src: &Path, target_arch: &str) -> Result<IdentityMap> {
    read_syscall_map_for(kernel_src, target_arch, LINUX_ARCHES)
}

/// Same as [`read_syscall_map`] for an explicit arch list
///
/// Fails when no table exists for `target_arch`, since every syscall would
/// otherwise be dropped from the output.
pub fn read_syscall_map_for(
    kernel_src: &Path,
    target_arch: &str,
    arches: &[Arch],
) -> Result<IdentityMap> {
    let mut entries = Vec::new();
    let mut target_tables = 0;
    for arch in arches {
        let dir = kernel_src.join("arch").join(arch.kernel_header_arch);
        if !dir.exists() {
            tracing::debug!("no arch directory {}", dir.display());
            continue;
        }
        for walk in WalkDir::new(&dir).sort_by_file_name() {
            let walk = walk.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                DeclextractError::SyscallTable {
                    path,
                    source: e.into(),
                }
            })?;
            let path = walk.path();
            if !walk.file_type().is_file() || path.extension().map_or(true, |ext| ext != "tbl") {
                continue;
            }
            let data = fs::read_to_string(path).map_err(|source| {
                DeclextractError::SyscallTable {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            entries.extend(
                data.lines()
                    .filter_map(|line| parse_table_line(line, arch.vm_arch)),
            );
            if arch.vm_arch == target_arch {
                target_tables += 1;
            }
        }
    }
    if target_tables == 0 {
        return Err(DeclextractError::Config(format!(
            "no syscall tables for {} under {}",
            target_arch,
            kernel_src.join("arch").display()
        )));
    }
    let map = resolve_identities(entries, target_arch);
    tracing::info!("resolved {} syscall entry points", map.len());
    Ok(map)
}

/// Pick a canonical entry point for every syscall name
pub fn resolve_identities(entries: Vec<SyscallTableEntry>, target_arch: &str) -> IdentityMap {
    let mut by_syscall: BTreeMap<String, Vec<SyscallTableEntry>> = BTreeMap::new();
    for entry in entries {
        by_syscall
            .entry(entry.syscall.clone())
            .or_default()
            .push(entry);
    }

    let mut rename = IdentityMap::new();
    rename.insert(
        GENETLINK_FAMILY_ID.to_string(),
        vec![GENETLINK_FAMILY_ID.to_string()],
    );
    for (syscall, mut descs) in by_syscall {
        descs.sort_by(|a, b| {
            (b.arch == target_arch)
                .cmp(&(a.arch == target_arch))
                .then(b.is_64bit.cmp(&a.is_64bit))
                .then(a.arch.cmp(&b.arch))
        });
        let entry_point = descs[0].entry_point.clone();
        rename.entry(entry_point).or_default().push(syscall);
    }
    rename
}
