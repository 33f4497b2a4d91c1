//! Compilation database loading and unit selection
//!
//! Reads `compile_commands.json` from the kernel build directory and keeps
//! only entries that are genuine kernel C translation units built by the
//! target compiler.

use crate::error::{DeclextractError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Define KBUILD adds to every kernel translation unit
const KBUILD_MARKER: &str = "-DKBUILD_BASENAME";

/// Host compiler; units built with it belong to host tools, not the kernel
const HOST_COMPILER: &str = "gcc";

/// One entry of a clang compilation database
#[derive(Debug, Clone, Deserialize)]
pub struct CompileEntry {
    /// Full compiler invocation
    #[serde(default)]
    pub command: String,

    /// Split invocation, used by some generators instead of `command`
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Working directory of the invocation
    pub directory: PathBuf,

    /// Translation unit
    pub file: PathBuf,
}

impl CompileEntry {
    /// The compiler invocation as a single string
    pub fn invocation(&self) -> String {
        if self.command.is_empty() {
            self.arguments.join(" ")
        } else {
            self.command.clone()
        }
    }

    /// The translation unit path, resolved against the working directory
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file)
    }

    /// Whether this entry is a kernel C unit compiled by the target compiler
    pub fn is_kernel_unit(&self) -> bool {
        let invocation = self.invocation();
        self.file.to_string_lossy().ends_with(".c")
            && !invocation.starts_with(HOST_COMPILER)
            && invocation.contains(KBUILD_MARKER)
    }
}

/// Load the compilation database and return the kernel units in random order
///
/// The order is shuffled on every run so that any dependence of the output on
/// arrival order shows up as a build difference early.
pub fn load_compile_commands(path: &Path) -> Result<Vec<CompileEntry>> {
    load_compile_commands_with(path, &mut rand::thread_rng())
}

/// Same as [`load_compile_commands`] with a caller-provided RNG
pub fn load_compile_commands_with<R: Rng + ?Sized>(
    path: &Path,
    rng: &mut R,
) -> Result<Vec<CompileEntry>> {
    let data = fs::read_to_string(path).map_err(|e| DeclextractError::CompileDb {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut cmds = parse_compile_commands(&data).map_err(|e| DeclextractError::CompileDb {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    cmds.shuffle(rng);
    tracing::debug!("selected {} kernel compilation units", cmds.len());
    Ok(cmds)
}

/// Decode a compilation database and drop non-kernel entries
pub fn parse_compile_commands(data: &str) -> serde_json::Result<Vec<CompileEntry>> {
    let mut cmds: Vec<CompileEntry> = serde_json::from_str(data)?;
    cmds.retain(CompileEntry::is_kernel_unit);
    Ok(cmds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DB: &str = r#"[
        {"command": "clang -DKBUILD_BASENAME='\"socket\"' -c net/socket.c", "directory": "/build", "file": "/src/net/socket.c"},
        {"command": "gcc -DKBUILD_BASENAME='\"fixdep\"' -c scripts/basic/fixdep.c", "directory": "/build", "file": "/src/scripts/basic/fixdep.c"},
        {"command": "clang -c tools/objtool/check.c", "directory": "/build", "file": "/src/tools/objtool/check.c"},
        {"command": "clang -DKBUILD_BASENAME='\"entry\"' -c arch/x86/entry/entry_64.S", "directory": "/build", "file": "/src/arch/x86/entry/entry_64.S"},
        {"arguments": ["clang", "-DKBUILD_BASENAME='\"namei\"'", "-c", "fs/namei.c"], "directory": "/build", "file": "/src/fs/namei.c"}
    ]"#;

    #[test]
    fn test_filter_keeps_only_kernel_c_units() {
        let cmds = parse_compile_commands(DB).unwrap();
        let files: Vec<_> = cmds.iter().map(|c| c.file.clone()).collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/src/net/socket.c"),
                PathBuf::from("/src/fs/namei.c")
            ]
        );
    }

    #[test]
    fn test_arguments_form_is_joined() {
        let cmds = parse_compile_commands(DB).unwrap();
        assert!(cmds[1].invocation().starts_with("clang -DKBUILD_BASENAME"));
    }

    #[test]
    fn test_relative_file_resolved_against_directory() {
        let cmds = parse_compile_commands(
            r#"[{"command": "clang -DKBUILD_BASENAME -c x.c", "directory": "/build", "file": "net/x.c"}]"#,
        )
        .unwrap();
        assert_eq!(cmds[0].path(), PathBuf::from("/build/net/x.c"));
        assert_eq!(
            parse_compile_commands(DB).unwrap()[0].path(),
            PathBuf::from("/src/net/socket.c")
        );
    }

    #[test]
    fn test_load_shuffles_but_keeps_multiset() {
        let mut entries = Vec::new();
        for i in 0..32 {
            entries.push(format!(
                r#"{{"command": "clang -DKBUILD_BASENAME -c f{i}.c", "directory": "/b", "file": "/s/f{i}.c"}}"#
            ));
        }
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[{}]", entries.join(",")).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let cmds = load_compile_commands_with(file.path(), &mut rng).unwrap();
        let mut names: Vec<_> = cmds.iter().map(|c| c.file.clone()).collect();
        let shuffled = names.clone();
        names.sort();
        assert_eq!(names.len(), 32);
        assert_ne!(shuffled, names, "seeded shuffle should permute 32 entries");
    }

    #[test]
    fn test_missing_database_is_error() {
        let err = load_compile_commands(Path::new("/nonexistent/compile_commands.json"))
            .unwrap_err();
        assert!(matches!(err, DeclextractError::CompileDb { .. }));
    }

    #[test]
    fn test_malformed_database_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_compile_commands(file.path()).unwrap_err();
        assert!(matches!(err, DeclextractError::CompileDb { .. }));
    }
}
