// Integration test utilities
//
// Builds a miniature kernel tree with a compilation database, syscall
// tables, a description directory and a fake extraction tool.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SYSCALL_64_TBL: &str = "\
# 64-bit system call numbers and entry vectors
0\tcommon\tread\t\t\tsys_read
3\tcommon\tclose\t\t\tsys_close
16\t64\tioctl\t\t\tsys_ioctl
105\tcommon\tsetuid\t\t\tsys_setuid
";

pub const SYSCALL_32_TBL: &str = "\
3\ti386\tread\t\t\tsys_read
23\ti386\tsetuid\t\t\tsys_setuid16
213\ti386\tsetuid32\t\tsys_setuid
";

pub const MANUAL_DESCRIPTIONS: &str = "\
resource fd[int32]: -1
close(fd fd)
";

/// Output of the extraction tool for net/a.c
pub const UNIT_A: &str = "\
# INTERFACE: IOCTL FOO FOO_CONST foo_ioctl read
include <include/uapi/linux/foo.h>
foo_arg {
\tx int32
}
unused_struct {
\ty int32
}
ioctl$FOO(fd fd, cmd const[FOO_CONST], arg ptr[in, foo_arg])
";

/// Output of the extraction tool for net/b.c
pub const UNIT_B: &str = "\
# INTERFACE: IOCTL FOO FOO_CONST foo_ioctl read
# INTERFACE: SYSCALL read - read -
# INTERFACE: SYSCALL close - close -
include <include/uapi/linux/foo.h>
foo_arg {
\tx int32
}
ioctl$FOO(fd fd, cmd const[FOO_CONST], arg ptr[in, foo_arg])
read(fd fd, buf buffer[out], count len[buf])
";

/// Shell script mimicking the extraction tool: `-p DB FILE --extra-arg=-w`
///
/// Prints `FILE.desc`, or fails with the contents of `FILE.fail` on stderr.
pub const FAKE_TOOL: &str = "#!/bin/sh
if [ -f \"$3.fail\" ]; then
    cat \"$3.fail\" >&2
    exit 1
fi
cat \"$3.desc\"
";

/// A throwaway kernel checkout where source and build trees coincide
pub struct KernelTree {
    pub dir: TempDir,
}

impl KernelTree {
    /// Tree with units net/a.c and net/b.c plus filtered-out noise
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let tree = KernelTree { dir };
        tree.write(
            "arch/x86/entry/syscalls/syscall_64.tbl",
            SYSCALL_64_TBL,
        );
        tree.write(
            "arch/x86/entry/syscalls/syscall_32.tbl",
            SYSCALL_32_TBL,
        );
        tree.write("sys/linux/sys.txt", MANUAL_DESCRIPTIONS);
        tree.add_unit("net/a.c", UNIT_A);
        tree.add_unit("net/b.c", UNIT_B);
        tree.write_compile_db();
        tree
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn descriptions(&self) -> PathBuf {
        self.root().join("sys/linux")
    }

    pub fn write(&self, rel: &str, text: &str) {
        let path = self.root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).unwrap()
    }

    /// Register a unit whose extraction prints `output`
    pub fn add_unit(&self, rel: &str, output: &str) {
        self.write(rel, "// kernel source\n");
        self.write(&format!("{rel}.desc"), output);
    }

    /// Register a unit whose extraction fails with `stderr`
    pub fn add_failing_unit(&self, rel: &str, stderr: &str) {
        self.write(rel, "// kernel source\n");
        self.write(&format!("{rel}.fail"), stderr);
    }

    /// Write compile_commands.json covering every registered unit
    pub fn write_compile_db(&self) {
        let mut units: Vec<String> = walk_units(self.root());
        units.sort();
        let mut entries: Vec<serde_json::Value> = units
            .iter()
            .map(|rel| {
                serde_json::json!({
                    "command": format!("clang -DKBUILD_BASENAME='\"x\"' -c {rel}"),
                    "directory": self.root(),
                    "file": self.root().join(rel),
                })
            })
            .collect();
        entries.push(serde_json::json!({
            "command": "gcc -DKBUILD_BASENAME='\"fixdep\"' -c scripts/basic/fixdep.c",
            "directory": self.root(),
            "file": self.root().join("scripts/basic/fixdep.c"),
        }));
        self.write(
            "compile_commands.json",
            &serde_json::to_string_pretty(&entries).unwrap(),
        );
    }

    /// Manager config pointing at this tree
    pub fn write_manager_config(&self) -> PathBuf {
        let path = self.root().join("manager.cfg");
        let cfg = serde_json::json!({
            "target": "linux/amd64",
            "kernel_obj": self.root(),
            "sandbox": "none",
        });
        fs::write(&path, cfg.to_string()).unwrap();
        path
    }

    /// Install the fake extraction tool and return its path
    #[cfg(unix)]
    pub fn install_fake_tool(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.root().join("bin/syz-declextract");
        self.write("bin/syz-declextract", FAKE_TOOL);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// In-process extractor reading the same `.desc`/`.fail` files
    pub fn extractor(&self) -> impl Fn(&Path) -> Result<String, String> + Sync {
        |file: &Path| -> Result<String, String> {
            let fail = PathBuf::from(format!("{}.fail", file.display()));
            if fail.exists() {
                return Err(fs::read_to_string(fail).unwrap());
            }
            fs::read_to_string(format!("{}.desc", file.display())).map_err(|e| e.to_string())
        }
    }
}

fn walk_units(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "c") {
                let rel = path.strip_prefix(root).unwrap();
                out.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    out
}
