//! Run configuration
//!
//! Kernel locations come from a syz-manager style JSON config; everything
//! else comes from the command line.

use crate::cli::Cli;
use crate::error::{DeclextractError, Result};
use crate::orchestrator;
use crate::paths;
use crate::targets;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TARGET: &str = "linux/amd64";

/// Name of the compilation database inside the kernel build directory
pub const COMPILE_DB: &str = "compile_commands.json";

/// Name of the generated description file
pub const AUTO_FILE: &str = "auto.txt";

/// The subset of a manager config this tool reads
///
/// Unknown fields are ignored so real manager configs load unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Kernel build directory
    pub kernel_obj: PathBuf,

    /// Kernel source directory; defaults to the build directory
    #[serde(default)]
    pub kernel_src: Option<PathBuf>,

    /// Target as `os/arch`
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

impl ManagerConfig {
    pub fn load_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            DeclextractError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| DeclextractError::Config(e.to_string()))
    }

    pub fn kernel_src(&self) -> &Path {
        self.kernel_src.as_deref().unwrap_or(&self.kernel_obj)
    }

    /// Architecture part of the target, validated against supported arches
    pub fn target_arch(&self) -> Result<&str> {
        let (os, arch) = self
            .target
            .split_once('/')
            .ok_or_else(|| DeclextractError::Config(format!("bad target {:?}", self.target)))?;
        if os != "linux" {
            return Err(DeclextractError::Config(format!(
                "unsupported target OS {os:?}"
            )));
        }
        targets::lookup(arch)
            .map(|a| a.vm_arch)
            .ok_or_else(|| DeclextractError::Config(format!("unsupported target arch {arch:?}")))
    }
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub kernel_src: PathBuf,
    pub kernel_obj: PathBuf,
    pub target_arch: String,
    pub binary: PathBuf,
    pub descriptions_dir: PathBuf,
    pub subsystem_rules: Option<PathBuf>,
    pub workers: usize,
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(mgr: &ManagerConfig, cli: &Cli) -> Result<Self> {
        Ok(Self {
            kernel_src: mgr.kernel_src().to_path_buf(),
            kernel_obj: mgr.kernel_obj.clone(),
            target_arch: mgr.target_arch()?.to_string(),
            binary: cli.binary.clone(),
            descriptions_dir: cli.descriptions.clone(),
            subsystem_rules: cli.subsystems.clone(),
            workers: cli.jobs.unwrap_or_else(orchestrator::default_workers),
            seed: cli.seed,
        })
    }

    pub fn compile_db(&self) -> PathBuf {
        self.kernel_obj.join(COMPILE_DB)
    }

    pub fn auto_file(&self) -> PathBuf {
        self.descriptions_dir.join(AUTO_FILE)
    }

    /// Generated file name as it appears in corpus positions
    pub fn auto_file_name(&self) -> String {
        paths::to_slash(&self.auto_file())
    }

    pub fn interfaces_file(&self) -> PathBuf {
        self.descriptions_dir.join(format!("{AUTO_FILE}.info"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_manager_config_defaults() {
        let cfg = ManagerConfig::from_json(
            r#"{"kernel_obj": "/build/linux", "http": "127.0.0.1:56741", "procs": 8}"#,
        )
        .unwrap();
        assert_eq!(cfg.kernel_src(), Path::new("/build/linux"));
        assert_eq!(cfg.target_arch().unwrap(), "amd64");
    }

    #[test]
    fn test_manager_config_explicit() {
        let cfg = ManagerConfig::from_json(
            r#"{"kernel_obj": "/build", "kernel_src": "/src", "target": "linux/arm64"}"#,
        )
        .unwrap();
        assert_eq!(cfg.kernel_src(), Path::new("/src"));
        assert_eq!(cfg.target_arch().unwrap(), "arm64");
    }

    #[test]
    fn test_bad_targets_rejected() {
        for target in ["amd64", "freebsd/amd64", "linux/sparc64"] {
            let cfg = ManagerConfig::from_json(&format!(
                r#"{{"kernel_obj": "/b", "target": "{target}"}}"#
            ))
            .unwrap();
            assert!(cfg.target_arch().is_err(), "{target}");
        }
    }

    #[test]
    fn test_missing_kernel_obj_rejected() {
        assert!(ManagerConfig::from_json(r#"{"kernel_src": "/src"}"#).is_err());
    }

    #[test]
    fn test_run_config_paths() {
        let mgr = ManagerConfig::from_json(r#"{"kernel_obj": "/build"}"#).unwrap();
        let cli = Cli::parse_from([
            "declextract",
            "--config",
            "mgr.cfg",
            "--descriptions",
            "out/sys/linux",
            "-j",
            "3",
        ]);
        let run = RunConfig::new(&mgr, &cli).unwrap();
        assert_eq!(run.compile_db(), PathBuf::from("/build/compile_commands.json"));
        assert_eq!(run.auto_file(), PathBuf::from("out/sys/linux/auto.txt"));
        assert_eq!(run.auto_file_name(), "out/sys/linux/auto.txt");
        assert_eq!(
            run.interfaces_file(),
            PathBuf::from("out/sys/linux/auto.txt.info")
        );
        assert_eq!(run.workers, 3);
        assert_eq!(run.binary, PathBuf::from("syz-declextract"));
    }
}
