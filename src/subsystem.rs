//! Kernel subsystem classification by source path
//!
//! The classifier answers "which subsystems own these files". It is phrased
//! in terms of crash reports (one [`Crash`] per guilty file) so the same rule
//! list can serve crash triage and interface ownership alike.

use crate::error::{DeclextractError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Minimal crash descriptor; only the guilty file is consulted
#[derive(Debug, Clone, Default)]
pub struct Crash {
    pub guilty_path: String,
}

/// One subsystem as written in a rules file
#[derive(Debug, Clone, Deserialize)]
pub struct SubsystemRule {
    pub name: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    subsystem: Vec<SubsystemRule>,
}

#[derive(Debug)]
struct Subsystem {
    name: String,
    paths: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Subsystem {
    fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|re| re.is_match(path))
            && !self.exclude.iter().any(|re| re.is_match(path))
    }
}

/// Path-rule based subsystem extractor
#[derive(Debug)]
pub struct Extractor {
    subsystems: Vec<Subsystem>,
}

const BUILTIN_RULES: &str = r#"
[[subsystem]]
name = "block"
paths = ["^block/", "^drivers/block/"]

[[subsystem]]
name = "bpf"
paths = ["^kernel/bpf/", "^net/core/filter\\.c$", "^net/bpf/"]

[[subsystem]]
name = "btrfs"
paths = ["^fs/btrfs/"]

[[subsystem]]
name = "crypto"
paths = ["^crypto/"]

[[subsystem]]
name = "ext4"
paths = ["^fs/ext4/"]

[[subsystem]]
name = "fs"
paths = ["^fs/"]
exclude = ["^fs/btrfs/", "^fs/ext4/", "^fs/nfs/"]

[[subsystem]]
name = "io-uring"
paths = ["^io_uring/"]

[[subsystem]]
name = "kernel"
paths = ["^kernel/"]
exclude = ["^kernel/bpf/"]

[[subsystem]]
name = "kvm"
paths = ["^virt/kvm/", "^arch/[^/]+/kvm/"]

[[subsystem]]
name = "mm"
paths = ["^mm/"]

[[subsystem]]
name = "net"
paths = ["^net/", "^drivers/net/"]
exclude = ["^net/bpf/", "^net/wireless/", "^net/mac80211/", "^net/bluetooth/"]

[[subsystem]]
name = "nfs"
paths = ["^fs/nfs/", "^net/sunrpc/"]

[[subsystem]]
name = "bluetooth"
paths = ["^net/bluetooth/", "^drivers/bluetooth/"]

[[subsystem]]
name = "wireless"
paths = ["^net/wireless/", "^net/mac80211/", "^drivers/net/wireless/"]

[[subsystem]]
name = "sound"
paths = ["^sound/"]

[[subsystem]]
name = "usb"
paths = ["^drivers/usb/"]

[[subsystem]]
name = "dri"
paths = ["^drivers/gpu/drm/"]

[[subsystem]]
name = "input"
paths = ["^drivers/input/", "^drivers/hid/"]

[[subsystem]]
name = "media"
paths = ["^drivers/media/"]

[[subsystem]]
name = "security"
paths = ["^security/"]
"#;

impl Extractor {
    /// Build an extractor from parsed rules
    pub fn new(rules: Vec<SubsystemRule>) -> Result<Self> {
        let compile = |patterns: &[String], name: &str| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        DeclextractError::SubsystemRules(format!("{name}: bad pattern {p:?}: {e}"))
                    })
                })
                .collect()
        };
        let mut subsystems = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.paths.is_empty() {
                return Err(DeclextractError::SubsystemRules(format!(
                    "{} has no paths",
                    rule.name
                )));
            }
            subsystems.push(Subsystem {
                paths: compile(&rule.paths, &rule.name)?,
                exclude: compile(&rule.exclude, &rule.name)?,
                name: rule.name,
            });
        }
        Ok(Self { subsystems })
    }

    /// Parse a TOML rules document
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: RulesFile =
            toml::from_str(text).map_err(|e| DeclextractError::SubsystemRules(e.to_string()))?;
        Self::new(file.subsystem)
    }

    /// Load a TOML rules file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            DeclextractError::SubsystemRules(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// The built-in Linux rule list
    pub fn linux() -> Result<Self> {
        Self::from_toml(BUILTIN_RULES)
    }

    /// Subsystems owning any of the crashes' guilty files, deduplicated
    pub fn extract(&self, crashes: &[Crash]) -> Vec<String> {
        let mut names = BTreeSet::new();
        for crash in crashes {
            for subsystem in &self.subsystems {
                if subsystem.matches(&crash.guilty_path) {
                    names.insert(subsystem.name.clone());
                }
            }
        }
        names.into_iter().collect()
    }
}
