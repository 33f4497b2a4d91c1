//! CLI argument parsing for declextract

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "declextract")]
#[command(version)]
#[command(about = "Extract, merge and prune kernel interface descriptions", long_about = None)]
pub struct Cli {
    /// Manager config file with kernel_obj/kernel_src/target
    #[arg(long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Path to the per-file extraction tool
    #[arg(long = "binary", value_name = "PATH", default_value = "syz-declextract")]
    pub binary: PathBuf,

    /// Directory with the description files; auto.txt is written here
    #[arg(long = "descriptions", value_name = "DIR", default_value = "sys/linux")]
    pub descriptions: PathBuf,

    /// TOML file with subsystem path rules (built-in Linux rules otherwise)
    #[arg(long = "subsystems", value_name = "FILE")]
    pub subsystems: Option<PathBuf>,

    /// Number of parallel extraction workers (default: available CPUs)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Seed for the compilation unit shuffle (default: random)
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// Enable debug tracing output on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
