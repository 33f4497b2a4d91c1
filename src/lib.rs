//! Declextract - kernel interface description extraction driver
//!
//! This library drives a per-file extraction tool over a kernel build,
//! reconciles declarations of the same interface seen from many files,
//! writes one canonical generated description file, prunes declarations
//! the rest of the corpus does not use, and records metadata about every
//! discovered kernel interface.

pub mod ast;
pub mod cli;
pub mod compile_db;
pub mod compiler;
pub mod config;
pub mod error;
pub mod ingest;
pub mod interfaces;
pub mod orchestrator;
pub mod paths;
pub mod pipeline;
pub mod subsystem;
pub mod synth;
pub mod syscall_table;
pub mod targets;
