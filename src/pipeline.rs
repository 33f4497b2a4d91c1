//! End-to-end extraction run
//!
//! ```text
//! compile_commands.json ─▶ select ─▶ extract (parallel) ─▶ ingest ─┬─▶ synthesize ─▶ auto.txt
//!                                                                  └─▶ interfaces ─▶ auto.txt.info
//! ```

use crate::compile_db;
use crate::compiler;
use crate::config::RunConfig;
use crate::error::DeclextractError;
use crate::ingest::Ingestor;
use crate::interfaces;
use crate::orchestrator::{self, ExtractionResult, FileExtractor};
use crate::paths;
use crate::subsystem::Extractor;
use crate::syscall_table;
use crate::synth;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

/// Counters describing a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub units: usize,
    pub declarations: usize,
    pub removed: usize,
    pub interfaces: usize,
}

/// Run the whole pipeline with the given extractor and subsystem rules
pub fn run<E: FileExtractor>(
    cfg: &RunConfig,
    extractor: &E,
    subsystems: &Extractor,
) -> Result<RunSummary> {
    // A bad source tree must fail before any unit is extracted.
    let identities = syscall_table::read_syscall_map(&cfg.kernel_src, &cfg.target_arch)?;

    let compile_db = cfg.compile_db();
    let cmds = match cfg.seed {
        Some(seed) => {
            compile_db::load_compile_commands_with(&compile_db, &mut StdRng::seed_from_u64(seed))
        }
        None => compile_db::load_compile_commands(&compile_db),
    }
    .context("failed to load compile commands")?;
    let files = cmds.iter().map(|c| c.path()).collect();

    let results = orchestrator::run_extraction(extractor, files, cfg.workers);
    check_results(&results, &cfg.kernel_src)?;

    let mut ingestor = Ingestor::new(&identities, &cfg.kernel_src, &cfg.kernel_obj);
    for result in &results {
        let file = source_relative(&cfg.kernel_src, &result.file)?;
        ingestor.ingest(&result.output, &file)?;
    }
    let (nodes, registry) = ingestor.finish();
    tracing::info!(
        "collected {} declarations and {} interfaces",
        nodes.len(),
        registry.len()
    );

    let auto_file = cfg.auto_file();
    let auto_name = cfg.auto_file_name();
    let mut desc = synth::finish_descriptions(nodes)?;
    synth::write_descriptions(&auto_file, &desc)?;
    // Unused analysis needs the manual descriptions too, since generated
    // declarations refer to manually defined types; so write first, then
    // re-read the whole directory.
    let corpus = compiler::parse_glob(&cfg.descriptions_dir)?;
    let removed = synth::remove_unused(&mut desc, &corpus, &auto_name)?;
    synth::write_descriptions(&auto_file, &desc)?;

    let corpus = compiler::parse_glob(&cfg.descriptions_dir)?;
    let ifaces = registry.finish(subsystems, &corpus, &auto_name);
    let info_file = cfg.interfaces_file();
    fs::write(&info_file, interfaces::serialize_interfaces(&ifaces)).map_err(|source| {
        DeclextractError::Write {
            path: info_file.clone(),
            source,
        }
    })?;
    tracing::info!("wrote {} interfaces to {}", ifaces.len(), info_file.display());

    Ok(RunSummary {
        units: results.len(),
        declarations: desc.len(),
        removed,
        interfaces: ifaces.len(),
    })
}

/// Fail if any unit failed to extract, after logging every failure
fn check_results(results: &[ExtractionResult], kernel_src: &Path) -> Result<(), DeclextractError> {
    let mut first = None;
    let mut failed = 0;
    for result in results {
        let Some(error) = &result.error else {
            continue;
        };
        let file = paths::relative_to(kernel_src, &result.file)
            .map_or_else(|| paths::to_slash(&result.file), |p| paths::to_slash(&p));
        tracing::error!("{}: {}", file, error.trim_end());
        failed += 1;
        first.get_or_insert((file, error.clone()));
    }
    match first {
        None => Ok(()),
        Some((file, message)) if failed == 1 => Err(DeclextractError::Extraction { file, message }),
        Some((file, message)) => Err(DeclextractError::Extraction {
            file,
            message: format!("{} (and {} more failed units)", message.trim_end(), failed - 1),
        }),
    }
}

fn source_relative(kernel_src: &Path, file: &Path) -> Result<String, DeclextractError> {
    paths::relative_to(kernel_src, file)
        .map(|p| paths::to_slash(&p))
        .ok_or_else(|| {
            DeclextractError::Config(format!(
                "{} is not relative to kernel source {}",
                file.display(),
                kernel_src.display()
            ))
        })
}
