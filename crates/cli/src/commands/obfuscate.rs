/// Module for the `obfuscate` subcommand, which applies the obfuscation passes to a module.
///
/// This module reads a JSON-serialized module, runs the enabled passes over every function, and
/// writes the transformed module. It can also emit the per-pass report, sample the result against
/// the original with the reference interpreter, and dump one Graphviz file per function.
use anyhow::{Context, bail};
use clap::Args;
use murk_transform::{ObfuscationConfig, obfuscate_module};
use murk_verification::{SampleConfig, check_module_equivalence};
use std::fs;
use std::path::PathBuf;

/// Arguments for the `obfuscate` subcommand.
#[derive(Args)]
pub struct ObfuscateArgs {
    /// Module JSON file.
    pub input: PathBuf,
    /// Seed as eight hex digits, optionally 0x-prefixed (default: drawn from the OS).
    #[arg(long)]
    seed: Option<String>,
    /// Enable control-flow flattening for every function.
    #[arg(long)]
    fla: bool,
    /// Enable bogus control flow for every function.
    #[arg(long)]
    bcf: bool,
    /// Enable instruction substitution for every function.
    #[arg(long)]
    sub: bool,
    /// Number of substitution rounds (default: 1).
    #[arg(long)]
    sub_loop: Option<String>,
    /// Output file for the obfuscated module (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Path to emit the per-pass report as JSON (optional).
    #[arg(long)]
    emit: Option<PathBuf>,
    /// Check the result against the original on this many random inputs per function.
    #[arg(long, value_name = "SAMPLES")]
    verify: Option<usize>,
    /// Directory to write one Graphviz file per obfuscated function.
    #[arg(long)]
    dot_dir: Option<PathBuf>,
}

impl super::Command for ObfuscateArgs {
    fn execute(self) -> anyhow::Result<()> {
        let mut module = super::load_module(&self.input)?;
        let config = ObfuscationConfig::from_settings(
            self.seed.as_deref(),
            self.sub_loop.as_deref(),
            self.sub,
            self.bcf,
            self.fla,
        )?;
        tracing::info!(
            "obfuscating {} functions with seed {:08x}",
            module.functions.len(),
            config.seed
        );

        let original = self.verify.map(|_| module.clone());
        let report = obfuscate_module(&mut module, &config)?;
        for name in report.failed_functions() {
            tracing::warn!("{name}: a pass failed, the function keeps its last good form");
        }

        if let (Some(samples), Some(original)) = (self.verify, original.as_ref()) {
            let sample_config = SampleConfig {
                samples,
                seed: u64::from(config.seed),
                ..SampleConfig::default()
            };
            let reports = check_module_equivalence(original, &module, &sample_config)?;
            let mut broken = Vec::new();
            for r in &reports {
                tracing::info!(
                    "{:>14} compared {} inputs ({} inconclusive), {} mismatches",
                    r.function,
                    r.compared,
                    r.inconclusive,
                    r.mismatches.len()
                );
                if !r.is_equivalent() {
                    broken.push(r.function.as_str());
                }
            }
            if !broken.is_empty() {
                bail!("obfuscated functions disagree with the original: {}", broken.join(", "));
            }
        }

        if let Some(dir) = &self.dot_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for func in &module.functions {
                let path = dir.join(format!("{}.dot", func.name));
                fs::write(&path, super::cfg::generate_dot(func))
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }

        if let Some(path) = &self.emit {
            fs::write(path, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("report written to {}", path.display());
        }

        let json = serde_json::to_string_pretty(&module)?;
        super::write_output(self.output.as_deref(), &json)
    }
}
