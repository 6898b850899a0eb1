use crate::config::ObfuscationConfig;
use crate::context::ObfuscationContext;
use crate::gate::should_apply;
use crate::{BogusFlow, Flatten, Substitution, Transform};
use murk_analysis::loops::fixup_loops;
use murk_analysis::metrics::{collect_metrics, compare};
use murk_core::cfg_ir::Function;
use murk_utils::errors::TransformError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What happened when one pass met one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass ran to completion.
    Applied {
        changed: bool,
        block_delta: i64,
        edge_delta: i64,
        /// Potency difference; absent when metrics could not be computed.
        potency_delta: Option<f64>,
    },
    /// The gate kept the pass off this function.
    Skipped,
    /// The pass failed; the function was restored to its state before the pass and no later
    /// pass ran on it.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub pass: String,
    #[serde(flatten)]
    pub outcome: PassOutcome,
}

/// Per-function record of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub function: String,
    pub passes: Vec<PassRecord>,
}

impl FunctionReport {
    pub fn failed(&self) -> bool {
        self.passes
            .iter()
            .any(|p| matches!(p.outcome, PassOutcome::Failed { .. }))
    }
}

/// A fixed sequence of passes, each with its default enablement.
pub struct Pipeline {
    passes: Vec<(Box<dyn Transform>, bool)>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.passes.iter().map(|(p, on)| (p.name(), on)))
            .finish()
    }
}

impl Pipeline {
    /// Builds the pipeline from an explicit pass list.
    pub fn new(passes: Vec<(Box<dyn Transform>, bool)>) -> Self {
        Self { passes }
    }

    /// SUB, then BCF, then FLA. Substitution goes first so the structural passes see the rewritten
    /// code, and BCF precedes FLA so its junk blocks are flattened too.
    pub fn from_config(config: &ObfuscationConfig) -> Self {
        Self::new(vec![
            (Box::new(Substitution::new(config.sub_loop)), config.enable_sub),
            (Box::new(BogusFlow::new()), config.enable_bcf),
            (Box::new(Flatten::new()), config.enable_fla),
        ])
    }

    /// Runs every gated pass on `func`.
    ///
    /// Each pass works on a snapshot that replaces the function only when the pass succeeds and
    /// leaves a structurally valid graph. A failure stops the pipeline for this function.
    pub fn run(&self, func: &mut Function, ctx: &mut ObfuscationContext) -> FunctionReport {
        let mut report = FunctionReport {
            function: func.name.clone(),
            passes: Vec::with_capacity(self.passes.len()),
        };

        for (pass, default_enabled) in &self.passes {
            let name = pass.name();
            if !should_apply(*default_enabled, &func.attributes, name) {
                report.passes.push(PassRecord {
                    pass: name.to_owned(),
                    outcome: PassOutcome::Skipped,
                });
                continue;
            }

            let mut snapshot = func.clone();
            if snapshot.loops.needs_fixup() {
                fixup_loops(&mut snapshot);
            }
            let before = collect_metrics(&snapshot).ok();

            let result = pass.apply(&mut snapshot, ctx).and_then(|changed| {
                snapshot
                    .verify_in(ctx.globals())
                    .map_err(TransformError::from)?;
                Ok(changed)
            });

            match result {
                Ok(changed) => {
                    let after = collect_metrics(&snapshot).ok();
                    let potency_delta = before.as_ref().zip(after.as_ref()).map(|(b, a)| compare(b, a));
                    info!(
                        "{:>14} Δ{:+.2} {}",
                        format!("{}:{}", func.name, name),
                        potency_delta.unwrap_or(0.0),
                        if changed { "✓" } else { "·" }
                    );
                    let block_delta = snapshot.cfg.node_count() as i64 - func.cfg.node_count() as i64;
                    let edge_delta = snapshot.cfg.edge_count() as i64 - func.cfg.edge_count() as i64;
                    *func = snapshot;
                    report.passes.push(PassRecord {
                        pass: name.to_owned(),
                        outcome: PassOutcome::Applied {
                            changed,
                            block_delta,
                            edge_delta,
                            potency_delta,
                        },
                    });
                }
                Err(e) => {
                    warn!("{} failed on {}: {}; function left as before the pass", name, func.name, e);
                    report.passes.push(PassRecord {
                        pass: name.to_owned(),
                        outcome: PassOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                    break;
                }
            }
        }
        report
    }
}
