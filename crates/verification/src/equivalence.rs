//! Sampled semantic equivalence between a function and its obfuscated form.

use crate::semantics::{Outcome, execute};
use murk_core::cfg_ir::{Function, Module};
use murk_core::ir::{GlobalTable, Ty};
use murk_utils::errors::{ExecError, VerifyError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How many inputs to try and how long each run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Random argument vectors, on top of the boundary vectors.
    pub samples: usize,
    pub seed: u64,
    /// Block budget of the original function per input.
    pub fuel: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            samples: 64,
            seed: 0,
            fuel: 100_000,
        }
    }
}

/// What one version of the function did for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observed {
    Returned { ret: Option<i64>, globals: Vec<i64> },
    DivisionByZero,
    Error(String),
}

/// An input on which the two versions disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub args: Vec<i64>,
    pub expected: Observed,
    pub actual: Observed,
}

/// Result of comparing one function pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub function: String,
    /// Inputs on which both versions were compared.
    pub compared: usize,
    /// Inputs skipped because the original ran out of fuel.
    pub inconclusive: usize,
    pub mismatches: Vec<Mismatch>,
}

impl EquivalenceReport {
    pub fn is_equivalent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Interesting values of a type: zero, one, minus one and the bounds.
fn boundary_values(ty: Ty) -> Vec<i64> {
    let mut values = vec![
        0,
        1,
        ty.normalize(-1),
        ty.min_value(),
        ty.max_value(),
    ];
    values.sort_unstable();
    values.dedup();
    values
}

fn argument_vectors(param_tys: &[Ty], config: &SampleConfig) -> Vec<Vec<i64>> {
    let mut vectors = Vec::new();
    let widest = param_tys
        .iter()
        .map(|&ty| boundary_values(ty).len())
        .max()
        .unwrap_or(1);
    for i in 0..widest {
        vectors.push(
            param_tys
                .iter()
                .map(|&ty| {
                    let values = boundary_values(ty);
                    values[i % values.len()]
                })
                .collect(),
        );
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    for _ in 0..config.samples {
        vectors.push(
            param_tys
                .iter()
                .map(|&ty| {
                    // Small magnitudes keep loop-driven code within the fuel budget.
                    let raw = if rng.random_bool(0.5) {
                        rng.random_range(-64..=64)
                    } else {
                        rng.random::<i64>()
                    };
                    ty.normalize(raw)
                })
                .collect(),
        );
    }
    vectors
}

fn signature(func: &Function) -> Result<(Vec<Ty>, Option<Ty>), VerifyError> {
    let tys = func
        .params
        .iter()
        .map(|&p| {
            func.local(p)
                .map(|l| l.ty)
                .ok_or_else(|| VerifyError::SignatureMismatch(format!("{}: dangling parameter", func.name)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((tys, func.ret_ty))
}

/// Globals of `table` by name, so that globals added by obfuscation are ignored.
fn observe(result: Result<Outcome, ExecError>, table: &GlobalTable, keep: &[String]) -> Observed {
    match result {
        Ok(out) => {
            let globals = keep
                .iter()
                .map(|name| {
                    table
                        .lookup(name)
                        .and_then(|id| out.globals.get(id.0 as usize).copied())
                        .unwrap_or_default()
                })
                .collect();
            Observed::Returned {
                ret: out.ret,
                globals,
            }
        }
        Err(ExecError::DivisionByZero(_)) => Observed::DivisionByZero,
        Err(e) => Observed::Error(e.to_string()),
    }
}

/// Runs `before` and `after` on the same inputs and compares what they observably do.
///
/// Return values and the final values of the globals known to `before_globals` must agree. When
/// the original divides by zero the obfuscated version must too. Inputs on which the original
/// runs out of fuel are counted as inconclusive. The obfuscated version gets a budget scaled from
/// the original's actual step count.
pub fn check_equivalence(
    before: &Function,
    before_globals: &GlobalTable,
    after: &Function,
    after_globals: &GlobalTable,
    config: &SampleConfig,
) -> Result<EquivalenceReport, VerifyError> {
    let sig = signature(before)?;
    if sig != signature(after)? {
        return Err(VerifyError::SignatureMismatch(format!(
            "{} and {} have different parameters or return types",
            before.name, after.name
        )));
    }
    let keep: Vec<String> = before_globals.iter().map(|(_, g)| g.name.clone()).collect();

    let mut report = EquivalenceReport {
        function: before.name.clone(),
        compared: 0,
        inconclusive: 0,
        mismatches: Vec::new(),
    };
    for args in argument_vectors(&sig.0, config) {
        let reference = execute(before, before_globals, &args, config.fuel);
        let budget = match &reference {
            Ok(out) => out.steps.saturating_mul(32).saturating_add(256),
            Err(ExecError::DivisionByZero(_)) => config.fuel.saturating_mul(32),
            Err(ExecError::OutOfFuel(_)) => {
                report.inconclusive += 1;
                continue;
            }
            Err(e) => return Err(VerifyError::Reference(e.clone())),
        };
        let expected = observe(reference, before_globals, &keep);
        let actual = observe(execute(after, after_globals, &args, budget), after_globals, &keep);
        report.compared += 1;
        if expected != actual {
            tracing::warn!("{}: mismatch on {:?}", before.name, args);
            report.mismatches.push(Mismatch {
                args,
                expected,
                actual,
            });
        }
    }
    Ok(report)
}

/// Compares every function of `before` with the function of the same name in `after`.
pub fn check_module_equivalence(
    before: &Module,
    after: &Module,
    config: &SampleConfig,
) -> Result<Vec<EquivalenceReport>, VerifyError> {
    before
        .functions
        .iter()
        .map(|func| {
            let other = after.function(&func.name).ok_or_else(|| {
                VerifyError::SignatureMismatch(format!("{} is missing after obfuscation", func.name))
            })?;
            check_equivalence(func, &before.globals, other, &after.globals, config)
        })
        .collect()
}
