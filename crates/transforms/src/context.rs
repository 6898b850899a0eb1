//! State shared by all passes of one obfuscation run.

use crate::random::RandomEngine;
use murk_core::ir::{GlobalId, GlobalTable, Ty};

/// The two globals read by the bogus-control-flow predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueGlobals {
    pub x: GlobalId,
    pub y: GlobalId,
}

/// Owns the run's random engine and the compilation unit's globals while passes execute.
///
/// The opaque-predicate globals are declared lazily, at most once per run; a unit that already
/// declares them (e.g. one obfuscated before) has its existing globals reused.
#[derive(Debug)]
pub struct ObfuscationContext {
    rng: RandomEngine,
    globals: GlobalTable,
    opaque: Option<OpaqueGlobals>,
}

impl ObfuscationContext {
    /// Name of the first opaque-predicate global.
    pub const OPAQUE_X: &'static str = "gx";
    /// Name of the second opaque-predicate global.
    pub const OPAQUE_Y: &'static str = "gy";

    /// Takes ownership of the run's engine and the unit's globals.
    pub const fn new(rng: RandomEngine, globals: GlobalTable) -> Self {
        Self {
            rng,
            globals,
            opaque: None,
        }
    }

    /// The shared random stream.
    pub fn rng(&mut self) -> &mut RandomEngine {
        &mut self.rng
    }

    /// Globals declared so far, including any opaque-predicate globals.
    pub const fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    /// Returns the opaque-predicate globals, declaring them on first use.
    pub fn opaque_globals(&mut self) -> OpaqueGlobals {
        if let Some(opaque) = self.opaque {
            return opaque;
        }
        let mut declare = |name: &str| {
            self.globals
                .lookup(name)
                .unwrap_or_else(|| self.globals.declare(name, Ty::I32, 0, true))
        };
        let opaque = OpaqueGlobals {
            x: declare(Self::OPAQUE_X),
            y: declare(Self::OPAQUE_Y),
        };
        tracing::debug!("opaque predicate globals: {:?}", opaque);
        self.opaque = Some(opaque);
        opaque
    }

    /// Hands the globals back to the compilation unit.
    pub fn into_globals(self) -> GlobalTable {
        self.globals
    }
}
