//! The layered binding environment.
//!
//! Maps each `let` definition site to the AST expression currently acting as
//! its value. The environment is a stack of layers: control-flow constructs
//! push a layer before generating a path, extract the layer's delta (its
//! *overlay*) when the path ends, and join overlays from parallel paths into
//! the raw material for phi construction.
//!
//! Layers are keyed and iterated by `StmtId`, so every overlay and join walks
//! its entries in arena order; phi emission order is thus a deterministic
//! function of the input AST.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{ExprId, StmtId};

/// The delta of one control-flow path: every binding set above some level.
pub type Overlay = BTreeMap<StmtId, ExprId>;

/// A stack of binding layers. Lookup searches top-down.
#[derive(Debug)]
pub struct BindingEnv {
    layers: Vec<BTreeMap<StmtId, ExprId>>,
}

impl BindingEnv {
    /// A fresh environment with one base layer.
    pub fn new() -> Self {
        BindingEnv {
            layers: vec![BTreeMap::new()],
        }
    }

    /// Pushes a new layer and returns a level token for `pop_to`/`overlay`.
    pub fn push(&mut self) -> usize {
        let level = self.layers.len();
        self.layers.push(BTreeMap::new());
        level
    }

    /// Discards every layer at or above `level` (a token from `push`).
    /// The set of visible bindings afterwards is exactly what it was before
    /// the matching `push`.
    pub fn pop_to(&mut self, level: usize) {
        debug_assert!(level >= 1, "cannot pop the base layer");
        self.layers.truncate(level);
    }

    /// Binds `def` in the topmost layer.
    pub fn set(&mut self, def: StmtId, value: ExprId) {
        self.layers
            .last_mut()
            .expect("binding environment always has a base layer")
            .insert(def, value);
    }

    /// The binding visible for `def`, searching layers top-down.
    pub fn get(&self, def: StmtId) -> Option<ExprId> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(&def).copied())
    }

    pub fn has(&self, def: StmtId) -> bool {
        self.get(def).is_some()
    }

    /// Flattens every layer at or above `level` into a single map: the delta
    /// of the control-flow path entered at `level`.
    pub fn overlay(&self, level: usize) -> Overlay {
        let mut out = Overlay::new();
        for layer in &self.layers[level.min(self.layers.len())..] {
            for (&def, &value) in layer {
                out.insert(def, value);
            }
        }
        out
    }

    /// Joins overlays from `n` parallel control-flow paths.
    ///
    /// For each `let` bound in any overlay, produces a vector of length `n`
    /// whose i-th element is the binding from overlay i if present, else the
    /// binding currently visible in the environment. Callers invoke this
    /// after popping back to the join level, so "currently visible" is the
    /// value from below the join.
    ///
    /// A `let` that is missing from some overlay *and* has no visible binding
    /// was declared inside one of the paths; it is out of scope at the join
    /// and is skipped.
    pub fn join_overlays(&self, overlays: &[Overlay]) -> BTreeMap<StmtId, Vec<ExprId>> {
        let mut keys: BTreeSet<StmtId> = BTreeSet::new();
        for overlay in overlays {
            keys.extend(overlay.keys().copied());
        }

        let mut out = BTreeMap::new();
        'keys: for key in keys {
            let mut values = Vec::with_capacity(overlays.len());
            for overlay in overlays {
                match overlay.get(&key).copied().or_else(|| self.get(key)) {
                    Some(value) => values.push(value),
                    None => continue 'keys,
                }
            }
            out.insert(key, values);
        }
        out
    }

    /// All `let`s with a visible binding, in arena order. Used to seed loop
    /// header phis.
    pub fn keys(&self) -> BTreeSet<StmtId> {
        let mut out = BTreeSet::new();
        for layer in &self.layers {
            out.extend(layer.keys().copied());
        }
        out
    }
}

impl Default for BindingEnv {
    fn default() -> Self {
        Self::new()
    }
}
