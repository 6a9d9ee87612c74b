//! Reachability pruning.
//!
//! Removes blocks no entry point or spawn target can reach, and drops phi
//! operand/target pairs that flowed in from removed predecessors. Break and
//! continue leave such blocks behind (the walker parks its cursor in a fresh
//! block after every loop exit), so pruning runs once after every walk.
//!
//! Block and statement ids are compacted and remapped; labels and value
//! numbers are untouched. Running the pass on an already-pruned program is a
//! no-op.

use std::collections::{HashMap, HashSet};

use crate::error::PassError;
use crate::ir::block::BbId;
use crate::ir::program::IrProgram;
use crate::ir::stmt::{IrStmt, IrStmtId, IrStmtKind};
use crate::pass::Pass;

pub struct PrunePass;

impl Pass for PrunePass {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn run(&mut self, prog: &mut IrProgram) -> Result<(), PassError> {
        prune(prog);
        Ok(())
    }
}

/// Runs reachability pruning on `prog`.
pub fn prune(prog: &mut IrProgram) {
    let reachable = mark_reachable(prog);

    // Drop phi inputs arriving from unreachable predecessors.
    for bb_idx in 0..prog.bbs.len() {
        let stmt_ids = prog.bbs[bb_idx].stmts.clone();
        for sid in stmt_ids {
            let stmt = prog.stmt_mut(sid);
            if stmt.kind == IrStmtKind::Phi {
                filter_phi_inputs(stmt, &reachable);
            }
        }
    }

    // Rebuild the block list and statement arena with unreachable blocks
    // (and the statements they own) removed, remapping every id.
    let old_bbs = std::mem::take(&mut prog.bbs);
    let old_stmts = std::mem::take(&mut prog.stmts);
    let mut old_stmts: Vec<Option<IrStmt>> = old_stmts.into_iter().map(Some).collect();

    let mut bb_map: HashMap<BbId, BbId> = HashMap::new();
    let mut kept: Vec<_> = old_bbs
        .into_iter()
        .filter(|bb| reachable.contains(&bb.id))
        .collect();
    for (i, bb) in kept.iter().enumerate() {
        bb_map.insert(bb.id, BbId(i as u32));
    }

    let mut stmt_map: HashMap<IrStmtId, IrStmtId> = HashMap::new();
    let mut next = 0u32;
    for bb in &kept {
        for &sid in &bb.stmts {
            stmt_map.insert(sid, IrStmtId(next));
            next += 1;
        }
    }

    let mut new_stmts: Vec<IrStmt> = Vec::with_capacity(next as usize);
    for bb in &mut kept {
        bb.id = bb_map[&bb.id];
        for sid in bb.stmts.iter_mut() {
            let mut stmt = old_stmts[sid.0 as usize]
                .take()
                .expect("statement owned by exactly one block");
            *sid = stmt_map[&stmt.id];
            stmt.id = *sid;
            for arg in stmt.args.iter_mut() {
                *arg = stmt_map[arg];
            }
            for target in stmt.targets.iter_mut() {
                *target = bb_map[target];
            }
            new_stmts.push(stmt);
        }
    }

    prog.bbs = kept;
    prog.stmts = new_stmts;
    for entry in prog.entries.iter_mut() {
        *entry = bb_map[entry];
    }
    for tv in prog.timevars.iter_mut() {
        tv.uses = tv
            .uses
            .iter()
            .filter_map(|u| stmt_map.get(u).copied())
            .collect();
    }
}

/// The set of blocks reachable from any entry point or spawn target by
/// forward traversal of branch successors.
fn mark_reachable(prog: &IrProgram) -> HashSet<BbId> {
    let mut worklist: Vec<BbId> = prog.entries.clone();
    for bb in &prog.bbs {
        for &sid in &bb.stmts {
            let stmt = prog.stmt(sid);
            if stmt.kind == IrStmtKind::Spawn {
                worklist.extend(stmt.targets.iter().copied());
            }
        }
    }

    let mut reachable = HashSet::new();
    while let Some(bb) = worklist.pop() {
        if !reachable.insert(bb) {
            continue;
        }
        worklist.extend(prog.succs(bb));
    }
    reachable
}

fn filter_phi_inputs(phi: &mut IrStmt, reachable: &HashSet<BbId>) {
    let keep: Vec<bool> = phi.targets.iter().map(|t| reachable.contains(t)).collect();
    if keep.iter().all(|&k| k) {
        return;
    }
    phi.args = retain_by(&keep, &phi.args);
    phi.arg_nums = retain_by(&keep, &phi.arg_nums);
    phi.targets = retain_by(&keep, &phi.targets);
    phi.target_labels = retain_by(&keep, &phi.target_labels);
}

fn retain_by<T: Clone>(keep: &[bool], items: &[T]) -> Vec<T> {
    items
        .iter()
        .zip(keep)
        .filter(|(_, &k)| k)
        .map(|(item, _)| item.clone())
        .collect()
}
