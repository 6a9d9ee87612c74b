//! IR structural validation.
//!
//! Checks the invariants code generation promises, after pruning:
//! 1. Value numbers are unique across the program and strictly increasing
//!    within each block.
//! 2. Every non-entry block has at least one predecessor through a branching
//!    statement (`If`/`Jmp`/`Spawn`).
//! 3. Phi operand and target lists are parallel, every target is a direct
//!    predecessor of the phi's block, and no predecessor appears twice.
//! 4. Every block ends with a terminator.

use std::collections::{HashMap, HashSet};

use crate::error::PassError;
use crate::ir::block::BbId;
use crate::ir::program::IrProgram;
use crate::ir::stmt::{IrStmtKind, ValNum};
use crate::pass::Pass;

pub struct ValidatePass;

impl Pass for ValidatePass {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn run(&mut self, prog: &mut IrProgram) -> Result<(), PassError> {
        validate(prog)
    }
}

/// Validates the structural invariants of `prog`.
pub fn validate(prog: &IrProgram) -> Result<(), PassError> {
    // Predecessors through any control-transferring statement.
    let mut preds: HashMap<BbId, HashSet<BbId>> = HashMap::new();
    for bb in &prog.bbs {
        for stmt in prog.block_stmts(bb.id) {
            if matches!(
                stmt.kind,
                IrStmtKind::If | IrStmtKind::Jmp | IrStmtKind::Spawn
            ) {
                for &target in &stmt.targets {
                    preds.entry(target).or_default().insert(bb.id);
                }
            }
        }
    }

    let mut seen_valnums: HashSet<ValNum> = HashSet::new();

    for bb in &prog.bbs {
        let label = bb.label.clone();

        if !bb.is_entry && preds.get(&bb.id).map_or(true, |set| set.is_empty()) {
            return Err(PassError::OrphanBlock { block: label });
        }

        let mut prev: Option<ValNum> = None;
        for stmt in prog.block_stmts(bb.id) {
            if !seen_valnums.insert(stmt.valnum) {
                return Err(PassError::DuplicateValueNumber {
                    value: stmt.valnum.0,
                });
            }
            if let Some(prev) = prev {
                if stmt.valnum <= prev {
                    return Err(PassError::NonIncreasingValueNumbers { block: label });
                }
            }
            prev = Some(stmt.valnum);

            if stmt.kind == IrStmtKind::Phi {
                let n = stmt.args.len();
                if stmt.arg_nums.len() != n
                    || stmt.targets.len() != n
                    || stmt.target_labels.len() != n
                {
                    return Err(PassError::PhiArityMismatch {
                        block: label,
                        value: stmt.valnum.0,
                    });
                }
                let mut seen_preds: HashSet<BbId> = HashSet::new();
                for &target in &stmt.targets {
                    if !preds
                        .get(&bb.id)
                        .map_or(false, |set| set.contains(&target))
                    {
                        return Err(PassError::PhiNonPredecessor {
                            block: label,
                            value: stmt.valnum.0,
                            pred: prog.bb(target).label.clone(),
                        });
                    }
                    if !seen_preds.insert(target) {
                        return Err(PassError::PhiDuplicatePredecessor {
                            block: label,
                            value: stmt.valnum.0,
                            pred: prog.bb(target).label.clone(),
                        });
                    }
                }
            }
        }

        let terminated = bb
            .stmts
            .last()
            .map_or(false, |&sid| prog.stmt(sid).kind.is_terminator());
        if !terminated {
            return Err(PassError::MissingTerminator { block: label });
        }
    }
    Ok(())
}
