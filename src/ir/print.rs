//! IR pretty-printer.
//!
//! Emits a human-readable text representation of an `IrProgram`. Output is
//! deterministic: blocks in program order, statements in block order.

use std::fmt::{self, Write};

use crate::ir::program::IrProgram;
use crate::ir::stmt::{ExprOp, IrStmt, IrStmtKind};

/// Emits a full text dump of the program.
pub fn emit_ir_text(prog: &IrProgram) -> Result<String, fmt::Error> {
    let mut out = String::new();
    if let Some(model) = &prog.timing_model {
        writeln!(out, "; timing_model = {}", model)?;
    }
    for bb in &prog.bbs {
        if bb.is_entry {
            writeln!(out, "entry {}:", bb.label)?;
        } else {
            writeln!(out, "{}:", bb.label)?;
        }
        for stmt in prog.block_stmts(bb.id) {
            write!(out, "  ")?;
            emit_stmt(&mut out, prog, stmt)?;
            writeln!(out)?;
        }
    }
    Ok(out)
}

fn emit_stmt(out: &mut String, prog: &IrProgram, stmt: &IrStmt) -> fmt::Result {
    match stmt.kind {
        IrStmtKind::Expr(ExprOp::Const) => {
            write!(
                out,
                "{} = const.{} {}",
                stmt.valnum,
                stmt.width,
                stmt.imm.unwrap_or(0)
            )?;
        }
        IrStmtKind::Expr(op) => {
            write!(out, "{} = {}.{}", stmt.valnum, op, stmt.width)?;
            emit_args(out, stmt)?;
        }
        IrStmtKind::Phi => {
            write!(out, "{} = phi.{}", stmt.valnum, stmt.width)?;
            for (i, num) in stmt.arg_nums.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                write!(out, "{}[{} from {}]", sep, num, stmt.target_labels[i])?;
            }
        }
        IrStmtKind::If => {
            write!(
                out,
                "if {} then {} else {}",
                stmt.arg_nums[0], stmt.target_labels[0], stmt.target_labels[1]
            )?;
        }
        IrStmtKind::Jmp => {
            write!(out, "jmp {}", stmt.target_labels[0])?;
        }
        IrStmtKind::Spawn => {
            write!(
                out,
                "{} = spawn.{} -> {}",
                stmt.valnum, stmt.width, stmt.target_labels[0]
            )?;
        }
        IrStmtKind::TimingBarrier => {
            let name = stmt
                .timevar
                .map(|tv| prog.timevar(tv).name.as_str())
                .unwrap_or("?");
            write!(out, "barrier @{} +{}", name, stmt.imm.unwrap_or(0))?;
        }
        IrStmtKind::ArraySize => {
            write!(
                out,
                "array.size @{} = {}",
                port(stmt),
                stmt.imm.unwrap_or(0)
            )?;
        }
        IrStmtKind::RegRead
        | IrStmtKind::ArrayRead
        | IrStmtKind::PortRead
        | IrStmtKind::ChanRead
        | IrStmtKind::BypassPresent
        | IrStmtKind::BypassReady
        | IrStmtKind::BypassRead => {
            write!(
                out,
                "{} = {}.{} @{}",
                stmt.valnum, stmt.kind, stmt.width, port(stmt)
            )?;
            emit_args(out, stmt)?;
        }
        IrStmtKind::RegWrite
        | IrStmtKind::ArrayWrite
        | IrStmtKind::PortWrite
        | IrStmtKind::ChanWrite
        | IrStmtKind::BypassStart
        | IrStmtKind::BypassEnd
        | IrStmtKind::BypassWrite => {
            write!(out, "{}.{} @{}", stmt.kind, stmt.width, port(stmt))?;
            emit_args(out, stmt)?;
        }
        IrStmtKind::PortExport => {
            write!(out, "port.export @{} width {}", port(stmt), stmt.width)?;
        }
        IrStmtKind::KillIf => {
            write!(out, "killif {}", stmt.arg_nums[0])?;
        }
        IrStmtKind::Kill | IrStmtKind::KillYounger | IrStmtKind::Done => {
            write!(out, "{}", stmt.kind)?;
        }
    }
    Ok(())
}

fn emit_args(out: &mut String, stmt: &IrStmt) -> fmt::Result {
    for (i, num) in stmt.arg_nums.iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        write!(out, "{}{}", sep, num)?;
    }
    Ok(())
}

fn port(stmt: &IrStmt) -> &str {
    stmt.port_name.as_deref().unwrap_or("?")
}
