//! Transactional constructs: spawn, kill, kill-if, kill-younger with
//! deferred cleanup blocks, and nested entry functions.

use sluice::ast::{Ast, AstBuilder, AstOp};
use sluice::ir::{ExprOp, IrBb, IrProgram, IrStmtKind, TXN_ID_WIDTH};
use sluice::pass::validate::validate;
use sluice::{generate, CodegenError, ErrorCollector};

fn gen(mut ast: Ast) -> IrProgram {
    let mut errors = ErrorCollector::new();
    let prog = generate(&mut ast, &mut errors).expect("codegen should succeed");
    assert!(
        !errors.has_errors(),
        "unexpected diagnostics: {:?}",
        errors.diagnostics()
    );
    prog
}

fn bb_by_prefix<'p>(prog: &'p IrProgram, prefix: &str) -> &'p IrBb {
    prog.bbs
        .iter()
        .find(|bb| bb.label.starts_with(prefix))
        .unwrap_or_else(|| panic!("no block with label prefix '{}'", prefix))
}

fn stmt_kinds(prog: &IrProgram, bb: &IrBb) -> Vec<IrStmtKind> {
    bb.stmts.iter().map(|&s| prog.stmt(s).kind).collect()
}

/// The spawn statement forks a fresh block; the spawned body ends with an
/// implicit kill and the spawning path continues where it left off.
#[test]
fn test_spawn_forks_and_falls_through() {
    let mut b = AstBuilder::new();
    let ch = b.chan_def(8);
    let ch_let = b.let_("ch", ch);
    let ch_use = b.var(ch_let);
    let five = b.const_(5, 8);
    let w = b.write(ch_use, five);
    let spawn_body = b.block(vec![w]);
    let spawn_stmt = b.spawn(spawn_body);
    let k = b.kill();
    let body = b.block(vec![ch_let, spawn_stmt, k]);
    b.func("main", true, body);

    let prog = gen(b.finish());
    assert_eq!(prog.entries.len(), 1);

    let entry = prog.bb(prog.entries[0]);
    assert_eq!(
        stmt_kinds(&prog, entry),
        vec![IrStmtKind::Spawn, IrStmtKind::Kill, IrStmtKind::Done]
    );

    let spawn = prog.stmt(entry.stmts[0]);
    assert_eq!(spawn.width, TXN_ID_WIDTH);
    assert!(spawn.target_labels[0].starts_with("spawn"));

    let spawn_bb = bb_by_prefix(&prog, "spawn");
    assert!(!spawn_bb.is_entry);
    assert_eq!(spawn.targets[0], spawn_bb.id);
    assert_eq!(
        stmt_kinds(&prog, spawn_bb),
        vec![
            IrStmtKind::Expr(ExprOp::Const),
            IrStmtKind::ChanWrite,
            IrStmtKind::Kill,
        ]
    );

    validate(&prog).expect("structural invariants hold");
}

/// `killyounger` with no registered cleanup emits exactly one statement.
#[test]
fn test_killyounger_without_cleanup() {
    let mut b = AstBuilder::new();
    let ky = b.kill_younger();
    let body = b.block(vec![ky]);
    b.func("main", true, body);

    let prog = gen(b.finish());
    let entry = prog.bb(prog.entries[0]);
    assert_eq!(
        stmt_kinds(&prog, entry),
        vec![IrStmtKind::KillYounger, IrStmtKind::Done]
    );
}

/// Each `killyounger` re-generates every registered cleanup block at the
/// kill site, with the bindings live at that site.
#[test]
fn test_killyounger_regenerates_cleanup_per_site() {
    let mut b = AstBuilder::new();
    let p = b.named_port_def("p", 8);
    let p_let = b.let_("p", p);
    let one = b.const_(1, 8);
    let x_let = b.let_("x", one);

    let p_use = b.var(p_let);
    let x_use = b.var(x_let);
    let cleanup_write = b.write(p_use, x_use);
    let cleanup = b.block(vec![cleanup_write]);
    let register = b.on_kill_younger(cleanup);

    let two = b.const_(2, 8);
    let x_lhs = b.var(x_let);
    let rebind = b.assign(x_lhs, two);

    let ky1 = b.kill_younger();
    let ky2 = b.kill_younger();
    let body = b.block(vec![p_let, x_let, register, rebind, ky1, ky2]);
    b.func("main", true, body);

    let prog = gen(b.finish());
    let entry = prog.bb(prog.entries[0]);
    assert_eq!(
        stmt_kinds(&prog, entry),
        vec![
            IrStmtKind::PortExport,
            IrStmtKind::Expr(ExprOp::Const), // x = 1
            IrStmtKind::Expr(ExprOp::Const), // x = 2
            IrStmtKind::KillYounger,
            IrStmtKind::PortWrite, // cleanup at first site
            IrStmtKind::KillYounger,
            IrStmtKind::PortWrite, // cleanup at second site
            IrStmtKind::Done,
        ]
    );

    // Cleanup observes the rebinding done before the kill site.
    let first_cleanup = prog.stmt(entry.stmts[4]);
    assert_eq!(prog.stmt(first_cleanup.args[0]).imm, Some(2));
    let second_cleanup = prog.stmt(entry.stmts[6]);
    assert_eq!(prog.stmt(second_cleanup.args[0]).imm, Some(2));
}

#[test]
fn test_kill_if_lowers_condition() {
    let mut b = AstBuilder::new();
    let cinit = b.const_(1, 1);
    let c_let = b.let_("c", cinit);
    let c_use = b.var(c_let);
    let not_c = b.op(AstOp::Not, vec![c_use], 1);
    let ki = b.kill_if(not_c);
    let body = b.block(vec![c_let, ki]);
    b.func("main", true, body);

    let prog = gen(b.finish());
    let entry = prog.bb(prog.entries[0]);
    assert_eq!(
        stmt_kinds(&prog, entry),
        vec![
            IrStmtKind::Expr(ExprOp::Const),
            IrStmtKind::Expr(ExprOp::Not),
            IrStmtKind::KillIf,
            IrStmtKind::Done,
        ]
    );
    let kill_if = prog.stmt(entry.stmts[2]);
    assert_eq!(kill_if.args[0], entry.stmts[1]);
}

/// Array reads are potential side effects and may not appear in a kill-if
/// condition.
#[test]
fn test_kill_if_rejects_side_effects() {
    let mut b = AstBuilder::new();
    let arr = b.array_init(8, 4);
    let a_let = b.let_("a", arr);
    let a_use = b.var(a_let);
    let idx = b.const_(0, 2);
    let load = b.array_ref(a_use, idx, 8);
    let ki = b.kill_if(load);
    let body = b.block(vec![a_let, ki]);
    b.func("main", true, body);

    let mut ast = b.finish();
    let mut errors = ErrorCollector::new();
    assert!(generate(&mut ast, &mut errors).is_err());
    assert!(matches!(
        errors.diagnostics()[0].error,
        CodegenError::KillIfSideEffect
    ));
}

/// A nested entry function gets its own entry block and implicit done; the
/// host function resumes emitting where it stopped.
#[test]
fn test_nested_entry_function() {
    let mut b = AstBuilder::new();
    let p = b.named_port_def("p", 8);
    let p_let = b.let_("p", p);
    let one = b.const_(1, 8);
    let x_let = b.let_("x", one);

    let k = b.kill();
    let nested_body = b.block(vec![k]);
    let nested = b.nested_func(nested_body);

    let p_use = b.var(p_let);
    let x_use = b.var(x_let);
    let w = b.write(p_use, x_use);
    let body = b.block(vec![p_let, x_let, nested, w]);
    b.func("main", true, body);

    let prog = gen(b.finish());
    assert_eq!(prog.entries.len(), 2);

    let entry = prog.bb(prog.entries[0]);
    assert_eq!(
        stmt_kinds(&prog, entry),
        vec![
            IrStmtKind::PortExport,
            IrStmtKind::Expr(ExprOp::Const),
            IrStmtKind::PortWrite,
            IrStmtKind::Done,
        ]
    );

    let anon = prog.bb(prog.entries[1]);
    assert!(anon.label.starts_with("anon_func"));
    assert!(anon.is_entry);
    assert_eq!(
        stmt_kinds(&prog, anon),
        vec![IrStmtKind::Kill, IrStmtKind::Done]
    );

    validate(&prog).expect("structural invariants hold");
}

/// Non-entry functions are skipped entirely.
#[test]
fn test_non_entry_function_not_generated() {
    let mut b = AstBuilder::new();
    let one = b.const_(1, 8);
    let x_let = b.let_("x", one);
    let helper_body = b.block(vec![x_let]);
    b.func("helper", false, helper_body);

    let k = b.kill();
    let main_body = b.block(vec![k]);
    b.func("main", true, main_body);

    let prog = gen(b.finish());
    assert_eq!(prog.entries.len(), 1);
    assert_eq!(prog.bb(prog.entries[0]).label, "main");
    assert_eq!(prog.bbs.len(), 1);
}
