//! Pretty-printer for LB, the inverse of [`super::parser::parse_program`].
//! Round-tripping through parse/print/parse yields an LB program denoting
//! the same scope tree (spec.md §8's "Round-trip" property).

use super::ast::*;
use std::fmt::Write;

pub fn print_program(prog: &Program) -> String {
    let mut out = String::new();
    for f in &prog.functions {
        print_function(&mut out, f);
        out.push('\n');
    }
    out
}

fn print_function(out: &mut String, f: &Function) {
    let params = f
        .params
        .iter()
        .map(|p| format!("{} %{}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "{} @{}({}) {{", f.ret, f.name, params).unwrap();
    print_block(out, &f.body, 1);
    writeln!(out, "}}").unwrap();
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn print_operand(o: &Operand) -> String {
    match o {
        Operand::Num(n) => n.to_string(),
        Operand::Var(v) => format!("%{}", v),
    }
}

fn print_callee(c: &Callee) -> String {
    match c {
        Callee::Func(n) => format!("@{}", n),
        Callee::Runtime(n) => n.clone(),
    }
}

fn print_args(args: &[Operand]) -> String {
    args.iter().map(print_operand).collect::<Vec<_>>().join(", ")
}

fn print_flat(out: &mut String, depth: usize, inst: &FlatInst) {
    indent(out, depth);
    match inst {
        FlatInst::Assign { dst, src } => {
            writeln!(out, "%{} <- {};", dst, print_operand(src)).unwrap()
        }
        FlatInst::BinOp { dst, op, lhs, rhs } => writeln!(
            out,
            "%{} <- {} {} {};",
            dst,
            print_operand(lhs),
            op,
            print_operand(rhs)
        )
        .unwrap(),
        FlatInst::Compare { dst, op, lhs, rhs } => writeln!(
            out,
            "%{} <- {} {} {};",
            dst,
            print_operand(lhs),
            op,
            print_operand(rhs)
        )
        .unwrap(),
        FlatInst::Load { dst, base, indices } => writeln!(
            out,
            "%{} <- %{}[{}];",
            dst,
            base,
            print_args(indices)
        )
        .unwrap(),
        FlatInst::Store { base, indices, src } => writeln!(
            out,
            "%{}[{}] <- {};",
            base,
            print_args(indices),
            print_operand(src)
        )
        .unwrap(),
        FlatInst::ArrayLen { dst, base, dim } => {
            writeln!(out, "%{} <- length %{} {};", dst, base, print_operand(dim)).unwrap()
        }
        FlatInst::TupleLen { dst, base } => {
            writeln!(out, "%{} <- length %{};", dst, base).unwrap()
        }
        FlatInst::NewArray { dst, dims } => {
            writeln!(out, "%{} <- new Array({});", dst, print_args(dims)).unwrap()
        }
        FlatInst::NewTuple { dst, len } => {
            writeln!(out, "%{} <- new Tuple({});", dst, print_operand(len)).unwrap()
        }
        FlatInst::Call { callee, args } => {
            writeln!(out, "call {}({});", print_callee(callee), print_args(args)).unwrap()
        }
        FlatInst::CallAssign { dst, callee, args } => writeln!(
            out,
            "%{} <- call {}({});",
            dst,
            print_callee(callee),
            print_args(args)
        )
        .unwrap(),
        FlatInst::ReturnVoid => writeln!(out, "return;").unwrap(),
        FlatInst::ReturnValue(v) => writeln!(out, "return {};", print_operand(v)).unwrap(),
    }
}

fn print_cond(c: &Cond) -> String {
    format!("({} {} {})", print_operand(&c.lhs), c.op, print_operand(&c.rhs))
}

fn print_block(out: &mut String, blk: &Block, depth: usize) {
    for stmt in &blk.stmts {
        match stmt {
            Stmt::Decl(name, ty, _loc) => {
                indent(out, depth);
                writeln!(out, "{} %{};", ty, name).unwrap();
            }
            Stmt::Flat(inst, _loc) => print_flat(out, depth, inst),
            Stmt::If {
                cond,
                then_blk,
                else_blk,
                loc: _,
            } => {
                indent(out, depth);
                writeln!(out, "if {} {{", print_cond(cond)).unwrap();
                print_block(out, then_blk, depth + 1);
                indent(out, depth);
                if else_blk.stmts.is_empty() {
                    writeln!(out, "}}").unwrap();
                } else {
                    writeln!(out, "}} else {{").unwrap();
                    print_block(out, else_blk, depth + 1);
                    indent(out, depth);
                    writeln!(out, "}}").unwrap();
                }
            }
            Stmt::While { cond, body, loc: _ } => {
                indent(out, depth);
                writeln!(out, "while {} {{", print_cond(cond)).unwrap();
                print_block(out, body, depth + 1);
                indent(out, depth);
                writeln!(out, "}}").unwrap();
            }
            Stmt::Continue(_) => {
                indent(out, depth);
                writeln!(out, "continue;").unwrap();
            }
            Stmt::Break(_) => {
                indent(out, depth);
                writeln!(out, "break;").unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_program;
    use super::*;

    #[test]
    fn round_trips_a_small_function() {
        let src = "int64 @main() {\n    int64 %a;\n    %a <- 5;\n    %a <- %a + 3;\n    return %a;\n}\n";
        let prog = parse_program(src).unwrap();
        let printed = print_program(&prog);
        let reparsed = parse_program(&printed).unwrap();
        assert_eq!(prog, reparsed);
    }
}
