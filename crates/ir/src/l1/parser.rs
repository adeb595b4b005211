//! Recursive-descent parser for L1, the inverse of [`super::printer`].
//! Identical grammar to `l2::parser` with every register a bare physical
//! mnemonic — there is no `%name` token to accept, since `L1` has no
//! virtual variables left (spec.md §4.3 is already fully applied by the
//! time a program reaches this level).
//!
//! `frame_size` is not read back from the `// frame N` comment the printer
//! emits (comments carry no semantic weight per spec.md §6); it is
//! recomputed the same way `l1::lower::frame_size` derives it, by scanning
//! the parsed body for the deepest `rsp`-relative displacement.

use super::ast::*;
use crate::common::{Callee, FuncRef, Lbl};
use crate::lexer::{Lexer, Token};
use lnc_entity::{EntityRef, PrimaryMap, SecondaryMap};
use lnc_support::registers::PhysReg;
use lnc_support::{Location, ParseError, ParseResult};
use std::collections::HashMap;
use std::str::FromStr;

pub fn parse_program(src: &str) -> ParseResult<Program> {
    let mut p = Parser::new(src)?;
    let mut functions = Vec::new();
    while p.tok != Token::Eof {
        functions.push(p.parse_function()?);
    }
    Ok(Program { functions })
}

struct Parser<'a> {
    lx: Lexer<'a>,
    tok: Token,
    loc: Location,
}

struct RawBlock {
    label: Lbl,
    insts: Vec<Instruction>,
    term: Terminator,
}

struct Symbols {
    labels: PrimaryMap<Lbl, ()>,
    label_names_fwd: HashMap<String, Lbl>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> ParseResult<Self> {
        let mut lx = Lexer::new(src);
        let (tok, loc) = lx.next()?;
        Ok(Self { lx, tok, loc })
    }

    fn advance(&mut self) -> ParseResult<()> {
        let (tok, loc) = self.lx.next()?;
        self.tok = tok;
        self.loc = loc;
        Ok(())
    }

    fn err<T>(&self, msg: impl Into<String>) -> ParseResult<T> {
        Err(ParseError {
            location: self.loc,
            message: msg.into(),
        })
    }

    fn expect_punct(&mut self, p: &'static str) -> ParseResult<()> {
        if self.tok == Token::Punct(p) {
            self.advance()
        } else {
            self.err(format!("expected {:?}, found {:?}", p, self.tok))
        }
    }

    fn take_label_name(&mut self) -> ParseResult<String> {
        match self.tok.clone() {
            Token::Label(n) => {
                self.advance()?;
                Ok(n)
            }
            other => self.err(format!("expected label, found {:?}", other)),
        }
    }

    fn take_num(&mut self) -> ParseResult<i64> {
        match self.tok.clone() {
            Token::Num(n) => {
                self.advance()?;
                Ok(n)
            }
            other => self.err(format!("expected integer, found {:?}", other)),
        }
    }

    fn label_of(&mut self, syms: &mut Symbols, name: String) -> Lbl {
        *syms
            .label_names_fwd
            .entry(name)
            .or_insert_with(|| syms.labels.push(()))
    }

    fn take_reg(&mut self) -> ParseResult<PhysReg> {
        match self.tok.clone() {
            Token::Ident(n) => match PhysReg::from_str(&n) {
                Ok(p) => {
                    self.advance()?;
                    Ok(p)
                }
                Err(()) => self.err(format!("expected register, found identifier {:?}", n)),
            },
            other => self.err(format!("expected register, found {:?}", other)),
        }
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        match self.tok.clone() {
            Token::Num(n) => {
                self.advance()?;
                Ok(Operand::Num(n))
            }
            Token::Ident(n) if PhysReg::from_str(&n).is_ok() => Ok(Operand::Reg(self.take_reg()?)),
            other => self.err(format!("expected operand, found {:?}", other)),
        }
    }

    fn peek_arith(&self) -> Option<crate::common::ArithOp> {
        use crate::common::ArithOp::*;
        match self.tok {
            Token::Punct("+") => Some(Add),
            Token::Punct("-") => Some(Sub),
            Token::Punct("*") => Some(Mul),
            Token::Punct("&") => Some(And),
            Token::Punct("<<") => Some(Shl),
            Token::Punct(">>") => Some(Shr),
            _ => None,
        }
    }

    fn peek_cmp(&self) -> Option<crate::common::CmpOp> {
        use crate::common::CmpOp::*;
        match self.tok {
            Token::Punct("<") => Some(Lt),
            Token::Punct("<=") => Some(Le),
            Token::Punct("=") => Some(Eq),
            Token::Punct(">=") => Some(Ge),
            Token::Punct(">") => Some(Gt),
            _ => None,
        }
    }

    fn parse_callee(&mut self) -> ParseResult<Callee> {
        match self.tok.clone() {
            Token::Func(name) => {
                self.advance()?;
                Ok(Callee::Func(FuncRef::new(name_hash(&name))))
            }
            Token::Ident(name) => {
                self.advance()?;
                match lnc_support::runtime::RuntimeFn::from_name(&name) {
                    Some(rt) => Ok(Callee::Runtime(rt)),
                    None => self.err(format!("unknown runtime function {:?}", name)),
                }
            }
            other => self.err(format!("expected callee, found {:?}", other)),
        }
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        let returns_value = match self.tok.clone() {
            Token::Ident(k) if k == "value" => {
                self.advance()?;
                true
            }
            Token::Ident(k) if k == "void" => {
                self.advance()?;
                false
            }
            other => return self.err(format!("expected 'value' or 'void', found {:?}", other)),
        };
        let name = match self.tok.clone() {
            Token::Func(n) => {
                self.advance()?;
                n
            }
            other => return self.err(format!("expected function name, found {:?}", other)),
        };

        let mut syms = Symbols {
            labels: PrimaryMap::new(),
            label_names_fwd: HashMap::new(),
        };

        self.expect_punct("(")?;
        let mut param_regs = Vec::new();
        if self.tok != Token::Punct(")") {
            loop {
                param_regs.push(self.take_reg()?);
                if self.tok == Token::Punct(",") {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_punct(")")?;
        self.expect_punct("{")?;

        let entry_label = syms.labels.push(());
        syms.label_names_fwd.insert(String::new(), entry_label);
        let mut cur_label = entry_label;
        let mut cur_insts: Vec<Instruction> = Vec::new();
        let mut finished: Vec<RawBlock> = Vec::new();
        let mut synthetic = 0u32;

        while self.tok != Token::Punct("}") {
            if let Token::Label(_) = self.tok {
                let lname = self.take_label_name()?;
                let new_label = self.label_of(&mut syms, lname);
                finished.push(RawBlock {
                    label: cur_label,
                    insts: std::mem::take(&mut cur_insts),
                    term: Terminator::Fallthrough,
                });
                cur_label = new_label;
                continue;
            }

            match self.tok.clone() {
                Token::Ident(kw) if kw == "return" => {
                    self.advance()?;
                    let term = if self.tok == Token::Punct(";") {
                        Terminator::ReturnVoid
                    } else {
                        Terminator::ReturnValue(self.parse_operand()?)
                    };
                    self.expect_punct(";")?;
                    finished.push(RawBlock {
                        label: cur_label,
                        insts: std::mem::take(&mut cur_insts),
                        term,
                    });
                    synthetic += 1;
                    cur_label = self.label_of(&mut syms, format!("__ft{synthetic}"));
                }
                Token::Ident(kw) if kw == "jump" => {
                    self.advance()?;
                    let lname = self.take_label_name()?;
                    self.expect_punct(";")?;
                    let target = self.label_of(&mut syms, lname);
                    finished.push(RawBlock {
                        label: cur_label,
                        insts: std::mem::take(&mut cur_insts),
                        term: Terminator::Jump(target),
                    });
                    synthetic += 1;
                    cur_label = self.label_of(&mut syms, format!("__ft{synthetic}"));
                }
                _ => {
                    let inst = self.parse_item(&mut syms)?;
                    cur_insts.push(inst);
                }
            }
        }
        self.expect_punct("}")?;
        if !cur_insts.is_empty() {
            finished.push(RawBlock {
                label: cur_label,
                insts: std::mem::take(&mut cur_insts),
                term: Terminator::Fallthrough,
            });
        }

        let mut label_block: SecondaryMap<Lbl, Option<crate::common::Blk>> = SecondaryMap::new();
        let mut blocks: PrimaryMap<crate::common::Blk, BasicBlock> = PrimaryMap::new();
        for rb in finished {
            let blk = blocks.push(BasicBlock {
                label: rb.label,
                insts: rb.insts,
                term: rb.term,
            });
            label_block[rb.label] = Some(blk);
        }

        let entry = label_block[entry_label].ok_or_else(|| ParseError {
            location: self.loc,
            message: "function has no entry block".into(),
        })?;

        let mut label_names: SecondaryMap<Lbl, String> = SecondaryMap::new();
        for (lname, lbl) in &syms.label_names_fwd {
            if !lname.starts_with("__ft") {
                label_names[*lbl] = lname.clone();
            }
        }

        let mut func = Function {
            name,
            param_regs,
            returns_value,
            label_names,
            blocks,
            entry,
            label_block,
            frame_size: 0,
        };
        func.frame_size = super::lower::frame_size_of(&func);
        Ok(func)
    }

    fn parse_item(&mut self, syms: &mut Symbols) -> ParseResult<Instruction> {
        if let Token::Ident(kw) = self.tok.clone() {
            if kw == "cjump" {
                self.advance()?;
                let l = self.parse_operand()?;
                let op = self.peek_cmp().ok_or_else(|| ParseError {
                    location: self.loc,
                    message: format!("expected comparison operator, found {:?}", self.tok),
                })?;
                self.advance()?;
                let r = self.parse_operand()?;
                self.expect_punct(",")?;
                let lname = self.take_label_name()?;
                self.expect_punct(";")?;
                let target = self.label_of(syms, lname);
                return Ok(Instruction::CondJump(op, l, r, target));
            }
            if kw == "call" {
                self.advance()?;
                let callee = self.parse_callee()?;
                self.expect_punct(",")?;
                let argc = self.take_num()? as usize;
                self.expect_punct(";")?;
                return Ok(Instruction::Call(callee, argc));
            }
            if kw == "mem" {
                self.advance()?;
                self.expect_punct("[")?;
                let base = self.take_reg()?;
                self.expect_punct(",")?;
                let disp = self.take_num()?;
                self.expect_punct("]")?;
                self.expect_punct("<-")?;
                let src = self.parse_operand()?;
                self.expect_punct(";")?;
                return Ok(Instruction::Store(base, disp, src));
            }
        }

        let dst = self.take_reg()?;

        if let Some(op) = self.peek_arith() {
            self.advance()?;
            self.expect_punct("=")?;
            let rhs = self.parse_operand()?;
            self.expect_punct(";")?;
            return Ok(Instruction::Arith(dst, op, rhs));
        }

        self.expect_punct("<-")?;

        if let Token::Ident(kw) = self.tok.clone() {
            if kw == "call" {
                self.advance()?;
                let callee = self.parse_callee()?;
                self.expect_punct(",")?;
                let argc = self.take_num()? as usize;
                self.expect_punct(";")?;
                return Ok(Instruction::CallAssign(dst, callee, argc));
            }
            if kw == "mem" {
                self.advance()?;
                self.expect_punct("[")?;
                let base = self.take_reg()?;
                self.expect_punct(",")?;
                let disp = self.take_num()?;
                self.expect_punct("]")?;
                self.expect_punct(";")?;
                return Ok(Instruction::Load(dst, base, disp));
            }
        }

        let first = self.parse_operand()?;
        if let Some(op) = self.peek_cmp() {
            self.advance()?;
            let rhs = self.parse_operand()?;
            self.expect_punct(";")?;
            return Ok(Instruction::Compare(dst, op, first, rhs));
        }
        self.expect_punct(";")?;
        Ok(Instruction::Assign(dst, first))
    }
}

fn name_hash(name: &str) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut h = DefaultHasher::new();
    name.hash(&mut h);
    (h.finish() % (u32::MAX as u64 / 2)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arith_and_compare_and_mem() {
        let src = "value @f(rdi, rsi) {\n\
                    rax <- rdi < rsi;\n\
                    rdi += rsi;\n\
                    mem[rsp, -8] <- rdi;\n\
                    rdi <- mem[rsp, -8];\n\
                    return rdi;\n\
                }\n";
        let prog = parse_program(src).unwrap();
        let out = super::super::printer::print_program(&prog);
        let reparsed = parse_program(&out).unwrap();
        assert_eq!(reparsed.functions[0].blocks.len(), prog.functions[0].blocks.len());
    }

    #[test]
    fn frame_size_is_recovered_from_the_deepest_stack_slot() {
        let src = "void @f() {\n\
                    mem[rsp, -16] <- rax;\n\
                    return;\n\
                }\n";
        let prog = parse_program(src).unwrap();
        assert_eq!(prog.functions[0].frame_size, 16);
    }
}
