//! Recursive-descent parser for L2, the inverse of [`super::printer`].
//!
//! ```text
//! function := ('value'|'void') '@' ident '(' params? ')' '{' item* '}'
//! item     := assign | arith | compare | load | store | call | cjump
//!           | label | term
//! assign   := reg '<-' operand ';'
//! compare  := reg '<-' operand cmpop operand ';'
//! arith    := reg arithop '=' operand ';'
//! load     := reg '<-' 'mem' '[' reg ',' num ']' ';'
//! store    := 'mem' '[' reg ',' num ']' '<-' operand ';'
//! cjump    := 'cjump' operand cmpop operand ',' label ';'
//! term     := 'return' [operand] | 'jump' label
//! ```
//!
//! A [`crate::common::Reg`] is distinguished at the token level, not by
//! extra punctuation: `%name` (`Token::Var`) is always virtual, a bare
//! identifier that names one of the sixteen x86-64 registers is always
//! physical.
//!
//! `Terminator::Fallthrough` has no surface syntax of its own: a block
//! that ends without an explicit `return`/`jump` before the next label
//! (or the closing `}`) is parsed as falling through, mirroring how
//! [`super::printer`] renders it as a bare comment.

use super::ast::*;
use crate::common::{Blk, Callee, FuncRef, Lbl, Reg, Var};
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

/// Per-function symbol tables threaded through parsing by reference
/// rather than captured by closures, so every helper can be a plain
/// method instead of a macro (unlike `ir::parser`'s `intern_var!`, which
/// only ever interns an already-lexed name and so doesn't need to call
/// back into `self`).
struct Symbols {
    vars: PrimaryMap<Var, VarInfo>,
    var_names: HashMap<String, Var>,
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

    fn take_reg(&mut self, syms: &mut Symbols) -> ParseResult<Reg> {
        match self.tok.clone() {
            Token::Var(n) => {
                self.advance()?;
                let v = *syms
                    .var_names
                    .entry(n.clone())
                    .or_insert_with(|| syms.vars.push(VarInfo { name: n.clone() }));
                Ok(Reg::Virtual(v))
            }
            Token::Ident(n) => match PhysReg::from_str(&n) {
                Ok(p) => {
                    self.advance()?;
                    Ok(Reg::Physical(p))
                }
                Err(()) => self.err(format!("expected register, found identifier {:?}", n)),
            },
            other => self.err(format!("expected register, found {:?}", other)),
        }
    }

    fn parse_operand(&mut self, syms: &mut Symbols) -> ParseResult<Operand> {
        match self.tok.clone() {
            Token::Num(n) => {
                self.advance()?;
                Ok(Operand::Num(n))
            }
            Token::Var(_) => Ok(Operand::Reg(self.take_reg(syms)?)),
            Token::Ident(n) if PhysReg::from_str(&n).is_ok() => Ok(Operand::Reg(self.take_reg(syms)?)),
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
            vars: PrimaryMap::new(),
            var_names: HashMap::new(),
            labels: PrimaryMap::new(),
            label_names_fwd: HashMap::new(),
        };

        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.tok != Token::Punct(")") {
            loop {
                match self.take_reg(&mut syms)? {
                    Reg::Virtual(v) => params.push(v),
                    Reg::Physical(_) => return self.err("parameters must be virtual registers"),
                }
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
                        Terminator::ReturnValue(self.parse_operand(&mut syms)?)
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

        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
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

        Ok(Function {
            name,
            params,
            returns_value,
            vars: syms.vars,
            label_names,
            blocks,
            entry,
            label_block,
            next_var_suffix: 0,
        })
    }

    fn parse_item(&mut self, syms: &mut Symbols) -> ParseResult<Instruction> {
        if let Token::Ident(kw) = self.tok.clone() {
            if kw == "cjump" {
                self.advance()?;
                let l = self.parse_operand(syms)?;
                let op = self.peek_cmp().ok_or_else(|| ParseError {
                    location: self.loc,
                    message: format!("expected comparison operator, found {:?}", self.tok),
                })?;
                self.advance()?;
                let r = self.parse_operand(syms)?;
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
                let base = self.take_reg(syms)?;
                self.expect_punct(",")?;
                let disp = self.take_num()?;
                self.expect_punct("]")?;
                self.expect_punct("<-")?;
                let src = self.parse_operand(syms)?;
                self.expect_punct(";")?;
                return Ok(Instruction::Store(base, disp, src));
            }
        }

        let dst = self.take_reg(syms)?;

        if let Some(op) = self.peek_arith() {
            self.advance()?;
            self.expect_punct("=")?;
            let rhs = self.parse_operand(syms)?;
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
                let base = self.take_reg(syms)?;
                self.expect_punct(",")?;
                let disp = self.take_num()?;
                self.expect_punct("]")?;
                self.expect_punct(";")?;
                return Ok(Instruction::Load(dst, base, disp));
            }
        }

        let first = self.parse_operand(syms)?;
        if let Some(op) = self.peek_cmp() {
            self.advance()?;
            let rhs = self.parse_operand(syms)?;
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
        let src = "value @f(%a, %b) {\n\
                    %c <- %a < %b;\n\
                    %a += %b;\n\
                    mem[rsp, -8] <- %a;\n\
                    %a <- mem[rsp, -8];\n\
                    return %a;\n\
                }\n";
        let prog = parse_program(src).unwrap();
        let out = super::super::printer::print_program(&prog);
        let reparsed = parse_program(&out).unwrap();
        assert_eq!(reparsed.functions[0].blocks.len(), prog.functions[0].blocks.len());
    }

    #[test]
    fn cjump_is_a_mid_block_instruction_not_a_terminator() {
        let src = "void @f() {\n\
                    cjump rax = 0, :skip;\n\
                    call print, 1;\n\
                :skip\n\
                    return;\n\
                }\n";
        let prog = parse_program(src).unwrap();
        let f = &prog.functions[0];
        assert_eq!(f.blocks.len(), 2);
        assert!(matches!(f.blocks[f.entry].insts[0], Instruction::CondJump(..)));
    }
}
