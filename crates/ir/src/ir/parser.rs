//! Recursive-descent parser for IR's flat, tagged-integer surface syntax.
//!
//! IR has dropped static types (spec.md §4.8): its header only records
//! whether the function returns a value, not what type. Per spec.md §6,
//! the typed ILs (LB, LA) write `<type> @name(...)`; IR is the first of
//! the untyped lower ILs, so its header instead carries a `value`/`void`
//! marker and its declarations drop the type prefix LA's `decl` has:
//!
//! ```text
//! function := ('value' | 'void') '@' ident '(' params? ')' '{' item* '}'
//! params   := '%' ident (',' '%' ident)*
//! item     := decl | inst ';' | label | term ';'
//! decl     := 'var' '%' ident ';'
//! term     := 'return' [operand] | 'jump' label | 'cbranch' '%'var ',' label ',' label
//! ```

use super::ast::*;
use crate::common::{ArithOp, Blk, Callee, CmpOp, FuncRef, Lbl, Var};
use crate::lexer::{Lexer, Token};
use lnc_entity::{PrimaryMap, SecondaryMap};
use lnc_support::{Location, ParseError, ParseResult};
use std::collections::HashMap;

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
    insts: Vec<(Instruction, Location)>,
    term: Option<Terminator>,
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

    fn take_ident(&mut self) -> ParseResult<String> {
        match self.tok.clone() {
            Token::Ident(n) => {
                self.advance()?;
                Ok(n)
            }
            other => self.err(format!("expected identifier, found {:?}", other)),
        }
    }

    fn take_var_name(&mut self) -> ParseResult<String> {
        match self.tok.clone() {
            Token::Var(n) => {
                self.advance()?;
                Ok(n)
            }
            other => self.err(format!("expected variable, found {:?}", other)),
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

    fn peek_arith(&self) -> Option<ArithOp> {
        match self.tok {
            Token::Punct("+") => Some(ArithOp::Add),
            Token::Punct("-") => Some(ArithOp::Sub),
            Token::Punct("*") => Some(ArithOp::Mul),
            Token::Punct("&") => Some(ArithOp::And),
            Token::Punct("<<") => Some(ArithOp::Shl),
            Token::Punct(">>") => Some(ArithOp::Shr),
            _ => None,
        }
    }

    fn peek_cmp(&self) -> Option<CmpOp> {
        match self.tok {
            Token::Punct("<") => Some(CmpOp::Lt),
            Token::Punct("<=") => Some(CmpOp::Le),
            Token::Punct("=") => Some(CmpOp::Eq),
            Token::Punct(">=") => Some(CmpOp::Ge),
            Token::Punct(">") => Some(CmpOp::Gt),
            _ => None,
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

        let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
        let mut var_names: HashMap<String, Var> = HashMap::new();
        let mut labels: PrimaryMap<Lbl, ()> = PrimaryMap::new();
        let mut label_names_fwd: HashMap<String, Lbl> = HashMap::new();

        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.tok != Token::Punct(")") {
            loop {
                let pname = self.take_var_name()?;
                let v = vars.push(VarInfo { name: pname.clone() });
                var_names.insert(pname, v);
                params.push(v);
                if self.tok == Token::Punct(",") {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_punct(")")?;
        self.expect_punct("{")?;

        macro_rules! intern_var {
            ($name:expr) => {{
                let n = $name;
                *var_names.entry(n.clone()).or_insert_with(|| {
                    vars.push(VarInfo { name: n.clone() })
                })
            }};
        }

        let entry_label = labels.push(());
        label_names_fwd.insert(String::new(), entry_label);
        let mut cur_label = entry_label;
        let mut cur_insts: Vec<(Instruction, Location)> = Vec::new();
        let mut finished: Vec<RawBlock> = Vec::new();

        while self.tok != Token::Punct("}") {
            if let Token::Label(_) = self.tok {
                let lname = self.take_label_name()?;
                let new_label = *label_names_fwd
                    .entry(lname)
                    .or_insert_with(|| labels.push(()));
                finished.push(RawBlock {
                    label: cur_label,
                    insts: std::mem::take(&mut cur_insts),
                    term: None,
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
                        let v = self.parse_operand(&mut intern_var!)?;
                        Terminator::ReturnValue(v)
                    };
                    self.expect_punct(";")?;
                    finished.push(RawBlock {
                        label: cur_label,
                        insts: std::mem::take(&mut cur_insts),
                        term: Some(term),
                    });
                    cur_label = labels.push(());
                }
                Token::Ident(kw) if kw == "jump" => {
                    self.advance()?;
                    let lname = self.take_label_name()?;
                    self.expect_punct(";")?;
                    let target = *label_names_fwd
                        .entry(lname)
                        .or_insert_with(|| labels.push(()));
                    finished.push(RawBlock {
                        label: cur_label,
                        insts: std::mem::take(&mut cur_insts),
                        term: Some(Terminator::Jump(target)),
                    });
                    cur_label = labels.push(());
                }
                Token::Ident(kw) if kw == "cbranch" => {
                    self.advance()?;
                    let cname = self.take_var_name()?;
                    let cvar = intern_var!(cname);
                    self.expect_punct(",")?;
                    let tname = self.take_label_name()?;
                    self.expect_punct(",")?;
                    let fname = self.take_label_name()?;
                    self.expect_punct(";")?;
                    let tlbl = *label_names_fwd
                        .entry(tname)
                        .or_insert_with(|| labels.push(()));
                    let flbl = *label_names_fwd
                        .entry(fname)
                        .or_insert_with(|| labels.push(()));
                    finished.push(RawBlock {
                        label: cur_label,
                        insts: std::mem::take(&mut cur_insts),
                        term: Some(Terminator::Branch(cvar, tlbl, flbl)),
                    });
                    cur_label = labels.push(());
                }
                _ => {
                    let loc = self.loc;
                    let inst = self.parse_item(&mut intern_var!)?;
                    cur_insts.push((inst, loc));
                }
            }
        }
        self.expect_punct("}")?;
        if !cur_insts.is_empty() {
            return self.err("function body ends without a terminator");
        }

        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
        for rb in finished {
            let term = rb.term.ok_or_else(|| ParseError {
                location: self.loc,
                message: "basic block missing a terminator".into(),
            })?;
            let blk = blocks.push(BasicBlock {
                label: rb.label,
                insts: rb.insts,
                term,
                falls_through: false,
            });
            label_block[rb.label] = Some(blk);
        }

        let entry = label_block[entry_label].ok_or_else(|| ParseError {
            location: self.loc,
            message: "function has no entry block".into(),
        })?;

        let mut label_names: SecondaryMap<Lbl, String> = SecondaryMap::new();
        for (name, lbl) in &label_names_fwd {
            label_names[*lbl] = name.clone();
        }

        Ok(Function {
            name,
            params,
            returns_value,
            vars,
            label_names,
            blocks,
            entry,
            label_block,
        })
    }

    fn parse_operand(&mut self, intern_var: &mut impl FnMut(String) -> Var) -> ParseResult<Operand> {
        match self.tok.clone() {
            Token::Num(n) => {
                self.advance()?;
                Ok(Operand::Num(n))
            }
            Token::Var(n) => {
                self.advance()?;
                Ok(Operand::Var(intern_var(n)))
            }
            other => self.err(format!("expected operand, found {:?}", other)),
        }
    }

    fn parse_args(
        &mut self,
        intern_var: &mut impl FnMut(String) -> Var,
    ) -> ParseResult<Vec<Operand>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if self.tok != Token::Punct(")") {
            args.push(self.parse_operand(intern_var)?);
            while self.tok == Token::Punct(",") {
                self.advance()?;
                args.push(self.parse_operand(intern_var)?);
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_index_list(
        &mut self,
        intern_var: &mut impl FnMut(String) -> Var,
    ) -> ParseResult<Vec<Operand>> {
        self.expect_punct("[")?;
        let mut idx = vec![self.parse_operand(intern_var)?];
        while self.tok == Token::Punct(",") {
            self.advance()?;
            idx.push(self.parse_operand(intern_var)?);
        }
        self.expect_punct("]")?;
        Ok(idx)
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

    fn parse_item(
        &mut self,
        intern_var: &mut impl FnMut(String) -> Var,
    ) -> ParseResult<Instruction> {
        if let Token::Ident(n) = &self.tok {
            if n == "var" {
                self.advance()?;
                let name = self.take_var_name()?;
                self.expect_punct(";")?;
                return Ok(Instruction::Decl(intern_var(name)));
            }
            if n == "call" {
                self.advance()?;
                let callee = self.parse_callee()?;
                let args = self.parse_args(intern_var)?;
                self.expect_punct(";")?;
                return Ok(Instruction::Call(callee, args));
            }
        }

        let dst_name = self.take_var_name()?;
        if self.tok == Token::Punct("[") {
            let indices = self.parse_index_list(intern_var)?;
            self.expect_punct("<-")?;
            let src = self.parse_operand(intern_var)?;
            self.expect_punct(";")?;
            return Ok(Instruction::Store(intern_var(dst_name), indices, src));
        }
        self.expect_punct("<-")?;
        let dst = intern_var(dst_name);

        if self.tok == Token::Ident("call".to_string()) {
            self.advance()?;
            let callee = self.parse_callee()?;
            let args = self.parse_args(intern_var)?;
            self.expect_punct(";")?;
            return Ok(Instruction::CallAssign(dst, callee, args));
        }
        if self.tok == Token::Ident("new".to_string()) {
            self.advance()?;
            let kind = self.take_ident()?;
            return match kind.as_str() {
                "Array" => {
                    let dims = self.parse_args(intern_var)?;
                    self.expect_punct(";")?;
                    Ok(Instruction::NewArray(dst, dims))
                }
                "Tuple" => {
                    self.expect_punct("(")?;
                    let len = self.parse_operand(intern_var)?;
                    self.expect_punct(")")?;
                    self.expect_punct(";")?;
                    Ok(Instruction::NewTuple(dst, len))
                }
                other => self.err(format!("unknown allocation kind {:?}", other)),
            };
        }
        if self.tok == Token::Ident("length".to_string()) {
            self.advance()?;
            let base_name = self.take_var_name()?;
            let base = intern_var(base_name);
            if self.tok == Token::Punct(";") {
                self.advance()?;
                return Ok(Instruction::TupleLen(dst, base));
            }
            let dim = self.parse_operand(intern_var)?;
            self.expect_punct(";")?;
            return Ok(Instruction::ArrayLen(dst, base, dim));
        }

        let first = match self.tok.clone() {
            Token::Var(n) if self.peek_is_index_open() => {
                self.advance()?;
                let base = intern_var(n);
                let indices = self.parse_index_list(intern_var)?;
                self.expect_punct(";")?;
                return Ok(Instruction::Load(dst, base, indices));
            }
            _ => self.parse_operand(intern_var)?,
        };

        if let Some(op) = self.peek_arith() {
            self.advance()?;
            let rhs = self.parse_operand(intern_var)?;
            self.expect_punct(";")?;
            return Ok(Instruction::BinOp(dst, op, first, rhs));
        }
        if let Some(op) = self.peek_cmp() {
            self.advance()?;
            let rhs = self.parse_operand(intern_var)?;
            self.expect_punct(";")?;
            return Ok(Instruction::Compare(dst, op, first, rhs));
        }
        self.expect_punct(";")?;
        Ok(Instruction::Assign(dst, first))
    }

    fn peek_is_index_open(&self) -> bool {
        if !matches!(self.tok, Token::Var(_)) {
            return false;
        }
        let mut probe = self.lx;
        matches!(probe.next(), Ok((Token::Punct("["), _)))
    }
}

fn name_hash(name: &str) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut h = DefaultHasher::new();
    name.hash(&mut h);
    (h.finish() % (u32::MAX as u64 / 2)) as usize
}
