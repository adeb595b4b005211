//! A hand-written recursive-descent parser for LB's surface syntax.
//!
//! Grammar (informal):
//!
//! ```text
//! program    := function*
//! function   := type '@' ident '(' params? ')' block
//! params     := param (',' param)*
//! param      := type '%' ident
//! block      := '{' stmt* '}'
//! stmt       := decl | flat | if | while | 'continue' ';' | 'break' ';'
//! decl       := type '%' ident ';'
//! if         := 'if' '(' cond ')' block ('else' block)?
//! while      := 'while' '(' cond ')' block
//! ```

use super::ast::*;
use crate::common::{ArithOp, CmpOp, Type};
use crate::lexer::{Lexer, Token};
use lnc_support::{Location, ParseError, ParseResult};

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

    fn expect_ident(&mut self, kw: &str) -> ParseResult<()> {
        if self.tok == Token::Ident(kw.to_string()) {
            self.advance()
        } else {
            self.err(format!("expected keyword {:?}, found {:?}", kw, self.tok))
        }
    }

    fn take_var(&mut self) -> ParseResult<String> {
        match self.tok.clone() {
            Token::Var(n) => {
                self.advance()?;
                Ok(n)
            }
            other => self.err(format!("expected variable, found {:?}", other)),
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

    fn parse_type(&mut self) -> ParseResult<Type> {
        let name = self.take_ident()?;
        let mut ty = match name.as_str() {
            "int64" => Type::Int64,
            "tuple" => Type::Tuple,
            "code" => Type::Code,
            "void" => Type::Void,
            other => return self.err(format!("unknown type {:?}", other)),
        };
        let mut rank = 0u32;
        while self.tok == Token::Punct("[") {
            self.advance()?;
            self.expect_punct("]")?;
            rank += 1;
        }
        if rank > 0 {
            if ty != Type::Int64 {
                return self.err("only int64 may be array-typed");
            }
            ty = Type::Array(rank);
        }
        Ok(ty)
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        match self.tok.clone() {
            Token::Num(n) => {
                self.advance()?;
                Ok(Operand::Num(n))
            }
            Token::Var(n) => {
                self.advance()?;
                Ok(Operand::Var(n))
            }
            other => self.err(format!("expected operand, found {:?}", other)),
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

    fn parse_cond(&mut self) -> ParseResult<Cond> {
        self.expect_punct("(")?;
        let lhs = self.parse_operand()?;
        let op = self
            .peek_cmp()
            .ok_or_else(|| ParseError {
                location: self.loc,
                message: "expected a comparison operator".into(),
            })?;
        self.advance()?;
        let rhs = self.parse_operand()?;
        self.expect_punct(")")?;
        Ok(Cond { op, lhs, rhs })
    }

    fn parse_callee(&mut self) -> ParseResult<Callee> {
        match self.tok.clone() {
            Token::Func(name) => {
                self.advance()?;
                Ok(Callee::Func(name))
            }
            Token::Ident(name) => {
                self.advance()?;
                Ok(Callee::Runtime(name))
            }
            other => self.err(format!("expected callee, found {:?}", other)),
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Operand>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if self.tok != Token::Punct(")") {
            args.push(self.parse_operand()?);
            while self.tok == Token::Punct(",") {
                self.advance()?;
                args.push(self.parse_operand()?);
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_index_list(&mut self) -> ParseResult<Vec<Operand>> {
        self.expect_punct("[")?;
        let mut idx = vec![self.parse_operand()?];
        while self.tok == Token::Punct(",") {
            self.advance()?;
            idx.push(self.parse_operand()?);
        }
        self.expect_punct("]")?;
        Ok(idx)
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.tok != Token::Punct(")") {
            loop {
                let ty = self.parse_type()?;
                let name = self.take_var()?;
                params.push(Param { name, ty });
                if self.tok == Token::Punct(",") {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        let ret = self.parse_type()?;
        let name = match self.tok.clone() {
            Token::Func(n) => {
                self.advance()?;
                n
            }
            other => return self.err(format!("expected function name, found {:?}", other)),
        };
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Function {
            name,
            params,
            ret,
            body,
        })
    }

    fn is_type_start(&self) -> bool {
        matches!(
            &self.tok,
            Token::Ident(n) if matches!(n.as_str(), "int64" | "tuple" | "code" | "void")
        )
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while self.tok != Token::Punct("}") {
            stmts.push(self.parse_stmt()?);
        }
        self.expect_punct("}")?;
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let loc = self.loc;
        if self.is_type_start() {
            let ty = self.parse_type()?;
            let name = self.take_var()?;
            self.expect_punct(";")?;
            return Ok(Stmt::Decl(name, ty, loc));
        }
        match self.tok.clone() {
            Token::Ident(kw) if kw == "if" => {
                self.advance()?;
                let cond = self.parse_cond()?;
                let then_blk = self.parse_block()?;
                let else_blk = if self.tok == Token::Ident("else".to_string()) {
                    self.advance()?;
                    self.parse_block()?
                } else {
                    Block::default()
                };
                Ok(Stmt::If {
                    cond,
                    then_blk,
                    else_blk,
                    loc,
                })
            }
            Token::Ident(kw) if kw == "while" => {
                self.advance()?;
                let cond = self.parse_cond()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body, loc })
            }
            Token::Ident(kw) if kw == "continue" => {
                self.advance()?;
                self.expect_punct(";")?;
                Ok(Stmt::Continue(loc))
            }
            Token::Ident(kw) if kw == "break" => {
                self.advance()?;
                self.expect_punct(";")?;
                Ok(Stmt::Break(loc))
            }
            Token::Ident(kw) if kw == "return" => {
                self.advance()?;
                if self.tok == Token::Punct(";") {
                    self.advance()?;
                    Ok(Stmt::Flat(FlatInst::ReturnVoid, loc))
                } else {
                    let v = self.parse_operand()?;
                    self.expect_punct(";")?;
                    Ok(Stmt::Flat(FlatInst::ReturnValue(v), loc))
                }
            }
            Token::Ident(kw) if kw == "call" => {
                self.advance()?;
                let callee = self.parse_callee()?;
                let args = self.parse_args()?;
                self.expect_punct(";")?;
                Ok(Stmt::Flat(FlatInst::Call { callee, args }, loc))
            }
            Token::Var(_) => {
                let dst = self.take_var()?;
                if self.tok == Token::Punct("[") {
                    let indices = self.parse_index_list()?;
                    self.expect_punct("<-")?;
                    let src = self.parse_operand()?;
                    self.expect_punct(";")?;
                    return Ok(Stmt::Flat(
                        FlatInst::Store {
                            base: dst,
                            indices,
                            src,
                        },
                        loc,
                    ));
                }
                self.expect_punct("<-")?;
                let inst = self.parse_rhs(dst)?;
                self.expect_punct(";")?;
                Ok(Stmt::Flat(inst, loc))
            }
            other => self.err(format!("unexpected token starting statement: {:?}", other)),
        }
    }

    /// Parse everything after `%dst <-`.
    fn parse_rhs(&mut self, dst: String) -> ParseResult<FlatInst> {
        if self.tok == Token::Ident("call".to_string()) {
            self.advance()?;
            let callee = self.parse_callee()?;
            let args = self.parse_args()?;
            return Ok(FlatInst::CallAssign { dst, callee, args });
        }
        if self.tok == Token::Ident("new".to_string()) {
            self.advance()?;
            let kind = self.take_ident()?;
            return match kind.as_str() {
                "Array" => {
                    let dims = self.parse_args()?;
                    Ok(FlatInst::NewArray { dst, dims })
                }
                "Tuple" => {
                    self.expect_punct("(")?;
                    let len = self.parse_operand()?;
                    self.expect_punct(")")?;
                    Ok(FlatInst::NewTuple { dst, len })
                }
                other => self.err(format!("unknown allocation kind {:?}", other)),
            };
        }
        if self.tok == Token::Ident("length".to_string()) {
            self.advance()?;
            let base = self.take_var()?;
            if self.tok == Token::Punct(";") {
                return Ok(FlatInst::TupleLen { dst, base });
            }
            let dim = self.parse_operand()?;
            return Ok(FlatInst::ArrayLen { dst, base, dim });
        }

        let first = match self.tok.clone() {
            Token::Var(n) if self.peek_is_index_open() => {
                self.advance()?;
                let indices = self.parse_index_list()?;
                return Ok(FlatInst::Load {
                    dst,
                    base: n,
                    indices,
                });
            }
            _ => self.parse_operand()?,
        };

        if let Some(op) = self.peek_arith() {
            self.advance()?;
            let rhs = self.parse_operand()?;
            return Ok(FlatInst::BinOp {
                dst,
                op,
                lhs: first,
                rhs,
            });
        }
        if let Some(op) = self.peek_cmp() {
            self.advance()?;
            let rhs = self.parse_operand()?;
            return Ok(FlatInst::Compare {
                dst,
                op,
                lhs: first,
                rhs,
            });
        }
        Ok(FlatInst::Assign { dst, src: first })
    }

    /// One token of lookahead past the current `%var` token, to
    /// disambiguate a load (`%dst <- %base[...]`) from a plain variable
    /// operand, without mutating the parser's position.
    fn peek_is_index_open(&self) -> bool {
        if !matches!(self.tok, Token::Var(_)) {
            return false;
        }
        let mut probe = self.lx;
        matches!(probe.next(), Ok((Token::Punct("["), _)))
    }
}
