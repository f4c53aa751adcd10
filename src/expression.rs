// src/expression.rs
use crate::parser::{ParseError, Parser};
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum ENode {
    Str(String),
    Num(Number),
    Bool(bool),
    Null,
    /// Field lookup on the context item.
    Name(String),
    /// `$`
    Context,
    /// `$$`
    Root,
    /// `$name` outside a call; there are no bindings, so it is always undefined.
    Var(String),
    Path(Vec<Step>),
    Object(Vec<(ENode, ENode)>),
    Array(Vec<ENode>),
    Block(Vec<ENode>),
    Call { name: String, args: Vec<ENode> },
    Neg(Box<ENode>),
    Binary { op: BinOp, lhs: Box<ENode>, rhs: Box<ENode> },
    Condition { cond: Box<ENode>, then: Box<ENode>, otherwise: Option<Box<ENode>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub node: ENode,
    pub predicates: Vec<ENode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

pub type EParseErr = ParseError;

/// Deepest nesting of groups, constructors, predicates and operator chains.
pub const MAX_NESTING: usize = 128;

pub fn parse_expr(input: &str) -> Result<ENode, EParseErr> {
    let mut p = EParser::new(input);
    p.skip_ws();
    if p.eof() {
        return Err(p.parser.error("empty expression"));
    }
    let node = p.parse_condition()?;
    p.skip_ws();
    if !p.eof() {
        return Err(p.parser.error("trailing input"));
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            parser: Parser::new(s),
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), EParseErr> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.parser.error(format!("expression nested deeper than {MAX_NESTING} levels")));
        }
        Ok(())
    }

    fn parse_condition(&mut self) -> Result<ENode, EParseErr> {
        self.enter()?;
        let out = self.parse_condition_inner();
        self.depth -= 1;
        out
    }

    fn parse_condition_inner(&mut self) -> Result<ENode, EParseErr> {
        let cond = self.parse_or()?;
        self.skip_ws();
        if !self.parser.consume_char('?') {
            return Ok(cond);
        }
        let then = self.parse_condition()?;
        self.skip_ws();
        let otherwise = if self.parser.consume_char(':') {
            Some(Box::new(self.parse_condition()?))
        } else {
            None
        };
        Ok(ENode::Condition {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        })
    }

    fn parse_or(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        loop {
            self.skip_ws();
            if self.parser.consume_keyword("or") {
                self.enter()?;
                chained += 1;
                let right = self.parse_and()?;
                left = binary(BinOp::Or, left, right);
            } else {
                break;
            }
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_compare()?;
        let mut chained = 0;
        loop {
            self.skip_ws();
            if self.parser.consume_keyword("and") {
                self.enter()?;
                chained += 1;
                let right = self.parse_compare()?;
                left = binary(BinOp::And, left, right);
            } else {
                break;
            }
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<ENode, EParseErr> {
        let left = self.parse_additive()?;
        self.skip_ws();
        let op = if self.parser.consume_str("!=") {
            BinOp::Ne
        } else if self.parser.consume_str("<=") {
            BinOp::Lte
        } else if self.parser.consume_str(">=") {
            BinOp::Gte
        } else if self.parser.consume_char('=') {
            BinOp::Eq
        } else if self.parser.consume_char('<') {
            BinOp::Lt
        } else if self.parser.consume_char('>') {
            BinOp::Gt
        } else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_multiplicative()?;
        let mut chained = 0;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_char('+') {
                BinOp::Add
            } else if self.parser.consume_char('-') {
                BinOp::Sub
            } else if self.parser.consume_char('&') {
                BinOp::Concat
            } else {
                break;
            };
            self.enter()?;
            chained += 1;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ENode, EParseErr> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_char('*') {
                BinOp::Mul
            } else if self.parser.consume_char('/') {
                BinOp::Div
            } else if self.parser.consume_char('%') {
                BinOp::Mod
            } else {
                break;
            };
            self.enter()?;
            chained += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ENode, EParseErr> {
        self.skip_ws();
        if self.parser.consume_char('-') {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(match inner {
                ENode::Num(n) => match negate_literal(&n) {
                    Some(neg) => ENode::Num(neg),
                    None => ENode::Neg(Box::new(ENode::Num(n))),
                },
                other => ENode::Neg(Box::new(other)),
            });
        }
        self.parse_path()
    }

    /// Primary followed by any number of `.step` and `[predicate]` suffixes.
    fn parse_path(&mut self) -> Result<ENode, EParseErr> {
        let first = self.parse_primary()?;
        let mut steps = vec![Step { node: first, predicates: Vec::new() }];
        let mut extended = false;
        loop {
            self.skip_ws();
            if self.parser.peek_char() == Some('.') && self.parser.peek_nth(1) != Some('.') {
                self.parser.consume_char('.');
                self.skip_ws();
                let node = self.parse_step()?;
                steps.push(Step { node, predicates: Vec::new() });
                extended = true;
            } else if self.parser.consume_char('[') {
                let pred = self.parse_condition()?;
                self.skip_ws();
                self.parser.expect(']')?;
                if let Some(last) = steps.last_mut() {
                    last.predicates.push(pred);
                }
                extended = true;
            } else {
                break;
            }
        }
        if !extended {
            let only = steps.remove(0);
            return Ok(match only.node {
                // A bare name is still a path so array flattening applies
                ENode::Name(n) => ENode::Path(vec![Step { node: ENode::Name(n), predicates: Vec::new() }]),
                other => other,
            });
        }
        Ok(ENode::Path(steps))
    }

    fn parse_step(&mut self) -> Result<ENode, EParseErr> {
        match self.parser.peek_char() {
            Some('{') | Some('(') | Some('$') | Some('`') | Some('[') => self.parse_primary(),
            Some(c) if c == '_' || c.is_alphabetic() => Ok(ENode::Name(self.parser.parse_identifier()?)),
            _ => Err(self.parser.error("path step expected")),
        }
    }

    fn parse_primary(&mut self) -> Result<ENode, EParseErr> {
        self.skip_ws();
        match self.parser.peek_char() {
            None => Err(self.parser.error("unexpected end of expression")),
            Some('"') | Some('\'') => Ok(ENode::Str(self.parser.parse_quoted_string()?)),
            Some(c) if c.is_ascii_digit() => Ok(ENode::Num(self.parser.parse_number_literal()?)),
            Some('`') => Ok(ENode::Name(self.parser.parse_backtick_name()?)),
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('(') => self.parse_block(),
            Some('$') => self.parse_dollar(),
            Some(c) if c == '_' || c.is_alphabetic() => {
                if self.parser.consume_keyword("true") {
                    return Ok(ENode::Bool(true));
                }
                if self.parser.consume_keyword("false") {
                    return Ok(ENode::Bool(false));
                }
                if self.parser.consume_keyword("null") {
                    return Ok(ENode::Null);
                }
                Ok(ENode::Name(self.parser.parse_identifier()?))
            }
            Some(c) => Err(self.parser.error(format!("unexpected character '{c}'"))),
        }
    }

    fn parse_dollar(&mut self) -> Result<ENode, EParseErr> {
        self.parser.expect('$')?;
        if self.parser.consume_char('$') {
            return Ok(ENode::Root);
        }
        let starts_name = self
            .parser
            .peek_char()
            .is_some_and(|c| c == '_' || c.is_alphabetic());
        if !starts_name {
            return Ok(ENode::Context);
        }
        let name = self.parser.parse_identifier()?;
        self.skip_ws();
        if self.parser.consume_char('(') {
            let args = self.parse_args(')')?;
            return Ok(ENode::Call { name, args });
        }
        Ok(ENode::Var(name))
    }

    fn parse_object(&mut self) -> Result<ENode, EParseErr> {
        self.parser.expect('{')?;
        let mut pairs = Vec::new();
        self.skip_ws();
        if self.parser.consume_char('}') {
            return Ok(ENode::Object(pairs));
        }
        loop {
            let key = self.parse_condition()?;
            self.skip_ws();
            self.parser.expect(':')?;
            let value = self.parse_condition()?;
            pairs.push((key, value));
            self.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect('}')?;
            break;
        }
        Ok(ENode::Object(pairs))
    }

    fn parse_array(&mut self) -> Result<ENode, EParseErr> {
        self.parser.expect('[')?;
        Ok(ENode::Array(self.parse_args(']')?))
    }

    fn parse_block(&mut self) -> Result<ENode, EParseErr> {
        self.parser.expect('(')?;
        let mut body = Vec::new();
        loop {
            self.skip_ws();
            if self.parser.consume_char(')') {
                break;
            }
            body.push(self.parse_condition()?);
            self.skip_ws();
            if self.parser.consume_char(';') {
                continue;
            }
            self.parser.expect(')')?;
            break;
        }
        Ok(ENode::Block(body))
    }

    /// Comma-separated expressions up to `close`; the opening token is already consumed.
    fn parse_args(&mut self, close: char) -> Result<Vec<ENode>, EParseErr> {
        let mut out = Vec::new();
        self.skip_ws();
        if self.parser.consume_char(close) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_condition()?);
            self.skip_ws();
            if self.parser.consume_char(',') {
                continue;
            }
            self.parser.expect(close)?;
            break;
        }
        Ok(out)
    }

    fn skip_ws(&mut self) {
        self.parser.skip_ws();
    }

    fn eof(&self) -> bool {
        self.parser.eof()
    }
}

fn binary(op: BinOp, lhs: ENode, rhs: ENode) -> ENode {
    ENode::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn negate_literal(n: &Number) -> Option<Number> {
    match n.as_i64().and_then(i64::checked_neg) {
        Some(i) => Some(Number::from(i)),
        None => n.as_f64().and_then(|f| Number::from_f64(-f)),
    }
}

/// True when `name` can appear unquoted as a path segment.
pub fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c == '_' || c.is_alphabetic());
    starts_ok
        && chars.all(|c| c == '_' || c.is_alphanumeric())
        && !matches!(name, "true" | "false" | "null" | "and" | "or")
}

/// Render a field name as a path segment, backtick-quoting when needed.
pub fn quote_name(name: &str) -> String {
    if is_plain_name(name) {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}
