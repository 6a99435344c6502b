//! Velocity template parser
//!
//! Turns template text into a node tree. Directive lines that hold nothing
//! but whitespace and directives are dropped from the output together with
//! their newline, the way Velocity's "lines" space gobbling works.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Number, Value};

use super::{ErrorKind, VelocityError, MAX_DEPTH};
use crate::syntax::HELPER_FUNCTIONS;

/// 1-based line, 0-based column
pub(crate) type Position = (usize, usize);

#[derive(Debug)]
pub(crate) struct Template {
    pub nodes: Vec<Node>,
    pub macros: HashMap<String, Rc<MacroDef>>,
}

#[derive(Debug)]
pub(crate) struct MacroDef {
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Text(String),
    Reference(Reference),
    Set {
        target: Reference,
        value: Expr,
        at: Position,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    Define {
        name: String,
        body: Rc<Vec<Node>>,
    },
    MacroCall {
        name: String,
        args: Vec<Expr>,
        source: String,
        at: Position,
    },
    Evaluate {
        expr: Expr,
        at: Position,
    },
    /// `#parse` / `#include`, which need a resource loader
    Include {
        directive: String,
        at: Position,
    },
    Break,
    Stop,
}

#[derive(Debug)]
pub(crate) struct Reference {
    pub quiet: bool,
    pub root: String,
    /// Arguments of a helper call on the root, as in `$format_date("%Y")`
    pub call: Option<Vec<Expr>>,
    pub segments: Vec<Segment>,
    /// Source text, rendered when the reference does not resolve
    pub literal: String,
    pub at: Position,
}

#[derive(Debug)]
pub(crate) enum Segment {
    Property(String),
    Method(String, Vec<Expr>),
    Index(Expr),
}

#[derive(Debug)]
pub(crate) enum Expr {
    Literal(Value),
    Reference(Box<Reference>),
    /// Double-quoted string containing references or directives
    Interpolated(Vec<Node>),
    List(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>, Position),
    Map(Vec<(Expr, Expr)>),
    Not(Box<Expr>),
    Negate(Box<Expr>, Position),
    Binary(BinaryOp, Box<Expr>, Box<Expr>, Position),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// Operators by precedence level, lowest first: (symbol, word form, op)
const PRECEDENCE: &[&[(&str, &str, BinaryOp)]] = &[
    &[("||", "or", BinaryOp::Or)],
    &[("&&", "and", BinaryOp::And)],
    &[("==", "eq", BinaryOp::Eq), ("!=", "ne", BinaryOp::Ne)],
    &[
        ("<=", "le", BinaryOp::Le),
        (">=", "ge", BinaryOp::Ge),
        ("<", "lt", BinaryOp::Lt),
        (">", "gt", BinaryOp::Gt),
    ],
    &[("+", "", BinaryOp::Add), ("-", "", BinaryOp::Sub)],
    &[
        ("*", "", BinaryOp::Mul),
        ("/", "", BinaryOp::Div),
        ("%", "", BinaryOp::Mod),
    ],
];

/// How a nested body ended
enum Terminator {
    Eof,
    End(Position),
    Else(Position),
    ElseIf(Expr, Position),
}

/// Parse a whole template
pub(crate) fn parse(source: &str) -> Result<Template, VelocityError> {
    let mut parser = Parser::new(source, (1, 0), true);
    let (nodes, terminator) = parser.parse_body()?;
    match terminator {
        Terminator::Eof => Ok(Template {
            nodes,
            macros: parser.macros,
        }),
        Terminator::End(at) => Err(syntax_error(at, "Unexpected #end with no open block")),
        Terminator::Else(at) | Terminator::ElseIf(_, at) => {
            Err(syntax_error(at, "#else without matching #if"))
        }
    }
}

fn syntax_error(at: Position, message: impl Into<String>) -> VelocityError {
    VelocityError::new(ErrorKind::Syntax, message, Some(at))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line_starts: Vec<usize>,
    origin: Position,
    gobble: bool,
    /// Whether the current output line already holds something visible
    line_has_content: bool,
    /// Open blocks and expressions around the cursor
    depth: usize,
    macros: HashMap<String, Rc<MacroDef>>,
}

impl Parser {
    fn new(source: &str, origin: Position, gobble: bool) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut line_starts = vec![0];
        line_starts.extend(
            chars
                .iter()
                .enumerate()
                .filter(|(_, c)| **c == '\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            chars,
            pos: 0,
            line_starts,
            origin,
            gobble,
            line_has_content: false,
            depth: 0,
            macros: HashMap::new(),
        }
    }

    fn position(&self, pos: usize) -> Position {
        let idx = self.line_starts.partition_point(|&start| start <= pos) - 1;
        let column = pos - self.line_starts[idx];
        if idx == 0 {
            (self.origin.0, self.origin.1 + column)
        } else {
            (self.origin.0 + idx, column)
        }
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> VelocityError {
        syntax_error(self.position(pos), message)
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        at: Position,
        parse: impl FnOnce(&mut Self) -> Result<T, VelocityError>,
    ) -> Result<T, VelocityError> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax_error(
                at,
                format!("Nesting deeper than {} levels", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn find(&self, pattern: &str, from: usize) -> Option<usize> {
        let pattern: Vec<char> = pattern.chars().collect();
        if from >= self.chars.len() {
            return None;
        }
        self.chars[from..]
            .windows(pattern.len())
            .position(|window| window == pattern.as_slice())
            .map(|idx| idx + from)
    }

    fn source(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.source(start, self.pos)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char, context: &str) -> Result<(), VelocityError> {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(self.pos, format!("Expected `{}` {}", expected, context)))
        }
    }

    /// Drop the line a standalone directive sits on: its indentation (still
    /// in `text`) and everything up to and including the newline.
    fn finish_directive(&mut self, text: &mut String) {
        if !self.gobble || self.line_has_content {
            return;
        }
        let mut end = self.pos;
        while matches!(self.chars.get(end), Some(' ' | '\t' | '\r')) {
            end += 1;
        }
        match self.chars.get(end) {
            Some('\n') => end += 1,
            None => {}
            Some(_) => return,
        }
        let kept = text.trim_end_matches([' ', '\t']).len();
        text.truncate(kept);
        self.pos = end;
    }

    fn parse_body(&mut self) -> Result<(Vec<Node>, Terminator), VelocityError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        let terminator = loop {
            let Some(c) = self.peek() else {
                break Terminator::Eof;
            };
            match c {
                '\\' if matches!(self.peek_at(1), Some('$' | '#')) => {
                    text.push(self.chars[self.pos + 1]);
                    self.pos += 2;
                    self.line_has_content = true;
                }
                '$' => match self.parse_reference()? {
                    Some(reference) => {
                        flush(&mut nodes, &mut text);
                        nodes.push(Node::Reference(reference));
                        self.line_has_content = true;
                    }
                    None => {
                        text.push('$');
                        self.pos += 1;
                        self.line_has_content = true;
                    }
                },
                '#' => {
                    if let Some(terminator) = self.parse_hash(&mut nodes, &mut text)? {
                        break terminator;
                    }
                }
                '\n' => {
                    text.push('\n');
                    self.pos += 1;
                    self.line_has_content = false;
                }
                c => {
                    text.push(c);
                    self.pos += 1;
                    if !c.is_whitespace() {
                        self.line_has_content = true;
                    }
                }
            }
        };

        flush(&mut nodes, &mut text);
        Ok((nodes, terminator))
    }

    /// Parse a `#` construct at the cursor. Returns a terminator when the
    /// construct closes the enclosing body.
    fn parse_hash(
        &mut self,
        nodes: &mut Vec<Node>,
        text: &mut String,
    ) -> Result<Option<Terminator>, VelocityError> {
        let start = self.pos;
        let at = self.position(start);

        if self.starts_with("##") {
            if !self.line_has_content {
                let kept = text.trim_end_matches([' ', '\t']).len();
                text.truncate(kept);
            }
            self.pos = self.find("\n", start).map_or(self.chars.len(), |nl| nl + 1);
            self.line_has_content = false;
            return Ok(None);
        }
        if self.starts_with("#*") {
            self.pos = self.find("*#", start + 2).map_or(self.chars.len(), |idx| idx + 2);
            self.finish_directive(text);
            return Ok(None);
        }
        if self.starts_with("#[[") {
            let end = self.find("]]#", start + 3);
            let content_end = end.unwrap_or(self.chars.len());
            let content = self.source(start + 3, content_end);
            if !content.is_empty() {
                self.line_has_content = content.rsplit('\n').next().is_some_and(|l| !l.trim().is_empty());
            }
            text.push_str(&content);
            self.pos = end.map_or(self.chars.len(), |idx| idx + 3);
            return Ok(None);
        }

        let Some((name, name_end)) = self.directive_name(start) else {
            text.push('#');
            self.pos += 1;
            self.line_has_content = true;
            return Ok(None);
        };

        match name.as_str() {
            "end" | "else" => {
                self.pos = name_end;
                self.finish_directive(text);
                let terminator = if name == "end" {
                    Terminator::End(at)
                } else {
                    Terminator::Else(at)
                };
                return Ok(Some(terminator));
            }
            "elseif" => {
                self.pos = name_end;
                let condition = self.parse_condition("#elseif")?;
                self.finish_directive(text);
                return Ok(Some(Terminator::ElseIf(condition, at)));
            }
            "set" => {
                self.pos = name_end;
                let node = self.parse_set(at)?;
                self.finish_directive(text);
                flush(nodes, text);
                nodes.push(node);
            }
            "if" => {
                self.pos = name_end;
                let condition = self.parse_condition("#if")?;
                self.finish_directive(text);
                flush(nodes, text);
                nodes.push(self.parse_if(condition, at)?);
            }
            "foreach" => {
                self.pos = name_end;
                let (var, iterable) = self.parse_foreach_header()?;
                self.finish_directive(text);
                flush(nodes, text);
                let body = self.parse_block("#foreach", at)?;
                nodes.push(Node::Foreach {
                    var,
                    iterable,
                    body,
                });
            }
            "macro" => {
                self.pos = name_end;
                let (macro_name, params) = self.parse_macro_header()?;
                self.finish_directive(text);
                let body = self.parse_block("#macro", at)?;
                self.macros
                    .insert(macro_name, Rc::new(MacroDef { params, body }));
            }
            "define" => {
                self.pos = name_end;
                self.expect('(', "after #define")?;
                self.skip_ws();
                let Some(target) = self.parse_reference()? else {
                    return Err(self.error(self.pos, "#define expects a reference"));
                };
                self.expect(')', "to close #define")?;
                self.finish_directive(text);
                flush(nodes, text);
                let body = self.parse_block("#define", at)?;
                nodes.push(Node::Define {
                    name: target.root,
                    body: Rc::new(body),
                });
            }
            "evaluate" | "parse" | "include" => {
                self.pos = name_end;
                self.expect('(', &format!("after #{}", name))?;
                let expr = self.parse_expr()?;
                self.expect(')', &format!("to close #{}", name))?;
                flush(nodes, text);
                nodes.push(if name == "evaluate" {
                    Node::Evaluate { expr, at }
                } else {
                    Node::Include {
                        directive: name.clone(),
                        at,
                    }
                });
                self.line_has_content = true;
            }
            "stop" | "break" => {
                self.pos = name_end;
                self.finish_directive(text);
                flush(nodes, text);
                nodes.push(if name == "stop" { Node::Stop } else { Node::Break });
            }
            _ if self.chars.get(name_end) == Some(&'(') => {
                self.pos = name_end + 1;
                let args = self.parse_args(')', "macro call")?;
                flush(nodes, text);
                nodes.push(Node::MacroCall {
                    name: name.clone(),
                    args,
                    source: self.source(start, self.pos),
                    at,
                });
                self.line_has_content = true;
            }
            _ => {
                text.push_str(&self.source(start, name_end));
                self.pos = name_end;
                self.line_has_content = true;
            }
        }
        Ok(None)
    }

    /// `#name` or `#{name}` at `start`: the name and the index past it
    fn directive_name(&self, start: usize) -> Option<(String, usize)> {
        let mut p = start + 1;
        let braced = self.chars.get(p) == Some(&'{');
        if braced {
            p += 1;
        }
        if !self.chars.get(p).is_some_and(|c| is_ident_start(*c)) {
            return None;
        }
        let mut end = p;
        while self.chars.get(end).is_some_and(|c| is_ident_char(*c)) {
            end += 1;
        }
        let name = self.source(p, end);
        if braced {
            if self.chars.get(end) != Some(&'}') {
                return None;
            }
            end += 1;
        }
        Some((name, end))
    }

    /// Body of a block directive, which must end with `#end`
    fn parse_block(&mut self, directive: &str, at: Position) -> Result<Vec<Node>, VelocityError> {
        let (body, terminator) = self.nested(at, Self::parse_body)?;
        match terminator {
            Terminator::End(_) => Ok(body),
            Terminator::Eof => Err(syntax_error(
                at,
                format!("{} is never closed with #end", directive),
            )),
            Terminator::Else(else_at) | Terminator::ElseIf(_, else_at) => {
                Err(syntax_error(else_at, "#else without matching #if"))
            }
        }
    }

    fn parse_if(&mut self, condition: Expr, at: Position) -> Result<Node, VelocityError> {
        self.nested(at, |parser| parser.parse_if_chain(condition, at))
    }

    fn parse_if_chain(&mut self, condition: Expr, at: Position) -> Result<Node, VelocityError> {
        let mut branches = Vec::new();
        let mut condition = condition;
        loop {
            let (body, terminator) = self.parse_body()?;
            branches.push((condition, body));
            match terminator {
                Terminator::End(_) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    })
                }
                Terminator::ElseIf(next, _) => condition = next,
                Terminator::Else(_) => {
                    let (otherwise, terminator) = self.parse_body()?;
                    return match terminator {
                        Terminator::End(_) => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        Terminator::Eof => Err(syntax_error(at, "#if is never closed with #end")),
                        Terminator::Else(else_at) | Terminator::ElseIf(_, else_at) => {
                            Err(syntax_error(else_at, "#else after #else"))
                        }
                    };
                }
                Terminator::Eof => return Err(syntax_error(at, "#if is never closed with #end")),
            }
        }
    }

    fn parse_condition(&mut self, directive: &str) -> Result<Expr, VelocityError> {
        self.expect('(', &format!("after {}", directive))?;
        let condition = self.parse_expr()?;
        self.expect(')', &format!("to close {}", directive))?;
        Ok(condition)
    }

    fn parse_set(&mut self, at: Position) -> Result<Node, VelocityError> {
        self.expect('(', "after #set")?;
        self.skip_ws();
        let Some(target) = self.parse_reference()? else {
            return Err(self.error(self.pos, "#set expects a reference to assign"));
        };
        self.skip_ws();
        if self.peek() != Some('=') || self.peek_at(1) == Some('=') {
            return Err(self.error(self.pos, "Expected `=` in #set"));
        }
        self.pos += 1;
        let value = self.parse_expr()?;
        self.expect(')', "to close #set")?;
        Ok(Node::Set { target, value, at })
    }

    fn parse_foreach_header(&mut self) -> Result<(String, Expr), VelocityError> {
        self.expect('(', "after #foreach")?;
        self.skip_ws();
        let var_start = self.pos;
        let var = match self.parse_reference()? {
            Some(reference) if reference.segments.is_empty() && reference.call.is_none() => {
                reference.root
            }
            _ => return Err(self.error(var_start, "#foreach expects a loop variable")),
        };
        self.skip_ws();
        if !self.take_word("in") {
            return Err(self.error(self.pos, "Expected `in` in #foreach"));
        }
        let iterable = self.parse_expr()?;
        self.expect(')', "to close #foreach")?;
        Ok((var, iterable))
    }

    fn parse_macro_header(&mut self) -> Result<(String, Vec<String>), VelocityError> {
        self.expect('(', "after #macro")?;
        self.skip_ws();
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error(self.pos, "#macro expects a name"));
        }
        let name = self.ident();
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(')') => {
                    self.pos += 1;
                    return Ok((name, params));
                }
                Some(',') => self.pos += 1,
                Some('$') if self.peek_at(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    params.push(self.ident());
                }
                _ => return Err(self.error(self.pos, "Malformed #macro parameter list")),
            }
        }
    }

    /// Consume `word` when it stands alone at the cursor
    fn take_word(&mut self, word: &str) -> bool {
        let end = self.pos + word.chars().count();
        if self.starts_with(word) && !self.chars.get(end).is_some_and(|c| is_ident_char(*c)) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    /// Parse a reference at the cursor. Returns `None`, leaving the cursor
    /// alone, when the `$` does not start one.
    fn parse_reference(&mut self) -> Result<Option<Reference>, VelocityError> {
        let start = self.pos;
        let mut p = start + 1;
        let quiet = self.chars.get(p) == Some(&'!');
        if quiet {
            p += 1;
        }
        let braced = self.chars.get(p) == Some(&'{');
        if braced {
            p += 1;
        }
        if !self.chars.get(p).is_some_and(|c| is_ident_start(*c)) {
            return Ok(None);
        }

        self.pos = p;
        let root = self.ident();
        let call = if self.peek() == Some('(') && HELPER_FUNCTIONS.contains(&root.as_str()) {
            self.pos += 1;
            Some(self.parse_args(')', "helper call")?)
        } else {
            None
        };

        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    let name = self.ident();
                    if self.peek() == Some('(') {
                        self.pos += 1;
                        let args = self.parse_args(')', "method call")?;
                        segments.push(Segment::Method(name, args));
                    } else {
                        segments.push(Segment::Property(name));
                    }
                }
                Some('[') => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(']', "to close the index")?;
                    segments.push(Segment::Index(index));
                }
                _ => break,
            }
        }

        if braced {
            if self.peek() != Some('}') {
                return Err(self.error(
                    start,
                    format!("Unclosed reference `{}`", self.source(start, self.pos)),
                ));
            }
            self.pos += 1;
        }

        Ok(Some(Reference {
            quiet,
            root,
            call,
            segments,
            literal: self.source(start, self.pos),
            at: self.position(start),
        }))
    }

    /// Arguments up to `close`, separated by commas or whitespace
    fn parse_args(&mut self, close: char, what: &str) -> Result<Vec<Expr>, VelocityError> {
        let open = self.pos.saturating_sub(1);
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(args);
                }
                Some(',') => self.pos += 1,
                Some(_) => args.push(self.parse_expr()?),
                None => return Err(self.error(open, format!("Unclosed {}", what))),
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, VelocityError> {
        let at = self.position(self.pos);
        self.nested(at, |parser| parser.parse_level(0))
    }

    fn parse_level(&mut self, level: usize) -> Result<Expr, VelocityError> {
        let Some(operators) = PRECEDENCE.get(level) else {
            return self.parse_unary();
        };
        let mut lhs = self.parse_level(level + 1)?;
        loop {
            self.skip_ws();
            let op_pos = self.pos;
            let Some(op) = self.take_operator(operators) else {
                return Ok(lhs);
            };
            let rhs = self.parse_level(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), self.position(op_pos));
        }
    }

    fn take_operator(&mut self, operators: &[(&str, &str, BinaryOp)]) -> Option<BinaryOp> {
        for &(symbol, word, op) in operators {
            if self.starts_with(symbol) {
                self.pos += symbol.len();
                return Some(op);
            }
            if !word.is_empty() && self.take_word(word) {
                return Some(op);
            }
        }
        None
    }

    fn parse_unary(&mut self) -> Result<Expr, VelocityError> {
        self.skip_ws();
        let start = self.pos;
        let at = self.position(start);
        if self.peek() == Some('!') && self.peek_at(1) != Some('=') {
            self.pos += 1;
            let operand = self.nested(at, Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        if self.take_word("not") {
            let operand = self.nested(at, Self::parse_unary)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        if self.peek() == Some('-') {
            self.pos += 1;
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return self.parse_number(start);
            }
            let operand = self.nested(at, Self::parse_unary)?;
            return Ok(Expr::Negate(Box::new(operand), at));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, VelocityError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(')', "to close the parenthesis")?;
                Ok(inner)
            }
            Some('$') => match self.parse_reference()? {
                Some(reference) => Ok(Expr::Reference(Box::new(reference))),
                None => Err(self.error(start, "Expected a reference after `$`")),
            },
            Some('"') => self.parse_string('"', true),
            Some('\'') => self.parse_string('\'', false),
            Some('[') => self.parse_list(),
            Some('{') => self.parse_map(),
            Some(c) if c.is_ascii_digit() => self.parse_number(start),
            Some(c) if is_ident_start(c) => {
                let word = self.ident();
                match word.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => Err(self.error(start, format!("Unexpected `{}` in expression", word))),
                }
            }
            Some(c) => Err(self.error(start, format!("Unexpected `{}` in expression", c))),
            None => Err(self.error(start, "Unexpected end of template in expression")),
        }
    }

    /// Number literal starting at `start` (which may be a `-` sign)
    fn parse_number(&mut self, start: usize) -> Result<Expr, VelocityError> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal = self.source(start, self.pos);
        let number = if is_float {
            literal.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            literal
                .parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| literal.parse::<f64>().ok().and_then(Number::from_f64))
        };
        number
            .map(|n| Expr::Literal(Value::Number(n)))
            .ok_or_else(|| self.error(start, format!("Invalid number `{}`", literal)))
    }

    fn parse_string(&mut self, quote: char, interpolate: bool) -> Result<Expr, VelocityError> {
        let start = self.pos;
        self.pos += 1;
        let mut content = String::new();
        loop {
            match self.peek() {
                // A doubled quote is a literal quote
                Some(c) if c == quote && self.peek_at(1) == Some(quote) => {
                    content.push(quote);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    content.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error(start, "Unterminated string literal")),
            }
        }

        if !interpolate || !content.contains(['$', '#']) {
            return Ok(Expr::Literal(Value::String(content)));
        }

        let mut origin = self.position(start);
        origin.1 += 1;
        let mut inner = Parser::new(&content, origin, false);
        inner.depth = self.depth;
        let (nodes, terminator) = inner.nested(origin, Self::parse_body)?;
        match terminator {
            Terminator::Eof => {}
            Terminator::End(at) | Terminator::Else(at) | Terminator::ElseIf(_, at) => {
                return Err(syntax_error(at, "Unbalanced directive inside string literal"));
            }
        }
        self.macros.extend(inner.macros);
        Ok(Expr::Interpolated(nodes))
    }

    fn parse_list(&mut self) -> Result<Expr, VelocityError> {
        let open = self.pos;
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(Expr::List(Vec::new()));
        }

        let first = self.parse_expr()?;
        self.skip_ws();
        if self.starts_with("..") {
            self.pos += 2;
            let last = self.parse_expr()?;
            self.expect(']', "to close the range")?;
            return Ok(Expr::Range(
                Box::new(first),
                Box::new(last),
                self.position(open),
            ));
        }

        let mut items = vec![first];
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(Expr::List(items));
                }
                Some(',') => {
                    self.pos += 1;
                    items.push(self.parse_expr()?);
                }
                _ => return Err(self.error(open, "Unclosed list literal")),
            }
        }
    }

    fn parse_map(&mut self) -> Result<Expr, VelocityError> {
        let open = self.pos;
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Expr::Map(entries));
                }
                Some(',') => self.pos += 1,
                Some(_) => {
                    let key = self.parse_expr()?;
                    self.expect(':', "between map key and value")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                }
                None => return Err(self.error(open, "Unclosed map literal")),
            }
        }
    }
}

fn flush(nodes: &mut Vec<Node>, text: &mut String) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}
