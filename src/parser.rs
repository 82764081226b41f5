// Copyright 2024 the rans developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Scanner and recursive-descent parser for the regex dialect.
//!
//! Parsing produces an arena of expression nodes annotated with the
//! Glushkov position attributes `nullable`, `first`, `last` and `follow`.
//! Leaf nodes (literals, `.`, character classes, and the end-of-pattern
//! marker) are the positions of the automaton; `first(root)` seeds the
//! subset construction in the `dfa` module and `follow` drives its
//! transitions.

use bit_set::BitSet;

use crate::error::Error;
use crate::Result;

/// How the regex source itself is decoded. The automaton always runs over
/// raw bytes; in `Utf8` mode a multi-byte character in the pattern becomes
/// a concatenation of its encoded bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Utf8,
}

pub(crate) type ExprIdx = usize;

#[derive(Clone, Debug)]
pub(crate) enum ExprKind {
    Literal(u8),
    Dot,
    CharClass(BitSet),
    Concat(ExprIdx, ExprIdx),
    Union(ExprIdx, ExprIdx),
    Star(ExprIdx),
    Plus(ExprIdx),
    Qmark(ExprIdx),
    Eop,
    Epsilon,
}

#[derive(Debug)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub nullable: bool,
    pub first: BitSet,
    pub last: BitSet,
}

/// A parsed expression tree, flattened into an arena. Node identity is the
/// arena index; `follow` is indexed the same way and is only meaningful
/// for leaf nodes.
#[derive(Debug)]
pub(crate) struct ExprTree {
    nodes: Vec<Expr>,
    follow: Vec<BitSet>,
    root: ExprIdx,
    eop: ExprIdx,
}

impl ExprTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> ExprIdx {
        self.root
    }

    pub fn kind(&self, idx: ExprIdx) -> &ExprKind {
        &self.nodes[idx].kind
    }

    pub fn first(&self, idx: ExprIdx) -> &BitSet {
        &self.nodes[idx].first
    }

    pub fn follow(&self, idx: ExprIdx) -> &BitSet {
        &self.follow[idx]
    }

    /// True iff the subset contains the end-of-pattern position, i.e. the
    /// corresponding DFA state accepts.
    pub fn contains_eop(&self, subset: &BitSet) -> bool {
        subset.contains(self.eop)
    }
}

pub(crate) fn parse(regex: &str, encoding: Encoding) -> Result<ExprTree> {
    Parser::new(regex.as_bytes(), encoding).parse()
}

fn singleton(i: usize) -> BitSet {
    let mut ret = BitSet::with_capacity(i + 1);
    ret.insert(i);
    ret
}

/// Number of bytes in a UTF-8 sequence led by `c`, or 0 if `c` cannot
/// lead one.
fn utf8_byte_length(c: u8) -> usize {
    match c {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Literal,
    Dot,
    CharClass,
    /// A predefined byte class produced by an escape like `\d`; the mask
    /// lives in the scanner's `class` field.
    ByteRange,
    Union,
    Star,
    Plus,
    Qmark,
    Repetition,
    Lpar,
    Rpar,
    Utf8,
    Eop,
}

impl Token {
    fn is_atom(self) -> bool {
        matches!(
            self,
            Token::Literal
                | Token::Dot
                | Token::CharClass
                | Token::ByteRange
                | Token::Lpar
                | Token::Utf8
        )
    }

    fn is_quantifier(self) -> bool {
        matches!(
            self,
            Token::Star | Token::Plus | Token::Qmark | Token::Repetition
        )
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    encoding: Encoding,

    // One-token lookahead. `literal` is the raw byte behind the token (or
    // the decoded byte for escapes); `class` and `repeat_*` carry the
    // payloads of ByteRange and Repetition tokens.
    token: Token,
    literal: u8,
    class: BitSet,
    repeat_min: usize,
    repeat_max: Option<usize>,

    // Character classes are byte-oriented in both encodings, so the
    // scanner must not assemble UTF-8 sequences while inside one.
    in_class: bool,

    nodes: Vec<Expr>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8], encoding: Encoding) -> Parser<'a> {
        Parser {
            input,
            pos: 0,
            encoding,
            token: Token::Eop,
            literal: 0,
            class: BitSet::with_capacity(256),
            repeat_min: 0,
            repeat_max: None,
            in_class: false,
            nodes: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<ExprTree> {
        self.consume()?;

        let (root, eop) = if self.token == Token::Eop {
            // The empty regex accepts exactly the empty string.
            let eop = self.new_expr(ExprKind::Eop);
            (eop, eop)
        } else {
            let expr = self.parse_union()?;
            if self.token != Token::Eop {
                return Err(Error::Parse("bad EOP"));
            }
            let eop = self.new_expr(ExprKind::Eop);
            let root = self.new_expr(ExprKind::Concat(expr, eop));
            (root, eop)
        };

        let mut follow = vec![BitSet::with_capacity(self.nodes.len()); self.nodes.len()];
        self.fill_follow(root, &mut follow);

        Ok(ExprTree {
            nodes: self.nodes,
            follow,
            root,
            eop,
        })
    }

    // Scanner ---------------------------------------------------------------

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> u8 {
        if self.eof() {
            0
        } else {
            self.input[self.pos]
        }
    }

    /// Advances one byte and returns the byte now under the scanner.
    fn bump(&mut self) -> u8 {
        if !self.eof() {
            self.pos += 1;
        }
        self.peek()
    }

    fn consume(&mut self) -> Result<()> {
        if self.eof() {
            self.literal = 0;
            self.token = Token::Eop;
            return Ok(());
        }

        self.literal = self.peek();
        match self.literal {
            b'[' => self.token = Token::CharClass,
            b'.' => self.token = Token::Dot,
            b'|' => self.token = Token::Union,
            b'?' => self.token = Token::Qmark,
            b'+' => self.token = Token::Plus,
            b'*' => self.token = Token::Star,
            b'(' => self.token = Token::Lpar,
            b')' => self.token = Token::Rpar,
            b'{' => {
                self.bump();
                self.token = self.consume_repetition()?;
            }
            b'\\' => {
                self.bump();
                self.token = self.consume_metachar()?;
            }
            c => {
                if self.encoding == Encoding::Utf8 && !self.in_class && utf8_byte_length(c) != 1 {
                    if !self.valid_utf8_sequence() {
                        return Err(Error::Parse("invalid utf8 sequence"));
                    }
                    // The sequence bytes are consumed by parse_atom.
                    self.token = Token::Utf8;
                    return Ok(());
                }
                self.token = Token::Literal;
            }
        }

        self.bump();
        Ok(())
    }

    fn valid_utf8_sequence(&self) -> bool {
        let len = utf8_byte_length(self.peek());
        if len == 0 || self.pos + len > self.input.len() {
            return false;
        }
        self.input[self.pos + 1..self.pos + len]
            .iter()
            .all(|&b| (0x80..=0xBF).contains(&b))
    }

    fn consume_int(&mut self) -> Result<usize> {
        let mut val: usize = 0;
        while self.peek().is_ascii_digit() && !self.eof() {
            val = val
                .checked_mul(10)
                .and_then(|v| v.checked_add((self.peek() - b'0') as usize))
                .ok_or(Error::Parse("bad repetition"))?;
            self.bump();
        }
        Ok(val)
    }

    /// Scans the inside of a `{...}` quantifier. On entry the scanner sits
    /// on the first byte after `{`; on success it sits on the closing `}`.
    fn consume_repetition(&mut self) -> Result<Token> {
        if self.peek() == b'}' {
            return Err(Error::Parse("bad repetition"));
        }

        self.repeat_min = self.consume_int()?;
        self.repeat_max = Some(self.repeat_min);
        if self.peek() == b',' {
            if self.bump() == b'}' {
                self.repeat_max = None;
            } else {
                self.repeat_max = Some(self.consume_int()?);
            }
        }

        if self.eof() || self.peek() != b'}' {
            return Err(Error::Parse("bad repetition"));
        }
        if let Some(max) = self.repeat_max {
            if self.repeat_min > max {
                return Err(Error::Parse("bad repetition"));
            }
        }

        Ok(match (self.repeat_min, self.repeat_max) {
            (0, None) => Token::Star,
            (1, None) => Token::Plus,
            _ => Token::Repetition,
        })
    }

    /// Scans the byte after a backslash. On exit the scanner sits on the
    /// last byte of the escape, mirroring the single-byte tokens.
    fn consume_metachar(&mut self) -> Result<Token> {
        if self.eof() || self.peek() == 0 {
            return Err(Error::Parse("bad '\\'"));
        }

        let c = self.peek();
        let token = match c {
            b'a' => {
                self.literal = 0x07;
                Token::Literal
            }
            b'f' => {
                self.literal = 0x0C;
                Token::Literal
            }
            b'n' => {
                self.literal = b'\n';
                Token::Literal
            }
            b'r' => {
                self.literal = b'\r';
                Token::Literal
            }
            b't' => {
                self.literal = b'\t';
                Token::Literal
            }
            b'v' => {
                self.literal = 0x0B;
                Token::Literal
            }
            b'd' | b'D' => {
                self.class.clear();
                for b in b'0'..=b'9' {
                    self.class.insert(b as usize);
                }
                if c == b'D' {
                    flip(&mut self.class);
                }
                Token::ByteRange
            }
            b's' | b'S' => {
                self.class.clear();
                for &b in &[b'\t', b'\n', 0x0Cu8, b'\r', b' '] {
                    self.class.insert(b as usize);
                }
                if c == b'S' {
                    flip(&mut self.class);
                }
                Token::ByteRange
            }
            b'w' | b'W' => {
                self.class.clear();
                for b in b'0'..=b'9' {
                    self.class.insert(b as usize);
                }
                for b in b'A'..=b'Z' {
                    self.class.insert(b as usize);
                }
                for b in b'a'..=b'z' {
                    self.class.insert(b as usize);
                }
                self.class.insert(b'_' as usize);
                if c == b'W' {
                    flip(&mut self.class);
                }
                Token::ByteRange
            }
            b'x' => {
                // One or two hex digits; on a non-digit the scanner backs
                // off one byte so the offender is lexed again.
                let mut hex: u8 = 0;
                for i in 0..2 {
                    let d = self.bump();
                    hex <<= 4;
                    match (d as char).to_digit(16) {
                        Some(v) => hex += v as u8,
                        None => {
                            if i == 0 {
                                hex = 0;
                            } else {
                                hex >>= 4;
                            }
                            self.pos -= 1;
                            break;
                        }
                    }
                }
                self.literal = hex;
                Token::Literal
            }
            other => {
                self.literal = other;
                Token::Literal
            }
        };

        Ok(token)
    }

    // Parser ----------------------------------------------------------------

    fn parse_union(&mut self) -> Result<ExprIdx> {
        let mut e = self.parse_concat()?;
        while self.token == Token::Union {
            self.consume()?;
            let f = self.parse_concat()?;
            e = self.new_expr(ExprKind::Union(e, f));
        }
        Ok(e)
    }

    fn parse_concat(&mut self) -> Result<ExprIdx> {
        let mut e = self.parse_repetition()?;
        while self.token.is_atom() {
            let f = self.parse_repetition()?;
            e = self.new_expr(ExprKind::Concat(e, f));
        }
        Ok(e)
    }

    fn parse_repetition(&mut self) -> Result<ExprIdx> {
        let mut e = self.parse_atom()?;

        while self.token.is_quantifier() {
            match self.token {
                Token::Star => e = self.new_expr(ExprKind::Star(e)),
                Token::Plus => e = self.new_expr(ExprKind::Plus(e)),
                Token::Qmark => e = self.new_expr(ExprKind::Qmark(e)),
                Token::Repetition => {
                    // Expand by cloning: every copy of the operand gets
                    // fresh positions, which keeps the position automaton
                    // sound.
                    let orig = e;
                    let mut min = self.repeat_min;
                    let max = self.repeat_max;
                    if min == 0 {
                        if max == Some(0) {
                            e = self.new_expr(ExprKind::Epsilon);
                        } else {
                            e = self.new_expr(ExprKind::Qmark(e));
                            min = 1;
                        }
                    }
                    for _ in 1..min {
                        let f = self.clone_expr(orig);
                        e = self.new_expr(ExprKind::Concat(e, f));
                    }
                    match max {
                        None => {
                            let f = self.clone_expr(orig);
                            let f = self.new_expr(ExprKind::Star(f));
                            e = self.new_expr(ExprKind::Concat(e, f));
                        }
                        Some(max) => {
                            for _ in min..max {
                                let f = self.clone_expr(orig);
                                let f = self.new_expr(ExprKind::Qmark(f));
                                e = self.new_expr(ExprKind::Concat(e, f));
                            }
                        }
                    }
                }
                _ => unreachable!(),
            }
            self.consume()?;
        }

        Ok(e)
    }

    fn parse_atom(&mut self) -> Result<ExprIdx> {
        let e = match self.token {
            Token::Literal => {
                let b = self.literal;
                self.new_expr(ExprKind::Literal(b))
            }
            Token::CharClass => self.parse_charclass()?,
            Token::Dot => self.new_expr(ExprKind::Dot),
            Token::ByteRange => {
                let mask = self.class.clone();
                self.new_expr(ExprKind::CharClass(mask))
            }
            Token::Utf8 => {
                // Lower the code point to a left-deep concat of its bytes.
                let top = self.literal;
                let mut e = self.new_expr(ExprKind::Literal(top));
                for _ in 1..utf8_byte_length(top) {
                    let b = self.bump();
                    let f = self.new_expr(ExprKind::Literal(b));
                    e = self.new_expr(ExprKind::Concat(e, f));
                }
                self.bump();
                e
            }
            Token::Lpar => {
                self.consume()?;
                let e = self.parse_union()?;
                if self.token != Token::Rpar {
                    return Err(Error::Parse("bad parentheses"));
                }
                e
            }
            _ => return Err(Error::Parse("bad expression")),
        };

        self.consume()?;
        Ok(e)
    }

    fn parse_charclass(&mut self) -> Result<ExprIdx> {
        let mut table = BitSet::with_capacity(256);
        let mut range = false;
        let mut negative = false;
        let mut last: u8 = 0;

        self.in_class = true;
        self.consume()?;

        if self.literal == b'^' {
            self.consume()?;
            negative = true;
        }
        // A `]` or `-` right after the opening bracket is a plain member.
        if self.literal == b'-' || self.literal == b']' {
            table.insert(self.literal as usize);
            last = self.literal;
            self.consume()?;
        }

        while self.token != Token::Eop && self.literal != b']' {
            if !range && self.literal == b'-' {
                range = true;
                self.consume()?;
                continue;
            }

            if self.token == Token::ByteRange {
                table.union_with(&self.class);
            } else {
                table.insert(self.literal as usize);
            }

            if range {
                for c in last..=self.literal {
                    table.insert(c as usize);
                }
                range = false;
            }

            last = self.literal;
            self.consume()?;
        }
        self.in_class = false;

        if self.token == Token::Eop {
            return Err(Error::Parse("invalid character class"));
        }
        if range {
            // Trailing `-` is a plain member.
            table.insert(b'-' as usize);
        }
        if negative {
            flip(&mut table);
        }

        if table.len() == 1 {
            // A one-byte class is just a literal.
            let b = table.iter().next().unwrap() as u8;
            return Ok(self.new_expr(ExprKind::Literal(b)));
        }

        Ok(self.new_expr(ExprKind::CharClass(table)))
    }

    // Arena -----------------------------------------------------------------

    /// Appends a node, computing `nullable`, `first` and `last` bottom-up.
    fn new_expr(&mut self, kind: ExprKind) -> ExprIdx {
        let id = self.nodes.len();
        let (nullable, first, last) = match kind {
            ExprKind::Literal(_) | ExprKind::Dot | ExprKind::CharClass(_) | ExprKind::Eop => {
                (false, singleton(id), singleton(id))
            }
            ExprKind::Union(l, r) => {
                let mut first = self.nodes[l].first.clone();
                first.union_with(&self.nodes[r].first);
                let mut last = self.nodes[l].last.clone();
                last.union_with(&self.nodes[r].last);
                (
                    self.nodes[l].nullable || self.nodes[r].nullable,
                    first,
                    last,
                )
            }
            ExprKind::Concat(l, r) => {
                let mut first = self.nodes[l].first.clone();
                if self.nodes[l].nullable {
                    first.union_with(&self.nodes[r].first);
                }
                let mut last = self.nodes[r].last.clone();
                if self.nodes[r].nullable {
                    last.union_with(&self.nodes[l].last);
                }
                (
                    self.nodes[l].nullable && self.nodes[r].nullable,
                    first,
                    last,
                )
            }
            ExprKind::Star(x) | ExprKind::Qmark(x) => {
                (true, self.nodes[x].first.clone(), self.nodes[x].last.clone())
            }
            ExprKind::Plus(x) => (
                self.nodes[x].nullable,
                self.nodes[x].first.clone(),
                self.nodes[x].last.clone(),
            ),
            ExprKind::Epsilon => (true, BitSet::new(), BitSet::new()),
        };

        self.nodes.push(Expr {
            kind,
            nullable,
            first,
            last,
        });
        id
    }

    /// Deep-copies a subtree; the copies are fresh positions.
    fn clone_expr(&mut self, idx: ExprIdx) -> ExprIdx {
        let kind = match self.nodes[idx].kind.clone() {
            ExprKind::Concat(l, r) => {
                let l = self.clone_expr(l);
                let r = self.clone_expr(r);
                ExprKind::Concat(l, r)
            }
            ExprKind::Union(l, r) => {
                let l = self.clone_expr(l);
                let r = self.clone_expr(r);
                ExprKind::Union(l, r)
            }
            ExprKind::Star(x) => ExprKind::Star(self.clone_expr(x)),
            ExprKind::Plus(x) => ExprKind::Plus(self.clone_expr(x)),
            ExprKind::Qmark(x) => ExprKind::Qmark(self.clone_expr(x)),
            leaf => leaf,
        };
        self.new_expr(kind)
    }

    // Follow sets -----------------------------------------------------------

    fn fill_follow(&self, idx: ExprIdx, follow: &mut [BitSet]) {
        match self.nodes[idx].kind {
            ExprKind::Literal(_)
            | ExprKind::Dot
            | ExprKind::CharClass(_)
            | ExprKind::Eop
            | ExprKind::Epsilon => {}
            ExprKind::Concat(l, r) => {
                connect(&self.nodes[l].last, &self.nodes[r].first, follow);
                self.fill_follow(l, follow);
                self.fill_follow(r, follow);
            }
            ExprKind::Union(l, r) => {
                self.fill_follow(l, follow);
                self.fill_follow(r, follow);
            }
            ExprKind::Star(x) | ExprKind::Plus(x) => {
                connect(&self.nodes[x].last, &self.nodes[x].first, follow);
                self.fill_follow(x, follow);
            }
            ExprKind::Qmark(x) => self.fill_follow(x, follow),
        }
    }
}

fn connect(src: &BitSet, dst: &BitSet, follow: &mut [BitSet]) {
    for p in src.iter() {
        follow[p].union_with(dst);
    }
}

/// Complements a byte mask in place.
fn flip(set: &mut BitSet) {
    for c in 0..256 {
        if set.contains(c) {
            set.remove(c);
        } else {
            set.insert(c);
        }
    }
}
