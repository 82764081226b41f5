// Copyright 2024 the rans developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The numeration engine.
//!
//! [`Rans`] turns the minimal DFA of a regex into an abstract numeration
//! system: counting walks through the automaton with powers of its
//! adjacency matrix ranks every accepted string in length-lexicographic
//! order ([`Rans::val`]) and unranks by greedy digit selection
//! ([`Rans::rep`]).

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use std::sync::OnceLock;

use crate::dfa::{Dfa, REJECT, START};
use crate::error::Error;
use crate::matrix::{Matrix, Vector};
use crate::parser::Encoding;
use crate::Result;

/// Ranks are arbitrary-precision integers.
pub type Value = BigInt;

/// An abstract numeration system over the language of one regex.
///
/// Immutable once built; `val` and `rep` only read the automaton and the
/// matrices and keep their scratch local, so a shared reference can be
/// used from several threads at once.
pub struct Rans {
    dfa: Dfa,
    /// Whether the empty string is in the language (state 0 accepts).
    match_epsilon: bool,
    /// `adjacency[(i, j)]` counts the bytes leading from state i to j.
    adjacency: Matrix,
    /// The adjacency matrix bordered by an absorbing column that counts
    /// walks which have already reached an accepting state; powers of it
    /// give cumulative counts by length.
    extended: Matrix,
    start_vector: Vector,
    accept_vector: Vector,
}

impl Rans {
    pub fn new(regex: &str) -> Result<Rans> {
        Rans::with_encoding(regex, Encoding::Ascii)
    }

    pub fn with_encoding(regex: &str, encoding: Encoding) -> Result<Rans> {
        let dfa = Dfa::from_regex(regex, encoding)?;

        let n = dfa.num_states();
        let mut adjacency = Matrix::zero(n);
        let mut extended = Matrix::zero(n + 1);
        let mut start_vector = Vector::zero(n);
        let mut accept_vector = Vector::zero(n);

        start_vector[START] = Value::one();
        for i in 0..n {
            if dfa.is_accepting(i) {
                accept_vector[i] = Value::one();
            }
            for c in 0..=255u8 {
                let j = dfa.transition(i, c);
                if j != REJECT {
                    adjacency[(i, j)] += 1;
                    extended[(i, j)] += 1;
                    if dfa.is_accepting(j) {
                        extended[(i, n)] += 1;
                    }
                }
            }
        }
        extended[(n, n)] = Value::one();

        Ok(Rans {
            match_epsilon: dfa.is_accepting(START),
            dfa,
            adjacency,
            extended,
            start_vector,
            accept_vector,
        })
    }

    /// The process-wide instance for `.*`, the language of all byte
    /// strings. Built lazily on first use.
    pub fn universal() -> &'static Rans {
        static UNIVERSAL: OnceLock<Rans> = OnceLock::new();
        UNIVERSAL.get_or_init(|| Rans::new(".*").expect("BUG: the universal regex must compile"))
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    /// Number of states of the minimal DFA.
    pub fn size(&self) -> usize {
        self.dfa.num_states()
    }

    pub fn accept(&self, text: &[u8]) -> bool {
        self.dfa.accepts(text)
    }

    fn epsilon(&self) -> Value {
        if self.match_epsilon {
            Value::one()
        } else {
            Value::zero()
        }
    }

    /// The rank of `text` in the length-lexicographic enumeration of the
    /// language: `text` is the `val(text)`-th accepted string, counting
    /// from zero.
    ///
    /// Runs in O(n·N²) big-integer additions for an n-byte text and an
    /// N-state DFA. Fails with [`Error::NotAcceptable`] iff the text is
    /// not in the language.
    pub fn val(&self, text: &[u8]) -> Result<Value> {
        let mut paths = Vector::zero(self.size());
        let mut state = START;

        // After step i, paths[s] counts the strictly smaller prefixes
        // (of any length up to i+1) whose continuations sit in state s,
        // all aligned into the same length frame.
        for (i, &b) in text.iter().enumerate() {
            paths[START] += 1;
            for c in 0..b {
                let next = self.dfa.transition(state, c);
                if next != REJECT {
                    paths[next] += 1;
                }
            }
            state = self.dfa.transition(state, b);
            if state == REJECT {
                return Err(Error::NotAcceptable);
            }
            if i + 1 < text.len() {
                paths *= &self.adjacency;
            }
        }

        if !self.dfa.is_accepting(state) {
            return Err(Error::NotAcceptable);
        }

        Ok(paths.dot(&self.accept_vector))
    }

    /// The `value`-th accepted string; the inverse of [`Rans::val`].
    ///
    /// Fails with [`Error::OutOfRange`] iff `value` is negative or the
    /// language is finite and has no string of that rank.
    pub fn rep(&self, value: &Value) -> Result<Vec<u8>> {
        if value.is_negative() {
            return Err(Error::OutOfRange);
        }

        let mut remaining = value.clone();
        let mut text = Vec::new();
        let mut state = START;

        // `floor` leaves the rank of the target among the strings of its
        // exact length; each digit is then the largest byte whose smaller
        // siblings don't cover that rank.
        let mut len = self.floor(&mut remaining)?;
        while len > 0 {
            let m = self.adjacency.pow(len - 1);
            let mut running = Value::zero();
            let mut chosen = None;

            for c in 0..=255u8 {
                let next = self.dfa.transition(state, c);
                if next == REJECT {
                    continue;
                }
                let mut cand = Value::zero();
                for i in 0..self.size() {
                    if self.dfa.is_accepting(i) {
                        cand += &m[(next, i)];
                    }
                }
                if &running + &cand > remaining {
                    chosen = Some((c, next));
                    break;
                }
                running += cand;
            }

            let (c, next) = chosen.expect("BUG: floor admitted a rank with no continuation");
            text.push(c);
            state = next;
            remaining -= running;
            len -= 1;
        }

        Ok(text)
    }

    /// Finds the length of the string of rank `value` and reduces `value`
    /// to its rank among the strings of exactly that length.
    ///
    /// Doubles the represented length by squaring the extended matrix
    /// until the cumulative count passes `value`, then backs off and
    /// advances one length at a time. If the count stops growing although
    /// the length already exceeds the state count, the language is finite
    /// and too small: by the pumping lemma a still-growing language must
    /// grow within every window of that width.
    fn floor(&self, value: &mut Value) -> Result<usize> {
        let eps = self.epsilon();
        if *value < eps {
            return Ok(0);
        }

        let n = self.size();
        let mut m = self.extended.clone();
        if &m[(START, n)] + &eps > *value {
            *value -= eps;
            return Ok(1);
        }

        let mut length: usize = 1;
        let mut prev;
        loop {
            prev = m.clone();
            m *= &prev;
            if length > n && m[(START, n)] == prev[(START, n)] {
                return Err(Error::OutOfRange);
            }
            length *= 2;
            if &m[(START, n)] + &eps > *value {
                break;
            }
        }

        m = prev;
        length /= 2;
        loop {
            prev = m.clone();
            m *= &self.extended;
            length += 1;
            if &m[(START, n)] + &eps > *value {
                break;
            }
        }

        *value -= &prev[(START, n)] + &eps;
        Ok(length)
    }

    /// Number of accepted strings of exactly `length` bytes.
    pub fn count(&self, length: usize) -> Value {
        let m = self.adjacency.pow(length);
        let v = &self.start_vector * &m;
        v.dot(&self.accept_vector)
    }

    /// Number of accepted strings of at most `length` bytes.
    pub fn amount_up_to(&self, length: usize) -> Value {
        let m = self.extended.pow(length);
        &m[(START, self.size())] + self.epsilon()
    }

    /// Total number of accepted strings, or −1 if the language is
    /// infinite.
    ///
    /// Squares the extended matrix until the represented length reaches
    /// twice the state count; if one more squaring still grows the
    /// cumulative count the language is infinite (pumping lemma),
    /// otherwise the count has converged.
    pub fn amount(&self) -> Value {
        let mut m = self.extended.clone();
        let n = self.size();
        let mut length: usize = 1;
        let mut total;

        loop {
            total = m[(START, n)].clone();
            let prev = m.clone();
            m *= &prev;
            length *= 2;
            if length >= 2 * n {
                break;
            }
        }

        if total != m[(START, n)] {
            -Value::one()
        } else {
            total + self.epsilon()
        }
    }

    pub fn finite(&self) -> bool {
        self.amount() != -Value::one()
    }

    pub fn infinite(&self) -> bool {
        !self.finite()
    }

    /// Re-encodes `text` as the `val(text)`-th byte string, i.e. unranks
    /// the rank in the universal `.*` numeration. The payload is the raw
    /// output of the inner unranking; no framing.
    pub fn compress(&self, text: &[u8]) -> Result<Vec<u8>> {
        let value = self.val(text)?;
        Rans::universal().rep(&value)
    }

    /// Inverse of [`Rans::compress`].
    pub fn decompress(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let value = Rans::universal().val(blob)?;
        self.rep(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rans(re: &str) -> Rans {
        Rans::new(re).unwrap()
    }

    fn v(n: i64) -> Value {
        Value::from(n)
    }

    #[test]
    fn ab_star_seeds() {
        let r = rans("(ab)*");
        assert_eq!(r.val(b"").unwrap(), v(0));
        assert_eq!(r.val(b"ab").unwrap(), v(1));
        assert_eq!(r.rep(&v(3)).unwrap(), b"ababab");
    }

    #[test]
    fn a_star_b_or_c_star_seeds() {
        let r = rans("a*(b*|c*)");
        assert_eq!(r.rep(&v(1)).unwrap(), b"a");
        assert_eq!(r.rep(&v(4)).unwrap(), b"aa");
        assert_eq!(r.val(b"aaa").unwrap(), v(9));
    }

    #[test]
    fn rank_zero_is_the_length_lex_smallest() {
        // With ε in the language, rank 0 is the empty string.
        assert_eq!(rans("a*").rep(&v(0)).unwrap(), b"");
        // Without it, rank 0 is the smallest nonempty string.
        assert_eq!(rans("a+").rep(&v(0)).unwrap(), b"a");
        assert_eq!(rans("b|ab").rep(&v(0)).unwrap(), b"b");
    }

    #[test]
    fn val_rejects_strings_outside_the_language() {
        let r = rans("(ab)*");
        assert_eq!(r.val(b"a"), Err(Error::NotAcceptable));
        assert_eq!(r.val(b"ba"), Err(Error::NotAcceptable));
        assert_eq!(r.val(b"abx"), Err(Error::NotAcceptable));
    }

    #[test]
    fn rep_rejects_out_of_range_values() {
        assert_eq!(rans("a?").rep(&v(-1)), Err(Error::OutOfRange));
        // a? has exactly two strings, so ranks 2 and beyond do not exist.
        assert_eq!(rans("a?").rep(&v(2)), Err(Error::OutOfRange));
        assert_eq!(rans("abc").rep(&v(1)), Err(Error::OutOfRange));
        assert_eq!(rans("").rep(&v(1)), Err(Error::OutOfRange));
    }

    #[test]
    fn counting_table() {
        let r = rans("a*(b*|c*)");
        assert_eq!(r.amount_up_to(0), v(1));
        assert_eq!(r.count(1), v(3));
        assert_eq!(r.amount_up_to(1), v(1 + 3));
        assert_eq!(r.count(2), v(5));
        assert_eq!(r.amount_up_to(2), v(1 + 3 + 5));
    }

    #[test]
    fn amount_totals() {
        assert_eq!(rans("[ab][cde][efgh][ijklm][opqrst][uvwxyz]").amount(), v(2 * 3 * 4 * 5 * 6 * 6));
        assert_eq!(rans("a?").amount(), v(2));
        assert_eq!(rans("").amount(), v(1));
        assert_eq!(rans("there exist just one string!").amount(), v(1));
        assert_eq!(rans("or infinite strings!*").amount(), v(-1));
        assert_eq!(rans("[12345]").amount(), v(5));
        assert_eq!(rans("[^12345]").amount(), v(256 - 5));
        assert_eq!(rans("...").amount(), v(256 * 256 * 256));
    }

    #[test]
    fn finiteness() {
        assert!(rans("a{3,7}").finite());
        assert!(rans("").finite());
        assert!(rans("a*").infinite());
        assert!(rans("a*b*|b*c*").infinite());
    }

    #[test]
    fn val_and_rep_are_inverse_on_small_ranks() {
        for re in &["(ab)*", "a*(b*|c*)", "0|1[01]*", "[a-c]{0,3}"] {
            let r = rans(re);
            let total = r.amount();
            for i in 0..40 {
                if total >= v(0) && v(i) >= total {
                    break;
                }
                let text = r.rep(&v(i)).unwrap();
                assert!(r.accept(&text), "regex {}: rep({}) not accepted", re, i);
                assert_eq!(r.val(&text).unwrap(), v(i), "regex: {}", re);
            }
        }
    }

    #[test]
    fn enumeration_is_length_lex_ordered() {
        let r = rans("0|1[01]*");
        let mut prev = r.rep(&v(0)).unwrap();
        for i in 1..32 {
            let cur = r.rep(&v(i)).unwrap();
            let before = prev.len() < cur.len() || (prev.len() == cur.len() && prev < cur);
            assert!(before, "rep({}) = {:?} not after {:?}", i, cur, prev);
            prev = cur;
        }
    }

    #[test]
    fn universal_instance_ranks_every_byte_string() {
        let u = Rans::universal();
        assert_eq!(u.size(), 1);
        assert_eq!(u.val(b"").unwrap(), v(0));
        assert_eq!(u.val(&[0x00]).unwrap(), v(1));
        assert_eq!(u.val(&[0xFF]).unwrap(), v(256));
        assert_eq!(u.val(&[0x00, 0x00]).unwrap(), v(257));
        assert_eq!(u.rep(&v(257)).unwrap(), vec![0x00, 0x00]);
        assert!(u.infinite());
    }

    #[test]
    fn compression_round_trips() {
        let r = rans("(hello|goodbye) (world|mars)(!*)");
        for text in &[&b"hello world"[..], b"goodbye mars!!!", b"hello mars!"] {
            let packed = r.compress(text).unwrap();
            // The numeration is dense, so matching text never expands.
            assert!(packed.len() <= text.len());
            assert_eq!(r.decompress(&packed).unwrap(), *text);
        }
        assert_eq!(r.compress(b"hello pluto"), Err(Error::NotAcceptable));
    }

    #[test]
    fn utf8_instances_rank_by_bytes() {
        let r = Rans::with_encoding("(あ|い)*", Encoding::Utf8).unwrap();
        assert_eq!(r.val("".as_bytes()).unwrap(), v(0));
        assert_eq!(r.val("あ".as_bytes()).unwrap(), v(1));
        assert_eq!(r.val("い".as_bytes()).unwrap(), v(2));
        assert_eq!(r.rep(&v(3)).unwrap(), "ああ".as_bytes());
    }
}
