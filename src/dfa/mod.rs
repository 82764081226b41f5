// Copyright 2024 the rans developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Deterministic automata over the byte alphabet.
//!
//! A [`Dfa`] is built from a parsed expression tree by subset construction
//! over Glushkov positions and then minimized. State 0 is the start state;
//! a transition that does not exist is the [`REJECT`] sentinel.

mod minimizer;

use bit_set::BitSet;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug, Formatter};

use crate::parser::{self, Encoding, ExprKind, ExprTree};
use crate::Result;

pub type StateIdx = usize;

/// Transition target meaning "no transition".
pub const REJECT: StateIdx = StateIdx::MAX;

/// The start state of every `Dfa`.
pub const START: StateIdx = 0;

#[derive(Clone)]
pub struct State {
    transitions: [StateIdx; 256],
    accept: bool,
}

impl State {
    fn new(accept: bool) -> State {
        State {
            transitions: [REJECT; 256],
            accept,
        }
    }
}

#[derive(Clone)]
pub struct Dfa {
    states: Vec<State>,
}

impl Dfa {
    /// Compiles a regex into its minimal DFA.
    pub fn from_regex(regex: &str, encoding: Encoding) -> Result<Dfa> {
        let tree = parser::parse(regex, encoding)?;
        Ok(Dfa::determinize(&tree).minimize())
    }

    /// Returns the number of states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn is_accepting(&self, state: StateIdx) -> bool {
        state != REJECT && self.states[state].accept
    }

    /// The target of the transition out of `state` on byte `c`, or
    /// `REJECT`.
    pub fn transition(&self, state: StateIdx, c: u8) -> StateIdx {
        self.states[state].transitions[c as usize]
    }

    /// Runs the whole string through the automaton.
    pub fn accepts(&self, text: &[u8]) -> bool {
        let mut state = START;
        for &b in text {
            state = self.transition(state, b);
            if state == REJECT {
                return false;
            }
        }
        self.is_accepting(state)
    }

    /// Returns an equivalent DFA with a minimal number of states.
    ///
    /// Uses the table-filling (distinguishable pairs) algorithm; state
    /// numbering of the result is deterministic, so minimizing a minimal
    /// DFA reproduces it exactly.
    pub fn minimize(&self) -> Dfa {
        minimizer::minimize(self)
    }

    fn add_state(&mut self, accept: bool) -> StateIdx {
        self.states.push(State::new(accept));
        self.states.len() - 1
    }

    /// Subset construction over the positions of the expression tree.
    ///
    /// Subsets are discovered breadth-first with bytes scanned in
    /// ascending order, which makes the state numbering deterministic.
    fn determinize(tree: &ExprTree) -> Dfa {
        let mut dfa = Dfa { states: Vec::new() };
        let mut state_map = HashMap::<BitSet, StateIdx>::new();
        let mut queue = VecDeque::<BitSet>::new();

        let start = tree.first(tree.root()).clone();
        dfa.add_state(tree.contains_eop(&start));
        state_map.insert(start.clone(), START);
        queue.push_back(start);

        while let Some(subset) = queue.pop_front() {
            let idx = state_map[&subset];
            let mut transitions = vec![BitSet::with_capacity(tree.len()); 256];

            for p in subset.iter() {
                match tree.kind(p) {
                    ExprKind::Eop => {}
                    ExprKind::Literal(b) => {
                        transitions[*b as usize].union_with(tree.follow(p));
                    }
                    ExprKind::Dot => {
                        for t in transitions.iter_mut() {
                            t.union_with(tree.follow(p));
                        }
                    }
                    ExprKind::CharClass(mask) => {
                        for c in mask.iter() {
                            transitions[c].union_with(tree.follow(p));
                        }
                    }
                    other => unreachable!("position {} is not a leaf: {:?}", p, other),
                }
            }

            for (c, next) in transitions.into_iter().enumerate() {
                if next.is_empty() {
                    continue;
                }
                let target = if state_map.contains_key(&next) {
                    state_map[&next]
                } else {
                    let t = dfa.add_state(tree.contains_eop(&next));
                    state_map.insert(next.clone(), t);
                    queue.push_back(next);
                    t
                };
                dfa.states[idx].transitions[c] = target;
            }
        }

        dfa
    }
}

/// Language equivalence, not structural equality: two automata are equal
/// iff a synchronous walk from the start states never disagrees on
/// acceptance and never pairs a transition with a missing one.
impl PartialEq for Dfa {
    fn eq(&self, other: &Dfa) -> bool {
        if self.states.is_empty() || other.states.is_empty() {
            return self.states.is_empty() == other.states.is_empty();
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert((START, START));
        queue.push_back((START, START));

        while let Some((s1, s2)) = queue.pop_front() {
            if self.states[s1].accept != other.states[s2].accept {
                return false;
            }
            for c in 0..256 {
                let n1 = self.states[s1].transitions[c];
                let n2 = other.states[s2].transitions[c];
                if n1 == REJECT && n2 == REJECT {
                    continue;
                }
                if n1 == REJECT || n2 == REJECT {
                    return false;
                }
                if seen.insert((n1, n2)) {
                    queue.push_back((n1, n2));
                }
            }
        }

        true
    }
}

impl Eq for Dfa {}

impl Debug for Dfa {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_fmt(format_args!("Dfa ({} states):\n", self.states.len()))?;

        for (st_idx, st) in self.states.iter().enumerate().take(40) {
            f.write_fmt(format_args!(
                "\tState {} (accepting: {}):\n",
                st_idx, st.accept
            ))?;

            // Cap it at 5 transitions, since it gets unreadable otherwise.
            let mut shown = 0;
            for (c, &target) in st.transitions.iter().enumerate() {
                if target == REJECT {
                    continue;
                }
                if shown == 5 {
                    f.write_str("\t\t...\n")?;
                    break;
                }
                f.write_fmt(format_args!("\t\t{:#04x} => {}\n", c, target))?;
                shown += 1;
            }
        }
        if self.states.len() > 40 {
            f.write_fmt(format_args!(
                "\t...({} more states)\n",
                self.states.len() - 40
            ))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::parser;

    pub fn make_dfa(re: &str) -> Dfa {
        Dfa::from_regex(re, Encoding::Ascii).unwrap()
    }

    fn make_unminimized(re: &str) -> Dfa {
        let tree = parser::parse(re, Encoding::Ascii).unwrap();
        Dfa::determinize(&tree)
    }

    #[test]
    fn empty_regex_accepts_only_the_empty_string() {
        let dfa = make_dfa("");
        assert_eq!(dfa.num_states(), 1);
        assert!(dfa.accepts(b""));
        assert!(!dfa.accepts(b"a"));
    }

    #[test]
    fn dot_matches_every_byte() {
        let dfa = make_dfa(".");
        for c in 0..=255u8 {
            assert!(dfa.accepts(&[c]));
        }
        assert!(!dfa.accepts(b""));
        assert!(!dfa.accepts(b"ab"));
    }

    #[test]
    fn whole_string_semantics() {
        let dfa = make_dfa("ab*");
        assert!(dfa.accepts(b"a"));
        assert!(dfa.accepts(b"abbb"));
        // No substring matching: a match must span the whole input.
        assert!(!dfa.accepts(b"xabbbz"));
    }

    #[test]
    fn anchors_are_literal_bytes() {
        let dfa = make_dfa("^a$");
        assert!(dfa.accepts(b"^a$"));
        assert!(!dfa.accepts(b"a"));
    }

    #[test]
    fn minimal_sizes() {
        // Known minimal-DFA sizes; the `[ab]*[ac][abc]{k}` family needs
        // 2^(k+2) - 1 states.
        let tests: &[(&str, usize)] = &[
            ("a*", 1),
            ("a", 2),
            ("a|b", 2),
            ("(a|b)*c", 2),
            ("[ab]*[ac][abc]{1}", 7),
            ("[ab]*[ac][abc]{2}", 15),
            ("[ab]*[ac][abc]{3}", 31),
            ("[ab]*[ac][abc]{4}", 63),
        ];
        for &(re, size) in tests {
            assert_eq!(make_dfa(re).num_states(), size, "regex: {}", re);
        }
    }

    #[test]
    fn minimization_preserves_the_language() {
        for re in &["(ab)*", "a*(b*|c*)", "a{2,5}", "(a|b)*abb", "[0-9a-f]+"] {
            let raw = make_unminimized(re);
            let min = raw.minimize();
            assert!(min.num_states() <= raw.num_states());
            assert_eq!(raw, min, "regex: {}", re);
        }
    }

    #[test]
    fn minimization_is_idempotent() {
        for re in &["(ab)*", "a*b*|a*c*", "[ab]*[ac][abc]{2}"] {
            let min = make_dfa(re);
            let twice = min.minimize();
            assert_eq!(twice.num_states(), min.num_states());
            assert_eq!(twice, min);
        }
    }

    #[test]
    fn equivalence_is_modulo_renaming() {
        // Same language through different expressions.
        assert_eq!(make_dfa("(a|aa)*"), make_dfa("a*"));
        assert_eq!(make_dfa("a{0,}"), make_dfa("a*"));
        assert_ne!(make_dfa("a+"), make_dfa("a*"));
        assert_ne!(make_dfa("ab"), make_dfa("ba"));
    }

    #[test]
    fn utf8_mode_builds_byte_transitions() {
        let dfa = Dfa::from_regex("あ*", Encoding::Utf8).unwrap();
        assert!(dfa.accepts("".as_bytes()));
        assert!(dfa.accepts("あ".as_bytes()));
        assert!(dfa.accepts("ああ".as_bytes()));
        assert!(!dfa.accepts(&[0xE3, 0x81]));
    }

    #[test]
    fn rejects_immediately_on_dead_byte() {
        let dfa = make_dfa("abc");
        assert!(!dfa.accepts(b"zbc"));
        assert!(!dfa.accepts(b"abz"));
        assert!(!dfa.accepts(b"ab"));
        assert!(!dfa.accepts(b"abcd"));
    }
}
