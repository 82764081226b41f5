// Copyright 2024 the rans developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Table-filling DFA minimization.
//!
//! Marks distinguishable state pairs until a fixpoint, merges every state
//! into its smallest equivalent, and renumbers the survivors densely.

use itertools::Itertools;

use crate::dfa::{Dfa, StateIdx, REJECT};

struct Minimizer<'a> {
    dfa: &'a Dfa,
    // Symmetric n*n table; distinguishable[i*n + j] is true once states i
    // and j are known to differ.
    distinguishable: Vec<bool>,
}

pub fn minimize(dfa: &Dfa) -> Dfa {
    let n = dfa.num_states();
    if n < 2 {
        return dfa.clone();
    }

    let mut min = Minimizer {
        dfa,
        distinguishable: vec![false; n * n],
    };
    min.compute_table();
    min.rebuild()
}

impl<'a> Minimizer<'a> {
    fn mark(&mut self, i: StateIdx, j: StateIdx) {
        let n = self.dfa.num_states();
        self.distinguishable[i * n + j] = true;
        self.distinguishable[j * n + i] = true;
    }

    fn marked(&self, i: StateIdx, j: StateIdx) -> bool {
        self.distinguishable[i * self.dfa.num_states() + j]
    }

    /// A pair disagrees on byte `c` if exactly one side rejects, or both
    /// targets exist but are already known to be distinguishable.
    fn disagree(&self, i: StateIdx, j: StateIdx, c: u8) -> bool {
        let n1 = self.dfa.transition(i, c);
        let n2 = self.dfa.transition(j, c);
        if n1 == n2 {
            return false;
        }
        if n1 == REJECT || n2 == REJECT {
            return true;
        }
        self.marked(n1, n2)
    }

    fn compute_table(&mut self) {
        let n = self.dfa.num_states();

        for (i, j) in (0..n).tuple_combinations() {
            if self.dfa.is_accepting(i) != self.dfa.is_accepting(j) {
                self.mark(i, j);
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (i, j) in (0..n).tuple_combinations() {
                if self.marked(i, j) {
                    continue;
                }
                for c in 0..=255u8 {
                    if self.disagree(i, j, c) {
                        self.mark(i, j);
                        changed = true;
                        break;
                    }
                }
            }
        }
    }

    /// Collapses each equivalence class onto its smallest member and
    /// renumbers the survivors in their original order.
    fn rebuild(&self) -> Dfa {
        let n = self.dfa.num_states();

        let mut merge: Vec<Option<StateIdx>> = vec![None; n];
        for (i, j) in (0..n).tuple_combinations() {
            if merge[j].is_none() && !self.marked(i, j) {
                merge[j] = Some(i);
            }
        }

        let mut replace = vec![0; n];
        let mut states = Vec::new();
        for s in 0..n {
            match merge[s] {
                None => {
                    replace[s] = states.len();
                    states.push(self.dfa.states[s].clone());
                }
                // The representative is smaller than s, so its new index
                // is already known.
                Some(rep) => replace[s] = replace[rep],
            }
        }

        for st in &mut states {
            for t in st.transitions.iter_mut() {
                if *t != REJECT {
                    *t = replace[*t];
                }
            }
        }

        Dfa { states }
    }
}
