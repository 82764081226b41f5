// Copyright 2024 the rans developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An abstract numeration system on regular languages.
//!
//! Given a regular expression, this crate enumerates the accepted byte
//! strings in length-lexicographic order and exposes the enumeration as a
//! bijection with the natural numbers: [`Rans::val`] maps an accepted
//! string to its rank, and [`Rans::rep`] maps a rank back to its string.
//!
//! ```
//! use rans::Rans;
//!
//! let r = Rans::new("(ab)*").unwrap();
//! assert_eq!(r.val(b"ab").unwrap(), rans::Value::from(1u32));
//! assert_eq!(r.rep(&rans::Value::from(3u32)).unwrap(), b"ababab");
//! ```
//!
//! The pipeline is a Glushkov position automaton determinized by subset
//! construction, minimized by table filling, and counted through powers of
//! its adjacency matrix over arbitrary-precision integers.

pub mod dfa;
mod error;
pub mod matrix;
mod parser;
mod rans;

pub use crate::error::Error;
pub use crate::parser::Encoding;
pub use crate::rans::{Rans, Value};

pub type Result<T> = std::result::Result<T, Error>;
