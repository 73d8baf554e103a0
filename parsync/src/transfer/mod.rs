//! Transfer rate arithmetic.

pub mod rate;

pub use rate::{eta, format_rate, parse_rate};
