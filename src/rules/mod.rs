//! Custody rule logic: validation before writes, evaluation on reads.

mod evaluator;
mod validator;

pub use evaluator::*;
pub use validator::*;
