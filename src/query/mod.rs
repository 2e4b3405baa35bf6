//! Mongo-style filter wire form, parsed into a [`Filter`] tree and
//! evaluated against a document, grounded on `query/eval.rs`'s
//! `eval_filter`/`compare_bson`/`type_rank` shape.
mod eval;
mod filter;
pub mod temporal;

pub use eval::eval_filter;
pub use filter::{FieldOp, Filter, parse};
