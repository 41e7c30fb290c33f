//! Response body rewriting.
//!
//! Plain text substitution only: no HTML, CSS or JavaScript parsing.

pub mod rewriter;

pub use rewriter::ContentRewriter;
