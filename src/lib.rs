//! Side-by-side file comparison with an interactive merge.
//!
//! The line comparison itself is delegated to an external `diff` whose
//! ed-style output is parsed ([`hunk`]), replayed against both input files
//! ([`sync`]), shown in two columns ([`render`]) and, in merge mode, resolved
//! span by span into an output file ([`merge`]).

pub mod config;
pub mod diffproc;
pub mod error;
pub mod hunk;
pub mod lbuf;
pub mod merge;
pub mod render;
pub mod sync;
