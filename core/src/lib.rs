//! Bounded-memory search and navigation over very large tag-structured
//! (XML-like) documents.
//!
//! Every operation opens the document fresh, reads it through small windows or
//! a single streaming pass, and never materializes the whole file.

mod cancel;
mod engine;
mod models;
mod refine;
mod sample;
mod scan;
mod search_match;
mod window;

pub use crate::cancel::{CancellationToken, SearchTicket};
pub use crate::engine::{CoreEngine, CoreError, CoreOptions};
pub use crate::models::{
  AncestorInfo, FileInfo, NavigationResult, SampleReport, SampleSpec, SearchKind, SearchRequest,
  SearchStatus,
};
