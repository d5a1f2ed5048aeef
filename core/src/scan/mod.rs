//! Scanners that turn queries and offsets into element spans.
//!
//! Every scanner yields an approximate [`ElementSpan`] plus the structural
//! context it observed; `refine` snaps the span onto real delimiters.

mod ancestors;
mod forward;
mod reverse;
mod stream;

pub(crate) use ancestors::{element_at, find_parent, resolve_xpath, root_element};
pub(crate) use forward::{first_child, search};
pub(crate) use reverse::last_child;

use crate::{engine::CoreError, models::AncestorInfo, scan::stream::OpenTag};

/// Byte range of one element, `<` inclusive to `>` inclusive (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ElementSpan {
  pub start: u64,
  pub end: u64,
}

/// An element a scanner settled on, before boundary refinement.
#[derive(Debug, Clone)]
pub(crate) struct Located {
  pub span: ElementSpan,
  pub path: String,
  pub line: Option<u64>,
  pub ancestors: Vec<AncestorInfo>,
}

/// Why a scan stopped without locating anything.
#[derive(Debug)]
pub(crate) enum Halt {
  Exhausted,
  Cancelled,
  Malformed(String),
  Failed(CoreError),
}

impl From<CoreError> for Halt {
  fn from(e: CoreError) -> Self {
    Halt::Failed(e)
  }
}

impl From<std::io::Error> for Halt {
  fn from(e: std::io::Error) -> Self {
    Halt::Failed(CoreError::Io(e))
  }
}

impl From<quick_xml::Error> for Halt {
  fn from(e: quick_xml::Error) -> Self {
    match e {
      quick_xml::Error::Io(io) => Halt::Failed(CoreError::Io(std::io::Error::new(io.kind(), io.to_string()))),
      other => Halt::Malformed(other.to_string()),
    }
  }
}

pub(crate) fn xpath_of<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
  let mut out = String::new();
  for n in names {
    out.push('/');
    out.push_str(n);
  }
  out
}

pub(crate) fn ancestors_of(stack: &[OpenTag]) -> Vec<AncestorInfo> {
  stack
    .iter()
    .map(|t| AncestorInfo {
      name: t.name.clone(),
      offset: t.offset,
      line_number: Some(t.line),
    })
    .collect()
}
