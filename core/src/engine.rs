use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  cancel::{CancellationToken, SearchRegistry, SearchTicket},
  models::{FileInfo, NavigationResult, SampleReport, SampleSpec, SearchRequest, SearchStatus},
  refine::{refine, RefineLimits},
  sample, scan,
  scan::{Halt, Located},
  search_match::PreparedSearch,
  window::{file_len, WindowReader},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("invalid argument: {0}")]
  InvalidArg(String),
  #[error("unknown search: {0}")]
  UnknownSearch(String),
  #[error("sample generation failed: {0}")]
  Sample(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
  /// Window size of the backward walk used by `last_child`.
  pub reverse_window_bytes: usize,
  /// Longest single tag the backward walk will reassemble across windows.
  pub max_tag_bytes: usize,
  /// How far boundary refinement looks for a tag's `<` and `>`.
  pub refine_scan_bytes: usize,
  /// Context returned on each side of a located element.
  pub context_bytes: usize,
  /// Read buffer of forward scans.
  pub read_buffer_bytes: usize,
  pub max_chunk_bytes: usize,
  /// Cap on `NavigationResult::element_text`.
  pub max_element_bytes: usize,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      reverse_window_bytes: 64 * 1024,
      max_tag_bytes: 64 * 1024,
      refine_scan_bytes: 128,
      context_bytes: 2000,
      read_buffer_bytes: 1024 * 1024,
      max_chunk_bytes: 16 * 1024 * 1024,
      max_element_bytes: 8 * 1024 * 1024,
    }
  }
}

impl CoreOptions {
  /// Parse options from JSON; absent keys keep their defaults.
  pub fn from_json(json: &str) -> Result<Self, CoreError> {
    serde_json::from_str(json).map_err(|e| CoreError::InvalidArg(format!("bad options: {e}")))
  }

  fn validate(&self) -> Result<(), CoreError> {
    let named = [
      ("reverse_window_bytes", self.reverse_window_bytes),
      ("max_tag_bytes", self.max_tag_bytes),
      ("refine_scan_bytes", self.refine_scan_bytes),
      ("read_buffer_bytes", self.read_buffer_bytes),
      ("max_chunk_bytes", self.max_chunk_bytes),
      ("max_element_bytes", self.max_element_bytes),
    ];
    for (name, v) in named {
      if v == 0 {
        return Err(CoreError::InvalidArg(format!("{name} must be > 0")));
      }
    }
    Ok(())
  }

  fn refine_limits(&self) -> RefineLimits {
    RefineLimits {
      scan_bytes: self.refine_scan_bytes,
      context_bytes: self.context_bytes,
      max_element_bytes: self.max_element_bytes,
    }
  }
}

/// Read-only navigation over large tag-structured documents.
///
/// Holds no file handles or parse state between calls; each operation opens
/// the document, scans, and closes it again.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  searches: SearchRegistry,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Result<Self, CoreError> {
    options.validate()?;
    Ok(Self {
      options,
      searches: SearchRegistry::default(),
    })
  }

  pub fn options(&self) -> &CoreOptions {
    &self.options
  }

  /// API: open(path) -> length
  pub fn open_file(&self, path: impl AsRef<Path>) -> Result<FileInfo, CoreError> {
    let path = path.as_ref();
    let len = file_len(path)?;
    Ok(FileInfo {
      path: path.to_string_lossy().to_string(),
      len,
    })
  }

  /// API: readChunk(path, offset, size) -> lossy text
  ///
  /// Returns `min(size, max_chunk_bytes, len - offset)` bytes' worth of text.
  /// Larger requests are clamped, not rejected.
  pub fn read_chunk(&self, path: impl AsRef<Path>, offset: u64, size: usize) -> Result<String, CoreError> {
    let size = size.min(self.options.max_chunk_bytes);
    let mut reader = WindowReader::open(path.as_ref())?;
    if offset > reader.len() {
      return Err(CoreError::InvalidArg(format!(
        "offset {} beyond file len {}",
        offset,
        reader.len()
      )));
    }
    reader.read_lossy(offset, size)
  }

  /// Register a new search and hand back its id and (un-cancelled) token.
  /// The registration ends when the ticket is dropped.
  pub fn begin_search(&self) -> SearchTicket {
    self.searches.issue()
  }

  /// API: cancel(search id)
  pub fn cancel(&self, search_id: &str) -> Result<(), CoreError> {
    self.searches.cancel(search_id)
  }

  /// Cancel every registered search; returns how many were signalled.
  pub fn cancel_all(&self) -> usize {
    self.searches.cancel_all()
  }

  pub fn searches_in_flight(&self) -> usize {
    self.searches.in_flight()
  }

  /// API: search(path, query, kind, startOffset, token) -> NavigationResult
  pub fn search(
    &self,
    path: impl AsRef<Path>,
    request: &SearchRequest,
    token: &CancellationToken,
  ) -> Result<NavigationResult, CoreError> {
    self.search_with_progress(path, request, token, |_| {})
  }

  /// Like `search`, reporting integer percent progress (0..=100) whenever it
  /// grows. 100 is always reported last.
  pub fn search_with_progress(
    &self,
    path: impl AsRef<Path>,
    request: &SearchRequest,
    token: &CancellationToken,
    mut on_progress: impl FnMut(u8),
  ) -> Result<NavigationResult, CoreError> {
    let path = path.as_ref();
    let prepared = PreparedSearch::new(&request.query, request.kind)
      .ok_or_else(|| CoreError::InvalidArg("query is empty".into()))?;
    let len = file_len(path)?;
    if request.start_offset > len {
      return Err(CoreError::InvalidArg(format!(
        "start_offset {} beyond file len {}",
        request.start_offset, len
      )));
    }

    let buffer = self.options.read_buffer_bytes;
    // a wrapped second pass must not move the reported percentage backwards
    let mut last = 0u8;
    let mut report = |pct: u8| {
      if pct > last {
        last = pct;
        on_progress(pct);
      }
    };

    let outcome = scan::search(path, &prepared, request.start_offset, buffer, token, &mut report);
    let wrapped = request.wrap && request.start_offset > 0 && matches!(outcome, Err(Halt::Exhausted));
    let outcome = if wrapped {
      debug!(start_offset = request.start_offset, "no match after start offset, wrapping to 0");
      scan::search(path, &prepared, 0, buffer, token, &mut report)
    } else {
      outcome
    };
    report(100);

    let mut result = self.settle(path, outcome, "search")?;
    result.wrapped = wrapped && result.found;
    Ok(result)
  }

  /// API: firstChild(path)
  pub fn first_child(&self, path: impl AsRef<Path>) -> Result<NavigationResult, CoreError> {
    let path = path.as_ref();
    let token = CancellationToken::new();
    let outcome = scan::first_child(path, self.options.read_buffer_bytes, &token);
    self.settle(path, outcome, "first_child")
  }

  /// API: lastChild(path)
  ///
  /// Walks backwards from end of file, so the child's own line number is not
  /// known; the root ancestor's is.
  pub fn last_child(&self, path: impl AsRef<Path>) -> Result<NavigationResult, CoreError> {
    let path = path.as_ref();
    let token = CancellationToken::new();
    let mut reader = WindowReader::open(path)?;
    let outcome = scan::last_child(
      &mut reader,
      self.options.reverse_window_bytes,
      self.options.max_tag_bytes,
      &token,
    )
    .and_then(|child| {
      let root = scan::root_element(path, self.options.read_buffer_bytes, &token)?;
      if root.name != child.root {
        return Err(Halt::Malformed(format!(
          "document opens with <{}> but closes with </{}>",
          root.name, child.root
        )));
      }
      Ok(Located {
        span: child.span,
        path: scan::xpath_of([root.name.as_str(), child.name.as_str()]),
        line: None,
        ancestors: scan::ancestors_of(std::slice::from_ref(&root)),
      })
    });
    self.settle(path, outcome, "last_child")
  }

  /// API: findParent(path, childOffset, ancestorDepth)
  ///
  /// `ancestor_depth` counts from the document root (0).
  pub fn find_parent(
    &self,
    path: impl AsRef<Path>,
    child_offset: u64,
    ancestor_depth: usize,
  ) -> Result<NavigationResult, CoreError> {
    let path = path.as_ref();
    let token = CancellationToken::new();
    let outcome = scan::find_parent(
      path,
      child_offset,
      ancestor_depth,
      self.options.read_buffer_bytes,
      &token,
    );
    self.settle(path, outcome, "find_parent")
  }

  /// The element starting at `offset` (or the first one after it), with its
  /// full path and ancestors.
  pub fn element_at(&self, path: impl AsRef<Path>, offset: u64) -> Result<NavigationResult, CoreError> {
    let path = path.as_ref();
    let token = CancellationToken::new();
    let outcome = scan::element_at(path, offset, self.options.read_buffer_bytes, &token);
    self.settle(path, outcome, "element_at")
  }

  /// API: resolveXPath(path, offset, tagName) -> full path
  pub fn resolve_xpath(
    &self,
    path: impl AsRef<Path>,
    offset: u64,
    tag_name: &str,
  ) -> Result<String, CoreError> {
    let token = CancellationToken::new();
    match scan::resolve_xpath(path.as_ref(), offset, tag_name, self.options.read_buffer_bytes, &token) {
      Ok(xpath) => Ok(xpath),
      Err(Halt::Failed(e)) => Err(e),
      // neither cancellation nor exhaustion can happen with a private token
      Err(_) => Ok(scan::xpath_of([tag_name])),
    }
  }

  /// API: generateSample(path, sizeMb, depthLimit)
  pub fn generate_sample(&self, path: impl AsRef<Path>, spec: &SampleSpec) -> Result<SampleReport, CoreError> {
    sample::generate(path.as_ref(), spec)
  }

  fn settle(
    &self,
    path: &Path,
    outcome: Result<Located, Halt>,
    op: &'static str,
  ) -> Result<NavigationResult, CoreError> {
    match outcome {
      Ok(located) => self.build_result(path, located),
      Err(Halt::Exhausted) => Ok(NavigationResult::not_found()),
      Err(Halt::Cancelled) => {
        debug!(op, "scan cancelled");
        Ok(NavigationResult::cancelled())
      }
      Err(Halt::Malformed(reason)) => {
        warn!(op, path = %path.display(), %reason, "malformed document, reporting not found");
        Ok(NavigationResult::not_found())
      }
      Err(Halt::Failed(e)) => Err(e),
    }
  }

  fn build_result(&self, path: &Path, located: Located) -> Result<NavigationResult, CoreError> {
    let mut reader = WindowReader::open(path)?;
    let el = refine(&mut reader, located.span, &self.options.refine_limits())?;
    Ok(NavigationResult {
      found: true,
      status: SearchStatus::Found,
      path: located.path,
      element_text: el.text,
      element_truncated: el.truncated,
      context_before: el.before,
      context_after: el.after,
      offset: el.start,
      end_offset: el.end,
      line_number: located.line,
      ancestors: located.ancestors,
      wrapped: false,
    })
  }
}
