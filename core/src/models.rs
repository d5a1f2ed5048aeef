use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
  pub path: String,
  pub len: u64,
}

/// Which part of an element a query is compared against.
///
/// `Any` evaluates tag name, then `id`, `guid`, `name` (first hit wins).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
  Tag,
  Id,
  Guid,
  Name,
  #[default]
  Any,
}

impl std::str::FromStr for SearchKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "tag" => Ok(SearchKind::Tag),
      "id" => Ok(SearchKind::Id),
      "guid" => Ok(SearchKind::Guid),
      "name" => Ok(SearchKind::Name),
      "any" | "" => Ok(SearchKind::Any),
      other => Err(format!("unknown search kind: {other}")),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
  pub query: String,
  #[serde(default)]
  pub kind: SearchKind,
  /// Only matches whose `<` sits at or after this byte are reported.
  #[serde(default)]
  pub start_offset: u64,
  /// Restart from byte 0 when nothing matches after `start_offset`.
  #[serde(default)]
  pub wrap: bool,
}

impl SearchRequest {
  pub fn new(query: impl Into<String>, kind: SearchKind) -> Self {
    Self {
      query: query.into(),
      kind,
      start_offset: 0,
      wrap: false,
    }
  }

  /// Same query, continuing after a previous hit.
  pub fn next_after(&self, offset: u64) -> Self {
    Self {
      start_offset: offset.saturating_add(1),
      ..self.clone()
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
  Found,
  NotFound,
  Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AncestorInfo {
  pub name: String,
  pub offset: u64,
  pub line_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
  pub found: bool,
  pub status: SearchStatus,
  /// Slash-joined element names from the root down to the element itself.
  pub path: String,
  pub element_text: String,
  /// Set when `element_text` was cut at `CoreOptions::max_element_bytes`.
  pub element_truncated: bool,
  pub context_before: String,
  pub context_after: String,
  pub offset: u64,
  /// Byte just past the element's closing `>`.
  pub end_offset: u64,
  pub line_number: Option<u64>,
  pub ancestors: Vec<AncestorInfo>,
  /// The match lies before `start_offset` (search restarted from byte 0).
  pub wrapped: bool,
}

impl NavigationResult {
  pub fn not_found() -> Self {
    Self::empty(SearchStatus::NotFound)
  }

  pub fn cancelled() -> Self {
    Self::empty(SearchStatus::Cancelled)
  }

  fn empty(status: SearchStatus) -> Self {
    Self {
      found: false,
      status,
      path: String::new(),
      element_text: String::new(),
      element_truncated: false,
      context_before: String::new(),
      context_after: String::new(),
      offset: 0,
      end_offset: 0,
      line_number: None,
      ancestors: Vec::new(),
      wrapped: false,
    }
  }

  /// Depth of the element below the document root (root itself is 0).
  pub fn depth(&self) -> usize {
    self.ancestors.len()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSpec {
  pub size_mb: u32,
  pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleReport {
  pub output_path: String,
  pub bytes_written: u64,
  pub elements_written: u64,
}
