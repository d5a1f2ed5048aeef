use quick_xml::events::BytesStart;

use crate::models::SearchKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrKey {
  Id,
  Guid,
  Name,
}

impl AttrKey {
  const ALL: [AttrKey; 3] = [AttrKey::Id, AttrKey::Guid, AttrKey::Name];

  fn as_bytes(self) -> &'static [u8] {
    match self {
      AttrKey::Id => b"id",
      AttrKey::Guid => b"guid",
      AttrKey::Name => b"name",
    }
  }

  fn from_key(key: &[u8]) -> Option<Self> {
    Self::ALL
      .into_iter()
      .find(|k| key.eq_ignore_ascii_case(k.as_bytes()))
  }
}

/// What a query is compared against. `Any` tries the tag name first, then the
/// `id`, `guid` and `name` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Predicate {
  TagName,
  Attribute(AttrKey),
  Any,
}

impl From<SearchKind> for Predicate {
  fn from(kind: SearchKind) -> Self {
    match kind {
      SearchKind::Tag => Predicate::TagName,
      SearchKind::Id => Predicate::Attribute(AttrKey::Id),
      SearchKind::Guid => Predicate::Attribute(AttrKey::Guid),
      SearchKind::Name => Predicate::Attribute(AttrKey::Name),
      SearchKind::Any => Predicate::Any,
    }
  }
}

/// A query lowered once so each tag event is matched without allocating.
#[derive(Debug, Clone)]
pub(crate) struct PreparedSearch {
  needle: Vec<u8>,
  predicate: Predicate,
}

impl PreparedSearch {
  /// `None` for an empty query. Whitespace is part of the needle.
  pub(crate) fn new(query: &str, kind: SearchKind) -> Option<Self> {
    if query.is_empty() {
      return None;
    }
    Some(Self {
      needle: query.as_bytes().to_ascii_lowercase(),
      predicate: kind.into(),
    })
  }

  pub(crate) fn matches(&self, e: &BytesStart<'_>) -> bool {
    match self.predicate {
      Predicate::TagName => self.matches_name(e),
      Predicate::Attribute(key) => self.matches_attr(e, |k| k == key),
      Predicate::Any => self.matches_name(e) || self.matches_attr(e, |_| true),
    }
  }

  fn matches_name(&self, e: &BytesStart<'_>) -> bool {
    contains_ignore_case(e.name().as_ref(), &self.needle)
  }

  fn matches_attr(&self, e: &BytesStart<'_>, want: impl Fn(AttrKey) -> bool) -> bool {
    e.attributes().flatten().any(|attr| {
      AttrKey::from_key(attr.key.as_ref()).is_some_and(&want)
        && contains_ignore_case(&attr.value, &self.needle)
    })
  }
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
  if needle.len() > haystack.len() {
    return false;
  }
  haystack
    .windows(needle.len())
    .any(|w| w.eq_ignore_ascii_case(needle))
}
