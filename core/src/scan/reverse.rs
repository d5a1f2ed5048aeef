use tracing::debug;

use crate::{
  cancel::CancellationToken,
  scan::{ElementSpan, Halt},
  window::WindowReader,
};

/// Lookbehind/lookahead any delimiter check may need (`<![CDATA[`).
const GUARD: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
  Open,
  Close,
  Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagRecord {
  pub name: String,
  pub kind: TagKind,
  pub span: ElementSpan,
}

/// What the bytes at the scan cursor belong to, seen from the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
  Markup,
  Comment,
  CData,
  Pi,
}

impl Region {
  fn opener(self) -> &'static [u8] {
    match self {
      Region::Markup => b"<",
      Region::Comment => b"<!--",
      Region::CData => b"<![CDATA[",
      Region::Pi => b"<?",
    }
  }

  fn closer(self) -> &'static [u8] {
    match self {
      Region::Markup => b">",
      Region::Comment => b"-->",
      Region::CData => b"]]>",
      Region::Pi => b"?>",
    }
  }
}

/// Walks a file backwards in fixed windows, yielding complete tags
/// right-to-left.
///
/// `buf` holds bytes `[base, base + buf.len())`. Everything at or after
/// `cursor` has been consumed; bytes after it are kept (up to `max_tag`)
/// only so a tag starting in an earlier window can be read forward to its `>`.
/// Outside `Markup`, bytes are skipped until `region_start`, the `<` that
/// opens the current comment, CDATA section or processing instruction.
pub(crate) struct ReverseTags<'r> {
  reader: &'r mut WindowReader,
  window: usize,
  max_tag: usize,
  buf: Vec<u8>,
  base: u64,
  cursor: usize,
  region: Region,
  region_start: u64,
}

impl<'r> ReverseTags<'r> {
  pub(crate) fn new(reader: &'r mut WindowReader, window: usize, max_tag: usize) -> Self {
    let base = reader.len();
    Self {
      reader,
      window: window.max(GUARD * 2),
      max_tag: max_tag.max(GUARD),
      buf: Vec::new(),
      base,
      cursor: 0,
      region: Region::Markup,
      region_start: 0,
    }
  }

  /// Next complete element tag to the left, or `None` at the start of file.
  pub(crate) fn prev_tag(&mut self) -> Result<Option<TagRecord>, Halt> {
    loop {
      let floor = if self.base == 0 { 0 } else { GUARD };
      while self.cursor > floor {
        let i = self.cursor - 1;
        self.cursor = i;
        if let Some(tag) = self.step(i)? {
          return Ok(Some(tag));
        }
      }
      if self.base == 0 {
        return Ok(None);
      }
      self.refill()?;
    }
  }

  fn step(&mut self, i: usize) -> Result<Option<TagRecord>, Halt> {
    let abs = self.base + i as u64;
    if self.region != Region::Markup {
      if abs == self.region_start {
        self.region = Region::Markup;
      }
      return Ok(None);
    }

    match self.buf[i] {
      b'>' => {
        let behind = &self.buf[..i];
        let candidate = if behind.ends_with(b"--") {
          Some(Region::Comment)
        } else if behind.ends_with(b"]]") {
          Some(Region::CData)
        } else if behind.ends_with(b"?") {
          Some(Region::Pi)
        } else {
          None
        };
        if let Some(region) = candidate {
          // `?>`, `-->` and `]]>` are legal in text and attribute values too
          if let Some(start) = self.construct_start(region, abs)? {
            self.region = region;
            self.region_start = start;
          }
        }
        Ok(None)
      }
      b'<' => {
        let rest = &self.buf[i..];
        if matches!(rest.get(1), Some(b'!' | b'?')) {
          // doctype and other declarations
          return Ok(None);
        }
        let len = tag_len(rest)
          .ok_or_else(|| Halt::Malformed(format!("unterminated tag at byte {abs}")))?;
        Ok(classify_tag(&rest[..len]).map(|(name, kind)| TagRecord {
          name,
          kind,
          span: ElementSpan {
            start: abs,
            end: abs + len as u64,
          },
        }))
      }
      _ => Ok(None),
    }
  }

  /// Where the `region` construct closed by the `>` at `gt` begins, or `None`
  /// if no opener before it reaches that `>` as its first terminator.
  ///
  /// Opener text may also occur inside CDATA or instruction content, so the
  /// outermost opener whose first terminator is `gt` wins.
  fn construct_start(&mut self, region: Region, gt: u64) -> Result<Option<u64>, Halt> {
    let (opener, closer) = (region.opener(), region.closer());
    let end = gt + 1;
    let mut limit = end.saturating_sub(closer.len() as u64);
    let mut start = None;
    while let Some(at) = self.reader.rfind(opener, limit, self.window)? {
      let body = at + opener.len() as u64;
      let first_close = self.reader.find(closer, body, end, self.window)?;
      if first_close != Some(end - closer.len() as u64) {
        break;
      }
      start = Some(at);
      limit = at + opener.len() as u64 - 1;
    }
    Ok(start)
  }

  /// Prepend the previous window, carrying the unconsumed head of the current
  /// buffer plus enough of its tail to finish any tag that straddles the seam.
  fn refill(&mut self) -> Result<(), Halt> {
    let keep = (self.cursor + self.max_tag).min(self.buf.len());
    let new_base = self.base.saturating_sub(self.window as u64);
    let mut next = self
      .reader
      .read_at(new_base, (self.base - new_base) as usize)?;
    let earlier = next.len();
    next.extend_from_slice(&self.buf[..keep]);
    self.cursor += earlier;
    self.buf = next;
    self.base = new_base;
    Ok(())
  }
}

/// Length of the tag starting at `bytes[0] == b'<'`, through the first `>`
/// outside a quoted attribute value.
fn tag_len(bytes: &[u8]) -> Option<usize> {
  let mut quote: Option<u8> = None;
  for (i, &b) in bytes.iter().enumerate().skip(1) {
    match quote {
      Some(q) if b == q => quote = None,
      Some(_) => {}
      None => match b {
        b'"' | b'\'' => quote = Some(b),
        b'>' => return Some(i + 1),
        b'<' => return None,
        _ => {}
      },
    }
  }
  None
}

/// Classify a complete `<…>` slice. Declarations, comments and processing
/// instructions yield `None`.
fn classify_tag(slice: &[u8]) -> Option<(String, TagKind)> {
  let len = slice.len();
  if len < 3 || matches!(slice[1], b'?' | b'!') {
    return None;
  }
  let (name_bytes, kind) = if slice[1] == b'/' {
    (&slice[2..], TagKind::Close)
  } else if slice[len - 2] == b'/' {
    (&slice[1..], TagKind::Empty)
  } else {
    (&slice[1..], TagKind::Open)
  };
  let end = name_bytes
    .iter()
    .position(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/'))
    .unwrap_or(name_bytes.len());
  if end == 0 {
    return None;
  }
  Some((String::from_utf8_lossy(&name_bytes[..end]).into_owned(), kind))
}

#[derive(Debug, Clone)]
pub(crate) struct LastChild {
  pub root: String,
  pub name: String,
  pub span: ElementSpan,
}

/// The wrapper's last direct child, found without a forward pass.
///
/// End tags seen while walking backwards are pushed and paired with their
/// start tags by name, so nested elements sharing a name resolve correctly.
/// With exactly the root's end tag on the stack we are directly inside the
/// wrapper.
pub(crate) fn last_child(
  reader: &mut WindowReader,
  window: usize,
  max_tag: usize,
  token: &CancellationToken,
) -> Result<LastChild, Halt> {
  let mut tags = ReverseTags::new(reader, window, max_tag);
  let mut open: Vec<String> = Vec::new();
  let mut child_end: Option<u64> = None;
  let mut seen = 0u64;

  while let Some(tag) = tags.prev_tag()? {
    if token.is_cancelled() {
      return Err(Halt::Cancelled);
    }
    seen += 1;
    match tag.kind {
      TagKind::Close => {
        if open.len() == 1 {
          child_end = Some(tag.span.end);
        }
        open.push(tag.name);
      }
      TagKind::Open => {
        let expected = open.pop().ok_or_else(|| {
          Halt::Malformed(format!("<{}> at byte {} is never closed", tag.name, tag.span.start))
        })?;
        if expected != tag.name {
          return Err(Halt::Malformed(format!(
            "<{}> at byte {} closed by </{}>",
            tag.name, tag.span.start, expected
          )));
        }
        match open.len() {
          0 => return Err(Halt::Exhausted),
          1 => {
            let end = child_end
              .ok_or_else(|| Halt::Malformed(format!("no end tag for <{}>", tag.name)))?;
            debug!(tags = seen, start = tag.span.start, end, "reverse scan found last child");
            return Ok(LastChild {
              root: open[0].clone(),
              name: tag.name,
              span: ElementSpan {
                start: tag.span.start,
                end,
              },
            });
          }
          _ => {}
        }
      }
      TagKind::Empty => match open.len() {
        0 => return Err(Halt::Exhausted),
        1 => {
          debug!(tags = seen, start = tag.span.start, "reverse scan found last child");
          return Ok(LastChild {
            root: open[0].clone(),
            name: tag.name,
            span: tag.span,
          });
        }
        _ => {}
      },
    }
  }

  if open.is_empty() {
    Err(Halt::Exhausted)
  } else {
    Err(Halt::Malformed(format!("reached start of file with {} element(s) open", open.len())))
  }
}
