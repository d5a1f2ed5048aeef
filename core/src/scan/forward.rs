use std::path::Path;

use tracing::debug;

use crate::{
  cancel::CancellationToken,
  scan::{
    ancestors_of,
    stream::{Position, Step, TagEvent, TagStream, Tagged},
    xpath_of, ElementSpan, Halt, Located,
  },
  search_match::PreparedSearch,
};

/// Integer-percent progress that only fires when the value grows. Stays below
/// 100; completion is reported by the caller.
struct Progress<'a> {
  total: u64,
  last: u8,
  sink: &'a mut dyn FnMut(u8),
}

impl Progress<'_> {
  fn update(&mut self, done: u64) {
    if self.total == 0 {
      return;
    }
    let pct = (done.saturating_mul(100) / self.total).min(99) as u8;
    if pct > self.last {
      self.last = pct;
      (self.sink)(pct);
    }
  }
}

/// Find the first element at or after `start_offset` matching `prepared`.
///
/// Always parses from byte 0: the nesting stack (and so the path and
/// ancestors of a hit) can only be rebuilt by seeing every open tag from the
/// root. `start_offset` filters which hit is reported, it is not a seek.
pub(crate) fn search(
  path: &Path,
  prepared: &PreparedSearch,
  start_offset: u64,
  buffer_bytes: usize,
  token: &CancellationToken,
  on_progress: &mut dyn FnMut(u8),
) -> Result<Located, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  let mut progress = Progress {
    total: stream.file_len(),
    last: 0,
    sink: on_progress,
  };
  debug!(path = %path.display(), start_offset, "forward search started");

  let outcome = loop {
    progress.update(stream.position());
    let hit = {
      let Tagged { at, event } = match stream.next(token) {
        Ok(t) => t,
        Err(halt) => break Err(halt),
      };
      match event {
        TagEvent::Open(e) if at.offset >= start_offset && prepared.matches(&e) => Some((at, None)),
        TagEvent::Empty(e) if at.offset >= start_offset && prepared.matches(&e) => {
          Some((at, Some(String::from_utf8_lossy(e.name().as_ref()).into_owned())))
        }
        TagEvent::Eof => break Err(Halt::Exhausted),
        _ => None,
      }
    };
    match hit {
      Some((at, None)) => break open_element(&mut stream, at, token),
      Some((at, Some(name))) => break Ok(empty_element(&stream, at, &name)),
      None => {}
    }
  };

  debug!(
    events = stream.events(),
    position = stream.position(),
    found = outcome.is_ok(),
    "forward search finished"
  );
  outcome
}

/// First element directly inside the document's wrapper element.
pub(crate) fn first_child(
  path: &Path,
  buffer_bytes: usize,
  token: &CancellationToken,
) -> Result<Located, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  loop {
    match stream.step(token)? {
      // depth 1 right after an open tag means we just entered the root
      Step::Open(_) if stream.depth() == 1 => {}
      Step::Open(at) => return open_element(&mut stream, at, token),
      Step::Empty(..) | Step::Close(_) if stream.depth() == 0 => return Err(Halt::Exhausted),
      Step::Empty(at, name) => return Ok(empty_element(&stream, at, &name)),
      Step::Eof(_) => return Err(Halt::Exhausted),
      Step::Close(_) | Step::Other(_) => {}
    }
  }
}

/// The element whose start tag was just read (top of the stack), scanned
/// through to its matching end tag.
pub(crate) fn open_element(
  stream: &mut TagStream,
  at: Position,
  token: &CancellationToken,
) -> Result<Located, Halt> {
  let stack = stream.stack();
  let depth = stack.len().saturating_sub(1);
  let path = xpath_of(stack.iter().map(|t| t.name.as_str()));
  let ancestors = ancestors_of(&stack[..depth]);
  let end = stream.close_to(depth, token)?;
  Ok(Located {
    span: ElementSpan {
      start: at.offset,
      end,
    },
    path,
    line: Some(at.line),
    ancestors,
  })
}

/// A self-closing element that was just read; it never enters the stack.
pub(crate) fn empty_element(stream: &TagStream, at: Position, name: &str) -> Located {
  let stack = stream.stack();
  Located {
    span: ElementSpan {
      start: at.offset,
      end: stream.position(),
    },
    path: xpath_of(stack.iter().map(|t| t.name.as_str()).chain(std::iter::once(name))),
    line: Some(at.line),
    ancestors: ancestors_of(stack),
  }
}
