use std::path::Path;

use tracing::debug;

use crate::{
  cancel::CancellationToken,
  scan::{
    ancestors_of,
    forward::{empty_element, open_element},
    stream::{OpenTag, Step, TagStream},
    xpath_of, ElementSpan, Halt, Located,
  },
};

/// The ancestor at `depth` (0 = document root) of whatever sits at
/// `child_offset`, with its own span, path and the ancestors above it.
pub(crate) fn find_parent(
  path: &Path,
  child_offset: u64,
  depth: usize,
  buffer_bytes: usize,
  token: &CancellationToken,
) -> Result<Located, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  stream.advance_to(child_offset, token)?;

  let stack = stream.stack();
  debug!(child_offset, depth, enclosing = stack.len(), "resolving ancestor");
  let Some(target) = stack.get(depth).cloned() else {
    return Err(Halt::Exhausted);
  };
  let path = xpath_of(stack[..=depth].iter().map(|t| t.name.as_str()));
  let ancestors = ancestors_of(&stack[..depth]);

  let end = stream.close_to(depth, token)?;
  Ok(Located {
    span: ElementSpan {
      start: target.offset,
      end,
    },
    path,
    line: Some(target.line),
    ancestors,
  })
}

/// Path of the element named `tag_name` whose start tag is at `offset`:
/// the names of every element enclosing `offset`, then `tag_name`.
///
/// A structural error part-way through still yields the chain seen so far.
pub(crate) fn resolve_xpath(
  path: &Path,
  offset: u64,
  tag_name: &str,
  buffer_bytes: usize,
  token: &CancellationToken,
) -> Result<String, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  match stream.advance_to(offset, token) {
    Ok(()) | Err(Halt::Malformed(_)) => {}
    Err(other) => return Err(other),
  }
  let names = stream.stack().iter().map(|t| t.name.as_str());
  Ok(xpath_of(names.chain(std::iter::once(tag_name))))
}

/// The element whose start tag begins at `offset`, or the first one after it.
pub(crate) fn element_at(
  path: &Path,
  offset: u64,
  buffer_bytes: usize,
  token: &CancellationToken,
) -> Result<Located, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  stream.advance_to(offset, token)?;
  loop {
    match stream.step(token)? {
      Step::Open(at) => return open_element(&mut stream, at, token),
      Step::Empty(at, name) => return Ok(empty_element(&stream, at, &name)),
      Step::Close(_) | Step::Eof(_) => return Err(Halt::Exhausted),
      Step::Other(_) => {}
    }
  }
}

/// The document's wrapper element, read from the prolog only.
pub(crate) fn root_element(
  path: &Path,
  buffer_bytes: usize,
  token: &CancellationToken,
) -> Result<OpenTag, Halt> {
  let mut stream = TagStream::open(path, buffer_bytes)?;
  loop {
    match stream.step(token)? {
      Step::Open(_) => {
        return stream.stack().first().cloned().ok_or(Halt::Exhausted);
      }
      Step::Empty(at, name) => {
        return Ok(OpenTag {
          name,
          offset: at.offset,
          line: at.line,
        })
      }
      Step::Close(_) | Step::Eof(_) => return Err(Halt::Exhausted),
      Step::Other(_) => {}
    }
  }
}
