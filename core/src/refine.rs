use crate::{engine::CoreError, scan::ElementSpan, window::WindowReader};

#[derive(Debug, Clone, Copy)]
pub(crate) struct RefineLimits {
  /// How far to look for the `<` / `>` delimiters around an approximate span.
  pub scan_bytes: usize,
  pub context_bytes: usize,
  pub max_element_bytes: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct RefinedElement {
  pub start: u64,
  pub end: u64,
  pub text: String,
  pub truncated: bool,
  pub before: String,
  pub after: String,
}

/// Snap a parser-reported span onto the element's real delimiters and pull the
/// element text plus fixed-size context windows on either side.
pub(crate) fn refine(
  reader: &mut WindowReader,
  approx: ElementSpan,
  limits: &RefineLimits,
) -> Result<RefinedElement, CoreError> {
  let start = refine_start(reader, approx.start, limits.scan_bytes)?;
  let end = refine_end(reader, start, approx.end, limits.scan_bytes)?;

  let elem_len = (end - start) as usize;
  let truncated = elem_len > limits.max_element_bytes;
  let text = reader.read_lossy(start, elem_len.min(limits.max_element_bytes))?;

  let before_start = start.saturating_sub(limits.context_bytes as u64);
  let before = reader.read_lossy(before_start, (start - before_start) as usize)?;
  let after = reader.read_lossy(end, limits.context_bytes)?;

  Ok(RefinedElement {
    start,
    end,
    text,
    truncated,
    before,
    after,
  })
}

fn refine_start(reader: &mut WindowReader, approx_start: u64, scan: usize) -> Result<u64, CoreError> {
  let approx_start = approx_start.min(reader.len().saturating_sub(1));
  let back_from = approx_start.saturating_sub(scan as u64);
  let back = reader.read_at(back_from, (approx_start - back_from) as usize + 1)?;

  // Inside a tag the nearest delimiter behind us is its `<`; between tags it
  // is the previous tag's `>`, and the element starts further ahead.
  if let Some(i) = memchr::memrchr2(b'<', b'>', &back) {
    if back[i] == b'<' {
      return Ok(back_from + i as u64);
    }
  }

  let ahead = reader.read_at(approx_start, scan)?;
  Ok(match memchr::memchr(b'<', &ahead) {
    Some(i) => approx_start + i as u64,
    None => approx_start,
  })
}

fn refine_end(
  reader: &mut WindowReader,
  start: u64,
  approx_end: u64,
  scan: usize,
) -> Result<u64, CoreError> {
  let len = reader.len();
  let from = approx_end.saturating_sub(1).max(start);
  let ahead = reader.read_at(from, scan)?;
  let end = match memchr::memchr(b'>', &ahead) {
    Some(i) => from + i as u64 + 1,
    None => approx_end,
  };
  Ok(end.clamp(start, len))
}
