use std::{
  fs::File,
  io::{BufRead, Read, Seek, SeekFrom},
  path::Path,
};

use memchr::memmem;

use crate::engine::CoreError;

/// Length of the file at `path`, read fresh on every call.
pub(crate) fn file_len(path: &Path) -> Result<u64, CoreError> {
  let meta = std::fs::metadata(path)?;
  if !meta.is_file() {
    return Err(CoreError::InvalidArg(format!(
      "not a regular file: {}",
      path.display()
    )));
  }
  Ok(meta.len())
}

/// Bounded random-access reads over one file, scoped to a single request.
pub(crate) struct WindowReader {
  file: File,
  len: u64,
}

impl WindowReader {
  pub(crate) fn open(path: &Path) -> Result<Self, CoreError> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok(Self { file, len })
  }

  pub(crate) fn len(&self) -> u64 {
    self.len
  }

  /// Up to `size` bytes starting at `offset`; short only at end of file.
  pub(crate) fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>, CoreError> {
    if offset >= self.len || size == 0 {
      return Ok(Vec::new());
    }
    let want = (size as u64).min(self.len - offset);
    self.file.seek(SeekFrom::Start(offset))?;
    let mut out = Vec::with_capacity(want as usize);
    (&mut self.file).take(want).read_to_end(&mut out)?;
    Ok(out)
  }

  /// Like `read_at`, decoded lossily: a multi-byte character split by the
  /// window edge becomes U+FFFD.
  pub(crate) fn read_lossy(&mut self, offset: u64, size: usize) -> Result<String, CoreError> {
    let bytes = self.read_at(offset, size)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
  }

  /// Start of the last `needle` lying wholly inside `[0, end)`, read backwards
  /// `chunk` bytes at a time.
  pub(crate) fn rfind(&mut self, needle: &[u8], end: u64, chunk: usize) -> Result<Option<u64>, CoreError> {
    let n = needle.len() as u64;
    let chunk = (chunk as u64).max(n * 2);
    let mut hi = end.min(self.len);
    while hi >= n {
      let lo = hi.saturating_sub(chunk);
      let bytes = self.read_at(lo, (hi - lo) as usize)?;
      if let Some(i) = memmem::rfind(&bytes, needle) {
        return Ok(Some(lo + i as u64));
      }
      if lo == 0 {
        break;
      }
      // overlap so a needle straddling `lo` is still seen
      hi = lo + n - 1;
    }
    Ok(None)
  }

  /// Start of the first `needle` lying wholly inside `[start, end)`.
  pub(crate) fn find(
    &mut self,
    needle: &[u8],
    start: u64,
    end: u64,
    chunk: usize,
  ) -> Result<Option<u64>, CoreError> {
    let n = needle.len() as u64;
    let chunk = (chunk as u64).max(n * 2);
    let end = end.min(self.len);
    let mut lo = start;
    while lo + n <= end {
      let hi = (lo + chunk).min(end);
      let bytes = self.read_at(lo, (hi - lo) as usize)?;
      if let Some(i) = memmem::find(&bytes, needle) {
        return Ok(Some(lo + i as u64));
      }
      if hi == end {
        break;
      }
      lo = hi + 1 - n;
    }
    Ok(None)
  }
}

/// `BufRead` adapter that counts newlines in consumed bytes, so a streaming
/// parser can report the line of each event without a second pass.
pub(crate) struct LineCountingReader<R> {
  inner: R,
  newlines: u64,
}

impl<R: BufRead> LineCountingReader<R> {
  pub(crate) fn new(inner: R) -> Self {
    Self { inner, newlines: 0 }
  }

  /// 1-based line of the next unconsumed byte.
  pub(crate) fn line(&self) -> u64 {
    self.newlines + 1
  }
}

impl<R: BufRead> Read for LineCountingReader<R> {
  fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
    let available = self.fill_buf()?;
    let n = available.len().min(out.len());
    out[..n].copy_from_slice(&available[..n]);
    self.consume(n);
    Ok(n)
  }
}

impl<R: BufRead> BufRead for LineCountingReader<R> {
  fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
    self.inner.fill_buf()
  }

  fn consume(&mut self, amt: usize) {
    if amt > 0 {
      if let Ok(buf) = self.inner.fill_buf() {
        let upto = amt.min(buf.len());
        self.newlines += memchr::memchr_iter(b'\n', &buf[..upto]).count() as u64;
      }
    }
    self.inner.consume(amt);
  }
}
