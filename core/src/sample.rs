use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use quick_xml::{
  events::{BytesDecl, BytesStart, BytesText, Event},
  Writer,
};
use tracing::info;

use crate::{
  engine::CoreError,
  models::{SampleReport, SampleSpec},
};

pub(crate) const SIZE_MB_RANGE: std::ops::RangeInclusive<u32> = 1..=2048;
pub(crate) const DEPTH_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

const NAMES: [&str; 10] = [
  "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta", "Iota", "Kappa",
];

/// Counts bytes actually handed to the file so the size target is exact.
struct CountingWriter<W> {
  inner: W,
  written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    let n = self.inner.write(buf)?;
    self.written += n as u64;
    Ok(n)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.inner.flush()
  }
}

type SampleWriter = Writer<CountingWriter<BufWriter<File>>>;

/// Write a synthetic document of roughly `size_mb` MiB: a `<root>` wrapper
/// holding chains of `item_<level>_<n>` elements nested `depth` deep, each with
/// `guid`, `id` and `name` attributes. Output is fully determined by the spec.
pub(crate) fn generate(path: &Path, spec: &SampleSpec) -> Result<SampleReport, CoreError> {
  if !SIZE_MB_RANGE.contains(&spec.size_mb) {
    return Err(CoreError::InvalidArg(format!(
      "size_mb must be in {SIZE_MB_RANGE:?}, got {}",
      spec.size_mb
    )));
  }
  if !DEPTH_RANGE.contains(&spec.depth) {
    return Err(CoreError::InvalidArg(format!(
      "depth must be in {DEPTH_RANGE:?}, got {}",
      spec.depth
    )));
  }
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)?;
    }
  }

  let target = u64::from(spec.size_mb) * 1024 * 1024;
  let sink = CountingWriter {
    inner: BufWriter::new(File::create(path)?),
    written: 0,
  };
  let mut writer = Writer::new_with_indent(sink, b' ', 2);

  emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
  let root = BytesStart::new("root");
  emit(&mut writer, Event::Start(root.clone()))?;

  let mut count = 0u64;
  // Leave room for the closing tag so the total lands on the target.
  while writer.get_ref().written + 16 < target {
    write_item(&mut writer, &mut count, 1, spec.depth)?;
  }

  emit(&mut writer, Event::End(root.to_end()))?;
  let mut sink = writer.into_inner();
  sink.write_all(b"\n")?;
  sink.flush()?;

  info!(
    path = %path.display(),
    bytes = sink.written,
    elements = count,
    "sample document written"
  );
  Ok(SampleReport {
    output_path: path.to_string_lossy().to_string(),
    bytes_written: sink.written,
    elements_written: count,
  })
}

fn write_item(writer: &mut SampleWriter, count: &mut u64, level: u32, max_depth: u32) -> Result<(), CoreError> {
  let n = *count;
  *count += 1;

  let tag = format!("item_{level}_{n}");
  let guid = pseudo_uuid(n);
  let name = format!("{}_L{level}", NAMES[(n % NAMES.len() as u64) as usize]);

  let mut node = BytesStart::new(tag.as_str());
  node.push_attribute(("guid", guid.as_str()));
  node.push_attribute(("id", n.to_string().as_str()));
  node.push_attribute(("name", name.as_str()));
  emit(writer, Event::Start(node.clone()))?;

  if level >= max_depth {
    let content = format!("Content for {tag} (guid={guid}).");
    emit(writer, Event::Text(BytesText::new(&content)))?;
  } else {
    // every third element forks, so parents also get sibling children
    let children = if n % 3 == 0 { 2 } else { 1 };
    for _ in 0..children {
      write_item(writer, count, level + 1, max_depth)?;
    }
  }

  emit(writer, Event::End(node.to_end()))
}

fn emit(writer: &mut SampleWriter, event: Event<'_>) -> Result<(), CoreError> {
  writer
    .write_event(event)
    .map_err(|e| CoreError::Sample(e.to_string()))
}

/// Unique-looking, reproducible id derived from a counter.
fn pseudo_uuid(n: u64) -> String {
  let h = n
    .wrapping_mul(6364136223846793005)
    .wrapping_add(1442695040888963407);
  format!(
    "{:08x}-{:04x}-{:04x}-{:04x}-{:08x}{:04x}",
    (h >> 32) as u32,
    (h >> 16) as u16,
    (h & 0xFFFF) as u16,
    n as u16,
    ((n >> 16) as u32) ^ 0xDEAD,
    (n & 0xFFFF) as u16
  )
}
