use std::{
  fs::File,
  io::{BufReader, Read, Seek, SeekFrom},
  path::Path,
};

use quick_xml::{
  events::{BytesStart, Event},
  Reader,
};

use crate::{cancel::CancellationToken, scan::Halt, window::LineCountingReader};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenTag {
  pub name: String,
  pub offset: u64,
  pub line: u64,
}

/// Where an event began: byte offset and 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
  pub offset: u64,
  pub line: u64,
}

pub(crate) enum TagEvent<'a> {
  /// Start tag, already pushed on the nesting stack.
  Open(BytesStart<'a>),
  /// Self-closing tag; the stack is left untouched.
  Empty(BytesStart<'a>),
  /// End tag, already popped.
  Close,
  /// Text, comments, declarations and the like.
  Other,
  Eof,
}

pub(crate) struct Tagged<'a> {
  pub at: Position,
  pub event: TagEvent<'a>,
}

/// An event with attributes dropped, for scans that only follow structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
  Open(Position),
  Empty(Position, String),
  Close(Position),
  Other(Position),
  Eof(Position),
}

/// Forward event stream from byte 0 that keeps the nesting stack current.
///
/// A leading byte-order mark is skipped before the parser sees the file;
/// `skip` adds it back so every reported offset is a file offset.
pub(crate) struct TagStream {
  reader: Reader<LineCountingReader<BufReader<File>>>,
  skip: u64,
  buf: Vec<u8>,
  stack: Vec<OpenTag>,
  file_len: u64,
  events: u64,
}

impl TagStream {
  pub(crate) fn open(path: &Path, buffer_bytes: usize) -> Result<Self, Halt> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut head = Vec::with_capacity(UTF8_BOM.len());
    (&mut file).take(UTF8_BOM.len() as u64).read_to_end(&mut head)?;
    let skip = if head == UTF8_BOM { UTF8_BOM.len() as u64 } else { 0 };
    file.seek(SeekFrom::Start(skip))?;

    let inner = LineCountingReader::new(BufReader::with_capacity(buffer_bytes.max(4096), file));
    Ok(Self {
      reader: Reader::from_reader(inner),
      skip,
      buf: Vec::new(),
      stack: Vec::new(),
      file_len,
      events: 0,
    })
  }

  pub(crate) fn file_len(&self) -> u64 {
    self.file_len
  }

  /// Byte just past the last event read (start of the next one).
  pub(crate) fn position(&self) -> u64 {
    self.reader.buffer_position() as u64 + self.skip
  }

  pub(crate) fn events(&self) -> u64 {
    self.events
  }

  pub(crate) fn stack(&self) -> &[OpenTag] {
    &self.stack
  }

  pub(crate) fn depth(&self) -> usize {
    self.stack.len()
  }

  /// Read one event. The token is checked first, so a cancelled scan never
  /// processes another tag.
  pub(crate) fn next(&mut self, token: &CancellationToken) -> Result<Tagged<'_>, Halt> {
    if token.is_cancelled() {
      return Err(Halt::Cancelled);
    }
    let mut at = Position {
      offset: self.position(),
      line: self.reader.get_ref().line(),
    };
    self.buf.clear();
    self.events += 1;
    let event = match self.reader.read_event_into(&mut self.buf)? {
      Event::Start(e) => {
        // `<` + content + `>`, measured back from where the tag ended
        at.offset = tag_start(self.reader.buffer_position() as u64 + self.skip, e.len() + 2, at.offset);
        self.stack.push(OpenTag {
          name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
          offset: at.offset,
          line: at.line,
        });
        TagEvent::Open(e)
      }
      Event::Empty(e) => {
        at.offset = tag_start(self.reader.buffer_position() as u64 + self.skip, e.len() + 3, at.offset);
        TagEvent::Empty(e)
      }
      Event::End(_) => {
        if self.stack.pop().is_none() {
          return Err(Halt::Malformed(format!("unmatched end tag at byte {}", at.offset)));
        }
        TagEvent::Close
      }
      Event::Eof => TagEvent::Eof,
      _ => TagEvent::Other,
    };
    Ok(Tagged { at, event })
  }

  pub(crate) fn step(&mut self, token: &CancellationToken) -> Result<Step, Halt> {
    let Tagged { at, event } = self.next(token)?;
    Ok(match event {
      TagEvent::Open(_) => Step::Open(at),
      TagEvent::Empty(e) => Step::Empty(at, String::from_utf8_lossy(e.name().as_ref()).into_owned()),
      TagEvent::Close => Step::Close(at),
      TagEvent::Other => Step::Other(at),
      TagEvent::Eof => Step::Eof(at),
    })
  }

  /// Keep reading until the stack is back to `depth`, returning the byte just
  /// past the end tag that got it there.
  pub(crate) fn close_to(&mut self, depth: usize, token: &CancellationToken) -> Result<u64, Halt> {
    while self.stack.len() > depth {
      let eof = matches!(self.next(token)?.event, TagEvent::Eof);
      if eof {
        return Err(Halt::Malformed(format!(
          "end of file with {} element(s) still open",
          self.stack.len()
        )));
      }
    }
    Ok(self.position())
  }

  /// Read events until the next one would start at or after `offset`.
  pub(crate) fn advance_to(&mut self, offset: u64, token: &CancellationToken) -> Result<(), Halt> {
    while self.position() < offset {
      if matches!(self.next(token)?.event, TagEvent::Eof) {
        break;
      }
    }
    Ok(())
  }
}

/// Exact offset of a tag's `<`, given the position just past its `>`.
/// Falls back to the pre-read position if the arithmetic does not fit.
fn tag_start(end: u64, raw_len: usize, before: u64) -> u64 {
  end.checked_sub(raw_len as u64).unwrap_or(before)
}
