use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use xnav_core::{CancellationToken, CoreEngine, CoreOptions, SearchKind, SearchRequest};

fn main() -> Result<(), String> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let mut args = std::env::args().skip(1);
  let usage = "usage: cargo run -p xnav_core --example smoke_search -- <path-to-xml> <query> [tag|id|guid|name|any]";
  let path = PathBuf::from(args.next().ok_or_else(|| usage.to_string())?);
  let query = args.next().ok_or_else(|| usage.to_string())?;
  let kind: SearchKind = args.next().as_deref().unwrap_or("any").parse()?;

  let eng = CoreEngine::new(CoreOptions::default()).map_err(|e| e.to_string())?;
  let info = eng.open_file(&path).map_err(|e| e.to_string())?;
  println!("len={}", info.len);

  let token = CancellationToken::new();
  let mut req = SearchRequest::new(query, kind);
  let mut hits = 0;
  loop {
    let r = eng.search(&path, &req, &token).map_err(|e| e.to_string())?;
    if !r.found {
      break;
    }
    hits += 1;
    if hits <= 5 {
      println!("hit offset={} line={:?} path={}", r.offset, r.line_number, r.path);
    }
    req = req.next_after(r.offset);
  }
  println!("hits={hits}");

  let first = eng.first_child(&path).map_err(|e| e.to_string())?;
  let last = eng.last_child(&path).map_err(|e| e.to_string())?;
  println!("first_child={} @{}", first.path, first.offset);
  println!("last_child={} @{}", last.path, last.offset);
  Ok(())
}
