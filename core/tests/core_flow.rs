use std::path::{Path, PathBuf};

use xnav_core::{
  AncestorInfo, CancellationToken, CoreEngine, CoreError, CoreOptions, SearchKind, SearchRequest,
  SearchStatus,
};

const SCENARIO: &str = r#"<root><a id="1"/><b guid="g1"><c name="x"/></b></root>"#;

fn engine() -> CoreEngine {
  CoreEngine::new(CoreOptions::default()).unwrap()
}

fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
  let p = dir.join(name);
  std::fs::write(&p, content).unwrap();
  p
}

fn search(eng: &CoreEngine, path: &Path, query: &str, kind: SearchKind) -> xnav_core::NavigationResult {
  eng
    .search(path, &SearchRequest::new(query, kind), &CancellationToken::new())
    .unwrap()
}

#[test]
fn open_reports_length() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.xml", SCENARIO);

  let eng = engine();
  let info = eng.open_file(&file).unwrap();
  assert_eq!(info.len, SCENARIO.len() as u64);

  match eng.open_file(dir.path()) {
    Err(CoreError::InvalidArg(_)) => {}
    other => panic!("expected InvalidArg for a directory, got {other:?}"),
  }
  match eng.open_file(dir.path().join("missing.xml")) {
    Err(CoreError::Io(_)) => {}
    other => panic!("expected Io error, got {other:?}"),
  }
}

#[test]
fn read_chunk_is_bounded_and_short_at_eof() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.txt", "abcdef");

  let eng = engine();
  assert_eq!(eng.read_chunk(&file, 2, 3).unwrap(), "cde");
  assert_eq!(eng.read_chunk(&file, 4, 100).unwrap(), "ef");
  assert_eq!(eng.read_chunk(&file, 6, 10).unwrap(), "");
  assert!(matches!(eng.read_chunk(&file, 7, 1), Err(CoreError::InvalidArg(_))));
  assert_eq!(eng.read_chunk(&file, 0, 64 * 1024 * 1024).unwrap(), "abcdef");
}

#[test]
fn read_chunk_clamps_oversized_requests() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.txt", "abcdef");

  let eng = CoreEngine::new(CoreOptions {
    max_chunk_bytes: 4,
    ..CoreOptions::default()
  })
  .unwrap();
  assert_eq!(eng.read_chunk(&file, 0, 100).unwrap(), "abcd");
  assert_eq!(eng.read_chunk(&file, 3, 100).unwrap(), "def");
  assert_eq!(eng.read_chunk(&file, 6, 100).unwrap(), "");
}

#[test]
fn read_chunk_split_character_is_replaced() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("u.txt");
  std::fs::write(&file, "aé".as_bytes()).unwrap();

  let eng = engine();
  assert_eq!(eng.read_chunk(&file, 0, 2).unwrap(), "a\u{FFFD}");
  assert_eq!(eng.read_chunk(&file, 0, 3).unwrap(), "aé");
}

#[test]
fn search_by_tag_reports_path_and_ancestors() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.xml", SCENARIO);

  let r = search(&engine(), &file, "b", SearchKind::Tag);
  assert!(r.found);
  assert_eq!(r.status, SearchStatus::Found);
  assert_eq!(r.path, "/root/b");
  assert_eq!(r.offset, 17);
  assert_eq!(r.end_offset, 47);
  assert_eq!(r.element_text, r#"<b guid="g1"><c name="x"/></b>"#);
  assert_eq!(r.context_before, r#"<root><a id="1"/>"#);
  assert_eq!(r.context_after, "</root>");
  assert_eq!(r.line_number, Some(1));
  assert_eq!(
    r.ancestors,
    vec![AncestorInfo {
      name: "root".into(),
      offset: 0,
      line_number: Some(1),
    }]
  );
}

#[test]
fn search_by_each_attribute_kind() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.xml", SCENARIO);
  let eng = engine();

  let by_name = search(&eng, &file, "X", SearchKind::Name);
  assert_eq!(by_name.path, "/root/b/c");
  assert_eq!(by_name.element_text, r#"<c name="x"/>"#);
  assert_eq!(by_name.depth(), 2);

  let by_guid = search(&eng, &file, "g1", SearchKind::Guid);
  assert_eq!(by_guid.path, "/root/b");

  let by_id = search(&eng, &file, "1", SearchKind::Id);
  assert_eq!(by_id.path, "/root/a");
  assert_eq!(by_id.offset, 6);

  // "g1" is a guid, not an id
  assert!(!search(&eng, &file, "g1", SearchKind::Id).found);

  let any = search(&eng, &file, "x", SearchKind::Any);
  assert_eq!(any.path, "/root/b/c");
}

#[test]
fn empty_query_and_bad_start_offset_are_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.xml", SCENARIO);
  let eng = engine();
  let token = CancellationToken::new();

  let empty = SearchRequest::new("", SearchKind::Any);
  assert!(matches!(eng.search(&file, &empty, &token), Err(CoreError::InvalidArg(_))));

  let mut past_end = SearchRequest::new("a", SearchKind::Tag);
  past_end.start_offset = SCENARIO.len() as u64 + 1;
  assert!(matches!(eng.search(&file, &past_end, &token), Err(CoreError::InvalidArg(_))));

  let missing = dir.path().join("missing.xml");
  let req = SearchRequest::new("a", SearchKind::Tag);
  assert!(matches!(eng.search(&missing, &req, &token), Err(CoreError::Io(_))));
}

#[test]
fn find_next_walks_forward_without_repeats() {
  let dir = tempfile::tempdir().unwrap();
  let mut doc = String::from("<root>\n");
  for i in 0..30 {
    doc.push_str(&format!("  <item id=\"{i}\"><inner/></item>\n"));
  }
  doc.push_str("</root>\n");
  let file = write_doc(dir.path(), "items.xml", &doc);

  let eng = engine();
  let token = CancellationToken::new();
  let mut req = SearchRequest::new("item", SearchKind::Tag);
  let mut offsets = Vec::new();
  loop {
    let r = eng.search(&file, &req, &token).unwrap();
    if !r.found {
      assert_eq!(r.status, SearchStatus::NotFound);
      break;
    }
    assert!(r.element_text.starts_with("<item"));
    assert!(r.element_text.ends_with("</item>"));
    offsets.push(r.offset);
    req = req.next_after(r.offset);
  }

  assert_eq!(offsets.len(), 30);
  assert!(offsets.windows(2).all(|w| w[0] < w[1]));
  let expected: Vec<u64> = doc.match_indices("<item ").map(|(i, _)| i as u64).collect();
  assert_eq!(offsets, expected);
}

#[test]
fn wrap_restarts_from_the_top() {
  let dir = tempfile::tempdir().unwrap();
  let doc = r#"<root><item id="1"/><item id="2"/><item id="3"/></root>"#;
  let file = write_doc(dir.path(), "a.xml", doc);
  let eng = engine();
  let token = CancellationToken::new();

  let mut req = SearchRequest::new("item", SearchKind::Tag);
  req.start_offset = 35;
  assert!(!eng.search(&file, &req, &token).unwrap().found);

  req.wrap = true;
  let r = eng.search(&file, &req, &token).unwrap();
  assert!(r.found);
  assert!(r.wrapped);
  assert_eq!(r.offset, 6);

  // a hit after start_offset is never flagged as wrapped
  req.start_offset = 7;
  let r = eng.search(&file, &req, &token).unwrap();
  assert_eq!(r.offset, 20);
  assert!(!r.wrapped);
}

#[test]
fn first_child_matches_search_for_its_tag() {
  let dir = tempfile::tempdir().unwrap();
  let doc = "<?xml version=\"1.0\"?>\n<!-- header -->\n<catalog>\n  <book id=\"b1\">\n    <title>T</title>\n  </book>\n  <book id=\"b2\"/>\n</catalog>\n";
  let file = write_doc(dir.path(), "a.xml", doc);
  let eng = engine();

  let first = eng.first_child(&file).unwrap();
  assert!(first.found);
  assert_eq!(first.path, "/catalog/book");
  assert_eq!(first.offset, doc.find("<book").unwrap() as u64);
  assert_eq!(first.line_number, Some(4));
  assert!(first.element_text.ends_with("</book>"));

  let searched = search(&eng, &file, "book", SearchKind::Tag);
  assert_eq!(searched.offset, first.offset);
}

#[test]
fn first_child_of_childless_root_is_not_found() {
  let dir = tempfile::tempdir().unwrap();
  let eng = engine();

  let empty_root = write_doc(dir.path(), "a.xml", "<root/>");
  assert!(!eng.first_child(&empty_root).unwrap().found);

  let no_children = write_doc(dir.path(), "b.xml", "<root>text only</root>");
  assert!(!eng.first_child(&no_children).unwrap().found);
}

#[test]
fn line_numbers_follow_newlines() {
  let dir = tempfile::tempdir().unwrap();
  let doc = "<?xml version=\"1.0\"?>\n<root>\n  <a id=\"1\"/>\n  <b>\n    <c name=\"x\"/>\n  </b>\n</root>\n";
  let file = write_doc(dir.path(), "a.xml", doc);

  let r = search(&engine(), &file, "c", SearchKind::Tag);
  assert_eq!(r.line_number, Some(5));
  let lines: Vec<Option<u64>> = r.ancestors.iter().map(|a| a.line_number).collect();
  assert_eq!(lines, vec![Some(2), Some(4)]);
  assert_eq!(r.ancestors[0].offset, doc.find("<root>").unwrap() as u64);
  assert_eq!(r.ancestors[1].offset, doc.find("<b>").unwrap() as u64);
}

#[test]
fn ancestors_precede_the_match() {
  let dir = tempfile::tempdir().unwrap();
  let doc = "<r><l1><l2><l3><target/></l3></l2></l1></r>";
  let file = write_doc(dir.path(), "a.xml", doc);

  let r = search(&engine(), &file, "target", SearchKind::Tag);
  assert_eq!(r.path, "/r/l1/l2/l3/target");
  assert_eq!(r.ancestors.len(), 4);
  assert!(r.ancestors.iter().all(|a| a.offset < r.offset));
  assert!(r.ancestors.windows(2).all(|w| w[0].offset < w[1].offset));
}

#[test]
fn malformed_documents_degrade_to_not_found() {
  let dir = tempfile::tempdir().unwrap();
  let eng = engine();

  let mismatched = write_doc(dir.path(), "a.xml", "<root><a></b><zzz/></root>");
  let r = search(&eng, &mismatched, "zzz", SearchKind::Tag);
  assert!(!r.found);
  assert_eq!(r.status, SearchStatus::NotFound);

  // the match never closes before end of file
  let unterminated = write_doc(dir.path(), "b.xml", "<root><a><b>");
  let r = search(&eng, &unterminated, "a", SearchKind::Tag);
  assert_eq!(r.status, SearchStatus::NotFound);
}

#[test]
fn large_elements_are_truncated() {
  let dir = tempfile::tempdir().unwrap();
  let doc = format!("<root><big>{}</big></root>", "x".repeat(500));
  let file = write_doc(dir.path(), "a.xml", &doc);

  let eng = CoreEngine::new(CoreOptions {
    max_element_bytes: 100,
    ..CoreOptions::default()
  })
  .unwrap();
  let r = search(&eng, &file, "big", SearchKind::Tag);
  assert!(r.found);
  assert!(r.element_truncated);
  assert_eq!(r.element_text.len(), 100);
  assert_eq!(r.end_offset, doc.find("</root>").unwrap() as u64);
}

#[test]
fn context_windows_are_clipped() {
  let dir = tempfile::tempdir().unwrap();
  let filler = "<pad/>".repeat(1000);
  let doc = format!("<root>{filler}<mid/>{filler}</root>");
  let file = write_doc(dir.path(), "a.xml", &doc);

  let r = search(&engine(), &file, "mid", SearchKind::Tag);
  assert_eq!(r.context_before.len(), 2000);
  assert_eq!(r.context_after.len(), 2000);
  assert!(r.context_before.ends_with("<pad/>"));
  assert!(r.context_after.starts_with("<pad/>"));
}

#[test]
fn options_load_from_partial_json() {
  let opts = CoreOptions::from_json(r#"{ "context_bytes": 16, "reverse_window_bytes": 4096 }"#).unwrap();
  assert_eq!(opts.context_bytes, 16);
  assert_eq!(opts.reverse_window_bytes, 4096);
  assert_eq!(opts.refine_scan_bytes, CoreOptions::default().refine_scan_bytes);

  assert!(matches!(CoreOptions::from_json("{ nope"), Err(CoreError::InvalidArg(_))));
  assert!(CoreEngine::new(CoreOptions {
    reverse_window_bytes: 0,
    ..CoreOptions::default()
  })
  .is_err());
}

#[test]
fn results_serialize_with_snake_case_fields() {
  let dir = tempfile::tempdir().unwrap();
  let file = write_doc(dir.path(), "a.xml", SCENARIO);

  let r = search(&engine(), &file, "c", SearchKind::Tag);
  let v = serde_json::to_value(&r).unwrap();
  assert_eq!(v["status"], "found");
  assert_eq!(v["path"], "/root/b/c");
  assert_eq!(v["ancestors"][1]["name"], "b");
  assert!(v.get("element_text").is_some());

  let req: SearchRequest = serde_json::from_str(r#"{ "query": "x", "kind": "name" }"#).unwrap();
  assert_eq!(req.kind, SearchKind::Name);
  assert_eq!(req.start_offset, 0);
  assert_eq!("GUID".parse::<SearchKind>().unwrap(), SearchKind::Guid);
}

#[test]
fn query_whitespace_is_matched_literally() {
  let dir = tempfile::tempdir().unwrap();
  let doc = r#"<root><q name="x"/><p name="big x"/></root>"#;
  let file = write_doc(dir.path(), "a.xml", doc);
  let eng = engine();

  let plain = search(&eng, &file, "x", SearchKind::Name);
  assert_eq!(plain.path, "/root/q");

  let spaced = search(&eng, &file, " x", SearchKind::Name);
  assert_eq!(spaced.path, "/root/p");
  assert_eq!(spaced.offset, doc.find("<p").unwrap() as u64);

  assert!(!search(&eng, &file, "x ", SearchKind::Name).found);
  assert!(search(&eng, &file, " ", SearchKind::Any).found);
}

#[test]
fn byte_order_mark_keeps_offsets_exact() {
  let dir = tempfile::tempdir().unwrap();
  let doc = "\u{FEFF}<root><a/><b/></root>";
  assert_eq!(&doc.as_bytes()[..3], b"\xEF\xBB\xBF");
  let file = write_doc(dir.path(), "bom.xml", doc);
  let eng = engine();

  let b = search(&eng, &file, "b", SearchKind::Tag);
  assert_eq!(b.offset, 13);
  assert_eq!(b.end_offset, 17);
  assert_eq!(b.element_text, "<b/>");
  assert_eq!(b.ancestors[0].offset, 3);

  let first = eng.first_child(&file).unwrap();
  assert_eq!(first.offset, 9);
  assert_eq!(first.element_text, "<a/>");

  let last = eng.last_child(&file).unwrap();
  assert_eq!(last.offset, 13);
  assert_eq!(last.ancestors[0].offset, 3);

  let root = eng.find_parent(&file, 13, 0).unwrap();
  assert_eq!(root.offset, 3);
  assert_eq!(root.element_text, "<root><a/><b/></root>");
  assert_eq!(eng.element_at(&file, 9).unwrap().element_text, "<a/>");
}
