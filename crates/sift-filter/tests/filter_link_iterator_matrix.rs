use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sift_filter::{apply, Filter, FilterError, FilterOptions};
use sift_value::{
    ArrayValue, ByteSource, ByteStreamHandle, CancelHandle, Context, ContextError,
    IteratorHandle, Link, MapValue, ResolveError, Resolver, SliceIterator, Value, ValueError,
    ValueIterator,
};

// ── Fixtures ──────────────────────────────────────────────────────────────

/// Serves JSON documents by path and counts fetches.
struct Store {
    docs: HashMap<String, serde_json::Value>,
    fetches: AtomicUsize,
}

impl Store {
    fn new(docs: &[(&str, serde_json::Value)]) -> Arc<Self> {
        Arc::new(Self {
            docs: docs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            fetches: AtomicUsize::new(0),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Resolver for Store {
    fn get(&self, ctx: &Context, path: &str) -> Result<Value, ResolveError> {
        ctx.check()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.docs.get(path) {
            Some(doc) => Ok(Value::from(doc.clone())),
            None => Err(format!("not found: {path}").into()),
        }
    }
}

fn with_store(store: &Arc<Store>) -> FilterOptions {
    FilterOptions::default().with_resolver(store.clone())
}

/// Counts close calls on the iterators it hands out.
struct Tracked {
    inner: SliceIterator,
    closes: Arc<AtomicUsize>,
}

impl ValueIterator for Tracked {
    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn scan(&self, dest: &mut Value) -> Result<(), ValueError> {
        self.inner.scan(dest)
    }

    fn key(&self) -> Value {
        self.inner.key()
    }

    fn close(&mut self) -> Result<(), ValueError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

fn tracked(values: Vec<Value>) -> (IteratorHandle, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let it = IteratorHandle::new(Tracked { inner: SliceIterator::new(values), closes: closes.clone() });
    (it, closes)
}

/// An iterator whose close always fails.
struct BadClose(SliceIterator);

impl ValueIterator for BadClose {
    fn next(&mut self) -> bool {
        self.0.next()
    }

    fn scan(&self, dest: &mut Value) -> Result<(), ValueError> {
        self.0.scan(dest)
    }

    fn key(&self) -> Value {
        self.0.key()
    }

    fn close(&mut self) -> Result<(), ValueError> {
        Err(ValueError::Other("close failed".into()))
    }

    fn is_ordered(&self) -> bool {
        true
    }
}

/// Upper-cases keys on lookup; iterates its fixed keys.
#[derive(Debug)]
struct Shouting {
    keys: Vec<&'static str>,
}

impl MapValue for Shouting {
    fn value_for_key(&self, key: &Value) -> Result<Value, ValueError> {
        match key {
            Value::Text(k) if self.keys.contains(&k.as_str()) => Ok(Value::Text(k.to_uppercase())),
            Value::Text(_) => Ok(Value::Null),
            other => Err(ValueError::NonTextKey(other.type_name())),
        }
    }

    fn iterate(&self) -> Box<dyn ValueIterator> {
        Box::new(SliceIterator::new(self.keys.iter().map(|k| Value::from(*k)).collect()))
    }
}

#[derive(Debug)]
struct Squares(i64);

impl ArrayValue for Squares {
    fn iterate(&self) -> Box<dyn ValueIterator> {
        Box::new(SliceIterator::new((0..self.0).map(|n| Value::Int(n * n)).collect()))
    }
}

/// Hands out close-counting iterators over fixed values.
#[derive(Debug)]
struct TrackedArray {
    values: Vec<Value>,
    closes: Arc<AtomicUsize>,
}

impl TrackedArray {
    fn value(values: Vec<Value>) -> (Value, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let array = TrackedArray { values, closes: closes.clone() };
        (Value::Array(Arc::new(array)), closes)
    }
}

impl ArrayValue for TrackedArray {
    fn iterate(&self) -> Box<dyn ValueIterator> {
        Box::new(Tracked { inner: SliceIterator::new(self.values.clone()), closes: self.closes.clone() })
    }
}

struct CountingSource {
    inner: Cursor<Vec<u8>>,
    closes: Arc<AtomicUsize>,
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl ByteSource for CountingSource {
    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn bytestream(bytes: &[u8]) -> (ByteStreamHandle, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let source = CountingSource { inner: Cursor::new(bytes.to_vec()), closes: closes.clone() };
    (ByteStreamHandle::new(source), closes)
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
    }
}

// ── Links ─────────────────────────────────────────────────────────────────

#[test]
fn link_resolution_matrix() {
    let store = Store::new(&[
        ("/users/1", json!({"name": "ada", "tags": ["x", "y", "z"]})),
        ("/greeting", json!("hello")),
    ]);
    let ctx = Context::background();
    let doc = Value::Mapping(
        [
            ("user".to_string(), Value::Link(Link::new("/users/1"))),
            ("greeting".to_string(), Value::Link(Link::new("/greeting"))),
        ]
        .into_iter()
        .collect(),
    );

    let cases = [
        (".user.name", Value::from("ada")),
        (".user.tags[1]", Value::from("y")),
        (".user.tags[1:]", Value::from(json!(["y", "z"]))),
        (".greeting | length", Value::Int(5)),
        (".greeting[0]", Value::from("h")),
    ];
    for (src, expected) in cases {
        let filter = Filter::new(src, with_store(&store)).unwrap();
        assert_eq!(filter.apply(&ctx, &doc).unwrap(), expected, "filter: {src}");
    }
    // both links were fetched once and then served from their caches
    assert_eq!(store.fetches(), 2);
}

#[test]
fn link_inside_iteration_is_resolved_per_element() {
    let store = Store::new(&[("/a", json!({"v": 1})), ("/b", json!({"v": 2}))]);
    let doc = Value::Sequence(vec![Value::Link(Link::new("/a")), Value::Link(Link::new("/b"))]);
    let filter = Filter::new(".[] | .v", with_store(&store)).unwrap();
    let out = filter.apply(&Context::background(), &doc).unwrap();
    assert_eq!(out, Value::from(json!([1, 2])));
}

#[test]
fn link_as_whole_source() {
    let store = Store::new(&[("/list", json!([3, 4, 5]))]);
    let doc = Value::Link(Link::new("/list"));
    let filter = Filter::new(".[] | . * 2", with_store(&store)).unwrap();
    let out = filter.apply(&Context::background(), &doc).unwrap();
    assert_eq!(out, Value::from(json!([6.0, 8.0, 10.0])));
}

#[test]
fn link_operand_in_binary() {
    let store = Store::new(&[("/n", json!(4))]);
    let doc = Value::Mapping([("n".to_string(), Value::Link(Link::new("/n")))].into_iter().collect());
    let filter = Filter::new(".n * .n", with_store(&store)).unwrap();
    assert_eq!(filter.apply(&Context::background(), &doc).unwrap(), Value::Float(16.0));
}

#[test]
fn link_cached_value_needs_no_resolver() {
    let link = Link::new("/preloaded");
    link.resolved(Value::from(json!({"k": "v"}))).unwrap();
    let out = apply(".k", None, &Value::Link(link)).unwrap();
    assert_eq!(out, Value::from("v"));
}

#[test]
fn link_resolution_errors_propagate_verbatim() {
    let store = Store::new(&[]);
    let filter = Filter::new(".x", with_store(&store)).unwrap();
    let err = filter.apply(&Context::background(), &Value::Link(Link::new("/missing"))).unwrap_err();
    match err.error {
        FilterError::Resolution { path, source } => {
            assert_eq!(path, "/missing");
            assert_eq!(source.to_string(), "not found: /missing");
        }
        other => panic!("expected resolution error, got {other:?}"),
    }
}

#[test]
fn link_without_resolver_is_an_error() {
    let err = apply(".x", None, &Value::Link(Link::new("/nowhere"))).unwrap_err();
    assert!(matches!(err.error, FilterError::NoResolver { .. }));
}

#[test]
fn unresolved_link_in_output_is_kept_as_is() {
    let link = Link::new("/lazy");
    let out = apply(".", None, &Value::Link(link.clone())).unwrap();
    assert_eq!(out, Value::Link(link.clone()));
    assert!(!link.is_resolved());
    assert!(out.to_json().is_err());
}

// ── Cancellation ──────────────────────────────────────────────────────────

#[test]
fn cancelled_context_aborts_before_resolving() {
    let store = Store::new(&[("/a", json!(1))]);
    let cancel = CancelHandle::new();
    let ctx = Context::with_cancel(cancel.clone());
    cancel.cancel();

    let filter = Filter::new(".", with_store(&store)).unwrap();
    let err = filter.apply(&ctx, &Value::Link(Link::new("/a"))).unwrap_err();
    assert!(matches!(err.error, FilterError::Context(ContextError::Cancelled)));
    assert_eq!(store.fetches(), 0);
}

#[test]
fn cancellation_from_inside_a_resolver_stops_the_rest() {
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let resolver = move |_ctx: &Context, _path: &str| -> Result<Value, ResolveError> {
        seen.fetch_add(1, Ordering::SeqCst);
        trigger.cancel();
        Ok(Value::Int(1))
    };
    let options = FilterOptions::default().with_resolver(Arc::new(resolver));
    let doc = Value::Sequence(vec![Value::Link(Link::new("/a")), Value::Link(Link::new("/b"))]);

    let filter = Filter::new(".[] | length", options).unwrap();
    let err = filter.apply(&Context::with_cancel(cancel), &doc).unwrap_err();
    assert!(matches!(err.error, FilterError::Context(ContextError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn expired_deadline_is_reported() {
    let ctx = Context::background().with_timeout(Duration::ZERO);
    let filter = Filter::compile(".a").unwrap();
    let err = filter.apply(&ctx, &Value::Null).unwrap_err();
    assert!(matches!(err.error, FilterError::Context(ContextError::DeadlineExceeded)));
}

// ── Iterators and capabilities ────────────────────────────────────────────

#[test]
fn iterator_matrix() {
    let ints = || (10..15).map(Value::Int).collect::<Vec<_>>();
    let cases = [
        (".[0]", Value::Int(10)),
        (".[4]", Value::Int(14)),
        (".[1:3]", Value::from(json!([11, 12]))),
        (".[3:]", Value::from(json!([13, 14]))),
        (".[:2]", Value::from(json!([10, 11]))),
        (".[2:2]", Value::from(json!([]))),
        ("length", Value::Int(5)),
        (".[] | length", Value::Int(5)),
    ];
    for (src, expected) in cases {
        let (it, closes) = tracked(ints());
        let out = apply(src, None, &Value::Iterator(it.clone())).unwrap();
        assert_eq!(out, expected, "filter: {src}");
        assert_eq!(closes.load(Ordering::SeqCst), 1, "{src} should close the iterator once");
        assert!(!it.next());
    }
}

#[test]
fn iterator_errors_still_close() {
    let cases: [(&str, fn(&FilterError) -> bool); 4] = [
        (".[9]", |e| matches!(e, FilterError::Index { index: 9, len: 5 })),
        (".[-1]", |e| matches!(e, FilterError::NegativeOnOneShot { index: -1, .. })),
        (".[-2:]", |e| matches!(e, FilterError::NegativeOnOneShot { index: -2, .. })),
        (".[:-1]", |e| matches!(e, FilterError::NegativeOnOneShot { index: -1, .. })),
    ];
    for (src, check) in cases {
        let (it, closes) = tracked((0..5).map(Value::Int).collect());
        let err = apply(src, None, &Value::Iterator(it)).unwrap_err();
        assert!(check(&err.error), "{src}: {:?}", err.error);
        assert_eq!(closes.load(Ordering::SeqCst), 1, "{src} should close the iterator once");
    }
}

#[test]
fn iterator_key_selection_is_a_type_error() {
    let (it, closes) = tracked(vec![Value::Int(1)]);
    let err = apply(".a", None, &Value::Iterator(it.clone())).unwrap_err();
    assert!(matches!(err.error, FilterError::Type { category: "iterator", .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(it.is_closed());
}

#[test]
fn iterator_from_array_capability_closed_when_later_stage_fails() {
    let (array, closes) = TrackedArray::value(vec![Value::Int(1), Value::Int(2)]);
    let err = apply(".[] | .a", None, &array).unwrap_err();
    assert!(matches!(err.error, FilterError::Type { op: "key selector", category: "iterator" }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn iterator_closed_when_array_construction_fails() {
    let (array, closes) = TrackedArray::value(vec![Value::Int(1)]);
    let err = apply("[.[], 1 * x]", None, &array).unwrap_err();
    assert!(matches!(err.error, FilterError::UnsupportedBinary { .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn iterator_operand_closed_by_failed_arithmetic() {
    let (it, closes) = tracked(vec![Value::Int(1)]);
    let err = apply(". * 2", None, &Value::Iterator(it)).unwrap_err();
    assert!(matches!(err.error, FilterError::UnsupportedBinary { left: "iterator", .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn unconsumed_stream_elements_closed_on_failure() {
    let (first, first_closes) = tracked(vec![Value::Int(1)]);
    let (second, second_closes) = tracked(vec![Value::Int(2)]);
    let input = Value::Sequence(vec![Value::Iterator(first), Value::Iterator(second.clone())]);

    let err = apply(".[] | .x", None, &input).unwrap_err();
    assert!(matches!(err.error, FilterError::Type { category: "iterator", .. }));
    assert_eq!(first_closes.load(Ordering::SeqCst), 1);
    assert_eq!(second_closes.load(Ordering::SeqCst), 1);
    assert_eq!(err.partial, Some(Value::Sequence(vec![Value::Iterator(second)])));
}

#[test]
fn iterator_close_failure_surfaces_on_success() {
    let it = IteratorHandle::new(BadClose(SliceIterator::new(vec![Value::Int(1)])));
    let err = apply(".[0]", None, &Value::Iterator(it)).unwrap_err();
    assert!(matches!(err.error, FilterError::Value(ValueError::Other(_))));
}

#[test]
fn iterator_close_failure_after_error_keeps_original() {
    let it = IteratorHandle::new(BadClose(SliceIterator::new(vec![Value::Int(1)])));
    let err = apply(".[3]", None, &Value::Iterator(it)).unwrap_err();
    assert!(matches!(err.error, FilterError::Index { index: 3, len: 1 }));
}

#[test]
fn closed_iterator_yields_nothing() {
    let (it, _) = tracked(vec![Value::Int(1), Value::Int(2)]);
    it.close().unwrap();
    assert_eq!(apply("length", None, &Value::Iterator(it.clone())).unwrap(), Value::Int(0));
    assert_eq!(apply(".[0:]", None, &Value::Iterator(it)).unwrap(), Value::from(json!([])));
}

#[test]
fn map_capability_matrix() {
    let map = Value::Map(Arc::new(Shouting { keys: vec!["a", "b", "c"] }));
    assert_eq!(apply(".a", None, &map).unwrap(), Value::from("A"));
    assert_eq!(apply(".zzz", None, &map).unwrap(), Value::Null);
    assert_eq!(apply("length", None, &map).unwrap(), Value::Int(3));
    assert_eq!(apply("{x: .b, y: .c}", None, &map).unwrap(), Value::from(json!({"x": "B", "y": "C"})));
    // a map has no positions, so indexing it is lenient null
    assert_eq!(apply(".[0]", None, &map).unwrap(), Value::Null);
}

#[test]
fn array_capability_matrix() {
    let squares = Value::Array(Arc::new(Squares(5)));
    assert_eq!(apply(".[3]", None, &squares).unwrap(), Value::Int(9));
    assert_eq!(apply(".[1:3]", None, &squares).unwrap(), Value::from(json!([1, 4])));
    assert_eq!(apply("length", None, &squares).unwrap(), Value::Int(5));
    assert_eq!(apply(".[] | length", None, &squares).unwrap(), Value::Int(5));
    // the capability hands out a fresh iterator each time
    assert_eq!(apply("[.[0], .[4]]", None, &squares).unwrap(), Value::from(json!([0, 16])));
}

// ── Byte streams ──────────────────────────────────────────────────────────

#[test]
fn bytestream_range_matrix() {
    let cases = [
        (".[0:3]", b"abc".to_vec()),
        (".[2:5]", b"cde".to_vec()),
        (".[4:]", b"efgh".to_vec()),
        (".[:2]", b"ab".to_vec()),
        (".[6:100]", b"gh".to_vec()),
        (".[20:30]", Vec::new()),
    ];
    for (src, expected) in cases {
        let (stream, closes) = bytestream(b"abcdefgh");
        let out = apply(src, None, &Value::Bytestream(stream.clone())).unwrap();
        assert_eq!(out, Value::Bytes(expected), "filter: {src}");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(stream.is_closed());
    }
}

#[test]
fn bytestream_rejections() {
    let (stream, closes) = bytestream(b"abc");
    let err = apply(".[-1:]", None, &Value::Bytestream(stream)).unwrap_err();
    assert!(matches!(err.error, FilterError::NegativeOnOneShot { category: "bytestream", .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    for src in [".a", ".[0]", "length"] {
        let (stream, closes) = bytestream(b"abc");
        let err = apply(src, None, &Value::Bytestream(stream.clone())).unwrap_err();
        assert!(matches!(err.error, FilterError::Type { category: "bytestream", .. }), "{src}");
        assert_eq!(closes.load(Ordering::SeqCst), 1, "{src}");
        assert!(stream.is_closed(), "{src}");
    }
}

#[test]
fn bytestream_read_failure_is_stream_io() {
    let stream = ByteStreamHandle::from_reader(FailingReader);
    let err = apply(".[0:2]", None, &Value::Bytestream(stream.clone())).unwrap_err();
    match err.error {
        FilterError::StreamIo(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected stream io error, got {other:?}"),
    }
    assert!(stream.is_closed());
}
