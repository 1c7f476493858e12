//! Filter evaluator.
//!
//! Every node maps an input [`Value`] to an output value, dispatching on the
//! input's variant. A [`Value::Stream`] input makes most nodes apply
//! themselves once per streamed element; that is how `.[] | expr` fans out.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

use sift_value::{
    ByteStreamHandle, Context, IteratorHandle, LazyStream, Link, Resolver, Value, ValueError,
};
use tracing::{trace, warn};

use crate::error::{ApplyError, FilterError};
use crate::types::*;

/// Links that resolve to links are followed at most this many times.
const MAX_LINK_DEPTH: usize = 32;

/// Applies filter nodes to values under one evaluation context.
pub struct Evaluator<'a> {
    ctx: &'a Context,
    resolver: Option<&'a dyn Resolver>,
    lenient: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a Context, resolver: Option<&'a dyn Resolver>, lenient: bool) -> Self {
        Self { ctx, resolver, lenient }
    }

    /// Runs every pipeline stage of `program` against `input`.
    ///
    /// The result has all streams flattened into sequences. On failure the
    /// error carries the flattened output of the last completed stage, with
    /// every iterator and byte stream in it closed.
    pub fn run(&self, program: &Program, input: &Value) -> Result<Value, ApplyError> {
        let mut current = Cow::Borrowed(input);
        for (stage, node) in program.stages.iter().enumerate() {
            trace!(stage, "applying pipeline stage");
            match self.apply(node, &current) {
                Ok(next) => current = Cow::Owned(next),
                Err(error) => {
                    let partial = match current {
                        Cow::Borrowed(input) => {
                            close_handle(input);
                            None
                        }
                        Cow::Owned(value) => {
                            let partial = flatten(value);
                            release(&partial);
                            Some(partial)
                        }
                    };
                    return Err(ApplyError::new(error, partial));
                }
            }
        }
        Ok(flatten(current.into_owned()))
    }

    /// Applies one node to one input.
    pub fn apply(&self, node: &FilterNode, input: &Value) -> Result<Value, FilterError> {
        self.ctx.check()?;
        match (node, input) {
            (FilterNode::Identity, _) => Ok(input.clone()),
            (FilterNode::Chain(steps) | FilterNode::Pipeline(steps), _) => {
                self.thread(steps, input)
            }
            (FilterNode::IterateAll, _) => self.iterate_all(input),
            (_, Value::Stream(stream)) => {
                let mut produced = Vec::new();
                stream
                    .map_each(|item| -> Result<Value, FilterError> {
                        let value = self.apply(node, &item)?;
                        produced.push(value.clone());
                        Ok(value)
                    })
                    .map(Value::Sequence)
                    .map_err(|error| {
                        produced.iter().for_each(release);
                        error
                    })
            }
            (FilterNode::StringLiteral(text), _) => Ok(Value::Text(text.clone())),
            (FilterNode::NumericLiteral(n), _) => Ok(Value::Float(*n)),
            (FilterNode::Length, _) => self.length(input),
            (FilterNode::Key(name), _) => self.select_key(node, name, input),
            (FilterNode::Index(index), _) => self.select_index(*index, input),
            (FilterNode::Range(range), _) => self.select_range(range, input),
            (FilterNode::Binary { left, op, right }, _) => self.binary(left, *op, right, input),
            (FilterNode::Array(items), _) => {
                collect_each(items, |item| self.apply(item, input)).map(Value::Sequence)
            }
            (FilterNode::Object(entries), _) => {
                let values = collect_each(entries, |(_, item)| self.apply(item, input))?;
                let out: BTreeMap<String, Value> =
                    entries.iter().map(|(key, _)| key.clone()).zip(values).collect();
                Ok(Value::Mapping(out))
            }
        }
    }

    /// Feeds each step the previous step's output.
    fn thread(&self, steps: &[FilterNode], input: &Value) -> Result<Value, FilterError> {
        let mut current = Cow::Borrowed(input);
        for step in steps {
            current = Cow::Owned(self.apply(step, &current)?);
        }
        Ok(current.into_owned())
    }

    fn iterate_all(&self, input: &Value) -> Result<Value, FilterError> {
        if let Value::Stream(stream) = input {
            return Ok(Value::Stream(LazyStream::wrap(stream.clone())));
        }
        Ok(match self.resolve(input)?.into_owned() {
            Value::Iterator(it) => Value::Iterator(it),
            Value::Array(array) => Value::Iterator(IteratorHandle::from_boxed(array.iterate())),
            Value::Sequence(items) => Value::Stream(LazyStream::from_values(items)),
            other => Value::Stream(LazyStream::single(other)),
        })
    }

    fn select_key(&self, node: &FilterNode, name: &str, input: &Value) -> Result<Value, FilterError> {
        let input = self.resolve(input)?;
        match input.as_ref() {
            Value::Map(map) => Ok(map.value_for_key(&Value::Text(name.to_string()))?),
            Value::Mapping(entries) => Ok(entries.get(name).cloned().unwrap_or_default()),
            Value::Dict(entries) => Ok(entries
                .iter()
                .find(|(key, _)| matches!(key, Value::Text(k) if k == name))
                .map(|(_, value)| value.clone())
                .unwrap_or_default()),
            // broadcast over the elements
            Value::Sequence(items) => {
                collect_each(items, |item| self.apply(node, item)).map(Value::Sequence)
            }
            Value::Iterator(_) | Value::Array(_) | Value::Bytestream(_) => {
                Err(reject("key selector", &input))
            }
            other => self.lenient_null("key selector", other),
        }
    }

    fn select_index(&self, index: i64, input: &Value) -> Result<Value, FilterError> {
        let input = self.resolve(input)?;
        match input.as_ref() {
            Value::Iterator(it) => self.nth(it, index),
            Value::Array(array) => self.nth(&IteratorHandle::from_boxed(array.iterate()), index),
            Value::Sequence(items) => Ok(items[position(index, items.len())?].clone()),
            Value::Text(text) => {
                let chars: Vec<char> = text.chars().collect();
                Ok(Value::Text(chars[position(index, chars.len())?].to_string()))
            }
            Value::Bytes(bytes) => Ok(Value::Byte(bytes[position(index, bytes.len())?])),
            Value::Bytestream(_) => Err(reject("index selector", &input)),
            other => self.lenient_null("index selector", other),
        }
    }

    /// Linear scan to `index`. The iterator is closed either way.
    fn nth(&self, it: &IteratorHandle, index: i64) -> Result<Value, FilterError> {
        let result = self.scan_to(it, index);
        let closed = it.close();
        finish(result, closed, "iterator")
    }

    fn scan_to(&self, it: &IteratorHandle, index: i64) -> Result<Value, FilterError> {
        let target = usize::try_from(index).map_err(|_| FilterError::NegativeOnOneShot {
            index,
            category: "iterator",
        })?;
        let mut seen = 0;
        while it.next() {
            if seen == target {
                return Ok(it.current()?);
            }
            seen += 1;
            self.ctx.check()?;
        }
        Err(FilterError::Index { index, len: seen })
    }

    fn select_range(&self, range: &RangeSelector, input: &Value) -> Result<Value, FilterError> {
        if range.is_all() {
            return Ok(input.clone());
        }
        let input = self.resolve(input)?;
        match input.as_ref() {
            Value::Iterator(it) => self.collect_range(it, range),
            Value::Array(array) => {
                self.collect_range(&IteratorHandle::from_boxed(array.iterate()), range)
            }
            Value::Bytestream(stream) => read_range(stream, range),
            Value::Sequence(items) => {
                let (start, stop) = clamp(range, items.len());
                Ok(Value::Sequence(items[start..stop].to_vec()))
            }
            Value::Text(text) => {
                let chars: Vec<char> = text.chars().collect();
                let (start, stop) = clamp(range, chars.len());
                Ok(Value::Text(chars[start..stop].iter().collect()))
            }
            Value::Bytes(bytes) => {
                let (start, stop) = clamp(range, bytes.len());
                Ok(Value::Bytes(bytes[start..stop].to_vec()))
            }
            other => self.lenient_null("range selector", other),
        }
    }

    /// Collects positions `[start, stop)` then closes the iterator.
    fn collect_range(&self, it: &IteratorHandle, range: &RangeSelector) -> Result<Value, FilterError> {
        let result = one_shot_bounds(range, "iterator").and_then(|(start, stop)| {
            let mut out = Vec::new();
            let mut pos = 0;
            while stop.map_or(true, |stop| pos < stop) && it.next() {
                if pos >= start {
                    out.push(it.current()?);
                }
                pos += 1;
                self.ctx.check()?;
            }
            Ok(Value::Sequence(out))
        });
        let closed = it.close();
        finish(result, closed, "iterator")
    }

    fn length(&self, input: &Value) -> Result<Value, FilterError> {
        let input = self.resolve(input)?;
        let len = match input.as_ref() {
            Value::Text(text) => text.chars().count(),
            Value::Bytes(bytes) => bytes.len(),
            Value::Sequence(items) => items.len(),
            Value::Mapping(entries) => entries.len(),
            Value::Dict(entries) => entries.len(),
            Value::Iterator(it) => self.count(it)?,
            Value::Array(array) => self.count(&IteratorHandle::from_boxed(array.iterate()))?,
            Value::Map(map) => self.count(&IteratorHandle::from_boxed(map.iterate()))?,
            Value::Bytestream(_) => return Err(reject("length", &input)),
            other => return self.lenient_null("length", other),
        };
        Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
    }

    /// Consumes the iterator counting advances, then closes it.
    fn count(&self, it: &IteratorHandle) -> Result<usize, FilterError> {
        let mut n = 0;
        let mut result: Result<(), FilterError> = Ok(());
        while it.next() {
            n += 1;
            if let Err(e) = self.ctx.check() {
                result = Err(e.into());
                break;
            }
        }
        let closed = it.close();
        finish(result.map(|()| n), closed, "iterator")
    }

    fn binary(
        &self,
        left: &FilterNode,
        op: BinaryOperator,
        right: &FilterNode,
        input: &Value,
    ) -> Result<Value, FilterError> {
        let left = self.apply(left, input)?;
        let right = match self.apply(right, input) {
            Ok(right) => right,
            Err(error) => {
                release(&left);
                return Err(error);
            }
        };
        let result = self.arithmetic(&left, op, &right);
        if result.is_err() {
            release(&left);
            release(&right);
        }
        result
    }

    fn arithmetic(&self, left: &Value, op: BinaryOperator, right: &Value) -> Result<Value, FilterError> {
        let left = self.resolve(left)?;
        let right = self.resolve(right).map_err(|error| {
            release(&left);
            error
        })?;
        match (op, left.as_f64(), right.as_f64()) {
            (BinaryOperator::Multiply, Some(a), Some(b)) => Ok(Value::Float(a * b)),
            (BinaryOperator::Add, Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => {
                release(&left);
                release(&right);
                Err(FilterError::UnsupportedBinary {
                    left: left.type_name(),
                    op,
                    right: right.type_name(),
                })
            }
        }
    }

    /// Follows links until a non-link value is reached.
    fn resolve<'v>(&self, value: &'v Value) -> Result<Cow<'v, Value>, FilterError> {
        let Value::Link(link) = value else {
            return Ok(Cow::Borrowed(value));
        };
        let mut current = self.resolve_link(link)?;
        for _ in 1..MAX_LINK_DEPTH {
            match current {
                Value::Link(next) => current = self.resolve_link(&next)?,
                other => return Ok(Cow::Owned(other)),
            }
        }
        match current {
            Value::Link(last) => Err(FilterError::LinkCycle { path: last.path() }),
            other => Ok(Cow::Owned(other)),
        }
    }

    fn resolve_link(&self, link: &Link) -> Result<Value, FilterError> {
        if let Some(value) = link.cached() {
            return Ok(value);
        }
        let path = link.path();
        let resolver = self
            .resolver
            .ok_or_else(|| FilterError::NoResolver { path: path.clone() })?;

        self.ctx.check()?;
        trace!(path = %path, "resolving link");
        let value = resolver
            .get(self.ctx, &path)
            .map_err(|source| FilterError::Resolution { path: path.clone(), source })?;
        self.ctx.check()?;

        match link.resolved(value.clone()) {
            // another holder of the link got there first
            Ok(()) | Err(ValueError::AlreadyResolved(_)) => Ok(value),
            Err(e) => Err(e.into()),
        }
    }

    fn lenient_null(&self, op: &'static str, input: &Value) -> Result<Value, FilterError> {
        if self.lenient {
            Ok(Value::Null)
        } else {
            Err(type_error(op, input))
        }
    }
}

/// Replaces every stream, at any depth, with the sequence of its elements.
pub fn flatten(value: Value) -> Value {
    match value {
        Value::Stream(stream) => {
            match stream.map_each(|item| Ok::<_, Infallible>(flatten(item))) {
                Ok(items) => Value::Sequence(items),
                Err(never) => match never {},
            }
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(flatten).collect()),
        Value::Mapping(entries) => {
            Value::Mapping(entries.into_iter().map(|(k, v)| (k, flatten(v))).collect())
        }
        Value::Dict(entries) => {
            Value::Dict(entries.into_iter().map(|(k, v)| (k, flatten(v))).collect())
        }
        other => other,
    }
}

fn type_error(op: &'static str, input: &Value) -> FilterError {
    FilterError::Type { op, category: input.type_name() }
}

/// The type error for `op` on `input`, after closing the handle `input` holds.
fn reject(op: &'static str, input: &Value) -> FilterError {
    close_handle(input);
    type_error(op, input)
}

/// Closes `value` if it is an iterator or byte stream. Failures are logged.
fn close_handle(value: &Value) {
    let closed = match value {
        Value::Iterator(it) => it.close().map_err(FilterError::from),
        Value::Bytestream(stream) => stream.close().map_err(FilterError::from),
        _ => Ok(()),
    };
    if let Err(error) = closed {
        warn!(resource = value.type_name(), %error, "close failed while discarding value");
    }
}

/// Closes every iterator and byte stream reachable from `value`. Streams are
/// drained to reach their elements.
fn release(value: &Value) {
    match value {
        Value::Stream(stream) => {
            while let Some(item) = stream.pull() {
                release(&item);
            }
        }
        Value::Sequence(items) => items.iter().for_each(release),
        Value::Mapping(entries) => entries.values().for_each(release),
        Value::Dict(entries) => {
            for (key, value) in entries {
                release(key);
                release(value);
            }
        }
        other => close_handle(other),
    }
}

/// Collects `f` over `items`, stopping at the first error. The values
/// produced before the error are released.
fn collect_each<T>(
    items: impl IntoIterator<Item = T>,
    mut f: impl FnMut(T) -> Result<Value, FilterError>,
) -> Result<Vec<Value>, FilterError> {
    let mut out = Vec::new();
    for item in items {
        match f(item) {
            Ok(value) => out.push(value),
            Err(error) => {
                out.iter().for_each(release);
                return Err(error);
            }
        }
    }
    Ok(out)
}

/// Combines a result with the outcome of closing the resource it came from.
///
/// A close failure after an error is logged and the original error wins.
fn finish<T, E>(result: Result<T, FilterError>, closed: Result<(), E>, resource: &str) -> Result<T, FilterError>
where
    E: Into<FilterError> + fmt::Display,
{
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(resource, error = %close_err, "close failed after evaluation error");
            Err(e)
        }
    }
}

/// Resolves a possibly negative index against `len`.
fn position(index: i64, len: usize) -> Result<usize, FilterError> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { len_i + index } else { index };
    if (0..len_i).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(FilterError::Index { index, len })
    }
}

/// Clamped slice bounds. Negative bounds count from the end.
fn clamp(range: &RangeSelector, len: usize) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let bound = |b: i64| {
        let b = if b < 0 { len_i + b } else { b };
        b.clamp(0, len_i) as usize
    };
    let start = range.start.map_or(0, bound);
    let stop = range.stop.map_or(len, bound);
    (start.min(stop), stop)
}

/// Bounds for a source whose length is unknown up front.
fn one_shot_bounds(
    range: &RangeSelector,
    category: &'static str,
) -> Result<(usize, Option<usize>), FilterError> {
    let check = |b: i64| {
        usize::try_from(b).map_err(|_| FilterError::NegativeOnOneShot { index: b, category })
    };
    let start = range.start.map(check).transpose()?.unwrap_or(0);
    let stop = range.stop.map(check).transpose()?;
    Ok((start, stop))
}

/// Reads bytes `[start, stop)` and closes the stream. The skipped prefix and
/// the unread remainder are gone afterwards.
fn read_range(stream: &ByteStreamHandle, range: &RangeSelector) -> Result<Value, FilterError> {
    let result = one_shot_bounds(range, "bytestream").and_then(|(start, stop)| {
        let skipped = stream.read_up_to(start)?;
        if skipped.len() < start {
            return Ok(Value::Bytes(Vec::new()));
        }
        let bytes = match stop {
            Some(stop) => stream.read_up_to(stop.saturating_sub(start))?,
            None => stream.read_to_end()?,
        };
        Ok(Value::Bytes(bytes))
    });
    let closed = stream.close();
    finish(result, closed, "bytestream")
}

impl fmt::Debug for Evaluator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("has_resolver", &self.resolver.is_some())
            .field("lenient", &self.lenient)
            .finish()
    }
}
