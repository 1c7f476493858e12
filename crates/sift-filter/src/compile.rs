//! Compiled filters and the parse cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use sift_value::{Context, Resolver, Value};
use tracing::debug;

use crate::error::{ApplyError, FilterError};
use crate::eval::Evaluator;
use crate::parser::FilterParser;
use crate::types::Program;

/// Default number of parsed programs kept by [`FilterCache::global`].
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Options for [`Filter`].
#[derive(Clone)]
pub struct FilterOptions {
    /// Fetches the targets of links met during evaluation.
    pub resolver: Option<Arc<dyn Resolver>>,
    /// Per-application time limit, on top of any deadline the caller's
    /// context already carries.
    pub timeout: Option<Duration>,
    /// When set, selectors and `length` on an unsupported scalar yield null
    /// instead of a type error.
    pub lenient: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self { resolver: None, timeout: None, lenient: true }
    }
}

impl FilterOptions {
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Type errors instead of lenient nulls.
    pub fn strict(mut self) -> Self {
        self.lenient = false;
        self
    }
}

impl fmt::Debug for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("resolver", &self.resolver.as_ref().map(|_| "<resolver>"))
            .field("timeout", &self.timeout)
            .field("lenient", &self.lenient)
            .finish()
    }
}

/// A parsed filter, ready to be applied to any number of values.
///
/// Applications are independent of each other: a `Filter` holds no state
/// that one application could leave behind for the next.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    program: Arc<Program>,
    options: FilterOptions,
}

impl Filter {
    /// Parses `source` through the process-wide cache.
    pub fn new(source: &str, options: FilterOptions) -> Result<Self, FilterError> {
        let program = FilterCache::global().get_or_parse(source)?;
        Ok(Self { source: source.to_string(), program, options })
    }

    /// Parses `source` with default options.
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        Self::new(source, FilterOptions::default())
    }

    /// Wraps an already parsed program.
    pub fn from_program(source: impl Into<String>, program: Program, options: FilterOptions) -> Self {
        Self { source: source.into(), program: Arc::new(program), options }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Applies the filter to `source`.
    ///
    /// `ctx` carries cancellation and deadline; the configured timeout, if
    /// any, is layered on top of it. Streams never escape: the result holds
    /// only concrete values.
    pub fn apply(&self, ctx: &Context, source: &Value) -> Result<Value, ApplyError> {
        let ctx = match self.options.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };
        let evaluator = Evaluator::new(&ctx, self.options.resolver.as_deref(), self.options.lenient);
        evaluator.run(&self.program, source)
    }
}

/// Thread-safe cache of parsed programs, keyed by filter source.
///
/// When full, the cache is cleared before the next insert.
pub struct FilterCache {
    programs: Mutex<HashMap<String, Arc<Program>>>,
    capacity: usize,
}

impl FilterCache {
    pub fn new(capacity: usize) -> Self {
        Self { programs: Mutex::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// The cache behind [`Filter::new`].
    pub fn global() -> &'static FilterCache {
        static CACHE: OnceLock<FilterCache> = OnceLock::new();
        CACHE.get_or_init(|| FilterCache::new(DEFAULT_CACHE_CAPACITY))
    }

    /// Returns the cached program for `source`, parsing it on a miss.
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&self, source: &str) -> Result<Arc<Program>, FilterError> {
        if let Some(program) = self.lock().get(source) {
            debug!(filter = source, "filter cache hit");
            return Ok(Arc::clone(program));
        }

        // parse outside the lock
        let program = Arc::new(FilterParser::parse(source)?);
        debug!(filter = source, stages = program.stages.len(), "compiled filter");

        let mut programs = self.lock();
        if programs.len() >= self.capacity {
            programs.clear();
        }
        programs.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Program>>> {
        self.programs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Compiles `filter` and applies it to `source` under a background context.
pub fn apply(
    filter: &str,
    resolver: Option<Arc<dyn Resolver>>,
    source: &Value,
) -> Result<Value, ApplyError> {
    let options = FilterOptions { resolver, ..FilterOptions::default() };
    let filter = Filter::new(filter, options)?;
    filter.apply(&Context::background(), source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterNode;
    use sift_value::{Link, ResolveError};

    #[test]
    fn test_cache_reuses_programs() {
        let cache = FilterCache::new(8);
        let a = cache.get_or_parse(".a | length").unwrap();
        let b = cache.get_or_parse(".a | length").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_clears_when_full() {
        let cache = FilterCache::new(2);
        cache.get_or_parse(".a").unwrap();
        cache.get_or_parse(".b").unwrap();
        cache.get_or_parse(".c").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_skips_parse_failures() {
        let cache = FilterCache::new(8);
        assert!(cache.get_or_parse(".a |").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_filter_exposes_program() {
        let filter = Filter::compile("length").unwrap();
        assert_eq!(filter.source(), "length");
        assert_eq!(filter.program().stages, vec![FilterNode::Length]);
        assert!(filter.options().lenient);
    }

    #[test]
    fn test_apply_with_resolver() {
        let resolver: Arc<dyn Resolver> =
            Arc::new(|_ctx: &Context, _path: &str| -> Result<Value, ResolveError> {
                Ok(Value::from("resolved"))
            });
        let input = Value::Sequence(vec![Value::Link(Link::new("/x"))]);
        let out = apply(".[0] | length", Some(resolver), &input).unwrap();
        assert_eq!(out, Value::Int(8));
    }

    #[test]
    fn test_zero_timeout_expires() {
        let filter =
            Filter::new(".", FilterOptions::default().with_timeout(Duration::ZERO)).unwrap();
        let err = filter.apply(&Context::background(), &Value::Null).unwrap_err();
        assert!(matches!(
            err.error,
            FilterError::Context(sift_value::ContextError::DeadlineExceeded)
        ));
    }
}
