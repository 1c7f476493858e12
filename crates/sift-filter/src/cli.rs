//! Logic behind the `sift` binary.
//!
//! Usage:
//!   sift [--compact] [--strict] [--verbose] [--timeout-ms <n>] '<filter>' [file]
//!
//! The document is read from `file`, or from stdin when no file is given.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use sift_value::{Context, Value, ValueError};
use thiserror::Error;

use crate::compile::{Filter, FilterOptions};
use crate::error::{ApplyError, FilterError};

pub const USAGE: &str = "\
usage: sift [options] <filter> [file]

Reads JSON from <file> or stdin, applies <filter> and prints the result.
When a later pipeline stage fails, the output of the last completed stage
is printed to stderr after the error, marked unreliable.

options:
  --compact         print the result on one line
  --strict          type errors instead of nulls for unsupported inputs
  --timeout-ms <n>  abort evaluation after <n> milliseconds
  --verbose         log compilation and evaluation steps to stderr
  -h, --help        show this message";

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid filter: {0}")]
    Compile(#[from] FilterError),

    #[error("{0}")]
    Apply(#[from] ApplyError),

    #[error("cannot print result: {0}")]
    Output(#[from] ValueError),
}

impl CliError {
    /// Compact JSON of the partial output carried by a failed application.
    ///
    /// `None` when there is none, or when it holds values JSON cannot show.
    pub fn partial_output(&self) -> Option<String> {
        let CliError::Apply(err) = self else {
            return None;
        };
        let json = err.partial.as_ref()?.to_json().ok()?;
        serde_json::to_string(&json).ok()
    }
}

// ── Arguments ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliOptions {
    pub filter: String,
    pub input: Option<PathBuf>,
    pub compact: bool,
    pub strict: bool,
    pub verbose: bool,
    pub timeout: Option<Duration>,
}

/// Parses command-line arguments, program name excluded.
///
/// Returns `Ok(None)` when help was requested.
pub fn parse_args<I>(args: I) -> Result<Option<CliOptions>, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--compact" => options.compact = true,
            "--strict" => options.strict = true,
            "--verbose" => options.verbose = true,
            "--timeout-ms" => {
                let raw = args
                    .next()
                    .ok_or_else(|| CliError::Usage("--timeout-ms needs a value".into()))?;
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| CliError::Usage(format!("invalid --timeout-ms value: {raw}")))?;
                options.timeout = Some(Duration::from_millis(ms));
            }
            flag if flag.starts_with("--") => {
                return Err(CliError::Usage(format!("unknown option: {flag}")));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    options.filter = positional
        .next()
        .ok_or_else(|| CliError::Usage("first argument must be a filter".into()))?;
    options.input = positional.next().map(PathBuf::from);
    if let Some(extra) = positional.next() {
        return Err(CliError::Usage(format!("unexpected argument: {extra}")));
    }
    Ok(Some(options))
}

// ── Running ───────────────────────────────────────────────────────────────

/// Reads the document named by `options`, or stdin.
pub fn read_input(options: &CliOptions) -> Result<String, CliError> {
    match &options.input {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Applies the filter in `options` to a JSON document and renders the
/// result as JSON.
pub fn run_filter(options: &CliOptions, json: &str) -> Result<String, CliError> {
    let doc: serde_json::Value = serde_json::from_str(json)?;

    let mut filter_options = FilterOptions::default();
    if options.strict {
        filter_options = filter_options.strict();
    }
    if let Some(timeout) = options.timeout {
        filter_options = filter_options.with_timeout(timeout);
    }

    let filter = Filter::new(&options.filter, filter_options)?;
    let result = filter.apply(&Context::background(), &Value::from(doc))?;
    let out = result.to_json()?;

    Ok(if options.compact {
        serde_json::to_string(&out)?
    } else {
        serde_json::to_string_pretty(&out)?
    })
}
