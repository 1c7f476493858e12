//! `sift`: apply a filter to a JSON document.
//!
//! Usage:
//!   sift [options] '<filter>' [file]
//!
//! The document is read from `file`, or from stdin. Set `RUST_LOG` to
//! override the log level chosen by `--verbose`.

use sift_filter::cli::{parse_args, read_input, run_filter, USAGE};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let level = if options.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    let result = read_input(&options).and_then(|json| run_filter(&options, &json));
    match result {
        Ok(out) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{out}") {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{e}");
            if let Some(partial) = e.partial_output() {
                eprintln!("partial output (unreliable): {partial}");
            }
            std::process::exit(1);
        }
    }
}
