//! External process execution with timeouts and process-group teardown.
//!
//! Git plumbing and scanner invocation both go through here rather than
//! `git2`/libgit2 bindings: the rest of the pipeline shells out to the
//! real `git` and `trufflehog` binaries.

mod runner;

pub use runner::{CommandError, CommandRunner, Output};
