//! Git history walker: recovers bytes the working tree no longer shows.
//!
//! Two independent recovery passes:
//! - [`history::restore_deleted_files`] walks every commit's parents and
//!   materializes the pre-deletion contents of any file a diff marks as
//!   deleted.
//! - [`dangling::extract_dangling_blobs`] unpacks every pack file and
//!   runs `git fsck --unreachable --dangling` to recover blobs reachable
//!   from no branch, tag, or reflog — history `git gc` would otherwise
//!   quietly collect.
//!
//! Everything shells out to the real `git` binary through
//! [`crate::command::CommandRunner`] rather than `git2`/libgit2.

pub mod dangling;
pub mod history;

pub use dangling::extract_dangling_blobs;
pub use history::restore_deleted_files;
