//! External tool invocation for Quill.
//!
//! Every process runs under a deadline. When the deadline passes the child
//! is killed and [`ToolError::Timeout`] is returned, which callers can tell
//! apart from ordinary failures via [`ToolError::is_timeout`]. Dropping a
//! pending call also kills the child.
//!
//! Output is captured, trimmed and stripped of ANSI escape sequences before
//! it is logged or returned.

mod command;
mod git;

pub use command::{ToolCommand, ToolError, strip_ansi};
pub use git::Git;
