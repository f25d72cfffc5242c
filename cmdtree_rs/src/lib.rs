//! # cmdtree
//!
//! **Command routing for text command lines** - aliases, permissions, and
//! trees of managed subcommands with speculative matching and exact rollback.
//!
//! A raw line such as `home set base` is split into a command token and the
//! rest, the token is resolved against an alias registry, and the mapping's
//! registrar runs it. Managed command trees try a matching subcommand first
//! and fall back to the node's own executor, restoring the parse state in
//! between so a failed attempt never leaks into the fallback.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cmdtree::{Cause, CommandNode, CommandResult, CommandRouter, SimpleSource};
//! use cmdtree::parameter::integer;
//!
//! let tp = CommandNode::builder()
//!     .parameter(integer("x"))
//!     .parameter(integer("y"))
//!     .parameter(integer("z"))
//!     .executor(|_, ctx| {
//!         println!("x = {:?}", ctx.get_one("x"));
//!         Ok(CommandResult::success())
//!     })
//!     .build()
//!     .unwrap();
//!
//! let router = CommandRouter::default();
//! router.register_node(tp, "tp", ["teleport"], "my-plugin").unwrap();
//!
//! let cause = Cause::of_source(Arc::new(SimpleSource::new("alex")));
//! router.process(&cause, "tp 10 20 30").unwrap();
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! cmdtree tp 10 64 -3                      # run one command
//! cmdtree --grant 'cmdtree.home.*' home set base
//! cmdtree --suggest home                   # completions
//! cmdtree < commands.txt                   # one command per line
//! ```

// ============================================================================
// Core Modules
// ============================================================================

/// Error taxonomy and user-facing messages.
pub mod error;
pub mod result;
/// Invocation context: source, subject, targets.
pub mod cause;
pub mod tokenizer;
pub mod parse_state;
/// Per-invocation argument bag with snapshot/restore.
pub mod context;
/// Positional parameters and the value-parser catalog.
pub mod parameter;
pub mod flags;
/// Managed command nodes and the recursive dispatch algorithm.
///
/// # Key Types
///
/// - [`CommandNode`](node::CommandNode) - one immutable node of a command tree
/// - [`ExceptionPolicy`](node::ExceptionPolicy) - what a failed child attempt does
/// - [`CommandCallable`](node::CommandCallable) - commands outside the node tree
pub mod node;
pub mod registrar;
/// Alias namespace with conflict resolution and owner overrides.
pub mod registry;
pub mod events;
pub mod config;
pub mod diagnostics;
/// Top-level entry point.
pub mod router;

// ============================================================================
// Binary support
// ============================================================================

/// clap front end, console source and demo commands used by the `cmdtree` binary.
pub mod cli;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use cause::{Cause, CommandSource, SimpleSource, Subject};
pub use config::RouterConfig;
pub use context::{ArgValue, ExecutionContext};
pub use error::{ArgumentParseError, BuildError, ChildCommandError, CommandError};
pub use events::{CommandListener, PostDispatchEvent, PreDispatchEvent};
pub use flags::Flags;
pub use node::{ChildFailure, CommandCallable, CommandNode, ExceptionPolicy};
pub use registrar::{CallableRegistrar, NodeRegistrar, Registrar};
pub use registry::{AliasRegistry, Mapping};
pub use result::CommandResult;
pub use router::CommandRouter;
