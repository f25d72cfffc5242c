//! Command-line front end: a console source, a demo command set and a REPL.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::cause::{Cause, CommandSource, Location, Subject, permission_granted};
use crate::config::RouterConfig;
use crate::context::{ArgValue, ExecutionContext};
use crate::error::CommandError;
use crate::flags::Flags;
use crate::node::{CommandCallable, CommandNode, ExceptionPolicy};
use crate::parameter::{double, optional, remaining_joined, string};
use crate::result::CommandResult;
use crate::router::CommandRouter;

const DEMO_OWNER: &str = "cmdtree";

#[derive(Parser, Debug)]
#[command(name = "cmdtree")]
#[command(about = "Route command lines through a tree of managed commands")]
#[command(version)]
pub struct CliArgs {
    /// Config file (default: .cmdtree/config.toml in the working directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log a diagnostic report for every failed command
    #[arg(long)]
    pub debug: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Grant a permission to the console (repeatable, `prefix.*` and `*` allowed)
    #[arg(long = "grant", value_name = "PERMISSION")]
    pub grants: Vec<String>,

    /// Print completions for the command line instead of running it
    #[arg(long)]
    pub suggest: bool,

    /// Command line to run; reads commands from stdin when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

pub fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap_or_default()),
        )
        .init();
}

/// The terminal user. Messages go to stdout.
#[derive(Debug)]
pub struct ConsoleSource {
    permissions: BTreeSet<String>,
    location: Location,
}

impl ConsoleSource {
    pub fn new<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: grants.into_iter().map(Into::into).collect(),
            location: Location::new("console", 0.0, 64.0, 0.0),
        }
    }
}

impl Subject for ConsoleSource {
    fn identifier(&self) -> &str {
        "console"
    }

    fn has_permission(&self, permission: &str) -> bool {
        permission_granted(&self.permissions, permission)
    }
}

impl CommandSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    fn send_message(&self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = writeln!(stdout, "{message}") {
            debug!(%error, "failed to write command output");
        }
    }

    fn location(&self) -> Option<Location> {
        Some(self.location.clone())
    }
}

// ============================================================================
// Demo commands
// ============================================================================

fn coordinate(ctx: &ExecutionContext, key: &str) -> Result<f64, CommandError> {
    ctx.get_one(key)
        .and_then(ArgValue::as_float)
        .ok_or_else(|| anyhow::anyhow!("coordinate '{key}' missing after a successful parse").into())
}

fn teleport_command() -> anyhow::Result<CommandNode> {
    Ok(CommandNode::builder()
        .parameter(double("x"))
        .parameter(double("y"))
        .parameter(double("z"))
        .short_description(|_| Some("Teleport to a position".to_string()))
        .executor(|cause, ctx| {
            let (x, y, z) = (
                coordinate(ctx, "x")?,
                coordinate(ctx, "y")?,
                coordinate(ctx, "z")?,
            );
            let name = cause.source_name().unwrap_or("nobody");
            cause.send_message(&format!("Teleported {name} to {x}, {y}, {z}"));
            Ok(CommandResult::success())
        })
        .build()?)
}

type Homes = Rc<RefCell<BTreeMap<String, Location>>>;

fn home_command(homes: Homes) -> anyhow::Result<CommandNode> {
    let store = Rc::clone(&homes);
    let set = CommandNode::builder()
        .permission("cmdtree.home.set")
        .parameter(string("name"))
        .executor(move |cause, ctx| {
            let name = ctx
                .get_one("name")
                .and_then(ArgValue::as_str)
                .ok_or_else(|| CommandError::failed("A home name is required."))?
                .to_string();
            let location = ctx
                .location()
                .cloned()
                .unwrap_or_else(|| Location::new("world", 0.0, 0.0, 0.0));
            store.borrow_mut().insert(name.clone(), location);
            cause.send_message(&format!("Home '{name}' set."));
            Ok(CommandResult::success())
        })
        .build()?;

    let listing = Rc::clone(&homes);
    let list = CommandNode::builder()
        .executor(move |cause, _| {
            let homes = listing.borrow();
            if homes.is_empty() {
                cause.send_message("No homes set.");
            } else {
                let names: Vec<&str> = homes.keys().map(String::as_str).collect();
                cause.send_message(&format!("Homes: {}", names.join(", ")));
            }
            Ok(CommandResult::with_outcome(homes.len() as i32))
        })
        .build()?;

    Ok(CommandNode::builder()
        .child(set, ["set"])
        .child(list, ["list", "ls"])
        .exception_policy(ExceptionPolicy::Rethrow)
        .parameter(optional(string("name")))
        .short_description(|_| Some("Manage and visit homes".to_string()))
        .executor(move |cause, ctx| {
            let Some(name) = ctx.get_one("name").and_then(ArgValue::as_str) else {
                return Err(CommandError::failed("Usage: home <set|list> | home <name>"));
            };
            match homes.borrow().get(name) {
                Some(location) => {
                    cause.send_message(&format!(
                        "Teleported home to '{name}' ({}, {}, {})",
                        location.x, location.y, location.z
                    ));
                    Ok(CommandResult::success())
                }
                None => Err(CommandError::failed(format!("No home named '{name}'."))),
            }
        })
        .build()?)
}

fn echo_command() -> anyhow::Result<CommandNode> {
    Ok(CommandNode::builder()
        .flags(Flags::builder().flag(["u", "upper"]).build())
        .parameter(remaining_joined("text"))
        .executor(|cause, ctx| {
            let text = ctx
                .get_one("text")
                .and_then(ArgValue::as_str)
                .unwrap_or_default();
            if ctx.has_any("u") {
                cause.send_message(&text.to_uppercase());
            } else {
                cause.send_message(text);
            }
            Ok(CommandResult::success())
        })
        .build()?)
}

/// Raw callable: answers with whatever it was given.
struct Ping;

impl CommandCallable for Ping {
    fn process(&self, cause: &Cause, arguments: &str) -> Result<CommandResult, CommandError> {
        let arguments = arguments.trim();
        if arguments.is_empty() {
            cause.send_message("pong");
        } else {
            cause.send_message(&format!("pong {arguments}"));
        }
        Ok(CommandResult::success())
    }

    fn suggestions(
        &self,
        _cause: &Cause,
        _arguments: &str,
        _target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError> {
        Ok(Vec::new())
    }

    fn usage(&self, _cause: &Cause) -> String {
        "[text]".to_string()
    }
}

/// Router preloaded with `tp`, `home`, `echo` and `ping`.
pub fn demo_router(config: RouterConfig) -> anyhow::Result<CommandRouter> {
    let router = CommandRouter::new(config);
    let homes: Homes = Rc::default();

    router.register_node(teleport_command()?, "tp", ["teleport"], DEMO_OWNER)?;
    router.register_node(home_command(homes)?, "home", ["homes"], DEMO_OWNER)?;
    router.register_node(echo_command()?, "echo", ["say"], DEMO_OWNER)?;
    router.register_callable(Arc::new(Ping), "ping", Vec::<&str>::new(), DEMO_OWNER)?;
    debug!(aliases = ?router.aliases(), "demo commands registered");
    Ok(router)
}

/// Re-quote words that the shell already split, so the tokenizer sees them
/// as one token again.
fn join_words(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            if word.is_empty() || word.contains(char::is_whitespace) {
                format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_line(router: &CommandRouter, cause: &Cause, line: &str) -> bool {
    let result = router.process_and_report(cause, line);
    result.error_message().is_none()
}

fn run_repl(router: &CommandRouter, cause: &Cause) -> anyhow::Result<bool> {
    let stdin = std::io::stdin();
    let mut last_ok = true;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read command from stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        last_ok = run_line(router, cause, line);
    }
    Ok(last_ok)
}

fn run_with(args: &CliArgs) -> anyhow::Result<bool> {
    let config = match &args.config {
        Some(path) => RouterConfig::load_from_path(path),
        None => {
            let cwd = std::env::current_dir().context("failed to resolve working directory")?;
            RouterConfig::load(&cwd)
        }
    }
    .with_debug(args.debug);

    let router = demo_router(config)?;
    let cause = Cause::of_source(Arc::new(ConsoleSource::new(args.grants.iter().cloned())));

    if args.suggest {
        // taken verbatim so a trailing space asks for the next word
        let line = args.command.join(" ");
        for candidate in router.suggest(&cause, &line, cause.location().as_ref()) {
            println!("{candidate}");
        }
        return Ok(true);
    }

    if args.command.is_empty() {
        info!("reading commands from stdin");
        return run_repl(&router, &cause);
    }
    Ok(run_line(&router, &cause, &join_words(&args.command)))
}

pub fn run(args: CliArgs) -> ExitCode {
    init_logging(&args.log_level);
    match run_with(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("[cmdtree][error] {error:#}");
            ExitCode::FAILURE
        }
    }
}
