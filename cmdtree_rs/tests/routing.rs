//! Routing and dispatch behaviour through the public API.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use cmdtree::cause::Location;
use cmdtree::parameter::{IntegerParser, choices, integer, string};
use cmdtree::parse_state::ParseState;
use cmdtree::tokenizer::QuotedStrings;
use cmdtree::{
    ArgValue, Cause, CommandCallable, CommandError, CommandListener, CommandNode, CommandResult,
    CommandRouter, ExceptionPolicy, ExecutionContext, Flags, PostDispatchEvent, PreDispatchEvent,
    RouterConfig, SimpleSource,
};

fn source(grants: &[&str]) -> (Arc<SimpleSource>, Cause) {
    let source = Arc::new(
        grants
            .iter()
            .fold(SimpleSource::new("alex"), |source, grant| source.with_permission(*grant)),
    );
    let cause = Cause::of_source(source.clone());
    (source, cause)
}

fn ok_node() -> CommandNode {
    CommandNode::builder()
        .executor(|_, _| Ok(CommandResult::success()))
        .build()
        .expect("leaf")
}

// ============================================
// Alias registry
// ============================================

mod aliases {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_alias_resolves_to_its_owner() {
        let router = CommandRouter::default();
        router
            .register_node(ok_node(), "teleport", ["tp", "TPX"], "core")
            .expect("core");
        router
            .register_node(ok_node(), "home", ["h"], "homes")
            .expect("homes");

        for (alias, owner) in [("teleport", "core"), ("tp", "core"), ("tpx", "core"), ("H", "homes")] {
            let mapping = router.lookup(alias).expect("registered alias");
            assert_eq!(mapping.owner(), owner, "owner of {alias}");
        }
    }

    #[test]
    fn competing_owner_keeps_surviving_aliases() {
        let router = CommandRouter::default();
        router.register_node(ok_node(), "spawn", ["s"], "first").expect("first");
        let second = router
            .register_node(ok_node(), "spawn", ["sp"], "second")
            .expect("second keeps sp");

        assert_eq!(second.aliases(), ["sp"]);
        assert_eq!(router.lookup("spawn").expect("spawn").owner(), "first");
        assert_eq!(router.lookup("sp").expect("sp").owner(), "second");
    }

    #[test]
    fn competing_owner_fails_when_nothing_survives() {
        let router = CommandRouter::default();
        router.register_node(ok_node(), "spawn", ["s"], "first").expect("first");
        let error = router
            .register_node(ok_node(), "SPAWN", ["s"], "second")
            .expect_err("conflict");
        assert!(matches!(error, CommandError::AliasConflict { .. }));
        assert_eq!(router.aliases(), vec!["s", "spawn"]);
    }

    #[test]
    fn configured_override_reserves_alias() {
        let config = RouterConfig::from_toml_str("[aliases]\ntp = \"core\"\n").expect("config");
        let router = CommandRouter::new(config);
        let plugin = router
            .register_node(ok_node(), "tp", ["ptp"], "plugin")
            .expect("keeps ptp");
        assert_eq!(plugin.primary_alias(), "ptp");
        assert!(router.lookup("tp").is_none());

        router.register_node(ok_node(), "tp", Vec::<&str>::new(), "core").expect("core");
        assert_eq!(router.lookup("tp").expect("tp").owner(), "core");
    }
}

// ============================================
// Parse state and context
// ============================================

mod state {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn restore_undoes_later_mutation() {
        let cause = Cause::default();
        let mut state = ParseState::tokenize(&QuotedStrings, "a b c").expect("tokenize");
        let mut ctx = ExecutionContext::new(&cause);
        ctx.put_entry("k", 1).expect("put");
        state.next().expect("a");

        let parse_snapshot = state.snapshot();
        let context_snapshot = ctx.snapshot();

        state.next().expect("b");
        ctx.put_entry("k", 2).expect("put");
        ctx.put_entry("other", "x").expect("put");
        ctx.set_current_command(Some("sub".into()));

        state.restore(&parse_snapshot);
        ctx.restore(&context_snapshot);

        assert_eq!(state.peek().expect("peek"), "b");
        let expected: Vec<ArgValue> = vec![1.into()];
        assert_eq!(ctx.get_all("k"), expected.as_slice());
        assert!(!ctx.has_any("other"));
        assert_eq!(ctx.current_command(), None);
    }

    #[test]
    fn put_entry_flattens_and_appends() {
        let mut ctx = ExecutionContext::new(&Cause::default());
        ctx.put_entry("k", vec![1, 2, 3]).expect("list");
        ctx.put_entry("k", 4).expect("single");

        let expected: Vec<ArgValue> = vec![1.into(), 2.into(), 3.into(), 4.into()];
        assert_eq!(ctx.get_all("k"), expected.as_slice());
        assert_eq!(ctx.get_one("k"), None);
    }
}

// ============================================
// Dispatch
// ============================================

mod dispatch {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tp_router() -> CommandRouter {
        let router = CommandRouter::default();
        let tp = CommandNode::builder()
            .parameter(integer("x"))
            .parameter(integer("y"))
            .parameter(integer("z"))
            .executor(|_, ctx| {
                let sum: i64 = ["x", "y", "z"]
                    .iter()
                    .filter_map(|key| ctx.get_one(key).and_then(ArgValue::as_int))
                    .sum();
                Ok(CommandResult::with_outcome(sum as i32))
            })
            .build()
            .expect("tp");
        router.register_node(tp, "tp", Vec::<&str>::new(), "core").expect("tp");
        router
    }

    #[test]
    fn numeric_parameters_parse_in_order() {
        let captured: Rc<RefCell<Option<(i64, i64, i64)>>> = Rc::default();
        let sink = Rc::clone(&captured);
        let tp = CommandNode::builder()
            .parameter(integer("x"))
            .parameter(integer("y"))
            .parameter(integer("z"))
            .executor(move |_, ctx| {
                let get = |key| ctx.get_one(key).and_then(ArgValue::as_int).unwrap_or(-1);
                *sink.borrow_mut() = Some((get("x"), get("y"), get("z")));
                Ok(CommandResult::success())
            })
            .build()
            .expect("tp");
        let router = CommandRouter::default();
        router.register_node(tp, "tp", Vec::<&str>::new(), "core").expect("tp");

        router.process(&Cause::default(), "tp 10 20 30").expect("dispatch");
        assert_eq!(*captured.borrow(), Some((10, 20, 30)));
    }

    #[test]
    fn unknown_command_carries_hint() {
        let router = tp_router();
        let error = router.process(&Cause::default(), "tpp 1 2 3").expect_err("unknown");
        let CommandError::UnknownCommand { command, suggestion } = error else {
            panic!("expected unknown command");
        };
        assert_eq!(command, "tpp");
        assert_eq!(suggestion.as_deref(), Some("tp"));
    }

    #[test]
    fn parse_error_reports_position_and_expectation() {
        let router = tp_router();
        let error = router.process(&Cause::default(), "tp 1 up 3").expect_err("bad y");
        let CommandError::ArgumentParse(error) = error else {
            panic!("expected parse error");
        };
        assert_eq!(error.position(), 2);
        assert_eq!(error.expected(), Some("an integer"));
    }

    #[test]
    fn child_alias_beats_local_executor() {
        let fallback_runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fallback_runs);
        let list = CommandNode::builder()
            .executor(|_, _| Ok(CommandResult::with_outcome(42)))
            .build()
            .expect("list");
        let root = CommandNode::builder()
            .parameter(cmdtree::parameter::optional(string("anything")))
            .child(list, ["list"])
            .executor(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(CommandResult::success())
            })
            .build()
            .expect("root");
        let router = CommandRouter::default();
        router.register_node(root, "warp", Vec::<&str>::new(), "core").expect("warp");

        let result = router.process(&Cause::default(), "warp list").expect("list");
        assert_eq!(result.outcome(), 42);
        assert_eq!(fallback_runs.get(), 0);
    }

    fn failing_pair(policy: ExceptionPolicy, fallback_runs: Rc<Cell<u32>>) -> CommandRouter {
        let child = CommandNode::builder()
            .parameter(integer("amount"))
            .executor(|_, _| Err(CommandError::failed("child failed")))
            .build()
            .expect("child");
        let root = CommandNode::builder()
            .parameter(cmdtree::parameter::optional(string("rest")))
            .child(child, ["pay"])
            .exception_policy(policy)
            .executor(move |_, _| {
                fallback_runs.set(fallback_runs.get() + 1);
                Err(CommandError::failed("fallback failed"))
            })
            .build()
            .expect("root");
        let router = CommandRouter::default();
        router.register_node(root, "bank", Vec::<&str>::new(), "eco").expect("bank");
        router
    }

    #[test]
    fn suppress_chains_local_and_child_failures() {
        let runs = Rc::new(Cell::new(0));
        let router = failing_pair(ExceptionPolicy::Suppress, Rc::clone(&runs));
        let error = router.process(&Cause::default(), "bank pay").expect_err("both");

        assert_eq!(runs.get(), 1);
        let CommandError::Child(chain) = &error else {
            panic!("expected child command error, got {error:?}");
        };
        assert_eq!(chain.subcommand(), "pay");
        assert_eq!(chain.local().to_string(), "fallback failed");
        let child = chain.child().expect("child failure");
        assert!(matches!(child, CommandError::ArgumentParse(_)));
        let message = error.user_message(false);
        assert!(message.starts_with("Fallback failed\n"), "{message}");
        assert!(
            message.contains("Subcommand 'pay' failed: Not enough arguments! (expected an integer)"),
            "{message}"
        );
    }

    #[test]
    fn rethrow_surfaces_only_child_failure() {
        let runs = Rc::new(Cell::new(0));
        let router = failing_pair(ExceptionPolicy::Rethrow, Rc::clone(&runs));
        let error = router.process(&Cause::default(), "bank pay 5").expect_err("child");

        assert_eq!(runs.get(), 0);
        assert!(matches!(error, CommandError::Failed { ref message } if message == "child failed"));
    }

    #[test]
    fn gated_subcommand_never_parses_its_parameters() {
        let parsed = Rc::new(Cell::new(0));
        let seen = Rc::clone(&parsed);
        let set = CommandNode::builder()
            .permission("cmd.home.set")
            .parameter(string("name"))
            .executor(move |_, _| {
                seen.set(seen.get() + 1);
                Ok(CommandResult::success())
            })
            .build()
            .expect("set");
        let home = CommandNode::builder()
            .child(set, ["set"])
            .build()
            .expect("home without executor");
        let router = CommandRouter::default();
        router.register_node(home, "home", Vec::<&str>::new(), "homes").expect("home");

        let (_, denied) = source(&[]);
        let error = router.process(&denied, "home set base").expect_err("denied");
        assert!(
            matches!(error, CommandError::PermissionDenied { ref permission } if permission == "cmd.home.set")
        );
        assert_eq!(parsed.get(), 0);

        let (_, allowed) = source(&["cmd.home.set"]);
        router.process(&allowed, "home set base").expect("allowed");
        assert_eq!(parsed.get(), 1);
    }

    #[test]
    fn internal_failures_stay_generic_without_debug_permission() {
        let router = CommandRouter::default();
        let node = CommandNode::builder()
            .executor(|_, _| Err(anyhow::anyhow!("db pool exhausted").into()))
            .build()
            .expect("node");
        router.register_node(node, "save", Vec::<&str>::new(), "core").expect("save");

        let (source_plain, plain) = source(&[]);
        let result = router.process_and_report(&plain, "save");
        assert!(!result.is_success());
        assert!(!source_plain.messages()[0].contains("db pool"));

        let (source_debug, debug) = source(&["cmdtree.debug"]);
        router.process_and_report(&debug, "save");
        assert!(source_debug.messages()[0].contains("db pool exhausted"));
    }

    #[test]
    fn inline_flag_value_error_under_non_ascii_name_is_reported() {
        let router = CommandRouter::default();
        let kick = CommandNode::builder()
            .flags(Flags::builder().value_flag(IntegerParser, ["k"]).build())
            .executor(|_, _| Ok(CommandResult::success()))
            .build()
            .expect("kick");
        router.register_node(kick, "kick", Vec::<&str>::new(), "core").expect("kick");

        let (source, cause) = source(&[]);
        let result = router.process_and_report(&cause, "kick --\u{212A}=x");
        assert!(!result.is_success());
        assert!(source.messages()[0].ends_with("--\u{212A}=x\n    ^"));
    }

    struct Vault;

    impl CommandCallable for Vault {
        fn process(&self, _: &Cause, _: &str) -> Result<CommandResult, CommandError> {
            Ok(CommandResult::success())
        }

        fn suggestions(
            &self,
            _: &Cause,
            _: &str,
            _: Option<&Location>,
        ) -> Result<Vec<String>, CommandError> {
            Ok(Vec::new())
        }

        fn test_permission(&self, cause: &Cause) -> bool {
            cause.has_permission("vault.open")
        }
    }

    #[test]
    fn denied_callable_names_the_command() {
        let router = CommandRouter::default();
        router
            .register_callable(Arc::new(Vault), "vault", ["safe"], "bank")
            .expect("vault");

        let error = router.process(&Cause::default(), "safe").expect_err("denied");
        let CommandError::PermissionDenied { permission } = error else {
            panic!("expected permission denial");
        };
        assert_eq!(permission, "vault");

        let (_, opener) = source(&["vault.open"]);
        router.process(&opener, "safe").expect("allowed");
    }
}

// ============================================
// Router lifecycle, events and re-entrancy
// ============================================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dispatch_is_refused_while_resetting() {
        let router = CommandRouter::default();
        router.register_node(ok_node(), "a", Vec::<&str>::new(), "p").expect("a");

        router.begin_reset();
        assert!(router.is_resetting());
        assert!(matches!(
            router.process(&Cause::default(), "a"),
            Err(CommandError::Resetting)
        ));
        router.register_node(ok_node(), "b", Vec::<&str>::new(), "p").expect("b");
        router.finish_reset();

        assert!(router.lookup("a").is_none());
        router.process(&Cause::default(), "b").expect("b after reset");
    }

    struct Alias;

    impl CommandListener for Alias {
        fn pre_dispatch(&self, event: &mut PreDispatchEvent<'_>) {
            match event.command() {
                "spawn" => {
                    event.set_command("tp");
                    event.set_arguments("0 64 0");
                }
                "blocked" => event.cancel_with(CommandResult::with_outcome(-1)),
                _ => {}
            }
        }
    }

    #[derive(Default)]
    struct Outcomes(RefCell<Vec<(String, i32, bool)>>);

    impl CommandListener for Outcomes {
        fn post_dispatch(&self, event: &PostDispatchEvent<'_>) {
            self.0
                .borrow_mut()
                .push((event.command.to_string(), event.result.outcome(), event.failed));
        }
    }

    #[test]
    fn listeners_rewrite_veto_and_observe() {
        let router = CommandRouter::default();
        let tp = CommandNode::builder()
            .parameter(integer("x"))
            .parameter(integer("y"))
            .parameter(integer("z"))
            .executor(|_, ctx| {
                let y = ctx.get_one("y").and_then(ArgValue::as_int).unwrap_or_default();
                Ok(CommandResult::with_outcome(y as i32))
            })
            .build()
            .expect("tp");
        router.register_node(tp, "tp", Vec::<&str>::new(), "core").expect("tp");
        let outcomes = Arc::new(Outcomes::default());
        router.subscribe(Arc::new(Alias));
        router.subscribe(outcomes.clone());

        let rewritten = router.process(&Cause::default(), "spawn").expect("rewritten");
        assert_eq!(rewritten.outcome(), 64);

        let vetoed = router.process(&Cause::default(), "blocked anything").expect("vetoed");
        assert_eq!(vetoed.outcome(), -1);

        router.process(&Cause::default(), "tp x").expect_err("parse");
        assert_eq!(
            *outcomes.0.borrow(),
            vec![("tp".to_string(), 64, false), ("tp".to_string(), 0, true)]
        );
    }

    #[test]
    fn executors_may_dispatch_and_register_reentrantly() {
        let router = Rc::new(CommandRouter::default());
        router
            .register_node(
                CommandNode::builder()
                    .executor(|_, _| Ok(CommandResult::with_outcome(7)))
                    .build()
                    .expect("inner"),
                "inner",
                Vec::<&str>::new(),
                "p",
            )
            .expect("inner");

        let weak = Rc::downgrade(&router);
        let outer = CommandNode::builder()
            .executor(move |cause, _| {
                let router = weak
                    .upgrade()
                    .ok_or_else(|| CommandError::failed("router gone"))?;
                router
                    .register_node(
                        CommandNode::builder()
                            .executor(|_, _| Ok(CommandResult::success()))
                            .build()
                            .map_err(anyhow::Error::from)?,
                        "late",
                        Vec::<&str>::new(),
                        "p",
                    )
                    .ok();
                let inner = router.process(cause, "inner")?;
                Ok(CommandResult::with_outcome(inner.outcome() + 1))
            })
            .build()
            .expect("outer");
        router.register_node(outer, "outer", Vec::<&str>::new(), "p").expect("outer");

        let result = router.process(&Cause::default(), "outer").expect("outer");
        assert_eq!(result.outcome(), 8);
        assert!(router.lookup("late").is_some());
    }
}

// ============================================
// Suggestions
// ============================================

mod suggestions {
    use super::*;
    use pretty_assertions::assert_eq;

    fn router() -> CommandRouter {
        let set = CommandNode::builder()
            .permission("cmd.home.set")
            .parameter(choices("slot", ["alpha", "beta"]))
            .executor(|_, _| Ok(CommandResult::success()))
            .build()
            .expect("set");
        let home = CommandNode::builder()
            .child(set, ["set"])
            .child(ok_node(), ["list"])
            .build()
            .expect("home");
        let router = CommandRouter::default();
        router.register_node(home, "home", ["homes"], "homes").expect("home");
        router.register_node(ok_node(), "help", Vec::<&str>::new(), "core").expect("help");
        router
    }

    #[test]
    fn command_token_completes_by_prefix() {
        let (_, cause) = source(&[]);
        assert_eq!(router().suggest(&cause, "ho", None), vec!["home", "homes"]);
        assert_eq!(router().suggest(&cause, "", None), vec!["help", "home", "homes"]);
    }

    #[test]
    fn subcommands_respect_permissions() {
        let router = router();
        let (_, plain) = source(&[]);
        let (_, admin) = source(&["cmd.home.*"]);
        assert_eq!(router.suggest(&plain, "home ", None), vec!["list"]);
        assert_eq!(router.suggest(&admin, "home ", None), vec!["list", "set"]);
        assert_eq!(router.suggest(&admin, "home set a", None), vec!["alpha"]);
    }

    #[test]
    fn failures_degrade_to_nothing() {
        let router = router();
        let (_, cause) = source(&[]);
        assert!(router.suggest(&cause, "nope x", None).is_empty());
        assert!(router.suggest(&cause, "home \"unterminated", None).is_empty());
    }

    struct Worlds;

    impl CommandCallable for Worlds {
        fn process(&self, _: &Cause, _: &str) -> Result<CommandResult, CommandError> {
            Ok(CommandResult::success())
        }

        fn suggestions(
            &self,
            _: &Cause,
            arguments: &str,
            target: Option<&Location>,
        ) -> Result<Vec<String>, CommandError> {
            let here = target.map(|location| location.world.clone());
            Ok(["nether", "overworld"]
                .into_iter()
                .map(str::to_string)
                .chain(here)
                .filter(|world| world.starts_with(arguments.trim()))
                .collect())
        }
    }

    struct Gatekeeper(std::rc::Weak<CommandRouter>);

    impl CommandCallable for Gatekeeper {
        fn process(&self, _: &Cause, _: &str) -> Result<CommandResult, CommandError> {
            Ok(CommandResult::success())
        }

        fn suggestions(
            &self,
            _: &Cause,
            _: &str,
            _: Option<&Location>,
        ) -> Result<Vec<String>, CommandError> {
            Ok(Vec::new())
        }

        fn test_permission(&self, _: &Cause) -> bool {
            if let Some(router) = self.0.upgrade() {
                router.register_node(ok_node(), "gateway", Vec::<&str>::new(), "gate").ok();
            }
            true
        }
    }

    #[test]
    fn permission_checks_may_register_commands_during_completion() {
        let router = Rc::new(CommandRouter::default());
        router
            .register_callable(
                Arc::new(Gatekeeper(Rc::downgrade(&router))),
                "gate",
                Vec::<&str>::new(),
                "gate",
            )
            .expect("gate");

        assert_eq!(router.suggest(&Cause::default(), "ga", None), vec!["gate"]);
        assert!(router.lookup("gateway").is_some());
    }

    #[test]
    fn callable_registrar_receives_target() {
        let router = CommandRouter::default();
        router
            .register_callable(Arc::new(Worlds), "world", Vec::<&str>::new(), "worlds")
            .expect("world");
        let target = Location::new("orbit", 0.0, 0.0, 0.0);
        assert_eq!(
            router.suggest(&Cause::default(), "world o", Some(&target)),
            vec!["orbit", "overworld"]
        );
    }
}
