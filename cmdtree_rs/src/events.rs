//! Pre/post dispatch hooks around every top-level invocation.
//!
//! Listeners run in subscription order. The pre-dispatch hook can rewrite
//! the command token and arguments, or veto the call outright; it is the
//! only cancellation point the router has.

use std::sync::Arc;

use crate::cause::Cause;
use crate::result::CommandResult;

pub struct PreDispatchEvent<'a> {
    cause: &'a Cause,
    command: String,
    arguments: String,
    cancelled: bool,
    result: Option<CommandResult>,
}

impl<'a> PreDispatchEvent<'a> {
    pub fn new(cause: &'a Cause, command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            cause,
            command: command.into(),
            arguments: arguments.into(),
            cancelled: false,
            result: None,
        }
    }

    pub fn cause(&self) -> &Cause {
        self.cause
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn set_arguments(&mut self, arguments: impl Into<String>) {
        self.arguments = arguments.into();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Veto the call. The router answers with an empty result.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Veto the call and answer with `result` instead.
    pub fn cancel_with(&mut self, result: CommandResult) {
        self.cancelled = true;
        self.result = Some(result);
    }

    pub(crate) fn into_parts(self) -> (String, String, bool, Option<CommandResult>) {
        (self.command, self.arguments, self.cancelled, self.result)
    }
}

pub struct PostDispatchEvent<'a> {
    pub cause: &'a Cause,
    pub command: &'a str,
    pub arguments: &'a str,
    pub result: &'a CommandResult,
    /// True when the registrar raised instead of returning.
    pub failed: bool,
}

pub trait CommandListener {
    fn pre_dispatch(&self, _event: &mut PreDispatchEvent<'_>) {}

    fn post_dispatch(&self, _event: &PostDispatchEvent<'_>) {}
}

#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Vec<Arc<dyn CommandListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn CommandListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Later listeners still see a cancelled event and may inspect it.
    pub fn fire_pre(&self, event: &mut PreDispatchEvent<'_>) {
        for listener in &self.listeners {
            listener.pre_dispatch(event);
        }
    }

    pub fn fire_post(&self, event: &PostDispatchEvent<'_>) {
        for listener in &self.listeners {
            listener.post_dispatch(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Rewrite;

    impl CommandListener for Rewrite {
        fn pre_dispatch(&self, event: &mut PreDispatchEvent<'_>) {
            if event.command() == "t" {
                event.set_command("tp");
                event.set_arguments("0 64 0");
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl CommandListener for Recorder {
        fn pre_dispatch(&self, event: &mut PreDispatchEvent<'_>) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("pre {} {}", event.command(), event.arguments()));
            }
        }

        fn post_dispatch(&self, event: &PostDispatchEvent<'_>) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("post {} {}", event.command, event.result.outcome()));
            }
        }
    }

    #[test]
    fn listeners_run_in_order_and_see_rewrites() {
        let recorder = Arc::new(Recorder::default());
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Rewrite));
        bus.subscribe(recorder.clone());

        let cause = Cause::default();
        let mut event = PreDispatchEvent::new(&cause, "t", "");
        bus.fire_pre(&mut event);
        let (command, arguments, cancelled, result) = event.into_parts();
        assert_eq!((command.as_str(), arguments.as_str()), ("tp", "0 64 0"));
        assert!(!cancelled);
        assert!(result.is_none());

        bus.fire_post(&PostDispatchEvent {
            cause: &cause,
            command: &command,
            arguments: &arguments,
            result: &CommandResult::success(),
            failed: false,
        });
        let seen = recorder.seen.lock().expect("lock").clone();
        assert_eq!(seen, vec!["pre tp 0 64 0", "post tp 1"]);
    }

    #[test]
    fn cancel_with_carries_result() {
        let cause = Cause::default();
        let mut event = PreDispatchEvent::new(&cause, "stop", "");
        event.cancel_with(CommandResult::with_outcome(5));
        assert!(event.is_cancelled());
        let (_, _, cancelled, result) = event.into_parts();
        assert!(cancelled);
        assert_eq!(result.map(|r| r.outcome()), Some(5));
    }
}
