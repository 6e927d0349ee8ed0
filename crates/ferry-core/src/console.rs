//! User-facing progress sink and confirmation prompt.

use crate::error::{FerryError, Result};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Structured output plus a yes/no prompt. Implementations pick the format.
pub trait Console: Send + Sync {
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn progress(&self, message: &str);

    fn verbose(&self, message: &str) {
        let _ = message;
    }

    /// Ask the user to confirm. `Ok(false)` means the user said no.
    fn prompt_confirmation(&self, message: &str) -> Result<bool>;
}

// ── LogConsole ──

/// Routes messages through `tracing`, reads answers from stdin.
pub struct LogConsole {
    interactive: bool,
}

impl LogConsole {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl Console for LogConsole {
    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn progress(&self, message: &str) {
        tracing::info!(target: "ferry::progress", "{message}");
    }

    fn verbose(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn prompt_confirmation(&self, message: &str) -> Result<bool> {
        if !self.interactive {
            return Err(FerryError::validation(format!(
                "Cannot ask for confirmation ('{message}') on a non-interactive console"
            )));
        }
        let stdin = std::io::stdin();
        loop {
            print!("{message} [y/n] ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(false);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => continue,
            }
        }
    }
}

// ── PrefixConsole ──

/// Prepends a fixed prefix to progress messages of another console.
pub struct PrefixConsole<'a> {
    prefix: String,
    delegate: &'a dyn Console,
}

impl<'a> PrefixConsole<'a> {
    pub fn new(prefix: impl Into<String>, delegate: &'a dyn Console) -> Self {
        Self {
            prefix: prefix.into(),
            delegate,
        }
    }
}

impl Console for PrefixConsole<'_> {
    fn error(&self, message: &str) {
        self.delegate.error(message);
    }

    fn warn(&self, message: &str) {
        self.delegate.warn(message);
    }

    fn info(&self, message: &str) {
        self.delegate.info(message);
    }

    fn progress(&self, message: &str) {
        self.delegate.progress(&format!("{}{message}", self.prefix));
    }

    fn verbose(&self, message: &str) {
        self.delegate.verbose(message);
    }

    fn prompt_confirmation(&self, message: &str) -> Result<bool> {
        self.delegate.prompt_confirmation(message)
    }
}

// ── TestingConsole ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Error,
    Warning,
    Info,
    Progress,
    Verbose,
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub text: String,
}

/// Captures messages and answers prompts from a programmed queue.
#[derive(Default)]
pub struct TestingConsole {
    responses: Mutex<VecDeque<bool>>,
    messages: Mutex<Vec<Message>>,
}

impl TestingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_yes(self) -> Self {
        self.push_response(true);
        self
    }

    pub fn respond_no(self) -> Self {
        self.push_response(false);
        self
    }

    fn push_response(&self, answer: bool) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(answer);
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Texts of all messages of one kind, in order.
    pub fn texts(&self, kind: MessageType) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.text)
            .collect()
    }

    fn record(&self, kind: MessageType, text: &str) {
        if let Ok(mut m) = self.messages.lock() {
            m.push(Message {
                kind,
                text: text.to_string(),
            });
        }
    }
}

impl Console for TestingConsole {
    fn error(&self, message: &str) {
        self.record(MessageType::Error, message);
    }

    fn warn(&self, message: &str) {
        self.record(MessageType::Warning, message);
    }

    fn info(&self, message: &str) {
        self.record(MessageType::Info, message);
    }

    fn progress(&self, message: &str) {
        self.record(MessageType::Progress, message);
    }

    fn verbose(&self, message: &str) {
        self.record(MessageType::Verbose, message);
    }

    fn prompt_confirmation(&self, message: &str) -> Result<bool> {
        self.record(MessageType::Prompt, message);
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        next.ok_or_else(|| {
            FerryError::validation(format!("No more programmed responses for '{message}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_console_records_in_order() {
        let console = TestingConsole::new();
        console.info("one");
        console.warn("two");
        console.progress("three");
        let kinds: Vec<MessageType> = console.messages().iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MessageType::Info, MessageType::Warning, MessageType::Progress]
        );
    }

    #[test]
    fn programmed_responses_run_out() {
        let console = TestingConsole::new().respond_yes().respond_no();
        assert!(console.prompt_confirmation("first?").unwrap());
        assert!(!console.prompt_confirmation("second?").unwrap());
        assert!(console.prompt_confirmation("third?").is_err());
        assert_eq!(console.texts(MessageType::Prompt).len(), 3);
    }

    #[test]
    fn prefix_applies_to_progress_only() {
        let inner = TestingConsole::new();
        let console = PrefixConsole::new("[ 1/3] ", &inner);
        console.progress("Transform x");
        console.info("plain");
        assert_eq!(inner.texts(MessageType::Progress), vec!["[ 1/3] Transform x"]);
        assert_eq!(inner.texts(MessageType::Info), vec!["plain"]);
    }

    #[test]
    fn non_interactive_log_console_refuses_prompts() {
        let console = LogConsole::new(false);
        assert!(console.prompt_confirmation("proceed?").is_err());
    }
}
