//! Command queue: shell-command accumulation with
//! variable indirection, used by the network builder and lifecycle
//! engine to build the bodies of the six hook scripts. A command
//! queue is plain text, not executed directly — it becomes one
//! section of a generated shell script.

use std::fmt::Write as _;

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    lines: Vec<String>,
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue::default()
    }

    pub fn push(&mut self, command: impl Into<String>) -> &mut Self {
        self.lines.push(command.into());
        self
    }

    pub fn push_commented(&mut self, comment: &str, command: impl Into<String>) -> &mut Self {
        self.lines.push(format!("# {comment}"));
        self.lines.push(command.into());
        self
    }

    /// Capture `command`'s stdout into shell variable `var_name`, for
    /// values only known at script-runtime (e.g. `$IOCAGE_NIC_<nic>`
    /// assigned by `ifconfig epair create`).
    pub fn capture(&mut self, var_name: &str, command: &str) -> &mut Self {
        self.lines.push(format!("{var_name}=$({command})"));
        self
    }

    pub fn extend(&mut self, other: CommandQueue) -> &mut Self {
        self.lines.extend(other.lines);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

/// Shell-quote `value` for safe interpolation into a single-quoted
/// argument position.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_push_order() {
        let mut q = CommandQueue::new();
        q.push("echo one").push("echo two");
        assert_eq!(q.render(), "echo one\necho two\n");
    }

    #[test]
    fn capture_assigns_variable() {
        let mut q = CommandQueue::new();
        q.capture("IOCAGE_NIC_vnet0", "ifconfig epair create");
        assert_eq!(q.render(), "IOCAGE_NIC_vnet0=$(ifconfig epair create)\n");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
