use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Error,
    Warning,
    Verbose,
}

fn paint(style: Style, text: &str) -> String {
    match style {
        Style::Plain => text.to_string(),
        Style::Error => text.bright_red().to_string(),
        Style::Warning => text.bright_yellow().to_string(),
        Style::Verbose => text.cyan().to_string(),
    }
}

/// Line-oriented colored output shared across threads.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn write_line(&self, style: Style, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Console output is best effort, like println! without the panic.
        let _ = writeln!(out, "{}", paint(style, text));
        let _ = out.flush();
    }

    pub fn line(&self, text: &str) {
        self.write_line(Style::Plain, text);
    }

    pub fn error(&self, text: &str) {
        self.write_line(Style::Error, text);
    }

    pub fn warning(&self, text: &str) {
        self.write_line(Style::Warning, text);
    }

    pub fn verbose(&self, text: &str) {
        self.write_line(Style::Verbose, text);
    }
}

/// Enables ANSI escape processing for the lifetime of the guard.
pub struct VirtualTerminal {
    #[cfg(windows)]
    enabled: bool,
}

impl VirtualTerminal {
    #[cfg(windows)]
    pub fn enable() -> Self {
        Self {
            enabled: colored::control::set_virtual_terminal(true).is_ok(),
        }
    }

    #[cfg(not(windows))]
    pub fn enable() -> Self {
        Self {}
    }
}

impl Drop for VirtualTerminal {
    fn drop(&mut self) {
        #[cfg(windows)]
        if self.enabled {
            let _ = colored::control::set_virtual_terminal(false);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::buffered;
    use super::*;

    #[test]
    fn lines_keep_their_text_in_every_style() {
        let (console, buffer) = buffered();

        console.line("plain");
        console.error("broken");
        console.warning("careful");
        console.verbose("chatty");

        let text = buffer.contents();
        for word in ["plain", "broken", "careful", "chatty"] {
            assert!(text.contains(word));
        }
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn plain_style_is_unpainted() {
        assert_eq!(paint(Style::Plain, "x"), "x");
    }
}
