//! Printers: status lines on stderr, colored when attached to a terminal.

use std::io;

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

pub struct StatusPrinter {
    pub color: bool,
}

impl Default for StatusPrinter {
    fn default() -> Self {
        Self { color: io::stderr().is_terminal() }
    }
}

impl StatusPrinter {
    pub fn ok(&self, text: &str) {
        if self.color {
            eprintln!("{}", text.green());
        } else {
            eprintln!("{}", text);
        }
    }

    pub fn warn(&self, text: &str) {
        if self.color {
            eprintln!("{}", text.yellow());
        } else {
            eprintln!("{}", text);
        }
    }

    pub fn error(&self, text: &str) {
        if self.color {
            eprintln!("{}", text.red());
        } else {
            eprintln!("{}", text);
        }
    }
}
