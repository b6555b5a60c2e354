//! Terminal output of deploy runs.

use crate::deploy::{Reporter, Status};
use clap::builder::styling::{Ansi256Color, Color, Style};

/// xterm 39 on 128, the highlight used for deployed addresses.
pub const ADDRESS_STYLE: Style = Style::new()
    .fg_color(Some(Color::Ansi256(Ansi256Color(39))))
    .bg_color(Some(Color::Ansi256(Ansi256Color(128))));

/// Prints status lines to stdout and verification errors to stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn render(&self, status: &Status) -> String {
        match status {
            Status::Deployed { contract, address } if self.color => {
                format!("{contract} deployed to: {ADDRESS_STYLE}{address}{ADDRESS_STYLE:#}")
            }
            other => other.to_string(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, status: &Status) {
        let line = self.render(status);
        if status.is_error() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}
