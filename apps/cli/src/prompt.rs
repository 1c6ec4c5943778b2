//! Terminal prompt.

use std::io::{BufRead, Write};

use avatar_batch_uploader::Prompt;

use crate::command::blocking;

/// Asks on stderr and reads the answer from stdin.
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

/// Interprets a typed answer; anything but an explicit yes is a no.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, title: &str, message: &str) -> bool {
        if self.assume_yes {
            tracing::info!(%title, "auto-confirmed: {message}");
            return true;
        }
        let ask = || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{title}\n{message} [y/N] ");
            let _ = stderr.flush();
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(_) => is_yes(&line),
                Err(_) => false,
            }
        };
        blocking(ask)
    }

    fn notify(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}
