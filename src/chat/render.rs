//! Output rendering for the chat application.
//!
//! [`Renderer`] abstracts the terminal; [`TerminalView`] watches the message log and turns each
//! new snapshot into renderer calls, printing only what was appended since the last one.

use std::io::{self, Stdout, Write};
use std::sync::Arc;

use crate::reconcile::{ERROR_NOTICE, LogObserver};
use crate::types::{Message, Role};

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for the banner).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for user turns).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a chunk of reply text as it streams in.
    fn print_text(&mut self, text: &str);

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Print a user message when replaying history.
    fn print_user(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print the welcome banner.
    fn print_banner(&mut self, banner: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn finish_response(&mut self) {
        println!();
        self.flush();
    }

    fn print_user(&mut self, text: &str) {
        if self.use_color {
            println!("{ANSI_CYAN}You:{ANSI_RESET} {text}");
        } else {
            println!("You: {text}");
        }
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}{error}{ANSI_RESET}");
        } else {
            eprintln!("{error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
    }

    fn print_banner(&mut self, banner: &str) {
        if self.use_color {
            println!("{ANSI_BOLD}{banner}{ANSI_RESET}");
        } else {
            println!("{banner}");
        }
    }
}

/// Print a restored conversation.
pub fn render_history(renderer: &mut dyn Renderer, messages: &[Message]) {
    for msg in messages {
        match msg.role {
            Role::User => renderer.print_user(&msg.text),
            Role::Assistant if msg.text == ERROR_NOTICE => renderer.print_error(&msg.text),
            Role::Assistant => {
                renderer.print_text(&msg.text);
                renderer.finish_response();
            }
        }
    }
}

/// Streams log changes to a [`Renderer`].
pub struct TerminalView<R: Renderer> {
    renderer: R,
    /// Messages already rendered in full.
    settled: usize,
    /// The streaming message and how many bytes of it are on screen.
    streaming: Option<(String, usize)>,
}

impl<R: Renderer> TerminalView<R> {
    /// Create a view that treats the first `already_shown` messages as rendered.
    pub fn new(renderer: R, already_shown: usize) -> Self {
        Self {
            renderer,
            settled: already_shown,
            streaming: None,
        }
    }
}

impl<R: Renderer> LogObserver for TerminalView<R> {
    fn log_changed(&mut self, messages: &Arc<Vec<Message>>) {
        if messages.len() < self.settled {
            self.settled = messages.len();
            self.streaming = None;
        }
        while let Some(msg) = messages.get(self.settled) {
            if msg.role == Role::User {
                self.settled += 1;
                continue;
            }
            let shown = match &self.streaming {
                Some((id, shown)) if *id == msg.id => *shown,
                _ => 0,
            };
            if msg.text == ERROR_NOTICE && !msg.in_progress {
                self.renderer.print_error(&msg.text);
            } else {
                let fresh = msg.text.get(shown..).unwrap_or("");
                if !fresh.is_empty() {
                    self.renderer.print_text(fresh);
                }
            }
            if msg.in_progress {
                self.streaming = Some((msg.id.clone(), msg.text.len()));
                break;
            }
            if shown > 0 || (!msg.text.is_empty() && msg.text != ERROR_NOTICE) {
                self.renderer.finish_response();
            }
            self.streaming = None;
            self.settled += 1;
        }
    }
}
