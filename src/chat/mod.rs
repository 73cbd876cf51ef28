//! Terminal front end for the coding assistant.
//!
//! This module provides the pieces the `spurify-chat` binary is assembled from:
//!
//! - [`config`]: CLI argument parsing and the optional YAML configuration file
//! - [`commands`]: slash command parsing
//! - [`render`]: terminal output and the log observer that streams replies to it
//! - [`download`]: saving exported archives

mod commands;
mod config;
mod download;
mod render;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ConfigFile};
pub use download::save_download;
pub use render::{PlainTextRenderer, Renderer, TerminalView, render_history};
