//! Slash command parsing for the chat application.
//!
//! Input starting with `/` controls the conversation instead of being sent to the model.

use crate::types::ModelVariant;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new chat with the current model.
    New,

    /// Switch to another model.  Empties the conversation.
    Model(ModelVariant),

    /// List the available models.
    Models,

    /// Export the code in the conversation, optionally to a given directory.
    Export(Option<String>),

    /// Display session statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated as a
/// regular message.
///
/// # Examples
///
/// ```
/// # use spurify::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model flash").is_some());
/// assert!(parse_command("Write me a parser").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" | "clear" => ChatCommand::New,
        "model" => match argument {
            Some(name) => match name.parse::<ModelVariant>() {
                Ok(model) => ChatCommand::Model(model),
                Err(err) => ChatCommand::Invalid(format!("{err} (see /models)")),
            },
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "models" => ChatCommand::Models,
        "export" | "download" => ChatCommand::Export(argument.map(|s| s.to_string())),
        "stats" | "status" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new chat (alias: /clear)
  /model <name>          Switch model: pro, flash, or thinking (clears the chat)
  /models                List available models
  /export [dir]          Save the code in this chat as spurify_code.zip
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat"#
}
