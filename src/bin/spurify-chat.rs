//! Interactive coding-assistant chat in the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Resume the saved conversation with the last selected model
//! API_KEY=... spurify-chat
//!
//! # Start with a specific model
//! spurify-chat --model flash
//!
//! # Keep state somewhere else and write exports to ~/Downloads
//! spurify-chat --data-dir /tmp/spurify --export-dir ~/Downloads
//!
//! # Read defaults from a YAML file
//! spurify-chat --config spurify.yaml
//! ```
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/new` - Start a new chat
//! - `/model <name>` - Switch model (clears the chat)
//! - `/models` - List models
//! - `/export [dir]` - Save the code from this chat as a zip archive
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::path::PathBuf;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use spurify::chat::{
    ChatArgs, ChatCommand, ChatConfig, PlainTextRenderer, Renderer, TerminalView, help_text,
    parse_command, render_history, save_download,
};
use spurify::{
    ARCHIVE_NAME, Conversation, Export, FileStore, ModelVariant, Persistence, ReplyOutcome,
    SessionManager,
};

/// Main entry point for the spurify-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("spurify-chat [OPTIONS]");
    let config = ChatConfig::resolve(args)?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let persistence = Persistence::new(Arc::new(FileStore::new(&config.data_dir)));
    let mut conversation = match Conversation::open(SessionManager::gemini(None), persistence) {
        Ok(conversation) => conversation,
        Err(err) => {
            renderer.print_error(&err.to_string());
            std::process::exit(1);
        }
    };
    if let Some(model) = config.model {
        conversation.switch_model(model)?;
    }

    let model = conversation.model();
    renderer.print_banner(&format!(
        "Spurify Code ({}). Describe what to build, then /export the code.",
        model.display_name()
    ));
    renderer.print_info("Type /help for commands, /quit to exit\n");
    let history = conversation.messages();
    render_history(&mut renderer, &history);
    conversation.subscribe(Box::new(TerminalView::new(
        PlainTextRenderer::with_color(config.use_color),
        history.len(),
    )));

    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let Some(cmd) = parse_command(line) else {
            match conversation.submit(line).await {
                Ok(ReplyOutcome::Completed | ReplyOutcome::Orphaned) => {}
                Ok(ReplyOutcome::Failed(err)) => tracing::debug!(error = %err, "reply failed"),
                Err(err) => renderer.print_error(&err.to_string()),
            }
            continue;
        };
        match cmd {
            ChatCommand::Quit => {
                println!("Goodbye!");
                break;
            }
            ChatCommand::New => match conversation.clear() {
                Ok(()) => renderer.print_info("Started a new chat."),
                Err(err) => renderer.print_error(&err.to_string()),
            },
            ChatCommand::Model(model) => {
                if model == conversation.model() {
                    renderer.print_info(&format!("Already using {}.", model.display_name()));
                    continue;
                }
                match conversation.switch_model(model) {
                    Ok(()) => renderer.print_info(&format!(
                        "Switched to {}. Started a new chat.",
                        model.display_name()
                    )),
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            ChatCommand::Models => print_models(conversation.model()),
            ChatCommand::Export(dir) => {
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| config.export_dir.clone());
                export(&conversation, &dir, &mut renderer);
            }
            ChatCommand::Stats => print_stats(&conversation, &config),
            ChatCommand::Help => {
                for line in help_text().lines() {
                    println!("    {line}");
                }
            }
            ChatCommand::Invalid(message) => renderer.print_error(&message),
        }
    }

    conversation.close().await;
    Ok(())
}

fn export(conversation: &Conversation, dir: &std::path::Path, renderer: &mut dyn Renderer) {
    match conversation.export_code() {
        Ok(Export::Nothing) => renderer.print_info("No code blocks found in this chat."),
        Ok(Export::Archive(blob)) => match save_download(dir, &blob, ARCHIVE_NAME) {
            Ok(path) => renderer.print_info(&format!("Saved {}", path.display())),
            Err(err) => renderer.print_error(&format!("Failed to save archive: {err}")),
        },
        Err(err) => renderer.print_error(&format!("Failed to package code: {err}")),
    }
}

fn print_models(current: ModelVariant) {
    println!("    Models:");
    for model in ModelVariant::ALL {
        let marker = if model == current { "*" } else { " " };
        println!(
            "    {marker} {:<9} {:<17} {}",
            model.short_name(),
            model.display_name(),
            model.description()
        );
    }
}

fn print_stats(conversation: &Conversation, config: &ChatConfig) {
    let messages = conversation.messages();
    let replies = messages
        .iter()
        .filter(|msg| msg.role == spurify::Role::Assistant)
        .count();
    println!("    Session Statistics:");
    println!("      Model: {} ({})", conversation.model().display_name(), conversation.model());
    println!("      Messages: {} ({} replies)", messages.len(), replies);
    println!("      Data directory: {}", config.data_dir.display());
    println!("      Export directory: {}", config.export_dir.display());
}
