//! Thin terminal adapter over the chat core: a line-based REPL on stdin and
//! a renderer for the controller's event stream. Everything here is
//! presentation; the turn semantics live in `services::chat`.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::models::{Message, Role};
use crate::services::chat::{ChatController, UiEvent};
use crate::services::{Database, SettingsService, SharedSettings};

pub async fn run(
    mut controller: ChatController,
    events: mpsc::UnboundedReceiver<UiEvent>,
    settings: SharedSettings,
    db: Database,
) -> Result<()> {
    let renderer = tokio::spawn(render_events(events));

    println!("banter — type a message, or /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();

        match line.split_whitespace().next() {
            Some("/quit") => break,
            Some("/help") => print_help(),
            Some("/new") => controller.new_chat(),
            Some("/list") => {
                for summary in controller.list_conversations().await {
                    println!("{}  {}", summary.id, summary.title);
                }
            }
            Some("/open") => {
                if let Some(id) = line.split_whitespace().nth(1) {
                    controller.open_conversation(id).await;
                } else {
                    println!("usage: /open <id>");
                }
            }
            Some("/rename") => {
                let mut parts = line.splitn(3, ' ');
                match (parts.nth(1), parts.next()) {
                    (Some(id), Some(title)) => {
                        controller.rename_conversation(id, title).await;
                    }
                    _ => println!("usage: /rename <id> <title>"),
                }
            }
            Some("/delete") => {
                if let Some(id) = line.split_whitespace().nth(1) {
                    controller.delete_conversation(id).await;
                } else {
                    println!("usage: /delete <id>");
                }
            }
            Some("/prompt") => {
                let prompt = line["/prompt".len()..].trim();
                if prompt.is_empty() {
                    settings.set_system_prompt(None);
                    println!("system prompt cleared");
                } else {
                    settings.set_system_prompt(Some(prompt.to_string()));
                    println!("system prompt set");
                }
                if let Err(e) = SettingsService::save(&db, &settings.snapshot()).await {
                    tracing::error!("Failed to save settings: {}", e);
                }
            }
            _ => controller.submit(&line).await,
        }
    }

    drop(controller);
    let _ = renderer.await;
    Ok(())
}

fn print_help() {
    println!("/new              start a new conversation");
    println!("/list             list conversations");
    println!("/open <id>        open a conversation");
    println!("/rename <id> <t>  rename a conversation");
    println!("/delete <id>      delete a conversation");
    println!("/prompt [text]    set or clear the system prompt");
    println!("/quit             exit");
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("you: {}", message.content),
        Role::Assistant => println!("assistant: {}", message.content),
    }
}

/// Renders controller events: streams pending content as it grows, prints
/// assistant messages that never streamed (error fallbacks), and shows
/// request-level errors as a banner.
async fn render_events(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    let mut pending: Option<String> = None;
    let mut streamed: Option<String> = None;
    let mut seen = 0usize;

    while let Some(event) = events.recv().await {
        match event {
            UiEvent::PendingChanged(Some(message)) => {
                let printed = pending.as_deref().map_or(0, str::len);
                if message.content.len() > printed {
                    print!("{}", &message.content[printed..]);
                    let _ = std::io::stdout().flush();
                }
                pending = Some(message.content);
            }
            UiEvent::PendingChanged(None) => {
                if pending.is_some() {
                    println!();
                }
                streamed = pending.take();
            }
            UiEvent::MessagesChanged(messages) => {
                if messages.len() < seen {
                    seen = messages.len();
                    continue;
                }
                for message in &messages[seen..] {
                    // streamed content was already echoed delta by delta;
                    // anything else (history, error fallbacks) prints whole
                    if message.role == Role::Assistant
                        && streamed.as_deref() == Some(message.content.as_str())
                    {
                        streamed = None;
                        continue;
                    }
                    print_message(message);
                }
                seen = messages.len();
            }
            UiEvent::ErrorChanged(Some(error)) => {
                eprintln!("error: {}", error);
            }
            UiEvent::ErrorChanged(None)
            | UiEvent::LoadingChanged(_)
            | UiEvent::ConversationsChanged(_)
            | UiEvent::ScrollToBottom => {}
        }
    }
}
