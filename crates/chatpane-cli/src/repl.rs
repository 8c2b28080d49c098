use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use chatpane_core::logging::Diagnostics;
use chatpane_core::models::preferences::Theme;
use chatpane_core::models::{Conversation, ErrorLevel};
use chatpane_core::services::FALLBACK_REPLY;
use chatpane_core::{ChatController, ReplyEvent, SendOutcome, SessionEvent};

const HELP: &str = "\
Commands:
  /new                     start a new chat
  /list [query]            pinned and recent chats, optionally filtered
  /select <id>             switch chat (id prefix is enough)
  /pin <id>                pin or unpin a chat
  /history                 messages of the current chat
  /edit <msg-id> <text>    edit a message
  /resend <msg-id>         send a message again
  /editsend <msg-id> <text> edit a message and send it again
  /pause                   stop the reply in progress
  /personas                list personas
  /persona <id>            switch persona
  /folders                 folders with chat counts
  /folder <name>           create a folder
  /move <folder>           file the current chat under a folder
  /templates               list templates
  /template <n>            send template number n
  /theme light|dark|system set the theme preference
  /login <user>            sign in and load that user's chats
  /logout                  sign out and clear local chats
  /errors                  warnings and errors captured in the background
  /quit                    exit
Anything else is sent to the current chat.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    New,
    List(String),
    Select(String),
    Pin(String),
    History,
    Edit { message: String, content: String },
    Resend(String),
    EditAndResend { message: String, content: String },
    Pause,
    Personas,
    Persona(String),
    Folders,
    CreateFolder(String),
    Move(String),
    Templates,
    UseTemplate(usize),
    Theme(Option<Theme>),
    Login(String),
    Logout,
    Errors,
    Quit,
    Send(String),
    Empty,
    Invalid(String),
}

fn split_first(rest: &str) -> (&str, &str) {
    match rest.split_once(char::is_whitespace) {
        Some((first, tail)) => (first, tail.trim()),
        None => (rest, ""),
    }
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    let Some(body) = trimmed.strip_prefix('/') else {
        return Command::Send(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, rest) = split_first(body);
    let need_arg = |cmd: fn(String) -> Command| {
        if rest.is_empty() {
            Command::Invalid(format!("/{} needs an argument", name))
        } else {
            cmd(rest.to_string())
        }
    };

    match name {
        "help" | "?" => Command::Help,
        "new" => Command::New,
        "list" => Command::List(rest.to_string()),
        "select" => need_arg(Command::Select),
        "pin" => need_arg(Command::Pin),
        "history" => Command::History,
        "edit" | "editsend" => {
            let (message, content) = split_first(rest);
            if message.is_empty() || content.is_empty() {
                return Command::Invalid(format!("usage: /{} <msg-id> <text>", name));
            }
            let (message, content) = (message.to_string(), content.to_string());
            if name == "edit" {
                Command::Edit { message, content }
            } else {
                Command::EditAndResend { message, content }
            }
        }
        "resend" => need_arg(Command::Resend),
        "pause" => Command::Pause,
        "personas" => Command::Personas,
        "persona" => need_arg(Command::Persona),
        "folders" => Command::Folders,
        "folder" => need_arg(Command::CreateFolder),
        "move" => need_arg(Command::Move),
        "templates" => Command::Templates,
        "template" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Command::UseTemplate(n),
            _ => Command::Invalid("usage: /template <n>".to_string()),
        },
        "theme" => match rest {
            "light" => Command::Theme(Some(Theme::Light)),
            "dark" => Command::Theme(Some(Theme::Dark)),
            "system" => Command::Theme(None),
            _ => Command::Invalid("usage: /theme light|dark|system".to_string()),
        },
        "login" => need_arg(Command::Login),
        "logout" => Command::Logout,
        "errors" => Command::Errors,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{}, try /help", other)),
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn describe(conversation: &Conversation, active: Option<&str>) -> String {
    let marker = if Some(conversation.id()) == active { '*' } else { ' ' };
    format!(
        "{} [{}] {} ({} msgs, {}) {}",
        marker,
        short(conversation.id()),
        conversation.title(),
        conversation.message_count(),
        conversation.folder(),
        conversation.preview()
    )
}

/// Resolve an id prefix against a set of ids; ambiguous prefixes fail.
fn resolve_prefix<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> Option<String> {
    let mut matches = ids.filter(|id| id.starts_with(prefix));
    let first = matches.next()?;
    match matches.next() {
        Some(_) => None,
        None => Some(first.to_string()),
    }
}

fn conversation_id(controller: &ChatController, prefix: &str) -> Option<String> {
    let store = controller.store().lock();
    resolve_prefix(store.conversations().iter().map(|c| c.id()), prefix)
}

fn message_id(controller: &ChatController, prefix: &str) -> Option<(String, String)> {
    let selected = controller.selected()?;
    let id = resolve_prefix(selected.messages().iter().map(|m| m.id.as_str()), prefix)?;
    Some((selected.id().to_string(), id))
}

fn report(outcome: SendOutcome) {
    if outcome.is_ignored() {
        println!("(nothing sent)");
    }
}

/// Read commands from stdin until `/quit` or end of input.
pub async fn run(
    controller: &ChatController,
    diagnostics: &Diagnostics,
    session: mpsc::Sender<SessionEvent>,
) -> Result<()> {
    println!(
        "chatpane: chatting as {}. Type /help for commands.",
        controller.current_persona().name
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Empty => {}
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Send(content) => report(controller.send(&content)),
            Command::New => {
                let id = controller.create_chat();
                println!("New chat [{}]", short(&id));
            }
            Command::List(query) => {
                let active = controller.store().lock().active_id().map(str::to_string);
                let pinned = controller.pinned(&query);
                if !pinned.is_empty() {
                    println!("Pinned:");
                    for c in &pinned {
                        println!("{}", describe(c, active.as_deref()));
                    }
                }
                println!("Recent:");
                for c in controller.recent(&query) {
                    println!("{}", describe(&c, active.as_deref()));
                }
            }
            Command::Select(prefix) => match conversation_id(controller, &prefix) {
                Some(id) if controller.select(&id) => println!("Switched to [{}]", short(&id)),
                _ => println!("No single chat matches '{}'", prefix),
            },
            Command::Pin(prefix) => match conversation_id(controller, &prefix) {
                Some(id) if controller.toggle_pin(&id) => println!("Toggled pin on [{}]", short(&id)),
                _ => println!("No single chat matches '{}'", prefix),
            },
            Command::History => match controller.selected() {
                Some(conversation) => {
                    for m in conversation.messages() {
                        let edited = if m.edited_at.is_some() { " (edited)" } else { "" };
                        println!("[{}] {}{}: {}", short(&m.id), m.role, edited, m.content);
                    }
                    if controller.engine().is_generating(conversation.id()) {
                        println!("(reply in progress, /pause to stop)");
                    }
                }
                None => println!("No chat selected"),
            },
            Command::Edit { message, content } => match message_id(controller, &message) {
                Some((conv, id)) if controller.edit_message(&conv, &id, &content) => {
                    println!("Edited [{}]", short(&id))
                }
                _ => println!("No single message matches '{}'", message),
            },
            Command::Resend(message) => match message_id(controller, &message) {
                Some((conv, id)) => report(controller.resend(&conv, &id)),
                None => println!("No single message matches '{}'", message),
            },
            Command::EditAndResend { message, content } => match message_id(controller, &message) {
                Some((conv, id)) => report(controller.edit_and_resend(&conv, &id, &content)),
                None => println!("No single message matches '{}'", message),
            },
            Command::Pause => {
                if !controller.pause() {
                    println!("Nothing to pause");
                }
            }
            Command::Personas => {
                let current = controller.current_persona().id;
                for p in controller.personas() {
                    let marker = if p.id == current { '*' } else { ' ' };
                    println!("{} {} {} - {} ({})", marker, p.icon, p.id, p.name, p.description);
                }
            }
            Command::Persona(id) => {
                if controller.change_persona(&id).await {
                    println!("Now chatting as {}", controller.current_persona().name);
                } else {
                    println!("Unknown persona '{}'", id);
                }
            }
            Command::Folders => {
                let counts = controller.folder_counts();
                for folder in controller.folders() {
                    let count = counts.get(&folder.name).copied().unwrap_or(0);
                    println!("  {} ({})", folder.name, count);
                }
            }
            Command::CreateFolder(name) => match controller.create_folder(&name) {
                Ok(folder) => println!("Created folder {}", folder.name),
                Err(e) => println!("{}", e),
            },
            Command::Move(folder) => {
                let selected = controller.selected().map(|c| c.id().to_string());
                match selected {
                    Some(id) if controller.move_to_folder(&id, &folder) => {
                        println!("Moved to {}", folder)
                    }
                    _ => println!("No chat selected"),
                }
            }
            Command::Templates => {
                for (i, t) in controller.templates().iter().enumerate() {
                    println!("  {}. {}: {}", i + 1, t.name, t.snippet.replace('\n', " "));
                }
            }
            Command::UseTemplate(n) => match controller.templates().get(n - 1) {
                Some(template) => report(controller.send(&template.content)),
                None => println!("No template {}", n),
            },
            Command::Theme(theme) => {
                controller.set_theme(theme).await;
                println!("Theme set to {}", theme.map(Theme::as_str).unwrap_or("system"));
            }
            Command::Login(user) => session.send(SessionEvent::SignedIn(user)).await?,
            Command::Logout => session.send(SessionEvent::SignedOut).await?,
            Command::Errors => {
                let entries = diagnostics.entries();
                if entries.is_empty() {
                    println!("No warnings or errors");
                }
                for entry in entries {
                    let level = match entry.level {
                        ErrorLevel::Error => "ERROR",
                        ErrorLevel::Warning => "WARN",
                    };
                    let mut fields: Vec<String> =
                        entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    fields.sort();
                    println!("{} {} {} {}", level, entry.target, entry.message, fields.join(" "));
                }
            }
            Command::Invalid(message) => println!("{}", message),
        }
    }
    Ok(())
}

/// Turns reply events into terminal output, tracking how much of each
/// reply has been printed.
#[derive(Debug, Default)]
struct ReplyPrinter {
    printed: HashMap<String, usize>,
}

impl ReplyPrinter {
    fn render(&mut self, event: ReplyEvent) -> String {
        match event {
            ReplyEvent::Started { message_id, .. } => {
                self.printed.insert(message_id, 0);
                "assistant> ".to_string()
            }
            ReplyEvent::Delta {
                message_id, text, ..
            } => {
                let done = self.printed.entry(message_id).or_insert(0);
                let fresh = text.get(*done..).unwrap_or_default().to_string();
                *done = text.len();
                fresh
            }
            ReplyEvent::Completed { message_id, .. } => {
                self.printed.remove(&message_id);
                "\n".to_string()
            }
            ReplyEvent::Cancelled { message_id, .. } => {
                self.forget(message_id);
                " [paused]\n".to_string()
            }
            ReplyEvent::Failed { message_id, .. } => {
                self.forget(message_id);
                format!("\nassistant> {}\n", FALLBACK_REPLY)
            }
        }
    }

    fn forget(&mut self, message_id: Option<String>) {
        if let Some(id) = message_id {
            self.printed.remove(&id);
        }
    }

    fn in_progress(&self) -> usize {
        self.printed.len()
    }
}

/// Print assistant replies as they stream in.
pub async fn print_replies(mut events: broadcast::Receiver<ReplyEvent>) {
    let mut printer = ReplyPrinter::default();
    let mut stdout = std::io::stdout();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        print!("{}", printer.render(event));
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(parse_command("hello there"), Command::Send("hello there".to_string()));
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(parse_command("/select ab12"), Command::Select("ab12".to_string()));
        assert_eq!(
            parse_command("/edit ab12 new words here"),
            Command::Edit {
                message: "ab12".to_string(),
                content: "new words here".to_string()
            }
        );
        assert_eq!(parse_command("/template 2"), Command::UseTemplate(2));
        assert_eq!(parse_command("/theme system"), Command::Theme(None));
        assert_eq!(parse_command("/list"), Command::List(String::new()));
    }

    #[test]
    fn test_invalid_commands() {
        assert!(matches!(parse_command("/select"), Command::Invalid(_)));
        assert!(matches!(parse_command("/edit ab12"), Command::Invalid(_)));
        assert!(matches!(parse_command("/template 0"), Command::Invalid(_)));
        assert!(matches!(parse_command("/frobnicate"), Command::Invalid(_)));
    }

    #[test]
    fn test_resolve_prefix() {
        let ids = ["abc123", "abd456", "xyz789"];
        assert_eq!(resolve_prefix(ids.iter().copied(), "abc"), Some("abc123".to_string()));
        assert_eq!(resolve_prefix(ids.iter().copied(), "ab"), None);
        assert_eq!(resolve_prefix(ids.iter().copied(), "q"), None);
    }

    fn delta(text: &str) -> ReplyEvent {
        ReplyEvent::Delta {
            conv_id: "c1".to_string(),
            message_id: "m1".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_printer_prints_only_new_text() {
        let mut printer = ReplyPrinter::default();
        let started = ReplyEvent::Started {
            conv_id: "c1".to_string(),
            message_id: "m1".to_string(),
        };
        assert_eq!(printer.render(started), "assistant> ");
        assert_eq!(printer.render(delta("Hi")), "Hi");
        assert_eq!(printer.render(delta("Hi there")), " there");
        let completed = ReplyEvent::Completed {
            conv_id: "c1".to_string(),
            message_id: "m1".to_string(),
        };
        assert_eq!(printer.render(completed), "\n");
        assert_eq!(printer.in_progress(), 0);
    }

    #[test]
    fn test_printer_forgets_cancelled_and_failed_replies() {
        let mut printer = ReplyPrinter::default();
        for id in ["m1", "m2"] {
            printer.render(ReplyEvent::Started {
                conv_id: "c1".to_string(),
                message_id: id.to_string(),
            });
        }
        assert_eq!(printer.in_progress(), 2);

        printer.render(ReplyEvent::Cancelled {
            conv_id: "c1".to_string(),
            message_id: Some("m1".to_string()),
        });
        let failed = printer.render(ReplyEvent::Failed {
            conv_id: "c1".to_string(),
            message_id: Some("m2".to_string()),
            error: "boom".to_string(),
        });
        assert!(failed.contains(FALLBACK_REPLY));
        assert_eq!(printer.in_progress(), 0);
    }
}
