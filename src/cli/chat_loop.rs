//! Interactive line-oriented chat shell.
//!
//! A thin layer over [`ConversationEngine`]: plain input sends a message
//! to the current session, `/`-prefixed commands map one-to-one onto
//! engine operations. Engine errors are printed as one-line notices;
//! nothing here exits the process except /quit or end of input.

use std::error::Error;
use std::io::{self, BufRead, Write};

use crate::core::engine::{ConversationEngine, CreateOutcome, EngineError, CONFIG_KEYS};
use crate::core::message::{Message, Role};

/// One user intent, parsed from a line of input. Message indices are
/// 1-based as displayed by /history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Send(String),
    ListSessions,
    NewSession(Option<String>),
    SwitchSession(String),
    DeleteSession(String),
    History,
    EditMessage { index: usize, content: String },
    RemoveMessage { index: usize },
    ShowConfig,
    SetConfig { key: String, value: String },
    Help,
    Quit,
    Invalid(String),
}

/// Parse a line of shell input. Returns `None` for blank lines.
pub fn parse_line(line: &str) -> Option<ShellCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(ShellCommand::Send(line.to_string()));
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let parsed = match command {
        "sessions" => ShellCommand::ListSessions,
        "new" => ShellCommand::NewSession(arg.map(str::to_string)),
        "switch" => match arg {
            Some(name) => ShellCommand::SwitchSession(name.to_string()),
            None => ShellCommand::Invalid("usage: /switch <name>".to_string()),
        },
        "delete" => match arg {
            Some(name) => ShellCommand::DeleteSession(name.to_string()),
            None => ShellCommand::Invalid("usage: /delete <name>".to_string()),
        },
        "history" => ShellCommand::History,
        "edit" => match arg.and_then(split_index_arg) {
            Some((index, content)) if !content.is_empty() => ShellCommand::EditMessage {
                index,
                content: content.to_string(),
            },
            _ => ShellCommand::Invalid("usage: /edit <n> <new text>".to_string()),
        },
        "remove" => match arg.and_then(parse_index) {
            Some(index) => ShellCommand::RemoveMessage { index },
            None => ShellCommand::Invalid("usage: /remove <n>".to_string()),
        },
        "config" => ShellCommand::ShowConfig,
        "set" => match arg.map(|a| {
            let mut kv = a.splitn(2, char::is_whitespace);
            (
                kv.next().unwrap_or("").to_string(),
                kv.next().map(str::trim).unwrap_or("").to_string(),
            )
        }) {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                ShellCommand::SetConfig { key, value }
            }
            _ => ShellCommand::Invalid(format!(
                "usage: /set <key> <value> (keys: {})",
                CONFIG_KEYS.join(", ")
            )),
        },
        "help" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => ShellCommand::Invalid(format!("Unknown command: /{other} (try /help)")),
    };
    Some(parsed)
}

/// Parse a 1-based message index as displayed by /history.
fn parse_index(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn split_index_arg(arg: &str) -> Option<(usize, &str)> {
    let mut parts = arg.splitn(2, char::is_whitespace);
    let index = parse_index(parts.next()?)?;
    Some((index, parts.next().map(str::trim).unwrap_or("")))
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run(engine: &mut ConversationEngine) -> Result<(), Box<dyn Error>> {
    println!("deepchat — type a message to send it, /help for commands");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("[{}] > ", engine.current_session());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let Some(command) = parse_line(&line) else {
            continue;
        };

        if matches!(execute(engine, command).await, Flow::Quit) {
            break;
        }
    }

    println!("Bye!");
    Ok(())
}

async fn execute(engine: &mut ConversationEngine, command: ShellCommand) -> Flow {
    match command {
        ShellCommand::Send(text) => {
            println!("Sending...");
            let reply = engine.send_message(&text).await;
            render_message(&reply);
        }
        ShellCommand::ListSessions => {
            let current = engine.current_session().to_string();
            for name in engine.session_names() {
                if name == current {
                    println!("{name} [current]");
                } else {
                    println!("{name}");
                }
            }
        }
        ShellCommand::NewSession(name) => match engine.create_session(name.as_deref()) {
            CreateOutcome::Created(name) => println!("Session '{name}' created"),
            CreateOutcome::Exists(name) => println!("Session '{name}' already exists"),
        },
        ShellCommand::SwitchSession(name) => report(
            engine
                .switch_session(&name)
                .map(|()| format!("Switched to session '{name}'")),
        ),
        ShellCommand::DeleteSession(name) => report(
            engine
                .delete_session(&name)
                .map(|()| format!("Session '{name}' deleted")),
        ),
        ShellCommand::History => print_history(engine),
        ShellCommand::EditMessage { index, content } => {
            let session = engine.current_session().to_string();
            report(
                engine
                    .edit_message(&session, index - 1, &content)
                    .map(|()| format!("Message {index} updated")),
            );
        }
        ShellCommand::RemoveMessage { index } => {
            let session = engine.current_session().to_string();
            report(
                engine
                    .delete_message(&session, index - 1)
                    .map(|_| format!("Message {index} deleted")),
            );
        }
        ShellCommand::ShowConfig => super::print_config(engine.config()),
        ShellCommand::SetConfig { key, value } => {
            report(engine.update_config(&key, &value).map(|()| format!("{key} updated")))
        }
        ShellCommand::Help => print_help(),
        ShellCommand::Invalid(notice) => println!("{notice}"),
        ShellCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn report(result: Result<String, EngineError>) {
    match result {
        Ok(notice) => println!("{notice}"),
        Err(e) => println!("{e}"),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

fn render_message(message: &Message) {
    println!("{}: {}", role_label(message.role), message.content);
}

fn print_history(engine: &ConversationEngine) {
    let messages = engine.current_messages();
    if messages.is_empty() {
        println!("(no messages in '{}')", engine.current_session());
        return;
    }
    for (i, message) in messages.iter().enumerate() {
        println!("[{}] {}: {}", i + 1, role_label(message.role), message.content);
        if let Some(timestamp) = &message.timestamp {
            println!("    {timestamp}");
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /sessions         List sessions");
    println!("  /new [name]       Create a session (timestamped name if omitted)");
    println!("  /switch <name>    Switch to a session");
    println!("  /delete <name>    Delete a session");
    println!("  /history          Show the current session transcript");
    println!("  /edit <n> <text>  Replace the content of message n");
    println!("  /remove <n>       Delete message n");
    println!("  /config           Show the configuration");
    println!("  /set <key> <val>  Update one configuration value");
    println!("  /quit             Exit");
    println!("Anything else is sent to the model as a message.");
}
