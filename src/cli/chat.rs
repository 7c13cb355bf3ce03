use std::sync::Arc;

use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::auth::SqliteAccounts;
use crate::chat::{Chat, ChatError, PersonaRegistry, SqliteStore, Transcript, provider_from_config};
use crate::core::{AppConfig, db::async_db};

use super::account::login;
use super::history::preview;

const NO_PERSONA: &str = "none";

/// Slash commands understood by the interactive chat. Anything else is
/// sent to the assistant.
#[derive(Debug, PartialEq)]
enum Command<'a> {
    New,
    History,
    Search(&'a str),
    Open(&'a str),
    Persona(&'a str),
    Personas,
    Help,
    Quit,
    Unknown(&'a str),
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Say(line);
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "new" => Command::New,
            "history" => Command::History,
            "search" => Command::Search(arg),
            "open" => Command::Open(arg),
            "persona" => Command::Persona(arg),
            "personas" => Command::Personas,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(name),
        }
    }
}

fn print_help() {
    println!("/new               save and start a new conversation");
    println!("/history           list saved conversations");
    println!("/search <keyword>  search saved conversations");
    println!("/open <id>         continue a saved conversation");
    println!("/persona <name>    start over with another persona, \"none\" for no system message");
    println!("/personas          list personas");
    println!("/quit              save and exit");
}

fn print_transcript(transcript: &Transcript) {
    for msg in transcript.iter() {
        match msg.timestamp() {
            Some(ts) => println!(
                "{} [{:?}] {}",
                ts.format("%Y-%m-%d %H:%M"),
                msg.role(),
                msg.content()
            ),
            None => println!("[{:?}] {}", msg.role(), msg.content()),
        }
    }
}

pub async fn run(config: AppConfig, persona: Option<String>, handle: Option<String>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let personas = PersonaRegistry::new(&config.assistant_name, &config.system_message);

    let mut builder = Chat::builder(provider_from_config(&config));
    match persona.or(config.default_persona.clone()) {
        Some(name) if name.eq_ignore_ascii_case(NO_PERSONA) => {}
        Some(name) => builder = builder.persona(personas.get(&name)?),
        None => {}
    }

    if let Some(handle) = handle {
        std::fs::create_dir_all(&config.db_path)?;
        let db = async_db(&config.db_path).await?;
        let identity = login(&SqliteAccounts::new(&db), &handle).await?;
        builder = builder
            .identity(identity)
            .store(Arc::new(SqliteStore::new(&db)));
    }
    let mut chat = builder.build();

    match chat.identity().handle() {
        Some(handle) => println!("Chatting as {}. Type /help for commands.", handle),
        None => println!("Chatting as a guest, nothing will be saved. Type /help for commands."),
    }

    loop {
        let line = match rl.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                tracing::error!("Readline failed: {:?}", err);
                break;
            }
        };
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line.as_str());
        }

        match Command::parse(&line) {
            Command::Say(text) => match chat.submit(text).await {
                Ok(reply) => {
                    println!("{}", reply.message.content());
                    if let Some(warning) = reply.warning {
                        tracing::warn!("Conversation not saved: {}", warning);
                    }
                }
                Err(ChatError::InputRejected) => {}
                Err(e) => tracing::error!("{}", e),
            },
            Command::New => {
                if let Some(warning) = chat.new_chat().await {
                    tracing::warn!("Conversation not saved: {}", warning);
                }
                println!("Started a new conversation");
            }
            Command::History => match chat.history().await {
                Ok(snapshots) if snapshots.is_empty() => println!("No saved conversations"),
                Ok(snapshots) => {
                    for snapshot in snapshots {
                        let opening = snapshot
                            .transcript
                            .iter()
                            .find(|m| m.role() == crate::chat::Role::User)
                            .map(|m| preview(m.content(), 60))
                            .unwrap_or_default();
                        println!("{}  {}", snapshot.meta.id, opening);
                    }
                }
                Err(e) => tracing::error!("{}", e),
            },
            Command::Search(keyword) => match chat.search(keyword).await {
                Ok(hits) if hits.is_empty() => println!("No matches"),
                Ok(hits) => {
                    for hit in hits {
                        println!("{}  {}", hit.snapshot.id, preview(hit.message.content(), 80));
                    }
                }
                Err(e) => tracing::error!("{}", e),
            },
            Command::Open(id) => match chat.resume(id).await {
                Ok(warning) => {
                    if let Some(warning) = warning {
                        tracing::warn!("Conversation not saved: {}", warning);
                    }
                    print_transcript(chat.transcript());
                }
                Err(e) => tracing::error!("{}", e),
            },
            Command::Persona(name) => {
                let persona = if name.is_empty() {
                    eprintln!("Usage: /persona <name>");
                    continue;
                } else if name.eq_ignore_ascii_case(NO_PERSONA) {
                    None
                } else {
                    match personas.get(name) {
                        Ok(persona) => Some(persona),
                        Err(e) => {
                            tracing::error!("{}", e);
                            continue;
                        }
                    }
                };
                if let Some(warning) = chat.switch_persona(persona).await {
                    tracing::warn!("Conversation not saved: {}", warning);
                }
                println!("Started a new conversation");
            }
            Command::Personas => {
                for name in personas.names() {
                    println!("{}", name);
                }
            }
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Unknown(name) => eprintln!("Unknown command /{}", name),
        }
    }

    // Keep the last exchange when leaving
    if let Some(warning) = chat.new_chat().await {
        return Err(anyhow!("Conversation was not saved: {}", warning));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/new"), Command::New);
        assert_eq!(Command::parse("  /history "), Command::History);
        assert_eq!(Command::parse("/search rust lang"), Command::Search("rust lang"));
        assert_eq!(Command::parse("/open abc"), Command::Open("abc"));
        assert_eq!(Command::parse("/persona tutor"), Command::Persona("tutor"));
        assert_eq!(Command::parse("/persona"), Command::Persona(""));
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/nope"), Command::Unknown("nope"));
    }

    #[test]
    fn test_plain_text_is_sent_as_is() {
        assert_eq!(Command::parse("hello /there"), Command::Say("hello /there"));
        assert_eq!(Command::parse("  "), Command::Say("  "));
    }
}
