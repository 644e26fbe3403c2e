//! Matcha Simulator
//!
//! Seeds a small world, connects to a bot program and lets you act as its
//! users from the console.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package matcha-simulator -- --url ws://127.0.0.1:8080/onebot/v11/ws
//! ```
//!
//! # Commands
//!
//! ```text
//! say <user> <text>            private message from <user> to the bot
//! group <group> <user> <text>  group message
//! poke <user>                  <user> pokes the bot
//! friend <user> [comment]      <user> asks to befriend the bot
//! bot <id> | bot none          log in as another bot
//! protocol v11|v12             switch the protocol binding
//! log                          print the chat log
//! quit
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use matcha::core::{Friend, MemoryStore};
use matcha::prelude::*;
use matcha::runtime::BotConfig;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "matcha", about = "Chat platform simulator for OneBot bot programs")]
struct Args {
    /// Configuration file (defaults to ./matcha.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `dev` loads matcha.dev.toml on top.
    #[arg(long)]
    profile: Option<String>,

    /// Override `connect.url`.
    #[arg(long)]
    url: Option<String>,

    /// Override `connect.protocol`.
    #[arg(long, value_parser = parse_protocol)]
    protocol: Option<ProtocolKind>,
}

fn parse_protocol(value: &str) -> Result<ProtocolKind, String> {
    match value {
        "v11" | "onebot-v11" => Ok(ProtocolKind::OnebotV11),
        "v12" | "onebot-v12" => Ok(ProtocolKind::OnebotV12),
        other => Err(format!("unknown protocol '{other}', expected v11 or v12")),
    }
}

// ============================================================================
// Console commands
// ============================================================================

#[derive(Debug, PartialEq)]
enum Command {
    Say { user: String, text: String },
    Group { group: String, user: String, text: String },
    Poke { user: String },
    Friend { user: String, comment: String },
    Bot(Option<String>),
    Protocol(ProtocolKind),
    Log,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.splitn(3, ' ');
    let mut next = |what: &str| {
        args.next()
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .with_context(|| format!("missing {what}"))
    };

    let command = match word {
        "say" => {
            let user = next("user")?;
            let text = rest[user.len()..].trim().to_owned();
            if text.is_empty() {
                bail!("missing text");
            }
            Command::Say { user, text }
        }
        "group" => Command::Group {
            group: next("group")?,
            user: next("user")?,
            text: next("text")?,
        },
        "poke" => Command::Poke { user: next("user")? },
        "friend" => {
            let user = next("user")?;
            let comment = rest[user.len()..].trim().to_owned();
            Command::Friend { user, comment }
        }
        "bot" => match next("bot id")?.as_str() {
            "none" => Command::Bot(None),
            id => Command::Bot(Some(id.to_owned())),
        },
        "protocol" => Command::Protocol(parse_protocol(&next("protocol")?).map_err(anyhow::Error::msg)?),
        "log" => Command::Log,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}'"),
    };
    Ok(Some(command))
}

/// Executes one command. Returns `false` on quit.
async fn execute(runtime: &MatchaRuntime, command: Command) -> Result<bool> {
    let behav = runtime.behav();
    let bot_id = behav.bot().id();
    match command {
        Command::Say { user, text } => {
            let sender = behav.require_user(&user).await?;
            let receiver = behav.require_user(&bot_id).await?;
            let scene = behav
                .send_private_message(&sender, &receiver, vec![Content::text(text)], None)
                .await?;
            runtime.publish(scene).await;
        }
        Command::Group { group, user, text } => {
            let sender = behav.require_user(&user).await?;
            let group = behav.require_group(&group).await?;
            let scene = behav
                .send_group_message(&sender, &group, vec![Content::text(text)], None, None)
                .await?;
            runtime.publish(scene).await;
        }
        Command::Poke { user } => {
            let scene = behav.poke(None, &user, &bot_id).await?;
            runtime.publish(scene).await;
        }
        Command::Friend { user, comment } => {
            let scene = behav.request_friend(&user, &comment).await?;
            runtime.publish(scene).await;
        }
        Command::Bot(id) => {
            let identity = match id {
                Some(id) => {
                    let user = behav.require_user(&id).await?;
                    Some(BotIdentity::new(user.id, user.name))
                }
                None => None,
            };
            runtime.assign_bot(identity).await;
        }
        Command::Protocol(kind) => runtime.switch_protocol(kind).await,
        Command::Log => {
            for entry in runtime.chat().entries() {
                let marker = if entry.pushed { "->" } else { "  " };
                println!("{marker} [{}] {} {}", entry.scene.talker, entry.scene.key(), entry.scene.id);
            }
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

// ============================================================================
// World
// ============================================================================

async fn seed(store: &MemoryStore) -> Result<()> {
    for (id, name) in [("10000", "Matcha"), ("10001", "Alice"), ("10002", "Bob")] {
        store.put_user(User::new(id, name)).await?;
    }
    for (user_id, friend_id) in [("10000", "10001"), ("10001", "10000")] {
        store
            .put_friend(Friend {
                user_id: user_id.into(),
                friend_id: friend_id.into(),
                remark: String::new(),
            })
            .await?;
    }
    store.put_group(Group::new("123", "Tea House")).await?;
    for (user_id, role) in [("10000", Role::Owner), ("10001", Role::Admin), ("10002", Role::Member)] {
        store.put_member(Member::new("123", user_id, role)).await?;
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = matcha::runtime::ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;
    if let Some(url) = args.url {
        config.connect.url = url;
    }
    if let Some(protocol) = args.protocol {
        config.connect.protocol = protocol;
    }
    if config.bot.is_none() {
        config.bot = Some(BotConfig {
            id: "10000".into(),
            name: "Matcha".into(),
        });
    }

    let store = Arc::new(MemoryStore::new());
    seed(&store).await.context("failed to seed the world")?;

    let runtime = MatchaRuntime::builder()
        .config(config)
        .store(store)
        .build()
        .await?;
    runtime.start().await;
    info!("Type commands, `quit` to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                warn!("{e:#}");
                continue;
            }
        };
        match execute(&runtime, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => warn!("{e:#}"),
        }
    }

    runtime.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("say 10001 hello there").unwrap(),
            Some(Command::Say {
                user: "10001".into(),
                text: "hello there".into()
            })
        );
        assert_eq!(
            parse_command("group 123 10002 hi all").unwrap(),
            Some(Command::Group {
                group: "123".into(),
                user: "10002".into(),
                text: "hi all".into()
            })
        );
        assert_eq!(parse_command("bot none").unwrap(), Some(Command::Bot(None)));
        assert_eq!(
            parse_command("protocol v12").unwrap(),
            Some(Command::Protocol(ProtocolKind::OnebotV12))
        );
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("say 10001").is_err());
        assert!(parse_command("protocol v13").is_err());
        assert!(parse_command("dance").is_err());
    }
}
