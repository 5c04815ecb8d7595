//! Administrative console
//!
//! Reads commands from stdin while the server runs: `status`, `help`,
//! `quit`/`exit`. Ctrl+C stops the server as well.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::listener::ServerHandle;

/// One console input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Status,
    Help,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            "quit" | "exit" => ConsoleCommand::Quit,
            "status" => ConsoleCommand::Status,
            "help" => ConsoleCommand::Help,
            "" => ConsoleCommand::Empty,
            _ => ConsoleCommand::Unknown(input),
        }
    }
}

/// Read stdin on a plain thread so a pending read never holds up runtime shutdown
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("Console input closed");
    });
    rx
}

/// Run the console until `quit` or Ctrl+C
///
/// When stdin is closed (e.g. running detached) only Ctrl+C stops the server.
pub async fn run(handle: &ServerHandle) -> Result<(), AppError> {
    println!("Server console ready, type 'help' for available commands");
    let mut lines = spawn_stdin_reader();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C");
                return Ok(());
            }
            line = lines.recv() => match line {
                Some(input) => {
                    if !execute(handle, ConsoleCommand::parse(&input)).await? {
                        return Ok(());
                    }
                }
                None => {
                    info!("Console input closed, waiting for Ctrl+C");
                    tokio::signal::ctrl_c().await?;
                    return Ok(());
                }
            }
        }
    }
}

/// Execute one command; returns false when the server should stop
async fn execute(handle: &ServerHandle, command: ConsoleCommand) -> Result<bool, AppError> {
    match command {
        ConsoleCommand::Quit => {
            println!("Shutting down...");
            return Ok(false);
        }
        ConsoleCommand::Status => {
            let users = handle.online_users().await?;
            let rooms = handle.rooms().await?;
            println!("Listening on: {}", handle.local_addr());
            println!("Online users ({}): {}", users.len(), users.join(", "));
            for room in rooms {
                println!("  {} {} ({} members)", room.id, room.name, room.member_count);
            }
        }
        ConsoleCommand::Help => {
            println!("Available commands:");
            println!("  quit/exit - stop the server");
            println!("  status    - show online users and rooms");
            println!("  help      - show this help");
        }
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(input) => {
            println!("Unknown command: {}, type 'help' for available commands", input);
        }
    }
    Ok(true)
}
