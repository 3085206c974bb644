//! Interactive REPL.

use crate::client::{is_disconnect, Client, ClientError};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const LOCAL_HELP: &str = "Lines are sent to the server as typed; the leading `$` is optional.
Type `help` for the server's command list, `quit` or `exit` to leave.";

/// What the REPL does with a line before it reaches the server.
#[derive(Debug, PartialEq, Eq)]
enum LocalAction {
    Skip,
    Quit,
    Send,
}

fn classify(line: &str) -> LocalAction {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => LocalAction::Skip,
        "quit" | "exit" | "q" => LocalAction::Quit,
        _ => LocalAction::Send,
    }
}

pub async fn run(mut client: Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "cryptowallet CLI".bold().cyan());
    println!("{} {}", "Connected to".green(), client.addr());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".cryptowallet_history"))
        .unwrap_or_else(|_| ".cryptowallet_history".into());
    let _ = rl.load_history(&history_path);

    println!("{}\n", LOCAL_HELP.dimmed());

    let mut connected = true;
    loop {
        let prompt = format!("{} ", "wallet>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => match classify(&line) {
                LocalAction::Skip => continue,
                LocalAction::Quit => break,
                LocalAction::Send => match client.send(&line).await {
                    Ok(lines) => {
                        println!("{}\n", lines.join("\n"));
                        if is_disconnect(&line) {
                            connected = false;
                            break;
                        }
                    }
                    Err(ClientError::Disconnected) => {
                        println!("{}", "Server closed the connection".red());
                        connected = false;
                        break;
                    }
                    Err(e) => {
                        println!("{}: {}\n", "Error".red(), e);
                        connected = false;
                        break;
                    }
                },
            },
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    if connected {
        let _ = client.close().await;
    }
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}
