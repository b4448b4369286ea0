mod render;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use streamchat_core::{config::Config, ChatSession, TurnOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::render::{print_transcript, LiveRenderer};

#[derive(Parser)]
#[command(author, version, about = "Streaming chat client", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Chat endpoint URL; overrides the config file
    #[arg(long, env = "STREAMCHAT_ENDPOINT", global = true)]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the transcript
    Send {
        #[arg(short, long, help = "Message from the user")]
        message: String,
        #[arg(long, value_delimiter = ',', help = "Tool activity to show, e.g. web_search")]
        tools: Vec<String>,
        #[arg(long, help = "Print the final transcript as JSON")]
        json: bool,
    },
    /// Interactive chat. `/tools a,b` sets tool hints, `/quit` exits, Ctrl-C cancels a reply
    /// (or exits when idle)
    Repl {
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match (&cli.config, &cli.endpoint) {
        (Some(path), _) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        (None, Some(url)) => Config::for_endpoint(url.clone()),
        (None, None) => anyhow::bail!("either --config or --endpoint (or STREAMCHAT_ENDPOINT) is required"),
    };
    if let Some(url) = &cli.endpoint {
        cfg.endpoint.url = url.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Run one turn while echoing transcript changes to stdout.
async fn live_turn(
    session: &mut ChatSession,
    message: &str,
    tools: &[String],
    out: &mut impl Write,
) -> io::Result<TurnOutcome> {
    let store = session.store().clone();
    let mut rx = store.subscribe();
    let mut renderer = LiveRenderer::starting_at(store.len());

    let turn = session.send(message, tools);
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Ok(()) = rx.changed() => {
                let t = rx.borrow_and_update().clone();
                renderer.render(&t, out)?;
            }
        }
    };
    renderer.render(&store.snapshot(), out)?;
    Ok(outcome)
}

/// What a Ctrl-C does: cancel the reply in flight, or leave when idle.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    CancelTurn,
    Exit,
}

fn on_interrupt(generating: bool) -> Interrupt {
    if generating {
        Interrupt::CancelTurn
    } else {
        Interrupt::Exit
    }
}

fn report(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Failed { message, .. } => eprintln!("[turn failed: {message}]"),
        TurnOutcome::Cancelled => eprintln!("[cancelled]"),
        TurnOutcome::Rejected | TurnOutcome::Completed => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let mut session = ChatSession::from_config(&cfg)?;
    tracing::debug!(endpoint = %cfg.endpoint.url, "session ready");

    let cancel = session.cancel_handle();
    let store = session.store().clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(store.is_generating()) {
                Interrupt::CancelTurn => cancel.cancel(),
                Interrupt::Exit => {
                    println!();
                    std::process::exit(130);
                }
            }
        }
    });

    let mut stdout = io::stdout();
    match cli.command {
        Commands::Send {
            message,
            tools,
            json,
        } => {
            let outcome = if json {
                let outcome = session.send(&message, &tools).await;
                println!("{}", serde_json::to_string_pretty(&session.store().snapshot())?);
                outcome
            } else {
                live_turn(&mut session, &message, &tools, &mut stdout).await?
            };
            report(&outcome);
            match outcome {
                TurnOutcome::Failed { kind, .. } => anyhow::bail!("turn failed ({kind})"),
                TurnOutcome::Rejected => anyhow::bail!("message is empty"),
                TurnOutcome::Cancelled | TurnOutcome::Completed => {}
            }
        }
        Commands::Repl { mut tools } => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                stdout.flush()?;
                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if let Some(rest) = line.strip_prefix("/tools") {
                    tools = rest
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    println!("tool hints: {tools:?}");
                    continue;
                }
                if line == "/transcript" {
                    print_transcript(&session.store().snapshot(), &mut stdout)?;
                    continue;
                }
                let outcome = live_turn(&mut session, line, &tools, &mut stdout).await?;
                report(&outcome);
            }
        }
    }

    Ok(())
}
