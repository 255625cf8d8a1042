mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use runtime::{
    Answer, Backend, McpToolHost, Orchestrator, ToolDescriptor, ToolHost, Transcript, schema,
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use error::Result;

const DEMO_QUERIES: [&str; 4] = [
    "What's the weather like in London?",
    "What is 123 * 45 + 9?",
    "What time is it in Tokyo?",
    "Tell me a fun fact about giraffes.",
];

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Answer questions with Gemini and MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tether.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model to use, overriding config and TETHER_MODEL
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Tool server command, overriding [tool_host].command
    #[arg(long, global = true, value_name = "CMD")]
    server: Option<String>,

    /// Argument for the tool server command (repeatable, needs --server)
    #[arg(
        long = "server-arg",
        global = true,
        value_name = "ARG",
        allow_hyphen_values = true,
        requires = "server"
    )]
    server_args: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Print the conversation turns after the answer
        #[arg(long)]
        transcript: bool,
    },
    /// Run the built-in sample queries
    Demo {
        #[arg(long)]
        transcript: bool,
    },
    /// Start an interactive session
    Chat {
        #[arg(long)]
        transcript: bool,
    },
    /// List the tool server's tools and their model declarations
    Tools,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = Config::discover(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    if let Some(server) = cli.server {
        config.tool_host.command = server;
        config.tool_host.args = cli.server_args;
    }

    let command = cli.command.unwrap_or(Commands::Demo { transcript: false });

    if let Commands::Tools = command {
        return cmd_tools(&config).await;
    }

    // Fail on a missing key before starting the tool server.
    let backend = config.backend()?;
    println!("tether v{} using {backend}", env!("CARGO_PKG_VERSION"));

    let host = McpToolHost::spawn(config.tool_host.server_config()).await?;
    print_tools(host.descriptors());

    let orchestrator = Orchestrator::new(backend, host);

    let outcome = match command {
        Commands::Ask { query, transcript } => {
            cmd_ask(&orchestrator, &query.join(" "), transcript).await
        }
        Commands::Demo { transcript } => cmd_demo(&orchestrator, transcript).await,
        Commands::Chat { transcript } => cmd_chat(&orchestrator, transcript).await,
        Commands::Tools => Ok(()),
    };

    let (_, host) = orchestrator.into_parts();
    if let Err(e) = host.shutdown().await {
        warn!(error = %e, "tool server did not shut down cleanly");
    }

    outcome
}

async fn cmd_ask<B: Backend>(
    orchestrator: &Orchestrator<B, McpToolHost>,
    query: &str,
    show_transcript: bool,
) -> Result<()> {
    let answer = orchestrator.process_query(query).await?;
    print_answer(&answer, show_transcript);
    Ok(())
}

async fn cmd_demo<B: Backend>(
    orchestrator: &Orchestrator<B, McpToolHost>,
    show_transcript: bool,
) -> Result<()> {
    for query in DEMO_QUERIES {
        println!("\nQuery: {query}");
        match orchestrator.process_query(query).await {
            Ok(answer) => {
                println!("\nResponse: {}", answer.text);
                if show_transcript {
                    print_transcript(&answer.transcript);
                }
            }
            Err(e) => eprintln!("\nError: {e}"),
        }
        println!("{}", "-".repeat(30));
    }
    Ok(())
}

async fn cmd_chat<B: Backend>(
    orchestrator: &Orchestrator<B, McpToolHost>,
    show_transcript: bool,
) -> Result<()> {
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match orchestrator.process_query(input).await {
            Ok(answer) => {
                println!("\n{}\n", answer.text);
                if show_transcript {
                    print_transcript(&answer.transcript);
                }
            }
            Err(e) => {
                eprintln!("Error: {e}\n");
            }
        }
    }

    println!("\nGoodbye.");
    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let host = McpToolHost::spawn(config.tool_host.server_config()).await?;
    print_tools(host.descriptors());

    let declarations = schema::declarations(host.descriptors());
    println!("\nModel declarations:");
    println!("{}", serde_json::to_string_pretty(&declarations)?);

    host.shutdown().await?;
    Ok(())
}

fn print_tools(tools: &[ToolDescriptor]) {
    println!("\nConnected to server with tools:");
    for tool in tools {
        println!("  - {}: {}", tool.name, tool.description);
    }
}

fn print_answer(answer: &Answer, show_transcript: bool) {
    println!("\n{}", answer.text);
    if show_transcript {
        print_transcript(&answer.transcript);
    }
}

fn print_transcript(transcript: &Transcript) {
    println!();
    for (i, turn) in transcript.iter().enumerate() {
        println!("  [{}] {turn}", i + 1);
    }
}
