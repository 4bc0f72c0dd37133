//! Terminal conversation with Apertus models.
//!
//! Uses `APERTUS_API_KEY` when `--api-key` is omitted. Type `/help` for
//! runtime commands and `/exit` to quit.

use anyhow::Context;
use apertus::{
    Apertus, ApertusError, ChatCompletionRequest, ChatMessage, ConfigLoader, ModelList, Role,
    StreamAccumulator,
};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PREFERRED_MODEL: &str = "swiss-ai/apertus-70b-instruct";

const HELP: &str = "\
Commands:
  /help                  Show this help
  /exit                  Quit the demo
  /clear                 Clear the conversation history (keeps system prompt)
  /model <model_id>      Switch to a different model id (must be available)

Tips:
  - Use a short first message to test connectivity (e.g., \"Hello!\").
  - If you see authorization errors, ensure APERTUS_API_KEY is set or pass --api-key.
  - If a preferred model isn't available, the demo falls back to the first model.";

#[derive(Debug, Parser)]
#[command(name = "apertus-chat", about = "Terminal conversation with Apertus models")]
struct Args {
    /// API key
    #[arg(long, env = "APERTUS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Preferred model id
    #[arg(long, default_value = PREFERRED_MODEL)]
    model: String,

    /// Optional system prompt to steer behavior
    #[arg(long)]
    system: Option<String>,

    /// Sampling temperature (0-2)
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Max tokens for each reply
    #[arg(long, default_value_t = 512)]
    max_tokens: u32,

    /// Override the base URL
    #[arg(long, env = "APERTUS_BASE_URL")]
    base_url: Option<String>,

    /// Connect and read timeout in seconds. Limits each wait, not the whole reply.
    #[arg(long, default_value_t = 60.0)]
    timeout: f64,

    /// Disable streaming replies
    #[arg(long)]
    no_stream: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Help,
    Exit,
    Clear,
    SwitchModel(String),
    ModelUsage,
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/help" => Input::Help,
        "/exit" => Input::Exit,
        "/clear" => Input::Clear,
        "/model" => Input::ModelUsage,
        _ => match line.strip_prefix("/model ") {
            Some(id) if !id.trim().is_empty() => Input::SwitchModel(id.trim().to_string()),
            Some(_) => Input::ModelUsage,
            None => Input::Message(line.to_string()),
        },
    }
}

/// Pick the preferred model if listed, else an Apertus instruct model, else the first.
fn choose_model(models: &ModelList, preferred: Option<&str>) -> Option<String> {
    if let Some(preferred) = preferred {
        if models.contains(preferred) {
            return Some(preferred.to_string());
        }
    }

    models
        .ids()
        .find(|id| {
            let id = id.to_lowercase();
            id.contains("apertus") && id.contains("instruct")
        })
        .or_else(|| models.ids().next())
        .map(str::to_string)
}

fn select_model(client: &Apertus, preferred: Option<&str>) -> anyhow::Result<String> {
    let models = client.models().list()?;
    choose_model(&models, preferred).context("No models available for this API key")
}

fn reply(
    client: &Apertus,
    args: &Args,
    model: &str,
    messages: &[ChatMessage],
) -> apertus::Result<String> {
    let request = ChatCompletionRequest::new(model, messages.to_vec())
        .with_temperature(args.temperature)
        .with_max_tokens(args.max_tokens);

    if args.no_stream {
        let completion = client.chat().completions().create(request)?;
        let text = completion.content().unwrap_or_default().to_string();
        println!("{}", text);
        return Ok(text);
    }

    let mut acc = StreamAccumulator::new();
    let mut stdout = io::stdout();
    for event in client.chat().completions().stream(request)? {
        let event = event?;
        if let Some(delta) = &event.delta {
            print!("{}", delta);
            let _ = stdout.flush();
        }
        acc.push(&event);
    }
    println!();

    Ok(acc.into_message().content)
}

fn loader_from_args(args: &Args) -> anyhow::Result<ConfigLoader> {
    let timeout = Duration::try_from_secs_f64(args.timeout)
        .with_context(|| format!("Invalid --timeout {}", args.timeout))?;

    // A streamed reply may outlive any fixed deadline; only bound each wait
    let mut loader = ConfigLoader::new()
        .connect_timeout(timeout)
        .read_timeout(timeout);
    if let Some(key) = &args.api_key {
        loader = loader.api_key(key);
    }
    if let Some(url) = &args.base_url {
        loader = loader.base_url(url);
    }

    Ok(loader)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = match loader_from_args(&args)?.resolve() {
        Ok(config) => config,
        Err(e) => {
            println!("Error: {}", e);
            println!("Set APERTUS_API_KEY or pass --api-key.");
            return Ok(ExitCode::FAILURE);
        }
    };
    let client = Apertus::from_config(config)?;

    let mut model_id = match select_model(&client, Some(&args.model)) {
        Ok(id) => id,
        Err(e) => {
            println!("Failed to choose model: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut messages: Vec<ChatMessage> = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system));
    }

    println!("\nApertus Terminal Chat Demo");
    println!("Using model: {}", model_id);
    if args.system.is_some() {
        println!("System prompt set.");
    }
    println!("Type /help for commands. Press Ctrl+C to quit.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                println!();
                break;
            }
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Help => println!("{}", HELP),
            Input::Clear => {
                messages.retain(|m| m.role == Role::System);
                println!("History cleared.");
            }
            Input::ModelUsage => println!("Usage: /model <model_id>"),
            Input::SwitchModel(id) => match select_model(&client, Some(&id)) {
                Ok(id) => {
                    model_id = id;
                    println!("Switched to model: {}", model_id);
                }
                Err(e) => println!("Failed to switch model: {}", e),
            },
            Input::Message(text) => {
                messages.push(ChatMessage::user(text));

                print!("Assistant: ");
                io::stdout().flush()?;
                match reply(&client, &args, &model_id, &messages) {
                    Ok(text) => messages.push(ChatMessage::assistant(text)),
                    Err(ApertusError::Api(e)) => {
                        println!("\n[API error {}] {}", e.status_code, e.message)
                    }
                    Err(e) => println!("\nUnexpected error: {}", e),
                }
            }
        }
    }

    println!("\nGoodbye!");
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    run(Args::parse())
}
