use std::io::{self, Read, Write};
use std::time::Instant;

use glyph_stream::config::{load_config, AppConfig};
use glyph_stream::observability::{init_tracing, log_session_usage, SessionUsage};
use glyph_stream::protocol::{outbound_messages, ChatMessage};
use glyph_stream::stream::{CancelHandle, EventSink, SessionOutcome};
use glyph_stream::transcript::{Transcript, TranscriptOutcome, EMPTY_STREAM_MESSAGE};
use glyph_stream::transport::HttpTransport;
use serde_json::Value;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const CONFIG_PATH_ENV: &str = "GLYPH_CONFIG";

const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

const USAGE: &str = "\
Usage: glyph-chat [--config PATH] [--endpoint NAME] [PROMPT...]

Sends PROMPT (or stdin when no PROMPT is given) to a streaming chat endpoint
and prints the reply as it arrives.

Options:
  -c, --config PATH     configuration file (default: $GLYPH_CONFIG or config.yaml)
  -e, --endpoint NAME   endpoint to use (default: the configured default)
  -h, --help            print this help";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config_path: Option<String>,
    endpoint: Option<String>,
    prompt: Option<String>,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut words = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-c" | "--config" => {
                parsed.config_path = Some(args.next().ok_or("--config requires a path")?);
            }
            "-e" | "--endpoint" => {
                parsed.endpoint = Some(args.next().ok_or("--endpoint requires a name")?);
            }
            "--" => {
                words.extend(args.by_ref());
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown option '{flag}'"));
            }
            _ => words.push(arg),
        }
    }
    if !words.is_empty() {
        parsed.prompt = Some(words.join(" "));
    }
    Ok(parsed)
}

/// Prints tokens as they arrive and keeps the full transcript.
///
/// A failed write to the token output cancels the session; nothing reads the
/// rest of the reply.
struct TerminalSink<W: Write> {
    out: W,
    cancel: CancelHandle,
    transcript: Transcript,
    printed: bool,
    output_closed: bool,
}

impl<W: Write> TerminalSink<W> {
    fn new(out: W, cancel: CancelHandle) -> Self {
        Self {
            out,
            cancel,
            transcript: Transcript::new(),
            printed: false,
            output_closed: false,
        }
    }

    fn write(&mut self, text: &str) {
        if self.output_closed {
            return;
        }
        let written = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "token output closed, cancelling chat stream");
            self.output_closed = true;
            self.cancel.cancel();
        }
    }

    fn end_line(&mut self) {
        if self.printed {
            self.write("\n");
            self.printed = false;
        }
    }

    fn print_tool(label: &str, payload: &Value) {
        eprintln!("[{label}] {payload}");
    }
}

impl<W: Write> EventSink for TerminalSink<W> {
    fn on_start(&mut self) {
        self.printed = false;
        self.transcript.on_start();
    }

    fn on_token(&mut self, text: String) {
        self.write(&text);
        self.printed |= !text.is_empty();
        self.transcript.on_token(text);
    }

    fn on_reset_text(&mut self) {
        self.end_line();
        self.transcript.on_reset_text();
    }

    fn on_tool_call(&mut self, payload: Value) {
        Self::print_tool("tool call", &payload);
        self.transcript.on_tool_call(payload);
    }

    fn on_tool_result(&mut self, payload: Value) {
        Self::print_tool("tool result", &payload);
        self.transcript.on_tool_result(payload);
    }

    fn on_finish(&mut self) {
        self.end_line();
        self.transcript.on_finish();
    }

    fn on_error(&mut self, message: String) {
        eprintln!("error: {message}");
        self.transcript.on_error(message);
    }
}

fn main() {
    let args = parse_args(std::env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("{e}\n\n{USAGE}");
        std::process::exit(EXIT_USAGE);
    });
    if args.help {
        println!("{USAGE}");
        return;
    }

    let config_path = args
        .config_path
        .clone()
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{config_path}': {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(EXIT_USAGE);
    });

    init_tracing(&config.log_level);

    let prompt = match args.prompt.clone() {
        Some(prompt) => prompt,
        None => read_stdin_prompt(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(EXIT_FAILED);
        });

    let code = runtime.block_on(run(config, args.endpoint.as_deref(), &prompt));
    std::process::exit(code);
}

fn read_stdin_prompt() -> String {
    let mut prompt = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut prompt) {
        eprintln!("Failed to read prompt from stdin: {e}");
        std::process::exit(EXIT_USAGE);
    }
    prompt
}

async fn run(config: AppConfig, endpoint_name: Option<&str>, prompt: &str) -> i32 {
    let endpoint = match config.endpoint(endpoint_name) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };
    let user_message = match ChatMessage::user(prompt) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };
    let transport = match HttpTransport::new(&config.transport) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_FAILED;
        }
    };

    let history: Vec<ChatMessage> = config
        .system_prompt
        .iter()
        .map(ChatMessage::system)
        .collect();
    let messages = outbound_messages(&history, user_message);
    let usage_input = messages.clone();

    let chat = transport.chat(endpoint, messages);
    let cancel = chat.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling chat stream");
            cancel.cancel();
        }
    });

    tracing::info!("glyph-chat streaming from {}", endpoint.summary());
    let started = Instant::now();
    let mut sink = TerminalSink::new(io::stdout().lock(), chat.cancel_handle());
    let outcome = chat.run(&mut sink).await;

    if sink.output_closed {
        return EXIT_FAILED;
    }
    if outcome == SessionOutcome::Cancelled {
        eprintln!("cancelled");
        return EXIT_CANCELLED;
    }

    let usage = SessionUsage::estimate(&usage_input, sink.transcript.text());
    log_session_usage(&endpoint.name, &usage, started.elapsed());

    match sink.transcript.outcome() {
        TranscriptOutcome::Completed { .. } => 0,
        TranscriptOutcome::Failed { .. } => EXIT_FAILED,
        TranscriptOutcome::Empty => {
            eprintln!("error: {EMPTY_STREAM_MESSAGE}");
            EXIT_USAGE
        }
    }
}
