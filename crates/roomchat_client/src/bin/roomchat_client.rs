#![forbid(unsafe_code)]

use std::io::Write as _;

use anyhow::Context as _;
use roomchat_client::prompt::{Prompt, Step};
use roomchat_client::{ClientConfig, ClientError, DEFAULT_SERVER_ENDPOINT, Session, render};
use roomchat_protocol::ServerEnvelope;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: roomchat_client [--connect ws://host:port]\n\
\n\
Options:\n\
	--connect   Server endpoint (alias: --endpoint) (default: {DEFAULT_SERVER_ENDPOINT})\n\
	            Format: ws://host:port\n\
	--help      Show this help\n\
\n\
Examples:\n\
	roomchat_client --connect ws://127.0.0.1:8080\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	// Chat output owns stdout; logs go to stderr and stay quiet unless asked for.
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn parse_args() -> ClientConfig {
	let mut endpoint = DEFAULT_SERVER_ENDPOINT.to_string();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected ws://host:port)");
					usage_and_exit();
				}
				endpoint = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	ClientConfig::from_ws_endpoint(&endpoint).unwrap_or_else(|e| {
		eprintln!("Invalid --connect value: {endpoint}\n{e}");
		usage_and_exit();
	})
}

fn show_prompt(prompt: &Prompt) {
	if let Some(text) = prompt.prompt_text() {
		print!("{text}");
		let _ = std::io::stdout().flush();
	}
}

enum Input {
	Line(Option<String>),
	Event(Result<ServerEnvelope, ClientError>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let cfg = parse_args();

	info!(url = %cfg.endpoint.url(), "connecting");
	let mut session = Session::connect(cfg).await?;

	let mut prompt = Prompt::new();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	show_prompt(&prompt);

	loop {
		let input = tokio::select! {
			line = lines.next_line() => Input::Line(line.context("read stdin")?),
			event = session.recv() => Input::Event(event),
		};

		match input {
			Input::Line(None) => break,
			Input::Line(Some(line)) => {
				match prompt.on_input(&line) {
					Step::Send(envelope) => session.send(&envelope).await?,
					Step::Reprompt(text) => println!("{}", render::notice(text)),
					Step::Idle => {}
				}
				show_prompt(&prompt);
			}
			Input::Event(Ok(envelope)) => {
				prompt.on_server(&envelope);
				println!("{}", render::server_event(&envelope));
				show_prompt(&prompt);
			}
			// Orderly close and transport failure end the same way.
			Input::Event(Err(e)) => {
				println!("{}", render::connection_lost());
				return Err(e.into());
			}
		}
	}

	session.close().await?;
	Ok(())
}
