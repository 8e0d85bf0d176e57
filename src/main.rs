use std::io;
use std::io::BufRead;
use std::io::Write;
use std::process;

use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ish::builtin::Registry;
use ish::config::{self, Config};
use ish::global;
use ish::{Executor, Parser};

fn print_prompt(stdout: &mut io::Stdout) -> anyhow::Result<()> {
	let cwd = global::current_directory()?;
	write!(stdout, "{}{}$ ", config::PROMPT_PREFIX, cwd)?;
	stdout.flush()?;
	Ok(())
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(
			std::env::var(config::LOG_KEY).unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
		))
		.with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
		.init();

	let config = Config::from_env();
	debug!(?config, "starting");
	let parser = Parser::new(&config);
	let mut executor = Executor::new(Registry::standard(config.builtin_match), global::State::new());

	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	let mut last = 0;
	loop {
		print_prompt(&mut stdout)?;
		let mut line = String::new();
		if stdin_locked.read_line(&mut line)? == 0 {
			break;
		}
		if line.trim().is_empty() {
			continue;
		}
		executor.state_mut().record(&line);
		match parser.parse_pipeline(&line) {
			Ok(mut pipeline) => {
				last = executor.run_pipeline(&mut pipeline);
				debug!(result = last, "pipeline finished");
			},
			Err(e) => {
				let _ = writeln!(&mut io::stderr(), "ish: {}", e);
				last = 2;
			},
		}
		if let Some(status) = executor.state().exit_request() {
			process::exit(status);
		}
	}
	process::exit(if last < 0 { 128 - last } else { last & 0xff })
}
