use std::env;
use std::io;

/// Mutable per-shell state the builtins act on. It lives only in the
/// original process; children see the copy taken at fork time.
#[derive(Debug, Default)]
pub struct State {
	pub history: Vec<String>,
	exit_request: Option<i32>,
}

impl State {
	pub fn new() -> State {
		State::default()
	}

	pub fn record(&mut self, line: &str) {
		let line = line.trim_end_matches('\n');
		if !line.trim().is_empty() {
			self.history.push(line.to_string());
		}
	}

	pub fn request_exit(&mut self, status: i32) {
		self.exit_request = Some(status);
	}

	/// Status the front end should terminate with, if `exit` has run.
	pub fn exit_request(&self) -> Option<i32> {
		self.exit_request
	}
}

/// The working directory as a string, for the prompt.
pub fn current_directory() -> io::Result<String> {
	let dir = env::current_dir()?;
	Ok(dir.to_string_lossy().into_owned())
}
