use std::os::unix::io::RawFd;

/// Index of the input slot in `CommandSpec::fds`.
pub const IN: usize = 0;
/// Index of the output slot in `CommandSpec::fds`.
pub const OUT: usize = 1;

/// One pipeline stage, with redirections and the background marker already
/// stripped out of `argv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
	pub argv: Vec<String>,
	pub input: Option<String>,
	pub output: Option<String>,
	pub is_background: bool,
	/// Descriptors the stage reads from and writes to when no file
	/// redirection is given. Only the orchestrator assigns these.
	pub fds: [RawFd; 2],
}

impl CommandSpec {
	pub fn new(argv: Vec<String>) -> CommandSpec {
		CommandSpec {
			argv: argv,
			input: None,
			output: None,
			is_background: false,
			fds: [libc::STDIN_FILENO, libc::STDOUT_FILENO],
		}
	}

	pub fn argc(&self) -> usize {
		self.argv.len()
	}

	/// The program or builtin name; empty when `argv` is. The executor
	/// refuses to run a stage without one.
	pub fn name(&self) -> &str {
		self.argv.first().map_or("", |s| s.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
	pub commands: Vec<CommandSpec>,
}

impl PipelineSpec {
	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_background(&self) -> bool {
		self.commands.last().map_or(false, |c| c.is_background)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn name_of_empty_command() {
		assert_eq!(CommandSpec::new(vec![]).name(), "");
		assert_eq!(CommandSpec::new(vec!["ls".to_string()]).name(), "ls");
	}
}
