use std::ffi::{CString, NulError};
use std::fmt;
use std::io;
use std::io::Write;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, warn};

use crate::builtin::{Affinity, Registry, Streams};
use crate::global;
use crate::types::{CommandSpec, PipelineSpec, IN, OUT};

/// Status for failures the shell detects itself (bad redirection, no pipe).
pub const FAILURE: i32 = 1;
/// Child status when the program image could not be replaced.
pub const CANNOT_EXECUTE: i32 = 126;
/// Child status when the program was not found.
pub const NOT_FOUND: i32 = 127;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("{op}: {source}")]
	Sys { op: &'static str, source: nix::Error },
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] NulError),
	#[error("empty command")]
	EmptyCommand,
}

fn sys(op: &'static str) -> impl FnOnce(nix::Error) -> ExecError {
	move |source| ExecError::Sys { op: op, source: source }
}

/// Progress of a launched stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
	/// Ran to completion without leaving the shell process.
	Executed(i32),
	Running(Pid),
}

fn report(subject: &str, msg: &dyn fmt::Display) {
	let _ = writeln!(&mut io::stderr(), "ish: {}: {}", subject, msg);
}

fn report_stage(command: &CommandSpec, e: &ExecError) {
	match command.argv.first() {
		Some(name) => report(name, e),
		None => { let _ = writeln!(&mut io::stderr(), "ish: {}", e); },
	}
}

/// Unbuffered writer on a bare descriptor. A forked child uses it instead of
/// the std handles, whose locks another thread may have held at fork time.
struct FdWriter(RawFd);

impl Write for FdWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let n = unsafe { libc::write(self.0, buf.as_ptr() as *const libc::c_void, buf.len()) };
		if n < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(n as usize)
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn child_report(subject: &str, msg: &dyn fmt::Display) {
	let mut err = FdWriter(libc::STDERR_FILENO);
	let _ = writeln!(err, "ish: {}: {}", subject, msg);
}

/// Collapses a builtin result into an 8-bit process status.
fn child_status(result: i32) -> i32 {
	if result < 0 { FAILURE } else { result & 0xff }
}

/// Waits for `pid` alone. Exit code `N` maps to `N`, death by signal `N`
/// maps to `-N`.
fn reap(pid: Pid) -> i32 {
	loop {
		match wait::waitpid(pid, None) {
			Ok(WaitStatus::Exited(_, code)) => {
				debug!(%pid, code, "reaped");
				return code;
			},
			Ok(WaitStatus::Signaled(_, signal, _)) => {
				debug!(%pid, ?signal, "reaped after signal");
				return -(signal as i32);
			},
			Ok(_) | Err(Errno::EINTR) => continue,
			Err(e) => {
				warn!(%pid, error = %e, "waitpid failed");
				return FAILURE;
			},
		}
	}
}

/// Makes `fd` the descriptor at `slot`, giving up the original.
fn install(fd: RawFd, slot: RawFd) -> nix::Result<()> {
	if fd != slot {
		unistd::dup2(fd, slot)?;
		unistd::close(fd)?;
	}
	Ok(())
}

/// Points stdin and stdout of a freshly forked child at the stage's files or
/// pipe ends and closes every pipeline descriptor it will not use.
fn setup_stdio(command: &CommandSpec, inherited: &[RawFd]) -> Result<(), i32> {
	for &fd in inherited {
		if fd != command.fds[IN] && fd != command.fds[OUT] {
			let _ = unistd::close(fd);
		}
	}

	let ifd = match command.input {
		Some(ref path) => {
			let fd = fcntl::open(path.as_str(), OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty()).map_err(|e| {
				child_report(path, &e);
				FAILURE
			})?;
			if command.fds[IN] != libc::STDIN_FILENO {
				let _ = unistd::close(command.fds[IN]);
			}
			fd
		},
		None => command.fds[IN],
	};
	install(ifd, libc::STDIN_FILENO).map_err(|e| {
		child_report("dup2", &e);
		FAILURE
	})?;

	// O_TRUNC only takes effect once the open itself has succeeded.
	let ofd = match command.output {
		Some(ref path) => {
			let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_CLOEXEC;
			let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
			let fd = fcntl::open(path.as_str(), flags, mode).map_err(|e| {
				child_report(path, &e);
				FAILURE
			})?;
			if command.fds[OUT] != libc::STDOUT_FILENO {
				let _ = unistd::close(command.fds[OUT]);
			}
			fd
		},
		None => command.fds[OUT],
	};
	install(ofd, libc::STDOUT_FILENO).map_err(|e| {
		child_report("dup2", &e);
		FAILURE
	})
}

/// Runs parsed command lines against one shell state.
pub struct Executor {
	registry: Registry,
	state: global::State,
	forks: usize,
}

impl Executor {
	pub fn new(registry: Registry, state: global::State) -> Executor {
		Executor { registry: registry, state: state, forks: 0 }
	}

	pub fn state(&self) -> &global::State {
		&self.state
	}

	pub fn state_mut(&mut self) -> &mut global::State {
		&mut self.state
	}

	/// Number of processes this executor has forked so far.
	pub fn forks(&self) -> usize {
		self.forks
	}

	/// Body of a forked child. Only returns when the stage failed before or
	/// instead of replacing the process image; the value is the exit status.
	fn exec_child(&mut self, command: &CommandSpec, argv: &[CString], inherited: &[RawFd]) -> i32 {
		if let Err(status) = setup_stdio(command, inherited) {
			return status;
		}
		if let Some(idx) = self.registry.lookup(command.name()) {
			let mut out = FdWriter(libc::STDOUT_FILENO);
			let mut err = FdWriter(libc::STDERR_FILENO);
			let r = self.registry.invoke(idx, &mut self.state, &command.argv, &mut Streams { out: &mut out, err: &mut err });
			return child_status(r);
		}
		// The shell runs with SIGPIPE ignored and programs must not inherit that.
		let _ = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
		let err = match unistd::execvp(&argv[0], argv) {
			Ok(never) => match never {},
			Err(e) => e,
		};
		if err == Errno::ENOENT {
			child_report(command.name(), &"command not found");
			NOT_FOUND
		} else {
			child_report(command.name(), &err);
			CANNOT_EXECUTE
		}
	}

	/// Starts one stage. Parent-relied builtins run right here when
	/// `in_parent` allows it; everything else gets its own process.
	fn launch(&mut self, command: &CommandSpec, in_parent: bool, inherited: &[RawFd]) -> Result<Stage, ExecError> {
		if command.argv.is_empty() {
			return Err(ExecError::EmptyCommand);
		}
		if in_parent {
			if let Some(idx) = self.registry.lookup(command.name()) {
				if self.registry.affinity(idx) == Affinity::Parent {
					let mut out = io::stdout();
					let mut err = io::stderr();
					let r = self.registry.invoke(idx, &mut self.state, &command.argv, &mut Streams { out: &mut out, err: &mut err });
					let _ = out.flush();
					return Ok(Stage::Executed(r));
				}
			}
		}

		let argv = command.argv.iter().map(|a| CString::new(a.as_str())).collect::<Result<Vec<CString>, NulError>>()?;
		// Anything still buffered would otherwise be written twice.
		let _ = io::stdout().flush();

		let forked = unsafe { unistd::fork() }.map_err(sys("fork"))?;
		match forked {
			ForkResult::Parent { child } => {
				self.forks += 1;
				debug!(pid = %child, command = command.name(), background = command.is_background, "forked");
				Ok(Stage::Running(child))
			},
			ForkResult::Child => {
				let status = self.exec_child(command, &argv, inherited);
				unsafe { libc::_exit(status) }
			},
		}
	}

	/// Runs one stage and, unless it is a background stage, waits for it.
	pub fn run_stage(&mut self, command: &CommandSpec) -> i32 {
		match self.launch(command, true, &[]) {
			Ok(Stage::Executed(r)) => r,
			Ok(Stage::Running(pid)) => {
				if command.is_background {
					debug!(%pid, "detached");
					0
				} else {
					reap(pid)
				}
			},
			Err(e) => {
				report_stage(command, &e);
				FAILURE
			},
		}
	}

	/// Runs every stage of `pipeline`, connected by pipes. The result is the
	/// first non-zero stage result, or zero.
	pub fn run_pipeline(&mut self, pipeline: &mut PipelineSpec) -> i32 {
		let n = pipeline.len();
		if n == 0 || pipeline.commands.iter().any(|c| c.argv.is_empty()) {
			let _ = writeln!(&mut io::stderr(), "ish: {}", ExecError::EmptyCommand);
			return FAILURE;
		}
		pipeline.commands[0].fds[IN] = libc::STDIN_FILENO;
		pipeline.commands[n - 1].fds[OUT] = libc::STDOUT_FILENO;
		if n == 1 {
			return self.run_stage(&pipeline.commands[0]);
		}

		let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(n - 1);
		for i in 1 .. n {
			match unistd::pipe2(OFlag::O_CLOEXEC).map_err(sys("pipe")) {
				Ok(pipe) => pipes.push(pipe),
				Err(e) => {
					warn!(error = %e, stage = i, "pipe creation failed");
					let _ = writeln!(&mut io::stderr(), "ish: {}", e);
					return FAILURE;
				},
			}
			let (ref read, ref write) = pipes[i - 1];
			pipeline.commands[i - 1].fds[OUT] = write.as_raw_fd();
			pipeline.commands[i].fds[IN] = read.as_raw_fd();
		}
		let inherited: Vec<RawFd> = pipes.iter().flat_map(|&(ref r, ref w)| vec![r.as_raw_fd(), w.as_raw_fd()]).collect();

		let mut stages: Vec<Stage> = Vec::with_capacity(n);
		for command in &pipeline.commands {
			match self.launch(command, false, &inherited) {
				Ok(stage) => stages.push(stage),
				Err(e) => {
					warn!(error = %e, command = command.name(), "stopping pipeline launch");
					report_stage(command, &e);
					stages.push(Stage::Executed(FAILURE));
					break;
				},
			}
		}
		drop(pipes);

		let detach = pipeline.is_background();
		let mut result = 0;
		for stage in stages {
			let r = match stage {
				Stage::Executed(r) => r,
				Stage::Running(pid) if detach => {
					debug!(%pid, "detached");
					0
				},
				Stage::Running(pid) => reap(pid),
			};
			if result == 0 {
				result = r;
			}
		}
		result
	}
}
