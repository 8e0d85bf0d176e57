use std::env;
use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::config::MatchMode;
use crate::global;

/// Output streams a builtin writes to. In the shell process these are the
/// std handles; in a forked child they are bare descriptors.
pub struct Streams<'a> {
	pub out: &'a mut dyn Write,
	pub err: &'a mut dyn Write,
}

/// Builtin result: negative is an execution error, zero success, positive
/// an exit status for the caller to propagate.
pub type Handler = fn(&mut global::State, &[String], &mut Streams) -> i32;

/// Where a builtin is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
	/// Changes process-wide state, so it has to run in the shell itself.
	Parent,
	/// May run in a forked child, where it honors redirection.
	Child,
}

#[derive(Clone, Copy)]
pub struct Builtin {
	pub name: &'static str,
	pub affinity: Affinity,
	pub summary: &'static str,
	pub handler: Handler,
}

pub const STANDARD: &'static [Builtin] = &[
	Builtin { name: "cd", affinity: Affinity::Parent, summary: "change the working directory", handler: builtin_cd },
	Builtin { name: "exit", affinity: Affinity::Parent, summary: "leave the shell", handler: builtin_exit },
	Builtin { name: "pwd", affinity: Affinity::Child, summary: "print the working directory", handler: builtin_pwd },
	Builtin { name: "echo", affinity: Affinity::Child, summary: "print the arguments", handler: builtin_echo },
	Builtin { name: "help", affinity: Affinity::Child, summary: "list the builtin commands", handler: builtin_help },
	Builtin { name: "history", affinity: Affinity::Child, summary: "list the lines entered so far", handler: builtin_history },
];

fn report(io: &mut Streams, name: &str, msg: &dyn fmt::Display) {
	let _ = writeln!(io.err, "{}: {}", name, msg);
}

pub fn builtin_cd(_: &mut global::State, argv: &[String], io: &mut Streams) -> i32 {
	let target = match argv.get(1) {
		Some(dir) => dir.clone(),
		None => match env::var("HOME") {
			Ok(home) => home,
			Err(_) => {
				report(io, "cd", &"HOME not set");
				return -1;
			},
		},
	};
	match env::set_current_dir(&target) {
		Ok(()) => 0,
		Err(e) => {
			report(io, "cd", &format!("{}: {}", target, e));
			-1
		},
	}
}

pub fn builtin_exit(state: &mut global::State, argv: &[String], io: &mut Streams) -> i32 {
	let status = match argv.get(1) {
		None => 0,
		Some(s) => match s.parse::<i32>() {
			Ok(n) => n,
			Err(_) => {
				report(io, "exit", &format!("{}: numeric argument required", s));
				return -1;
			},
		},
	};
	state.request_exit(status);
	0
}

pub fn builtin_pwd(_: &mut global::State, _: &[String], io: &mut Streams) -> i32 {
	match global::current_directory() {
		Ok(cwd) => match writeln!(io.out, "{}", cwd) {
			Ok(()) => 0,
			Err(_) => -1,
		},
		Err(e) => {
			report(io, "pwd", &e);
			-1
		},
	}
}

pub fn builtin_echo(_: &mut global::State, argv: &[String], io: &mut Streams) -> i32 {
	let line = argv[1..].join(" ");
	match writeln!(io.out, "{}", line) {
		Ok(()) => 0,
		Err(_) => -1,
	}
}

pub fn builtin_help(_: &mut global::State, _: &[String], io: &mut Streams) -> i32 {
	for b in STANDARD {
		if writeln!(io.out, "{:<10}{}", b.name, b.summary).is_err() {
			return -1;
		}
	}
	0
}

pub fn builtin_history(state: &mut global::State, _: &[String], io: &mut Streams) -> i32 {
	for (i, line) in state.history.iter().enumerate() {
		if writeln!(io.out, "{:>5}  {}", i + 1, line).is_err() {
			return -1;
		}
	}
	0
}

/// Builtin table, fixed once built.
pub struct Registry {
	builtins: Vec<Builtin>,
	mode: MatchMode,
}

impl Registry {
	pub fn new(builtins: Vec<Builtin>, mode: MatchMode) -> Registry {
		Registry { builtins: builtins, mode: mode }
	}

	pub fn standard(mode: MatchMode) -> Registry {
		Registry::new(STANDARD.to_vec(), mode)
	}

	/// Index of the first builtin matching `name`. In prefix mode any name
	/// starting with a registered name matches it.
	pub fn lookup(&self, name: &str) -> Option<usize> {
		let mode = self.mode;
		self.builtins.iter().position(|b| match mode {
			MatchMode::Prefix => name.starts_with(b.name),
			MatchMode::Exact => name == b.name,
		})
	}

	pub fn affinity(&self, index: usize) -> Affinity {
		self.builtins[index].affinity
	}

	pub fn invoke(&self, index: usize, state: &mut global::State, argv: &[String], io: &mut Streams) -> i32 {
		let builtin = &self.builtins[index];
		debug!(builtin = builtin.name, argc = argv.len(), "invoking builtin");
		(builtin.handler)(state, argv, io)
	}
}
