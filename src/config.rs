//! Tunables for the parser and the builtin lookup.
//!
//! Every field has a compiled-in default; `Config::from_env` lets the
//! environment override them. Values that fail to parse keep the default.

use std::env;

use tracing::warn;

/// Upper bound on raw tokens in a single pipeline stage.
pub const DEFAULT_MAX_ARGS: usize = 64;

/// Text printed before the working directory in the prompt.
pub const PROMPT_PREFIX: &'static str = "user:";

/// Filter used for log output when `ISH_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &'static str = "warn";

pub const MAX_ARGS_KEY: &'static str = "ISH_MAX_ARGS";
pub const BUILTIN_MATCH_KEY: &'static str = "ISH_BUILTIN_MATCH";
pub const LOG_KEY: &'static str = "ISH_LOG";

/// How a command name is compared against registered builtin names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
	/// The command name starts with the builtin's name, so `cdrom` resolves
	/// to `cd`.
	Prefix,
	Exact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub max_args: usize,
	pub builtin_match: MatchMode,
}

impl Default for Config {
	fn default() -> Config {
		Config { max_args: DEFAULT_MAX_ARGS, builtin_match: MatchMode::Prefix }
	}
}

impl Config {
	pub fn from_env() -> Config {
		Config::from_lookup(|key| env::var(key).ok())
	}

	fn from_lookup<F>(lookup: F) -> Config where F: Fn(&str) -> Option<String> {
		let mut config = Config::default();
		if let Some(v) = lookup(MAX_ARGS_KEY) {
			match v.trim().parse::<usize>() {
				Ok(n) if n > 0 => config.max_args = n,
				_ => warn!(value = %v, "ignoring invalid {}", MAX_ARGS_KEY),
			}
		}
		if let Some(v) = lookup(BUILTIN_MATCH_KEY) {
			match v.trim() {
				"prefix" => config.builtin_match = MatchMode::Prefix,
				"exact" => config.builtin_match = MatchMode::Exact,
				_ => warn!(value = %v, "ignoring invalid {}", BUILTIN_MATCH_KEY),
			}
		}
		config
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn from_pairs(pairs: &[(&str, &str)]) -> Config {
		let map: HashMap<String, String> = pairs.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect();
		Config::from_lookup(|key| map.get(key).cloned())
	}

	#[test]
	fn defaults_without_overrides() {
		assert_eq!(from_pairs(&[]), Config::default());
		assert_eq!(Config::default().max_args, DEFAULT_MAX_ARGS);
		assert_eq!(Config::default().builtin_match, MatchMode::Prefix);
	}

	#[test]
	fn overrides_are_applied() {
		let c = from_pairs(&[(MAX_ARGS_KEY, "8"), (BUILTIN_MATCH_KEY, "exact")]);
		assert_eq!(c.max_args, 8);
		assert_eq!(c.builtin_match, MatchMode::Exact);
	}

	#[test]
	fn invalid_values_keep_defaults() {
		let c = from_pairs(&[(MAX_ARGS_KEY, "0"), (BUILTIN_MATCH_KEY, "fuzzy")]);
		assert_eq!(c, Config::default());
		let c = from_pairs(&[(MAX_ARGS_KEY, "lots")]);
		assert_eq!(c.max_args, DEFAULT_MAX_ARGS);
	}
}
