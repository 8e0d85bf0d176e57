use thiserror::Error;

use crate::config::{Config, DEFAULT_MAX_ARGS};
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("missing file name after '{0}'")]
	MissingRedirectTarget(char),
	#[error("'&' is only allowed at the end of a pipeline")]
	MisplacedBackground,
	#[error("empty command")]
	EmptyCommand,
	#[error("too many arguments (at most {0})")]
	TooManyArguments(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

const PIPE: char = '|';
const BACKGROUND: &'static str = "&";

pub struct Parser {
	max_args: usize,
}

impl Default for Parser {
	fn default() -> Parser {
		Parser { max_args: DEFAULT_MAX_ARGS }
	}
}

impl Parser {
	pub fn new(config: &Config) -> Parser {
		Parser { max_args: config.max_args }
	}

	fn is_whitespace(c: char) -> bool {
		match c {
			' ' | '\t' | '\n' | '\r' => true,
			_ => false,
		}
	}

	fn is_operator(token: &str) -> bool {
		token.starts_with('<') || token.starts_with('>') || token == BACKGROUND
	}

	/// Parses one stage. The last redirection of each direction wins.
	pub fn parse_command(&self, segment: &str) -> ParseResult<CommandSpec> {
		let tokens: Vec<&str> = segment.split(Parser::is_whitespace).filter(|t| !t.is_empty()).collect();
		if tokens.len() > self.max_args {
			return Err(ParseError::TooManyArguments(self.max_args));
		}

		let mut input: Option<String> = None;
		let mut output: Option<String> = None;
		let mut argv: Vec<String> = Vec::with_capacity(tokens.len());

		let mut tokens = tokens.into_iter();
		while let Some(token) = tokens.next() {
			let op = match token.chars().next() {
				Some(c @ '<') | Some(c @ '>') => c,
				_ => {
					argv.push(token.to_string());
					continue;
				},
			};
			let glued = &token[1..];
			let target = if !glued.is_empty() {
				glued
			} else {
				match tokens.next() {
					Some(t) if !Parser::is_operator(t) => t,
					_ => { return Err(ParseError::MissingRedirectTarget(op)); },
				}
			};
			if op == '<' {
				input = Some(target.to_string());
			} else {
				output = Some(target.to_string());
			}
		}

		let is_background = argv.last().map_or(false, |a| a == BACKGROUND);
		if is_background {
			argv.pop();
		}
		if argv.iter().any(|a| a == BACKGROUND) {
			return Err(ParseError::MisplacedBackground);
		}
		if argv.is_empty() {
			return Err(ParseError::EmptyCommand);
		}

		let mut command = CommandSpec::new(argv);
		command.input = input;
		command.output = output;
		command.is_background = is_background;
		Ok(command)
	}

	pub fn parse_pipeline(&self, line: &str) -> ParseResult<PipelineSpec> {
		let commands = line.split(PIPE).map(|s| self.parse_command(s)).collect::<ParseResult<Vec<CommandSpec>>>()?;
		let last = commands.len() - 1;
		if commands[..last].iter().any(|c| c.is_background) {
			return Err(ParseError::MisplacedBackground);
		}
		Ok(PipelineSpec { commands: commands })
	}
}

pub fn parse_command(segment: &str) -> ParseResult<CommandSpec> {
	Parser::default().parse_command(segment)
}

pub fn parse_pipeline(line: &str) -> ParseResult<PipelineSpec> {
	Parser::default().parse_pipeline(line)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn words(argv: &[&str]) -> Vec<String> {
		argv.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn plain_words() {
		let c = parse_command("w1 w2 w3").unwrap();
		assert_eq!(c.argv, words(&["w1", "w2", "w3"]));
		assert_eq!(c.argc(), 3);
		assert!(!c.is_background);
		assert_eq!(c.input, None);
		assert_eq!(c.output, None);
	}

	#[test]
	fn mixed_whitespace() {
		let c = parse_command("\t ls  -l\t/tmp \n").unwrap();
		assert_eq!(c.argv, words(&["ls", "-l", "/tmp"]));
	}

	#[test]
	fn glued_and_spaced_redirections_agree() {
		let spaced = parse_command("cmd > out.txt").unwrap();
		let glued = parse_command("cmd >out.txt").unwrap();
		assert_eq!(spaced, glued);
		assert_eq!(glued.output.as_ref().map(|s| s.as_str()), Some("out.txt"));
		assert_eq!(glued.argv, words(&["cmd"]));
	}

	#[test]
	fn last_redirection_wins() {
		let c = parse_command("cmd > a > b").unwrap();
		assert_eq!(c.output.as_ref().map(|s| s.as_str()), Some("b"));
		let c = parse_command("cmd <a x <b y").unwrap();
		assert_eq!(c.input.as_ref().map(|s| s.as_str()), Some("b"));
		assert_eq!(c.argv, words(&["cmd", "x", "y"]));
	}

	#[test]
	fn both_directions() {
		let c = parse_command("sort < in.txt -r > out.txt").unwrap();
		assert_eq!(c.argv, words(&["sort", "-r"]));
		assert_eq!(c.input.as_ref().map(|s| s.as_str()), Some("in.txt"));
		assert_eq!(c.output.as_ref().map(|s| s.as_str()), Some("out.txt"));
	}

	#[test]
	fn missing_redirect_target() {
		assert_eq!(parse_command("cmd >"), Err(ParseError::MissingRedirectTarget('>')));
		assert_eq!(parse_command("cmd <"), Err(ParseError::MissingRedirectTarget('<')));
		assert_eq!(parse_command("cmd > > b"), Err(ParseError::MissingRedirectTarget('>')));
		assert_eq!(parse_command("cmd > &"), Err(ParseError::MissingRedirectTarget('>')));
	}

	#[test]
	fn trailing_background_marker() {
		let c = parse_command("cmd &").unwrap();
		assert!(c.is_background);
		assert_eq!(c.argv, words(&["cmd"]));
		let c = parse_command("sleep 1 & > log").unwrap();
		assert!(c.is_background);
		assert_eq!(c.argv, words(&["sleep", "1"]));
		assert_eq!(c.output.as_ref().map(|s| s.as_str()), Some("log"));
	}

	#[test]
	fn misplaced_background_marker() {
		assert_eq!(parse_command("a & b"), Err(ParseError::MisplacedBackground));
		assert_eq!(parse_pipeline("a & | b"), Err(ParseError::MisplacedBackground));
	}

	#[test]
	fn empty_commands() {
		assert_eq!(parse_command(""), Err(ParseError::EmptyCommand));
		assert_eq!(parse_command("  \n"), Err(ParseError::EmptyCommand));
		assert_eq!(parse_command("> out"), Err(ParseError::EmptyCommand));
		assert_eq!(parse_command("&"), Err(ParseError::EmptyCommand));
	}

	#[test]
	fn argument_bound_is_an_error() {
		let parser = Parser { max_args: 3 };
		assert!(parser.parse_command("a b c").is_ok());
		assert_eq!(parser.parse_command("a b c d"), Err(ParseError::TooManyArguments(3)));
		let long = vec!["x"; DEFAULT_MAX_ARGS + 1].join(" ");
		assert_eq!(parse_command(&long), Err(ParseError::TooManyArguments(DEFAULT_MAX_ARGS)));
	}

	#[test]
	fn pipeline_stage_count() {
		let p = parse_pipeline("a | b | c").unwrap();
		assert_eq!(p.len(), 3);
		let names: Vec<&str> = p.commands.iter().map(|c| c.name()).collect();
		assert_eq!(names, vec!["a", "b", "c"]);
		assert!(!p.is_background());
		let p = parse_pipeline("echo hi|wc -c").unwrap();
		assert_eq!(p.len(), 2);
	}

	#[test]
	fn pipeline_background_applies_to_last_stage() {
		let p = parse_pipeline("yes | head -n 1 &").unwrap();
		assert!(p.is_background());
		assert!(!p.commands[0].is_background);
	}

	#[test]
	fn pipeline_fails_as_a_whole() {
		assert_eq!(parse_pipeline("a | | c"), Err(ParseError::EmptyCommand));
		assert_eq!(parse_pipeline("a |"), Err(ParseError::EmptyCommand));
		assert_eq!(parse_pipeline("a | b >"), Err(ParseError::MissingRedirectTarget('>')));
	}

	#[test]
	fn parser_fds_default_to_standard_streams() {
		let c = parse_command("cat").unwrap();
		assert_eq!(c.fds, [0, 1]);
	}
}
