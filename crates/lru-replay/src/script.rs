//! Replay script parser using nom
//!
//! Script format:
//! ```text
//! # comment
//! SET user:1 "Ada Lovelace"
//! GET user:1
//! POPITEM MRU
//! ```
//!
//! One command per line. Verbs are case-insensitive; arguments are bare
//! tokens or double-quoted strings (`\"`, `\\` and `\n` escapes).

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map, opt, value},
    multi::separated_list1,
    sequence::delimited,
    IResult,
};

/// A parsed replay command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Get(String),
    Peek(String),
    Del(String),
    Pop { key: String, default: Option<String> },
    SetDefault { key: String, value: String },
    PopItem { least_recent: bool },
    First,
    Last,
    Has(String),
    Resize(usize),
    Capacity,
    Len,
    Clear,
    Keys,
    Values,
    Items,
    Stats,
}

/// A command together with the 1-based line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: Command,
}

/// Script parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ScriptError {}

/// Parse a whole script, skipping blank lines and `#` comments
pub fn parse_script(input: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut commands = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens = tokenize(trimmed).map_err(|message| ScriptError { line, message })?;
        let command = Command::from_tokens(&tokens).map_err(|message| ScriptError { line, message })?;
        commands.push(ScriptLine { line, command });
    }

    Ok(commands)
}

/// Split one line into tokens
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let result: IResult<&str, Vec<String>> = all_consuming(delimited(
        space0,
        separated_list1(space1, token),
        space0,
    ))(line);

    result
        .map(|(_, tokens)| tokens)
        .map_err(|e| format!("syntax error: {:?}", e))
}

fn token(input: &str) -> IResult<&str, String> {
    alt((quoted, bare))(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '"'),
        String::from,
    )(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    let body = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            value("\\", tag("\\")),
            value("\"", tag("\"")),
            value("\n", tag("n")),
        )),
    );
    map(
        delimited(char('"'), opt(body), char('"')),
        Option::unwrap_or_default,
    )(input)
}

impl Command {
    /// Build a command from a verb and its arguments
    pub fn from_tokens(tokens: &[String]) -> Result<Command, String> {
        let (verb, args) = match tokens.split_first() {
            Some((verb, args)) => (verb.to_uppercase(), args),
            None => return Err("empty command".to_string()),
        };

        let arity_error = || format!("wrong number of arguments for '{}' command", verb.to_lowercase());
        let arity = |expected: usize| -> Result<(), String> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(arity_error())
            }
        };

        let command = match verb.as_str() {
            "SET" => {
                arity(2)?;
                Command::Set {
                    key: args[0].clone(),
                    value: args[1].clone(),
                }
            }
            "GET" => {
                arity(1)?;
                Command::Get(args[0].clone())
            }
            "PEEK" => {
                arity(1)?;
                Command::Peek(args[0].clone())
            }
            "DEL" => {
                arity(1)?;
                Command::Del(args[0].clone())
            }
            "POP" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity_error());
                }
                Command::Pop {
                    key: args[0].clone(),
                    default: args.get(1).cloned(),
                }
            }
            "SETDEFAULT" => {
                arity(2)?;
                Command::SetDefault {
                    key: args[0].clone(),
                    value: args[1].clone(),
                }
            }
            "POPITEM" => {
                let least_recent = match args {
                    [] => true,
                    [which] => match which.to_uppercase().as_str() {
                        "LRU" => true,
                        "MRU" => false,
                        other => return Err(format!("expected LRU or MRU, got '{}'", other)),
                    },
                    _ => return Err(arity_error()),
                };
                Command::PopItem { least_recent }
            }
            "FIRST" => {
                arity(0)?;
                Command::First
            }
            "LAST" => {
                arity(0)?;
                Command::Last
            }
            "HAS" => {
                arity(1)?;
                Command::Has(args[0].clone())
            }
            "RESIZE" => {
                arity(1)?;
                let size = args[0]
                    .parse()
                    .map_err(|_| format!("invalid size '{}'", args[0]))?;
                Command::Resize(size)
            }
            "CAPACITY" => {
                arity(0)?;
                Command::Capacity
            }
            "LEN" => {
                arity(0)?;
                Command::Len
            }
            "CLEAR" => {
                arity(0)?;
                Command::Clear
            }
            "KEYS" => {
                arity(0)?;
                Command::Keys
            }
            "VALUES" => {
                arity(0)?;
                Command::Values
            }
            "ITEMS" => {
                arity(0)?;
                Command::Items
            }
            "STATS" => {
                arity(0)?;
                Command::Stats
            }
            _ => return Err(format!("unknown command '{}'", verb.to_lowercase())),
        };

        Ok(command)
    }
}
