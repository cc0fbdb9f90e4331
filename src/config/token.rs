//! Tokenizer and syntax validator for the `watchd` policy file grammar (§4.1).

use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: colon missing\n  {text}\n  ^\nuse 'Command: Argument' format")]
    MissingColon { line: usize, text: String },
    #[error("line {line}: extra colon\n  {text}\n  ^\nuse 'Command: Argument' format")]
    ExtraColon { line: usize, text: String },
    #[error("line {line}: invalid command '{command}'\n  {command}: {argument}\n  ^\nvalid commands: D, IF, E, EE, ES")]
    InvalidCommand {
        line: usize,
        command: String,
        argument: String,
    },
    #[error("line {line}: empty argument\n  {command}:\n  ^\nprovide argument for command")]
    EmptyArgument { line: usize, command: String },
    #[error("line {line}: argument must start with /\n  {command}: {argument}\n  ^\nprovide absolute path")]
    NotAbsolute {
        line: usize,
        command: String,
        argument: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `D` — include a directory recursively.
    IncludeDir,
    /// `IF` — include a single file.
    IncludeFile,
    /// `E` — exclude a directory.
    ExcludeDir,
    /// `EE` — exclude by extension.
    ExcludeExt,
    /// `ES` — exclude by basename suffix.
    ExcludeSuffix,
}

impl Command {
    fn parse(raw: &str) -> Option<Command> {
        match raw {
            "D" => Some(Command::IncludeDir),
            "IF" => Some(Command::IncludeFile),
            "E" => Some(Command::ExcludeDir),
            "EE" => Some(Command::ExcludeExt),
            "ES" => Some(Command::ExcludeSuffix),
            _ => None,
        }
    }

    fn requires_absolute_path(self) -> bool {
        matches!(
            self,
            Command::IncludeDir | Command::IncludeFile | Command::ExcludeDir
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match self {
            Command::IncludeDir => "D",
            Command::IncludeFile => "IF",
            Command::ExcludeDir => "E",
            Command::ExcludeExt => "EE",
            Command::ExcludeSuffix => "ES",
        };
        write!(f, "{raw}")
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub line: usize,
    pub command: Command,
    pub argument: String,
}

/// Reads `path` and tokenizes it one directive per non-empty, non-`#`-comment line.
///
/// Whitespace around the command and argument is trimmed. This only tokenizes; syntax
/// validation (unknown commands, missing arguments, relative paths) happens separately in
/// [`validate_syntax`] so `watchd validate` can report every problem it can, not just the
/// first tokenizing failure.
pub fn read_config(path: &Path) -> Result<Vec<RawToken>> {
    let contents = fs::read_to_string(path)?;
    let mut tokens = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line_num = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.splitn(3, ':');
        let command = parts
            .next()
            .ok_or_else(|| ConfigError::MissingColon {
                line: line_num,
                text: trimmed.to_owned(),
            })?
            .trim()
            .to_owned();
        let argument = match parts.next() {
            Some(arg) => arg.trim().to_owned(),
            None => {
                return Err(ConfigError::MissingColon {
                    line: line_num,
                    text: trimmed.to_owned(),
                })
            }
        };
        if parts.next().is_some() {
            return Err(ConfigError::ExtraColon {
                line: line_num,
                text: trimmed.to_owned(),
            });
        }
        tokens.push(RawToken {
            line: line_num,
            command,
            argument,
        });
    }
    Ok(tokens)
}

/// A tokenized line before its command has been checked against the known command set.
#[derive(Debug, Clone)]
pub struct RawToken {
    pub line: usize,
    pub command: String,
    pub argument: String,
}

/// Validates tokenizer output against the grammar rules in §4.1 and returns typed [`Token`]s.
pub fn validate_syntax(raw: &[RawToken]) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(raw.len());
    for t in raw {
        let Some(command) = Command::parse(&t.command) else {
            return Err(ConfigError::InvalidCommand {
                line: t.line,
                command: t.command.clone(),
                argument: t.argument.clone(),
            });
        };
        if t.argument.is_empty() {
            return Err(ConfigError::EmptyArgument {
                line: t.line,
                command: t.command.clone(),
            });
        }
        if command.requires_absolute_path() && !t.argument.starts_with('/') {
            return Err(ConfigError::NotAbsolute {
                line: t.line,
                command: t.command.clone(),
                argument: t.argument.clone(),
            });
        }
        tokens.push(Token {
            line: t.line,
            command,
            argument: t.argument.clone(),
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn tokenizes_skipping_blank_and_comment_lines() {
        let f = write_config("# a comment\n\nD: /tmp/w\n  IF: /etc/passwd  \n");
        let raw = read_config(f.path()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].line, 3);
        assert_eq!(raw[0].command, "D");
        assert_eq!(raw[0].argument, "/tmp/w");
        assert_eq!(raw[1].line, 4);
        assert_eq!(raw[1].argument, "/etc/passwd");
    }

    #[test]
    fn missing_colon_is_error_naming_line_and_text() {
        let f = write_config("D /tmp/w\n");
        let err = read_config(f.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Line 1".to_uppercase().as_str()) || msg.contains("line 1"));
        assert!(msg.contains("colon missing"));
    }

    #[test]
    fn extra_colon_is_error() {
        let f = write_config("D: /tmp/w: extra\n");
        let err = read_config(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ExtraColon { line: 1, .. }));
    }

    #[test]
    fn validate_rejects_unknown_command() {
        let raw = vec![RawToken {
            line: 1,
            command: "X".into(),
            argument: "/tmp".into(),
        }];
        let err = validate_syntax(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand { .. }));
    }

    #[test]
    fn validate_rejects_empty_argument() {
        let raw = vec![RawToken {
            line: 1,
            command: "D".into(),
            argument: "".into(),
        }];
        let err = validate_syntax(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyArgument { .. }));
    }

    #[test]
    fn validate_rejects_relative_path_for_directory_commands() {
        let raw = vec![RawToken {
            line: 1,
            command: "D".into(),
            argument: "relative/path".into(),
        }];
        let err = validate_syntax(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::NotAbsolute { .. }));
    }

    #[test]
    fn validate_allows_non_absolute_extension_and_suffix_arguments() {
        let raw = vec![
            RawToken {
                line: 1,
                command: "EE".into(),
                argument: ".log".into(),
            },
            RawToken {
                line: 2,
                command: "ES".into(),
                argument: "~".into(),
            },
        ];
        let tokens = validate_syntax(&raw).unwrap();
        assert_eq!(tokens.len(), 2);
    }
}
