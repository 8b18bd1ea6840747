//! Shell command grammar
//!
//! Each input line is split into words and parsed with clap, so the shell
//! gets the same usage errors and help text as the launcher's own flags.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

/// One line of shell input
#[derive(Parser, Debug)]
#[command(
    name = "krompir",
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// List registered instances
    #[command(alias = "ls")]
    List,

    /// Register an executable as an instance
    Add {
        /// Path to the game executable
        path: PathBuf,
        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Re-read the instance list from disk
    Reload,

    /// Remove an instance from the list (files are kept)
    #[command(alias = "rm")]
    Remove { index: usize },

    /// Launch an instance
    #[command(alias = "run")]
    Launch { index: usize },

    /// Kill the running instance and its child processes
    Kill,

    /// Show what is running and downloading
    Status,

    /// Show captured output
    Logs {
        /// Discard the captured output instead
        #[arg(long, conflicts_with = "new")]
        clear: bool,
        /// Only show output captured since the last `logs`
        #[arg(long)]
        new: bool,
    },

    /// List published releases
    Releases,

    /// Download a release and register it as an instance
    Download {
        /// Release tag, as shown by `releases`
        tag: String,
        /// Asset to fetch (defaults to the build for this platform)
        #[arg(short, long)]
        asset: Option<String>,
    },

    /// Download a file from a URL and register it as an instance
    DownloadUrl {
        url: String,
        /// Destination file name inside the bin directory
        file: String,
        /// Version label used in the instance name
        label: String,
    },

    /// Cancel the running download
    Cancel,

    /// Manage mods of an instance (by index) or the global mods
    Mods {
        /// Instance index or `global`
        target: ModTarget,
        #[command(subcommand)]
        action: Option<ModAction>,
    },

    /// Show this help
    Help,

    /// Leave the shell; a running game keeps running
    #[command(alias = "exit")]
    Quit,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ModAction {
    /// List mods and whether they are enabled
    List,
    Enable { name: String },
    Disable { name: String },
    /// Copy a .py or .skmod file into the mod directory
    Add { path: PathBuf },
    Remove { name: String },
    /// Open the mod directory in the file manager
    Open,
}

/// Which mod directory a `mods` command works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModTarget {
    Global,
    Instance(usize),
}

impl ModTarget {
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Global => None,
            Self::Instance(index) => Some(*index),
        }
    }
}

impl FromStr for ModTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("global") {
            return Ok(Self::Global);
        }
        s.parse()
            .map(Self::Instance)
            .map_err(|_| format!("expected an instance index or `global`, got {:?}", s))
    }
}

impl fmt::Display for ModTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Instance(index) => write!(f, "instance {}", index),
        }
    }
}

#[derive(Debug)]
pub enum ParseError {
    /// Unbalanced quote in the input
    Quote,
    Usage(clap::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => write!(f, "error: unterminated quote"),
            Self::Usage(e) => write!(f, "{}", e.render()),
        }
    }
}

/// Parse one input line; blank lines yield `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, ParseError> {
    let words = split_words(line).ok_or(ParseError::Quote)?;
    if words.is_empty() {
        return Ok(None);
    }
    ShellLine::try_parse_from(words)
        .map(|parsed| Some(parsed.command))
        .map_err(ParseError::Usage)
}

/// Split on whitespace, keeping single- or double-quoted runs together
fn split_words(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return None;
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(line: &str) -> ShellCommand {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn shell_parser_builds() {
        ShellLine::command().debug_assert();
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   \t").unwrap().is_none());
    }

    #[test]
    fn add_accepts_quoted_paths_and_names() {
        assert_eq!(
            parse(r#"add "/opt/my game/run" --name 'Build v1'"#),
            ShellCommand::Add {
                path: PathBuf::from("/opt/my game/run"),
                name: Some("Build v1".into()),
            }
        );
    }

    #[test]
    fn indices_must_be_numbers() {
        assert_eq!(parse("launch 2"), ShellCommand::Launch { index: 2 });
        assert!(matches!(parse_line("launch two"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_line("remove"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn download_commands() {
        assert_eq!(
            parse("download v1.1 --asset Skakavi-Krompir-Linux"),
            ShellCommand::Download {
                tag: "v1.1".into(),
                asset: Some("Skakavi-Krompir-Linux".into()),
            }
        );
        assert_eq!(
            parse("download-url http://host/game game v2"),
            ShellCommand::DownloadUrl {
                url: "http://host/game".into(),
                file: "game".into(),
                label: "v2".into(),
            }
        );
    }

    #[test]
    fn mods_target_and_action() {
        assert_eq!(
            parse("mods global"),
            ShellCommand::Mods {
                target: ModTarget::Global,
                action: None,
            }
        );
        assert_eq!(
            parse("mods 1 disable jump.py"),
            ShellCommand::Mods {
                target: ModTarget::Instance(1),
                action: Some(ModAction::Disable {
                    name: "jump.py".into()
                }),
            }
        );
        assert!(parse_line("mods everywhere").is_err());
    }

    #[test]
    fn aliases_and_help() {
        assert_eq!(parse("ls"), ShellCommand::List);
        assert_eq!(parse("exit"), ShellCommand::Quit);
        assert_eq!(parse("help"), ShellCommand::Help);
        assert_eq!(parse("reload"), ShellCommand::Reload);
        assert_eq!(
            parse("logs --clear"),
            ShellCommand::Logs {
                clear: true,
                new: false
            }
        );
        assert_eq!(
            parse("logs --new"),
            ShellCommand::Logs {
                clear: false,
                new: true
            }
        );
        assert!(parse_line("logs --clear --new").is_err());
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        assert!(matches!(parse_line("add \"/opt/game"), Err(ParseError::Quote)));
    }

    #[test]
    fn empty_quotes_make_an_empty_word() {
        assert_eq!(
            split_words(r#"add "" x"#).unwrap(),
            vec!["add".to_string(), String::new(), "x".to_string()]
        );
    }
}
