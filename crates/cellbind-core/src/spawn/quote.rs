//! Command-line quoting for log output.

use std::borrow::Cow;
use std::iter;

/// Quoting convention used when rendering a command for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `CommandLineToArgvW` rules: wrap in double quotes, escape embedded
    /// quotes and the backslashes preceding them.
    Windows,
    /// POSIX shell quoting.
    Posix,
}

impl QuoteStyle {
    /// The convention of the host platform.
    pub fn native() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    /// Quote a single argument so it survives a round trip through the shell.
    pub fn quote<'a>(self, arg: &'a str) -> Cow<'a, str> {
        match self {
            Self::Windows => quote_windows(arg),
            Self::Posix => quote_posix(arg),
        }
    }
}

/// Render a full command line, one quoted argument per word.
pub fn join_command(command: &[String], style: QuoteStyle) -> String {
    command
        .iter()
        .map(|arg| style.quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_windows(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes would otherwise escape the closing quote
    quoted.extend(iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    Cow::Owned(quoted)
}

fn quote_posix(arg: &str) -> Cow<'_, str> {
    // shlex refuses interior NUL bytes, which no real argv can carry anyway
    shlex::try_quote(arg).unwrap_or_else(|_| Cow::Owned(format!("{arg:?}")))
}
