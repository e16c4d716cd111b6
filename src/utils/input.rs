//! Input text sources.

use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::InputError;

/// Where the texts of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A single text given on the command line.
    Text(String),
    /// A newline-delimited file.
    File(PathBuf),
    /// Standard input: piped data, or lines typed until an empty line.
    Console,
}

/// Split raw input into trimmed, non-empty lines.
pub fn parse_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read the texts for a run.
///
/// With no explicit source, piped standard input is used when available.
pub fn read_texts(source: Option<&InputSource>) -> Result<Vec<String>, InputError> {
    let texts = match source {
        Some(InputSource::Text(text)) => single_text(text),
        Some(InputSource::File(path)) => read_file(path)?,
        Some(InputSource::Console) => read_console()?,
        None if !io::stdin().is_terminal() => read_piped()?,
        None => return Err(InputError::NoInput),
    };

    if texts.is_empty() {
        return Err(InputError::NoInput);
    }
    Ok(texts)
}

fn single_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        Vec::new()
    } else {
        vec![text.to_string()]
    }
}

fn read_file(path: &Path) -> Result<Vec<String>, InputError> {
    let content = std::fs::read_to_string(path).map_err(|error| InputError::ReadError {
        source_name: path.display().to_string(),
        error,
    })?;
    Ok(parse_lines(&content))
}

fn read_piped() -> Result<Vec<String>, InputError> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|error| InputError::ReadError {
            source_name: "stdin".to_string(),
            error,
        })?;
    Ok(parse_lines(&input))
}

fn read_console() -> Result<Vec<String>, InputError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return read_piped();
    }

    eprintln!("Enter text lines. Submit an empty line to finish:");
    let _ = io::stderr().flush();
    read_until_blank(stdin.lock())
}

/// Collect lines until the first empty line or end of input.
fn read_until_blank(reader: impl BufRead) -> Result<Vec<String>, InputError> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|error| InputError::ReadError {
            source_name: "console".to_string(),
            error,
        })?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        lines.push(line.to_string());
    }
    Ok(lines)
}
