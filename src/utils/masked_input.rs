//! Single-line secret entry for the terminal. Typed characters are shown as `*`.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::fmt;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskedEdit {
    Insert(char),
    Paste(String),
    Backspace,
    Clear,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskedOutcome {
    Continue { redraw: bool },
    Submit(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct MaskedInputError {
    message: String,
}

impl MaskedInputError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for MaskedInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MaskedInputError {}

impl From<io::Error> for MaskedInputError {
    fn from(err: io::Error) -> Self {
        MaskedInputError::new(err.to_string())
    }
}

pub fn map_key(key: &KeyEvent) -> Option<MaskedEdit> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => Some(MaskedEdit::Submit),
        KeyCode::Esc => Some(MaskedEdit::Cancel),
        KeyCode::Backspace => Some(MaskedEdit::Backspace),
        KeyCode::Char('c') if ctrl => Some(MaskedEdit::Cancel),
        KeyCode::Char('u') if ctrl => Some(MaskedEdit::Clear),
        KeyCode::Char('\n' | '\r') => Some(MaskedEdit::Submit),
        KeyCode::Char(c) if !ctrl => Some(MaskedEdit::Insert(c)),
        _ => None,
    }
}

pub fn apply_edit(text: &mut String, edit: MaskedEdit) -> MaskedOutcome {
    match edit {
        MaskedEdit::Insert(c) => {
            text.push(c);
            MaskedOutcome::Continue { redraw: true }
        }
        // Only the first line of a paste is kept; a newline submits.
        MaskedEdit::Paste(pasted) => {
            let first_line = pasted.split(['\r', '\n']).next().unwrap_or_default();
            text.push_str(first_line);
            if pasted.contains(['\r', '\n']) {
                MaskedOutcome::Submit(text.clone())
            } else {
                MaskedOutcome::Continue {
                    redraw: !first_line.is_empty(),
                }
            }
        }
        MaskedEdit::Backspace => MaskedOutcome::Continue {
            redraw: text.pop().is_some(),
        },
        MaskedEdit::Clear => {
            let redraw = !text.is_empty();
            text.clear();
            MaskedOutcome::Continue { redraw }
        }
        MaskedEdit::Submit => MaskedOutcome::Submit(text.clone()),
        MaskedEdit::Cancel => MaskedOutcome::Cancelled,
    }
}

pub fn masked_display(text: &str) -> String {
    "*".repeat(text.chars().count())
}

/// Read a secret from the terminal in raw mode, echoing `*` to stderr.
///
/// Raw mode and bracketed paste are restored before returning, also on error.
pub fn prompt_masked(prompt: &str) -> Result<String, MaskedInputError> {
    enable_raw_mode()?;
    let mut stderr = io::stderr();
    if let Err(err) = execute!(stderr, event::EnableBracketedPaste) {
        let _ = disable_raw_mode();
        return Err(err.into());
    }

    let result = read_masked(prompt, &mut stderr);

    let restore_paste = execute!(stderr, event::DisableBracketedPaste);
    let restore_raw = disable_raw_mode();
    let _ = writeln!(stderr);

    let value = result?;
    restore_paste?;
    restore_raw?;
    Ok(value)
}

fn read_masked<W: Write>(prompt: &str, out: &mut W) -> Result<String, MaskedInputError> {
    let mut text = String::new();
    redraw(prompt, &text, out)?;

    loop {
        let outcome = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match map_key(&key) {
                Some(edit) => apply_edit(&mut text, edit),
                None => continue,
            },
            Event::Paste(pasted) => apply_edit(&mut text, MaskedEdit::Paste(pasted)),
            _ => continue,
        };

        match outcome {
            MaskedOutcome::Continue { redraw: true } => redraw(prompt, &text, out)?,
            MaskedOutcome::Continue { redraw: false } => {}
            MaskedOutcome::Submit(value) => return Ok(value),
            MaskedOutcome::Cancelled => return Err(MaskedInputError::new("Cancelled by user")),
        }
    }
}

fn redraw<W: Write>(prompt: &str, text: &str, out: &mut W) -> io::Result<()> {
    write!(out, "\r\x1b[K{prompt}{}", masked_display(text))?;
    out.flush()
}
