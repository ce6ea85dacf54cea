use crossterm::tty::IsTty;
use std::fmt;
use std::io::{self, BufRead, Write};

use crate::utils::masked_input::prompt_masked;

#[derive(Debug, Clone)]
pub struct UiError {
    message: String,
}

impl UiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UiError {}

impl From<io::Error> for UiError {
    fn from(err: io::Error) -> Self {
        UiError::new(format!("Failed to read input: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

const EMAIL_PROMPT: &str = "Email: ";
const PASSWORD_PROMPT: &str = "Password: ";

/// Ask for whichever of email and password was not given on the command line.
///
/// On a terminal the password is read with masked echo. Piped input is read
/// line by line.
pub fn prompt_credentials(
    email: Option<String>,
    password: Option<String>,
) -> Result<Credentials, UiError> {
    let mut output = io::stderr();
    let email = match email.filter(|e| !e.trim().is_empty()) {
        Some(email) => email,
        None => prompt_line(&mut io::stdin().lock(), &mut output, EMAIL_PROMPT)?,
    };
    let password = match password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None if io::stdin().is_tty() => {
            prompt_masked(PASSWORD_PROMPT).map_err(|err| UiError::new(err.to_string()))?
        }
        None => prompt_line(&mut io::stdin().lock(), &mut output, PASSWORD_PROMPT)?,
    };
    validate_credentials(email, password)
}

pub fn prompt_credentials_from<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    email: Option<String>,
    password: Option<String>,
) -> Result<Credentials, UiError> {
    let email = match email.filter(|e| !e.trim().is_empty()) {
        Some(email) => email,
        None => prompt_line(input, output, EMAIL_PROMPT)?,
    };
    let password = match password.filter(|p| !p.is_empty()) {
        Some(password) => password,
        None => prompt_line(input, output, PASSWORD_PROMPT)?,
    };
    validate_credentials(email, password)
}

fn validate_credentials(email: String, password: String) -> Result<Credentials, UiError> {
    if email.trim().is_empty() {
        return Err(UiError::new("Email cannot be empty"));
    }
    if password.is_empty() {
        return Err(UiError::new("Password cannot be empty"));
    }

    Ok(Credentials {
        email: email.trim().to_string(),
        password,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationChoice {
    Yes,
    No,
}

/// Empty input means no.
pub fn parse_confirmation(input: &str) -> Result<ConfirmationChoice, UiError> {
    match input.trim().to_lowercase().as_str() {
        "" | "n" | "no" => Ok(ConfirmationChoice::No),
        "y" | "yes" => Ok(ConfirmationChoice::Yes),
        _ => Err(UiError::new("Invalid confirmation response")),
    }
}

/// Ask a y/N question on stderr and read the answer from stdin.
pub fn confirm(question: &str) -> Result<bool, UiError> {
    confirm_from(&mut io::stdin().lock(), &mut io::stderr(), question)
}

pub fn confirm_from<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<bool, UiError> {
    let answer = prompt_line(input, output, &format!("{question} [y/N]: "))?;
    Ok(parse_confirmation(&answer)? == ConfirmationChoice::Yes)
}

fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> Result<String, UiError> {
    write!(output, "{prompt}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(UiError::new("Input closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
