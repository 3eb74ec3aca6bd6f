use anyhow::{anyhow, Result};
use attest_core::{AttestError, Password};
use std::io::{BufRead, Write};

pub const PASSWORD_ENV: &str = "ATTEST_PASSWORD";
pub const PASSWORD_CONFIRM_ENV: &str = "ATTEST_PASSWORD_CONFIRM";
pub const NEW_PASSWORD_ENV: &str = "ATTEST_NEW_PASSWORD";

fn from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn read_hidden(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))
}

/// Password for an existing key.
pub fn password(prompt: &str) -> Result<Password> {
    let raw = match from_env(PASSWORD_ENV) {
        Some(pw) => pw,
        None => read_hidden(prompt)?,
    };
    Ok(Password::from_string(raw)?)
}

/// Password for a new vault, asked twice. `env_var` supplies it
/// non-interactively, with `ATTEST_PASSWORD_CONFIRM` checked when set.
pub fn new_password(prompt: &str, env_var: &str) -> Result<Password> {
    let (first, second) = match from_env(env_var) {
        Some(pw) => {
            let password = Password::from_string(pw)?;
            let Some(confirm) = from_env(PASSWORD_CONFIRM_ENV) else {
                return Ok(password);
            };
            (password, confirm)
        }
        None => {
            let password = Password::from_string(read_hidden(prompt)?)?;
            (password, read_hidden("Confirm password: ")?)
        }
    };
    let second = Password::from_string(second).map_err(|_| AttestError::PasswordMismatch)?;
    first.confirm(&second)?;
    Ok(first)
}

/// `[y/N]` question on stderr. Empty input or end of input is a no.
pub fn confirm(prompt: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    let mut stderr = std::io::stderr();
    let mut prompt = prompt.to_string();
    loop {
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            None | Some('n') => return Ok(false),
            Some('y') => return Ok(true),
            Some(_) => prompt = "Answer with y[es] or n[o]: ".into(),
        }
    }
}
