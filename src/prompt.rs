//! Interactive prompts for the `fetch` command.
//!
//! Only used when stdin is a terminal; otherwise the caller must supply the
//! answer through flags.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};

use crate::models::Subject;
use crate::selection::{parse_selection, Selection};

pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin)
}

pub fn ask_url() -> Result<String> {
    let url: String = Input::new()
        .with_prompt("Index or subject page URL")
        .interact_text()
        .context("no URL given")?;
    Ok(url.trim().to_string())
}

/// List `subjects` on stderr and ask until a valid selection is entered.
pub fn ask_selection(subjects: &[Subject]) -> Result<Selection> {
    for (i, subject) in subjects.iter().enumerate() {
        eprintln!("  {:>3}. {}", i + 1, subject.name);
    }
    loop {
        let expr: String = Input::new()
            .with_prompt("Select subjects (all, none, 2-5, 1,3)")
            .default("all".to_string())
            .interact_text()
            .context("no selection given")?;
        match parse_selection(&expr, subjects.len()) {
            Ok((selection, dropped)) => {
                if !dropped.is_empty() {
                    eprintln!("ignoring out-of-range entries: {:?}", dropped);
                }
                return Ok(selection);
            }
            Err(e) => eprintln!("{}", e),
        }
    }
}

pub fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()
        .context("confirmation aborted")
}
