use std::fmt::Display;

use console::{style, StyledObject};

/// Styling helpers for terminal output
pub fn bright_yellow(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn cyan(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Green when `ok`, red otherwise.
pub fn outcome(text: impl Display, ok: bool) -> StyledObject<String> {
    let styled = style(text.to_string()).bright();
    if ok {
        styled.green()
    } else {
        styled.red()
    }
}

/// `succeeded`/`failed` label for a finished run or phase.
pub fn outcome_label(ok: bool) -> StyledObject<String> {
    outcome(if ok { "succeeded" } else { "failed" }, ok)
}
