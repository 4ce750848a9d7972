use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{HarnessError, Result};

/// Comment prefixes recognized in generated sources, longest first.
const COMMENT_PREFIXES: [&str; 2] = ["# ", "#"];

/// Closing brackets that may end a commented multi-line variable.
const CLOSING_BRACKETS: [char; 3] = ['}', ']', ')'];

/// A declarative edit applied to one file of the working copy.
///
/// Every transform must find what it targets. A miss is reported as
/// [`HarnessError::TargetNotFound`] so template drift surfaces immediately
/// instead of silently re-running the unmodified pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTransform {
    /// For each marker, uncomment the first commented line containing it.
    Uncomment { file: PathBuf, markers: Vec<String> },
    /// For each marker, uncomment every commented line containing it.
    UncommentAll { file: PathBuf, markers: Vec<String> },
    /// Uncomment whole `# NAME = ...` definitions including their continuation lines.
    UncommentVariables { file: PathBuf, variables: Vec<String> },
    /// For each pair, replace the first literal occurrence of `old` with `new`.
    Replace {
        file: PathBuf,
        pairs: Vec<(String, String)>,
    },
    /// Rewrite the first top-level `NAME = ...` line to `NAME = '<value>'`.
    Assign {
        file: PathBuf,
        variable: String,
        value: String,
    },
}

impl TextTransform {
    pub fn uncomment(file: impl Into<PathBuf>, markers: &[&str]) -> Self {
        Self::Uncomment {
            file: file.into(),
            markers: to_owned(markers),
        }
    }

    pub fn uncomment_all(file: impl Into<PathBuf>, markers: &[&str]) -> Self {
        Self::UncommentAll {
            file: file.into(),
            markers: to_owned(markers),
        }
    }

    pub fn uncomment_variables(file: impl Into<PathBuf>, variables: &[&str]) -> Self {
        Self::UncommentVariables {
            file: file.into(),
            variables: to_owned(variables),
        }
    }

    pub fn replace(file: impl Into<PathBuf>, pairs: Vec<(String, String)>) -> Self {
        Self::Replace {
            file: file.into(),
            pairs,
        }
    }

    pub fn assign(file: impl Into<PathBuf>, variable: &str, value: &str) -> Self {
        Self::Assign {
            file: file.into(),
            variable: variable.to_string(),
            value: value.to_string(),
        }
    }

    /// File targeted by this transform, relative to the working copy root.
    pub fn file(&self) -> &Path {
        match self {
            Self::Uncomment { file, .. }
            | Self::UncommentAll { file, .. }
            | Self::UncommentVariables { file, .. }
            | Self::Replace { file, .. }
            | Self::Assign { file, .. } => file,
        }
    }

    /// Applies the transform to in-memory content.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::TargetNotFound`] for the first marker, variable
    /// or pattern that cannot be located.
    pub fn apply_to(&self, content: &str) -> Result<String> {
        let not_found = |pattern: &str| HarnessError::TargetNotFound {
            file: self.file().to_path_buf(),
            pattern: pattern.to_string(),
        };

        match self {
            Self::Uncomment { markers, .. } => {
                let mut lines = split_lines(content);
                for marker in markers {
                    if !uncomment_marker(&mut lines, marker, false) {
                        return Err(not_found(marker));
                    }
                }
                Ok(lines.concat())
            }
            Self::UncommentAll { markers, .. } => {
                let mut lines = split_lines(content);
                for marker in markers {
                    if !uncomment_marker(&mut lines, marker, true) {
                        return Err(not_found(marker));
                    }
                }
                Ok(lines.concat())
            }
            Self::UncommentVariables { variables, .. } => {
                uncomment_variables(content, variables).map_err(|missing| not_found(&missing))
            }
            Self::Replace { pairs, .. } => {
                let mut content = content.to_string();
                for (old, new) in pairs {
                    let start = content.find(old.as_str()).ok_or_else(|| not_found(old))?;
                    content.replace_range(start..start + old.len(), new);
                }
                Ok(content)
            }
            Self::Assign {
                variable, value, ..
            } => {
                let mut lines = split_lines(content);
                let line = lines
                    .iter_mut()
                    .find(|line| defines_variable(line_body(line), variable))
                    .ok_or_else(|| not_found(variable))?;
                let terminator = line[line_body(line).len()..].to_string();
                *line = format!("{variable} = '{value}'{terminator}");
                Ok(lines.concat())
            }
        }
    }

    /// Applies the transform to its file under `root`, overwriting it in place.
    pub fn apply(&self, root: &Path) -> Result<()> {
        let path = root.join(self.file());
        let content = fs::read_to_string(&path)?;
        let updated = self.apply_to(&content)?;

        if updated != content {
            fs::write(&path, updated)?;
            debug!("Updated {}", path.display());
        } else {
            debug!("{} already up to date", path.display());
        }

        Ok(())
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// Splits content into lines that keep their terminators, so joining is lossless.
fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(str::to_string).collect()
}

fn line_body(line: &str) -> &str {
    line.trim_end_matches(&['\n', '\r'][..])
}

/// Returns the line with its comment prefix removed, or `None` if it is not commented.
///
/// Leading indentation and the line terminator are preserved.
fn strip_comment(line: &str) -> Option<String> {
    let rest = line.trim_start();
    let indent = &line[..line.len() - rest.len()];

    COMMENT_PREFIXES
        .iter()
        .find_map(|prefix| rest.strip_prefix(prefix))
        .map(|uncommented| format!("{indent}{uncommented}"))
}

/// A marker ending in a newline must end the line; any other marker may appear anywhere.
fn matches_marker(line: &str, marker: &str) -> bool {
    let body = line_body(line);
    match marker.strip_suffix('\n') {
        Some(tail) => body.ends_with(tail),
        None => body.contains(marker),
    }
}

/// Uncomments the first (or every) commented line matching `marker`.
///
/// In first-match mode the earliest line containing the marker decides: a
/// commented one is uncommented, an already uncommented one makes the step a
/// no-op. Returns `false` only when the marker appears nowhere.
fn uncomment_marker(lines: &mut [String], marker: &str, every: bool) -> bool {
    let mut found = false;

    for line in lines.iter_mut() {
        match strip_comment(line) {
            Some(uncommented) if matches_marker(&uncommented, marker) => {
                *line = uncommented;
                found = true;
            }
            None if matches_marker(line, marker) => found = true,
            _ => continue,
        }
        if !every {
            break;
        }
    }

    found
}

fn defines_variable(text: &str, variable: &str) -> bool {
    text.strip_prefix(variable)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// Continuation lines of a commented multi-line definition and the number of
/// bytes to strip from each.
fn continuation_prefix_len(line: &str) -> Option<usize> {
    let body = line_body(line);
    if body == "#" {
        return Some(1);
    }
    let rest = body.strip_prefix("# ")?;
    if rest.starts_with(' ') || rest.starts_with(&CLOSING_BRACKETS[..]) {
        Some(2)
    } else {
        None
    }
}

fn uncomment_variables(content: &str, variables: &[String]) -> std::result::Result<String, String> {
    let mut found = vec![false; variables.len()];
    let mut output = String::with_capacity(content.len());
    let mut in_definition = false;

    for line in content.split_inclusive('\n') {
        if in_definition {
            if let Some(strip) = continuation_prefix_len(line) {
                output.push_str(&line[strip..]);
                continue;
            }
            in_definition = false;
        }

        let commented = line.strip_prefix("# ");
        let mut started = false;
        for (index, variable) in variables.iter().enumerate() {
            if let Some(text) = commented {
                if defines_variable(text, variable) {
                    found[index] = true;
                    started = true;
                    break;
                }
            } else if defines_variable(line, variable) {
                found[index] = true;
            }
        }

        match commented {
            Some(text) if started => {
                output.push_str(text);
                in_definition = true;
            }
            _ => output.push_str(line),
        }
    }

    match found.iter().position(|hit| !hit) {
        Some(missing) => Err(variables[missing].clone()),
        None => Ok(output),
    }
}
