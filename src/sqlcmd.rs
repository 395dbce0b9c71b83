//! SQLCMD directive processing
//!
//! Setup and deployment scripts are frequently written for `sqlcmd` mode.
//! The server does not understand those directives, so before a script is
//! split into batches its `:setvar` definitions are collected, `$(name)`
//! references substituted, `:r` includes expanded, and every other directive
//! line blanked out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use encoding_rs::WINDOWS_1252;
use regex::Regex;

use crate::error::FixtureError;

/// SQLCMD variable values by name
pub type SqlCmdVariables = HashMap<String, String>;

/// `:setvar Name "Value"` (quotes optional, value optional)
static SETVAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*:setvar\s+(\w+)(?:\s+"?([^"\r\n]*)"?)?\s*$"#).unwrap()
});

/// `:r path\to\file.sql` or `:r "path with spaces\file.sql"`
static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^\s*:r\s+(?:"([^"]+)"|(\S+))\s*$"#).unwrap());

/// Any other directive: `:on error exit`, `:connect`, `:quit`, ...
static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*:[A-Za-z]").unwrap());

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\((\w+)\)").unwrap());

/// Read a SQL file, trying UTF-8 first and Windows-1252 as fallback.
/// A leading BOM is stripped.
pub fn read_sql_file(path: &Path) -> Result<String, FixtureError> {
    let read_error = |source| FixtureError::SqlFileReadError {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(read_error)?;
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let (decoded, _, had_errors) = WINDOWS_1252.decode(e.as_bytes());
            if had_errors {
                return Err(read_error(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "File contains invalid characters",
                )));
            }
            decoded.into_owned()
        }
    };

    Ok(match content.strip_prefix('\u{FEFF}') {
        Some(stripped) => stripped.to_string(),
        None => content,
    })
}

/// Apply SQLCMD directives to script content
///
/// `variables` seeds the variable scope; `:setvar` lines in the script (or in
/// anything it includes) add to it for the remainder of the script. Unknown
/// `$(name)` references are left as they are.
///
/// Directive lines are replaced by empty lines, so line numbers in the output
/// match the original file up to its first `:r` include. An include is
/// replaced by the included text between `-- BEGIN :r` and `-- END :r` marker
/// lines, which shifts every later line; `split --sqlcmd` prints the expanded
/// text those line numbers refer to.
///
/// # Errors
/// Returns an error if:
/// - An included file cannot be found or read
/// - A circular include is detected
pub fn preprocess(content: &str, source_file: &Path, variables: &SqlCmdVariables) -> Result<String> {
    let mut scope = variables.clone();
    let mut chain = vec![source_file
        .canonicalize()
        .unwrap_or_else(|_| source_file.to_path_buf())];
    preprocess_recursive(content, source_file, &mut scope, &mut chain)
}

fn preprocess_recursive(
    content: &str,
    source_file: &Path,
    scope: &mut SqlCmdVariables,
    chain: &mut Vec<PathBuf>,
) -> Result<String> {
    let source_dir = source_file.parent().unwrap_or(Path::new("."));
    let mut result = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        if let Some(caps) = SETVAR_RE.captures(line) {
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let value = substitute_variables(value, scope);
            scope.insert(caps[1].to_string(), value);
            result.push_str(line_ending(line));
            continue;
        }

        if let Some(caps) = INCLUDE_RE.captures(line) {
            let raw_path = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            let include_path_str = substitute_variables(raw_path, scope).replace('\\', "/");
            let include_path = Path::new(&include_path_str);

            let resolved_path = if include_path.is_absolute() {
                include_path.to_path_buf()
            } else {
                source_dir.join(include_path)
            };

            let canonical_path =
                resolved_path
                    .canonicalize()
                    .map_err(|_| FixtureError::SqlcmdIncludeNotFound {
                        path: resolved_path.clone(),
                        source_file: source_file.to_path_buf(),
                    })?;

            if chain.contains(&canonical_path) {
                let chain_display = chain
                    .iter()
                    .chain(std::iter::once(&canonical_path))
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(FixtureError::SqlcmdCircularInclude {
                    path: canonical_path,
                    chain: chain_display,
                }
                .into());
            }

            let included_content = read_sql_file(&canonical_path)?;

            chain.push(canonical_path.clone());
            let expanded =
                preprocess_recursive(&included_content, &canonical_path, scope, chain)?;
            chain.pop();

            result.push_str(&format!("-- BEGIN :r {}\n", include_path_str));
            result.push_str(&expanded);
            if !expanded.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&format!("-- END :r {}\n", include_path_str));
            continue;
        }

        if DIRECTIVE_RE.is_match(line) {
            result.push_str(line_ending(line));
            continue;
        }

        result.push_str(&substitute_variables(line, scope));
    }

    Ok(result)
}

/// Replace `$(name)` references with their values
pub fn substitute_variables(text: &str, variables: &SqlCmdVariables) -> String {
    VARIABLE_RE
        .replace_all(text, |caps: &regex::Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}
