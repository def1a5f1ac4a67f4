//! Utilities (argument splitting, variable expansion).

use std::collections::HashMap;

/// Split a command-line fragment into arguments.
///
/// Whitespace separates arguments; single or double quotes group text
/// (including whitespace) into one argument and are removed. Backslashes are
/// literal so Windows paths survive untouched.
pub fn split_arguments(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

/// Expand `$NAME`, `${NAME}` and `%NAME%` references from `vars`.
///
/// Unknown variables are left exactly as written, as is a lone `$` or `%`.
pub fn expand_vars(text: &str, vars: &HashMap<String, String>) -> String {
    expand(text, vars, true)
}

/// Expand only `$NAME` and `${NAME}`; `%` is always literal.
pub fn expand_macros(text: &str, vars: &HashMap<String, String>) -> String {
    expand(text, vars, false)
}

fn expand(text: &str, vars: &HashMap<String, String>, percent: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(|c: char| c == '$' || (percent && c == '%')) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let (reference, name) = match split_reference(tail) {
            Some(found) => found,
            None => {
                out.push_str(&tail[..1]);
                rest = &tail[1..];
                continue;
            }
        };
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(reference),
        }
        rest = &tail[reference.len()..];
    }
    out.push_str(rest);
    out
}

/// For text starting at `$` or `%`, the whole reference and the variable name.
fn split_reference(tail: &str) -> Option<(&str, &str)> {
    let is_name = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if let Some(body) = tail.strip_prefix("${") {
        let end = body.find('}')?;
        let name = &body[..end];
        return (!name.is_empty()).then(|| (&tail[..end + 3], name));
    }
    if let Some(body) = tail.strip_prefix('%') {
        let end = body.find('%')?;
        let name = &body[..end];
        return (!name.is_empty() && name.chars().all(is_name)).then(|| (&tail[..end + 2], name));
    }
    let body = &tail[1..];
    let end = body.find(|c: char| !is_name(c)).unwrap_or(body.len());
    (end > 0).then(|| (&tail[..end + 1], &body[..end]))
}
