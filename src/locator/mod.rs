//! Data-source locator normalization.
//!
//! Layer definitions store their data sources relative to the project file.
//! This module rewrites relative locators (`./`, `../`) to absolute form so
//! cached layer objects can be keyed and shared across worker processes
//! regardless of where the project was loaded from.
//!
//! Three locator syntaxes are recognized:
//! - plain file paths,
//! - database locators (`dbname='…' table=…`), where only the embedded
//!   database path of host-less (file based) databases is rewritten,
//! - `file:` URL locators, where only the path component before the query
//!   string is rewritten.
//!
//! Anything malformed is returned unchanged; normalization never fails.

/// Normalize a data-source locator against the owning project's path.
///
/// Dispatches on the locator syntax and delegates to [`normalize_path`] for
/// the embedded path component. Locators that do not carry a relative
/// marker come back unchanged.
pub fn normalize_locator(locator: &str, project_path: &str) -> String {
    if locator.starts_with("dbname") {
        normalize_database_locator(locator, project_path)
    } else if let Some(rest) = locator.strip_prefix("file:") {
        normalize_file_url_locator(rest, project_path)
    } else {
        normalize_path(locator, project_path)
    }
}

/// Convert a project-relative path to absolute form.
///
/// Only paths beginning with `./` or `../` are rewritten; anything else is
/// the identity. The project path contributes every segment but its final
/// one (the project file name); `.` segments are dropped and each `..`
/// segment deletes its preceding segment. A `..` with nothing before it is
/// left in place.
pub fn normalize_path(path: &str, project_path: &str) -> String {
    if !path.starts_with("./") && !path.starts_with("../") {
        return path.to_string();
    }

    let src = path.replace('\\', "/");
    let proj = project_path.replace('\\', "/");
    let unc = proj.starts_with("//");

    let mut segments: Vec<&str> = proj.split('/').filter(|s| !s.is_empty()).collect();
    if unc {
        segments.insert(0, "");
        segments.insert(0, "");
    }

    // Drop the project file name itself.
    segments.pop();

    segments.extend(src.split('/').filter(|s| !s.is_empty()));
    segments.retain(|s| *s != ".");

    // Fold each ".." into its preceding segment. A leading ".." has nothing
    // to consume and stops the folding, matching the legacy behavior.
    loop {
        match segments.iter().position(|s| *s == "..") {
            Some(pos) if pos > 0 => {
                segments.remove(pos - 1);
                segments.remove(pos - 1);
            }
            _ => break,
        }
    }

    if !unc {
        segments.insert(0, "");
    }

    segments.join("/")
}

/// Rewrite the embedded database path of a `dbname=…` locator.
///
/// Locators with a `host=` entry point at a database server rather than a
/// file and are returned unchanged, as is anything whose `dbname` value
/// cannot be located.
fn normalize_database_locator(locator: &str, project_path: &str) -> String {
    // Networked databases keep their locator untouched.
    if parameter_value(locator, "host").is_some_and(|host| !host.is_empty()) {
        return locator.to_string();
    }

    let Some((start, end, dbpath)) = database_path_span(locator) else {
        return locator.to_string();
    };

    let absolute = normalize_path(dbpath, project_path);
    if absolute == dbpath {
        return locator.to_string();
    }

    let mut out = String::with_capacity(locator.len() + absolute.len());
    out.push_str(&locator[..start]);
    out.push_str(&absolute);
    out.push_str(&locator[end..]);
    out
}

/// Rewrite the path component of a `file:` URL locator.
///
/// `rest` is the locator with the `file:` scheme already stripped; the
/// query string (from `?`), if any, is preserved verbatim.
fn normalize_file_url_locator(rest: &str, project_path: &str) -> String {
    let (path, query) = match rest.find('?') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let absolute = normalize_path(path, project_path);
    if absolute == path {
        return format!("file:{rest}");
    }
    format!("file:{absolute}{query}")
}

/// Byte span and value of the `dbname` parameter within a database locator.
///
/// The value may be single-quoted (`dbname='./a.db'`) or bare, ending at
/// the next whitespace.
fn database_path_span(locator: &str) -> Option<(usize, usize, &str)> {
    let key_start = locator.find("dbname=")?;
    let value_start = key_start + "dbname=".len();
    let remainder = &locator[value_start..];

    if let Some(quoted) = remainder.strip_prefix('\'') {
        let len = quoted.find('\'')?;
        let start = value_start + 1;
        Some((start, start + len, &locator[start..start + len]))
    } else {
        let len = remainder
            .find(char::is_whitespace)
            .unwrap_or(remainder.len());
        Some((value_start, value_start + len, &locator[value_start..value_start + len]))
    }
}

/// Value of a space-separated `key=value` parameter within a locator.
fn parameter_value<'a>(locator: &'a str, key: &str) -> Option<&'a str> {
    for token in locator.split_whitespace() {
        if let Some(value) = token.strip_prefix(key) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value.trim_matches('\''));
            }
        }
    }
    None
}
