use anyhow::{Result, anyhow};
use log::debug;
use regex::Regex;

pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|err| anyhow!("invalid domain name: {err}"))?;
    Ok(ascii.to_lowercase())
}

/// Comparison form of a name; wildcard entries are not valid IDNA, so
/// anything that fails normalization is only trimmed and lowercased.
fn comparable(input: &str) -> String {
    normalize_domain(input)
        .unwrap_or_else(|_| input.trim().trim_end_matches('.').to_lowercase())
}

/// Checks whether `candidate` is covered by any entry of `domains`.
///
/// Entries are tried in order and the first match wins:
/// - exact names compare case-insensitively,
/// - a bare `*` covers everything,
/// - `*.suffix` covers exactly one extra label in front of `suffix`,
/// - any other entry containing `*` is matched as a glob where `*` spans
///   any run of characters, dots included (legacy wildcard styles).
pub fn domain_matches(candidate: &str, domains: &[String]) -> bool {
    let candidate = comparable(candidate);
    if candidate.is_empty() {
        return false;
    }
    domains
        .iter()
        .any(|entry| entry_matches(&candidate, &comparable(entry)))
}

fn entry_matches(candidate: &str, entry: &str) -> bool {
    if entry == candidate {
        return true;
    }
    if entry == "*" {
        return true;
    }
    if let Some(suffix) = entry.strip_prefix("*.") {
        if !suffix.contains('*') {
            return single_label_wildcard(candidate, suffix);
        }
    }
    if entry.contains('*') {
        return glob_matches(entry, candidate);
    }
    false
}

fn single_label_wildcard(candidate: &str, suffix: &str) -> bool {
    match candidate.strip_suffix(suffix) {
        Some(head) => match head.strip_suffix('.') {
            Some(label) => !label.is_empty() && !label.contains('.'),
            None => false,
        },
        None => false,
    }
}

/// `*` spans any run of characters, dots included; everything else is literal.
fn glob_matches(entry: &str, candidate: &str) -> bool {
    let pattern = format!("^{}$", regex::escape(entry).replace(r"\*", ".*"));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(candidate),
        Err(err) => {
            debug!("[certificate] ignoring unusable domain entry {entry:?}: {err}");
            false
        }
    }
}
