//! Codec for the newline-delimited `key:value` format used by associate and
//! `check_authentication` response bodies, and for signature base strings.

use log::debug;

use std::collections::HashMap;

/// Parse a KV-form body into ordered pairs. Keys and values are trimmed of
/// surrounding whitespace; lines without a colon are skipped.
pub(crate) fn parse(body: &str) -> Vec<(String, String)> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.split_once(':') {
            Some((key, value)) => Some((key.trim().to_string(), value.trim().to_string())),
            None => {
                debug!("skipping malformed KV-form line {line:?}");
                None
            }
        })
        .collect()
}

/// Parse a KV-form body into a lookup map. Later duplicate keys win.
pub(crate) fn to_map(body: &str) -> HashMap<String, String> {
    parse(body).into_iter().collect()
}

/// Emit `key:value\n` records, preserving input order. Signature base strings
/// depend on this ordering.
pub(crate) fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out
}
