use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::window::DateWindow;

const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const DATE_ONLY_LEN: usize = 10;
const TIMESTAMP_LEN: usize = 24;

/// Defaulted windows drift with the wall clock, so their redirects stay
/// cacheable for ten minutes at most.
const DEFAULTED_REDIRECT_TTL_SECS: u32 = 600;
/// A timestamp-form query is a stable alias of its date-only form.
const CANONICAL_REDIRECT_TTL_SECS: u32 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid '{field}' date: {value}")]
pub struct InvalidDate {
    pub field: &'static str,
    pub value: String,
}

/// Outcome of query-window normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Canonical(DateWindow),
    Redirect {
        permanent: bool,
        location: String,
        max_age_secs: u32,
    },
}

struct ParsedDate {
    date: NaiveDate,
    truncated: bool,
}

/// Validates and canonicalizes the `from`/`to` query parameters.
///
/// Resolves in two sequential passes, redirecting at the first pass that
/// needed a change: defaulting of absent bounds (302, supplied values kept
/// verbatim), then truncation of timestamp forms to date-only (301). A value
/// matching neither accepted form fails naming the offending field.
pub fn normalize(
    path: &str,
    params: &BTreeMap<String, String>,
    today: NaiveDate,
) -> Result<Normalized, InvalidDate> {
    let from = params
        .get("from")
        .map(|raw| parse_date_param("from", raw))
        .transpose()?;
    let to = params
        .get("to")
        .map(|raw| parse_date_param("to", raw))
        .transpose()?;

    let (Some(from), Some(to)) = (from, to) else {
        let to_value = params
            .get("to")
            .cloned()
            .unwrap_or_else(|| today.format(DATE_ONLY_FORMAT).to_string());
        let from_value = params.get("from").cloned().unwrap_or_else(|| to_value.clone());
        return Ok(Normalized::Redirect {
            permanent: false,
            location: location(path, &from_value, &to_value, params),
            max_age_secs: DEFAULTED_REDIRECT_TTL_SECS,
        });
    };

    if from.truncated || to.truncated {
        return Ok(Normalized::Redirect {
            permanent: true,
            location: location(path, &from.date.to_string(), &to.date.to_string(), params),
            max_age_secs: CANONICAL_REDIRECT_TTL_SECS,
        });
    }

    Ok(Normalized::Canonical(DateWindow {
        from: from.date,
        to: to.date,
    }))
}

fn parse_date_param(field: &'static str, raw: &str) -> Result<ParsedDate, InvalidDate> {
    if raw.len() == DATE_ONLY_LEN {
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_ONLY_FORMAT) {
            return Ok(ParsedDate {
                date,
                truncated: false,
            });
        }
    }
    if raw.len() == TIMESTAMP_LEN {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
            return Ok(ParsedDate {
                date: timestamp.date(),
                truncated: true,
            });
        }
    }
    Err(InvalidDate {
        field,
        value: raw.to_string(),
    })
}

fn location(path: &str, from: &str, to: &str, params: &BTreeMap<String, String>) -> String {
    let mut query = format!("from={from}&to={to}");
    for (key, value) in params {
        if key == "from" || key == "to" {
            continue;
        }
        query.push('&');
        query.push_str(key);
        query.push('=');
        query.push_str(value);
    }
    format!("{path}?{query}")
}
