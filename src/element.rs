//! Helpers for pulling attributes and text out of quick-xml events.

use quick_xml::events::BytesStart;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttrError {
    #[error("could not parse an attribute on <{element}>")]
    Malformed {
        element: String,
        #[source]
        source: quick_xml::events::attributes::AttrError,
    },
    #[error("could not decode an attribute value on <{element}>")]
    Decode {
        element: String,
        #[source]
        source: quick_xml::Error,
    },
    #[error("<{element}> is missing the required `{attribute}` attribute")]
    Missing { element: String, attribute: String },
}

pub fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Look up an attribute by name, unescaping its value.
pub fn optional_attr(e: &BytesStart, name: &str) -> Result<Option<String>, AttrError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|source| AttrError::Malformed {
            element: tag_name(e),
            source,
        })?;
        if attr.key.local_name().as_ref() != name.as_bytes() {
            continue;
        }
        let value = attr.unescape_value().map_err(|source| AttrError::Decode {
            element: tag_name(e),
            source,
        })?;
        return Ok(Some(value.into_owned()));
    }
    Ok(None)
}

pub fn required_attr(e: &BytesStart, name: &str) -> Result<String, AttrError> {
    optional_attr(e, name)?.ok_or_else(|| AttrError::Missing {
        element: tag_name(e),
        attribute: name.to_string(),
    })
}

/// Boolean attributes are spelled `"true"` or absent.
pub fn flag_attr(e: &BytesStart, name: &str) -> Result<bool, AttrError> {
    Ok(optional_attr(e, name)?.as_deref() == Some("true"))
}

/// Trim each line of a pcdata body while keeping paragraph breaks, and
/// strip leading/trailing blank lines.
pub fn trim_text(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(0);
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    match lines.get(start..end) {
        Some(kept) => kept.join("\n"),
        None => String::new(),
    }
}
