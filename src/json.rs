//! Strict JSON decoding with caller-friendly messages, and pretty encoding.
//!
//! [`decode`] rejects fields the target type does not know, at any depth,
//! without the type having to opt in with `#[serde(deny_unknown_fields)]`.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::error::Category;

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("body must not be empty")]
    Empty,
    #[error("body contains badly-formed JSON (at line {line}, column {column})")]
    Syntax { line: usize, column: usize },
    #[error("body contains badly-formed JSON")]
    Truncated,
    #[error("body contains incorrect JSON type (at line {line}, column {column})")]
    Type { line: usize, column: usize },
    #[error("body contains unknown field {0:?}")]
    UnknownField(String),
    #[error("body must only contain a single JSON value")]
    TrailingData,
    #[error("{0}")]
    Invalid(String),
    #[error("failed to read body: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decodes exactly one JSON value from `body` into `T`.
///
/// The first field `T` would silently ignore is reported as
/// [`JsonError::UnknownField`], named by its dotted path.
pub fn decode<T>(body: &[u8]) -> Result<T, JsonError>
where
    T: DeserializeOwned,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(JsonError::Empty);
    }

    let mut unknown = None;
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let value = serde_ignored::deserialize(&mut deserializer, |path| {
        unknown.get_or_insert_with(|| path.to_string());
    })
    .map_err(describe)?;
    deserializer.end().map_err(|_| JsonError::TrailingData)?;

    match unknown {
        Some(field) => Err(JsonError::UnknownField(field)),
        None => Ok(value),
    }
}

/// Reads `reader` to the end and decodes it with [`decode`].
pub fn decode_reader<R, T>(mut reader: R) -> Result<T, JsonError>
where
    R: Read,
    T: DeserializeOwned,
{
    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    decode(&body)
}

/// Pretty-prints `value` with two-space indentation.
pub fn pretty<T>(value: &T) -> Result<String, JsonError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string_pretty(value).map_err(JsonError::Encode)
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn encode<W, T>(mut writer: W, value: &T) -> Result<(), JsonError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    serde_json::to_writer_pretty(&mut writer, value).map_err(JsonError::Encode)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn describe(err: serde_json::Error) -> JsonError {
    match err.classify() {
        Category::Eof => JsonError::Truncated,
        Category::Syntax => JsonError::Syntax {
            line: err.line(),
            column: err.column(),
        },
        Category::Io => JsonError::Invalid(err.to_string()),
        Category::Data => {
            let message = err.to_string();
            if let Some(field) = unknown_field(&message) {
                JsonError::UnknownField(field)
            } else if message.starts_with("invalid type") || message.starts_with("invalid value") {
                JsonError::Type {
                    line: err.line(),
                    column: err.column(),
                }
            } else {
                JsonError::Invalid(message)
            }
        }
    }
}

/// Extracts `foo` from "unknown field `foo`, expected ...".
fn unknown_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_owned())
}
