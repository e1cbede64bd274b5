use std::{
    fmt,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, ser::PrettyFormatter};

use crate::error::Result;
use crate::models::slack::Message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum OutputFormat {
    /// One indented JSON array per channel (.json)
    #[default]
    #[value(name = "pretty-array", alias = "json")]
    #[serde(rename = "pretty-array", alias = "json")]
    Json,
    /// One compact JSON record per line (.jsonl)
    #[value(name = "line-delimited", alias = "jsonl")]
    #[serde(rename = "line-delimited", alias = "jsonl")]
    Jsonl,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "pretty-array"),
            OutputFormat::Jsonl => write!(f, "line-delimited"),
        }
    }
}

/// Turns a channel or user name into a file stem that is valid on common
/// filesystems. Falls back to `fallback` when nothing usable is left.
pub fn safe_file_name(name: &str, fallback: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn to_record(message: &Message) -> Result<Value> {
    Ok(sort_keys(serde_json::to_value(message)?))
}

/// Serializes messages in the given format. Keys are sorted so exports diff cleanly.
pub fn render(messages: &[Message], format: OutputFormat) -> Result<Vec<u8>> {
    let records = messages.iter().map(to_record).collect::<Result<Vec<_>>>()?;
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Json => {
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            records.serialize(&mut serializer)?;
            buffer.push(b'\n');
        }
        OutputFormat::Jsonl => {
            for record in &records {
                serde_json::to_writer(&mut buffer, record)?;
                buffer.push(b'\n');
            }
        }
    }

    Ok(buffer)
}

/// Writes one channel file into an existing directory and returns its path.
pub async fn write_channel(
    dir: &Path,
    file_stem: &str,
    messages: &[Message],
    format: OutputFormat,
) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", file_stem, format.extension()));
    let content = render(messages, format)?;
    tokio::fs::write(&path, content).await?;
    Ok(path)
}
