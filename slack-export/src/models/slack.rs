use std::{cmp::Ordering, fmt, hash::Hash};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message timestamp as sent by Slack, e.g. `"1512085950.000216"`.
///
/// Compared numerically as seconds plus fraction, so the raw string is only
/// kept for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ts {
    raw: String,
    seconds: u64,
    nanos: u32,
}

impl Ts {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (seconds, fraction) = raw.split_once('.').unwrap_or((raw, ""));

        if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid timestamp '{raw}'"));
        }
        if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid timestamp fraction '{raw}'"));
        }

        let seconds = seconds
            .parse::<u64>()
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))?;
        let nanos = format!("{fraction:0<9}")
            .parse::<u32>()
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))?;

        Ok(Self {
            raw: raw.to_string(),
            seconds,
            nanos,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.seconds).ok()?, self.nanos)
    }

    fn key(&self) -> (u64, u32) {
        (self.seconds, self.nanos)
    }
}

impl TryFrom<String> for Ts {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Ts::parse(&raw)
    }
}

impl From<Ts> for String {
    fn from(ts: Ts) -> Self {
        ts.raw
    }
}

impl PartialEq for Ts {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ts {}

impl PartialOrd for Ts {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ts {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Ts {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Public channels
    Public,
    /// Private channels
    Private,
    /// Multi-person direct messages
    Mpim,
    /// One-to-one direct messages
    Im,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Public,
        ChannelKind::Private,
        ChannelKind::Mpim,
        ChannelKind::Im,
    ];

    /// Name used by the `types` parameter of `conversations.list`.
    pub fn api_name(self) -> &'static str {
        match self {
            ChannelKind::Public => "public_channel",
            ChannelKind::Private => "private_channel",
            ChannelKind::Mpim => "mpim",
            ChannelKind::Im => "im",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelKind::Public => "public",
            ChannelKind::Private => "private",
            ChannelKind::Mpim => "mpim",
            ChannelKind::Im => "im",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: Option<String>,
    /// Peer of a one-to-one direct message.
    pub user: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        if self.is_im {
            ChannelKind::Im
        } else if self.is_mpim {
            ChannelKind::Mpim
        } else if self.is_private || self.is_group {
            ChannelKind::Private
        } else {
            ChannelKind::Public
        }
    }
}

/// A channel message or thread reply.
///
/// Fields this tool does not look at are kept in `extra` so that the exported
/// record is the one Slack returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub ts: Ts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<Ts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// True for the first message of a thread that has replies to fetch.
    ///
    /// Replies broadcast to the channel carry a `thread_ts` pointing at their
    /// parent and are not parents themselves.
    pub fn is_thread_parent(&self) -> bool {
        self.thread_ts.as_ref() == Some(&self.ts) && self.reply_count.is_none_or(|count| count > 0)
    }
}
