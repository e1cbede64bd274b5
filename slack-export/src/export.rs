use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    api::slack::SlackApi,
    error::Result,
    models::slack::{Channel, Message, Ts, User},
    pagination::collect_all,
    rate_limit::{LimiterStats, RateLimiter},
    thread::{merge_by_ts, normalize},
    writer::{OutputFormat, safe_file_name, write_channel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Pending,
    Listing,
    Resolving,
    Writing,
    Done,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Done | ExportState::Failed)
    }

    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;

        match (self, next) {
            (Pending, Listing) | (Listing, Resolving) | (Resolving, Writing) | (Writing, Done) => {
                true
            }
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Pending => "pending",
            ExportState::Listing => "listing",
            ExportState::Resolving => "resolving",
            ExportState::Writing => "writing",
            ExportState::Done => "done",
            ExportState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Export of a single channel into `<file_stem>.<ext>`.
#[derive(Debug)]
pub struct ExportJob {
    pub channel: Channel,
    /// Human readable name used in logs.
    pub label: String,
    pub file_stem: String,
    state: ExportState,
}

impl ExportJob {
    pub fn new(channel: Channel, label: String, file_stem: String) -> Self {
        Self {
            channel,
            label,
            file_stem,
            state: ExportState::Pending,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    fn advance(&mut self, next: ExportState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal export transition {} -> {}",
            self.state,
            next
        );
        debug!("{}: {} -> {}", self.label, self.state, next);
        self.state = next;
    }
}

/// Name shown for a channel: its own name, or the peer's user name for a
/// direct message.
pub fn channel_label(channel: &Channel, users: &HashMap<String, User>) -> String {
    if let Some(name) = channel.name.as_deref().filter(|name| !name.is_empty()) {
        return name.to_string();
    }

    match &channel.user {
        Some(user_id) => users
            .get(user_id)
            .map(|user| user.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user_id.clone()),
        None => channel.id.clone(),
    }
}

/// Creates one job per channel with a file name no other job uses.
///
/// Names are compared case-insensitively. A clash gets the channel id
/// appended, then a counter if that name is taken as well.
pub fn plan_jobs(channels: Vec<Channel>, users: &HashMap<String, User>) -> Vec<ExportJob> {
    let mut taken = HashSet::new();

    channels
        .into_iter()
        .map(|channel| {
            let label = channel_label(&channel, users);
            let base = safe_file_name(&label, &channel.id);

            let mut file_stem = base.clone();
            if !taken.insert(file_stem.to_lowercase()) {
                let suffixed = format!("{}-{}", base, safe_file_name(&channel.id, "channel"));
                file_stem = suffixed.clone();
                let mut n = 2;
                while !taken.insert(file_stem.to_lowercase()) {
                    file_stem = format!("{suffixed}-{n}");
                    n += 1;
                }
            }

            ExportJob::new(channel, label, file_stem)
        })
        .collect()
}

pub struct Exporter<A> {
    api: A,
    limiter: RateLimiter,
}

impl<A: SlackApi> Exporter<A> {
    pub fn new(api: A, limiter: RateLimiter) -> Self {
        Self { api, limiter }
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        info!("fetching users");
        let api = &self.api;
        let users = collect_all(&self.limiter, |cursor| async move {
            api.users_page(cursor.as_deref()).await
        })
        .await?;
        info!("{} users fetched", users.len());

        Ok(users)
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        info!("fetching channels");
        let api = &self.api;
        let channels = collect_all(&self.limiter, |cursor| async move {
            api.channels_page(cursor.as_deref()).await
        })
        .await?;
        info!("{} channels fetched", channels.len());

        Ok(channels)
    }

    /// Full history of a channel, oldest first, without thread replies.
    pub async fn fetch_messages(&self, channel: &Channel) -> Result<Vec<Message>> {
        let api = &self.api;
        let channel_id = channel.id.as_str();
        let mut messages = collect_all(&self.limiter, |cursor| async move {
            api.history_page(channel_id, cursor.as_deref()).await
        })
        .await?;

        // history pages run newest to oldest
        messages.reverse();
        Ok(normalize(messages))
    }

    /// Replies of one thread, oldest first, without the parent message.
    pub async fn fetch_replies(&self, channel: &Channel, thread_ts: &Ts) -> Result<Vec<Message>> {
        let api = &self.api;
        let channel_id = channel.id.as_str();
        let replies = collect_all(&self.limiter, |cursor| async move {
            api.replies_page(channel_id, thread_ts, cursor.as_deref())
                .await
        })
        .await?;

        Ok(normalize(
            replies
                .into_iter()
                .filter(|reply| &reply.ts != thread_ts)
                .collect(),
        ))
    }

    /// Expands every thread parent in `messages` with its replies, keeping
    /// the whole channel in timestamp order.
    pub async fn resolve_threads(
        &self,
        channel: &Channel,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let parents: Vec<Ts> = messages
            .iter()
            .filter(|message| message.is_thread_parent())
            .map(|message| message.ts.clone())
            .collect();

        if parents.is_empty() {
            return Ok(messages);
        }

        debug!("resolving {} threads in {}", parents.len(), channel.id);

        let mut streams = Vec::with_capacity(parents.len() + 1);
        streams.push(messages);
        for thread_ts in &parents {
            streams.push(self.fetch_replies(channel, thread_ts).await?);
        }

        Ok(merge_by_ts(streams))
    }

    /// Runs one job to completion. On error the job ends up `Failed` and
    /// nothing is written for it.
    pub async fn export_channel(
        &self,
        job: &mut ExportJob,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        let result = self.run_job(job, output_dir, format).await;
        if result.is_err() {
            job.advance(ExportState::Failed);
        }
        result
    }

    async fn run_job(
        &self,
        job: &mut ExportJob,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        job.advance(ExportState::Listing);
        info!(
            "fetching messages for {} channel {}{}",
            job.channel.kind(),
            job.label,
            if job.channel.is_archived { " (archived)" } else { "" }
        );
        let messages = self.fetch_messages(&job.channel).await?;

        job.advance(ExportState::Resolving);
        let messages = self.resolve_threads(&job.channel, messages).await?;
        log_span(&job.label, &messages);

        job.advance(ExportState::Writing);
        let path = write_channel(output_dir, &job.file_stem, &messages, format).await?;
        debug!("wrote {}", path.display());

        job.advance(ExportState::Done);
        Ok(path)
    }

    pub async fn stats(&self) -> LimiterStats {
        self.limiter.stats().await
    }
}

fn log_span(label: &str, messages: &[Message]) {
    let date = |message: Option<&Message>| {
        message
            .and_then(|m| m.ts.to_datetime())
            .map(|d| d.format("%Y-%m-%d").to_string())
    };

    match (date(messages.first()), date(messages.last())) {
        (Some(first), Some(last)) => info!(
            "{} messages fetched for {} ({} to {})",
            messages.len(),
            label,
            first,
            last
        ),
        _ => info!("{} messages fetched for {}", messages.len(), label),
    }
}
