use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use futures::{StreamExt, stream};
use log::{error, info};

use crate::{
    api::slack::SlackClient,
    export::{Exporter, plan_jobs},
    rate_limit::RateLimiter,
    settings::ExportConfig,
};

pub async fn run(config: ExportConfig) -> Result<()> {
    let client = SlackClient::new(&config.api_url, &config.token, config.client_options())
        .context("cannot create Slack client")?;
    let limiter = RateLimiter::system(config.min_request_interval, config.default_backoff);
    let exporter = Exporter::new(client, limiter);

    let users = exporter
        .list_users()
        .await
        .context("cannot list users")?
        .into_iter()
        .map(|user| (user.id.clone(), user))
        .collect::<HashMap<_, _>>();

    let channels = exporter
        .list_channels()
        .await
        .context("cannot list channels")?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("cannot create {}", config.output_dir.display()))?;

    let jobs = plan_jobs(channels, &users);
    let total = jobs.len();

    let mut results = stream::iter(jobs)
        .map(|mut job| {
            let exporter = &exporter;
            let output_dir = config.output_dir.as_path();
            let format = config.output_format;
            async move {
                let result = exporter.export_channel(&mut job, output_dir, format).await;
                (job, result)
            }
        })
        .buffer_unordered(config.jobs);

    let mut failed = Vec::new();
    while let Some((job, result)) = results.next().await {
        match result {
            Ok(path) => info!("exported {} to {}", job.label, path.display()),
            Err(e) if e.is_fatal() => {
                return Err(anyhow!(e).context(format!("export of {} aborted", job.label)));
            }
            Err(e) => {
                error!("channel {} failed: {}", job.label, e);
                failed.push(job.label);
            }
        }
    }

    let stats = exporter.stats().await;
    info!(
        "{} of {} channels exported ({} requests, {} rate limited)",
        total - failed.len(),
        total,
        stats.requests,
        stats.throttled
    );

    if !failed.is_empty() {
        failed.sort();
        bail!(
            "{} of {} channels failed: {}",
            failed.len(),
            total,
            failed.join(", ")
        );
    }

    Ok(())
}
