use async_trait::async_trait;
use log::trace;
use reqwest::{Client, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, SlackError};
use crate::models::{
    Page,
    slack::{Channel, ChannelKind, Message, Ts, User},
};

pub const DEFAULT_API_URL: &str = "https://slack.com/api";

/// One call per page of each listing method used by the exporter.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn users_page(&self, cursor: Option<&str>) -> Result<Page<User>>;
    async fn channels_page(&self, cursor: Option<&str>) -> Result<Page<Channel>>;
    async fn history_page(&self, channel_id: &str, cursor: Option<&str>) -> Result<Page<Message>>;
    async fn replies_page(
        &self,
        channel_id: &str,
        thread_ts: &Ts,
        cursor: Option<&str>,
    ) -> Result<Page<Message>>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub page_size: u32,
    pub types: Vec<ChannelKind>,
    pub include_archived: bool,
    pub timeout: Duration,
}

pub struct SlackClient {
    client: Client,
    base_url: String,
    options: ClientOptions,
}

impl SlackClient {
    pub fn new(base_url: &str, token: &str, options: ClientOptions) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut authorization = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| SlackError::Auth("token contains invalid characters".to_string()))?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);

        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
        })
    }

    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        trace!("GET {} {:?}", url, params);

        let response = self.client.get(&url).query(params).send().await?;
        Self::check_response(response).await
    }

    /// Turns HTTP statuses and `ok: false` bodies into typed errors.
    async fn check_response(response: Response) -> Result<Value> {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlackError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SlackError::Auth(format!("server answered {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await?;
            return Err(SlackError::Http { status, body });
        }

        let body: Value = serde_json::from_str(&response.text().await?)?;

        match body.get("ok").and_then(Value::as_bool) {
            Some(true) => Ok(body),
            Some(false) => {
                let code = body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error");
                Err(SlackError::from_api_code(code, retry_after))
            }
            None => Err(SlackError::Format("response has no 'ok' flag".to_string())),
        }
    }

    fn page_params(&self, cursor: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.options.page_size.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        params
    }
}

/// Extracts `field` and the next cursor from a successful listing response.
fn into_page<T: DeserializeOwned>(mut body: Value, field: &str) -> Result<Page<T>> {
    let items = match body.get_mut(field).map(Value::take) {
        Some(items) => serde_json::from_value(items)?,
        None => {
            return Err(SlackError::Format(format!(
                "response has no '{}' field",
                field
            )));
        }
    };

    // `has_more: false` wins over a stale cursor.
    if body.get("has_more").and_then(Value::as_bool) == Some(false) {
        return Ok(Page::last(items));
    }

    let next_cursor = body
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Page::new(items, next_cursor))
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn users_page(&self, cursor: Option<&str>) -> Result<Page<User>> {
        let body = self.call("users.list", &self.page_params(cursor)).await?;
        into_page(body, "members")
    }

    async fn channels_page(&self, cursor: Option<&str>) -> Result<Page<Channel>> {
        let mut params = self.page_params(cursor);
        let types = self
            .options
            .types
            .iter()
            .map(|kind| kind.api_name())
            .collect::<Vec<_>>()
            .join(",");
        params.push(("types", types));
        params.push((
            "exclude_archived",
            (!self.options.include_archived).to_string(),
        ));

        let body = self.call("conversations.list", &params).await?;
        into_page(body, "channels")
    }

    async fn history_page(&self, channel_id: &str, cursor: Option<&str>) -> Result<Page<Message>> {
        let mut params = self.page_params(cursor);
        params.push(("channel", channel_id.to_string()));

        let body = self.call("conversations.history", &params).await?;
        into_page(body, "messages")
    }

    async fn replies_page(
        &self,
        channel_id: &str,
        thread_ts: &Ts,
        cursor: Option<&str>,
    ) -> Result<Page<Message>> {
        let mut params = self.page_params(cursor);
        params.push(("channel", channel_id.to_string()));
        params.push(("ts", thread_ts.to_string()));

        let body = self.call("conversations.replies", &params).await?;
        into_page(body, "messages")
    }
}
