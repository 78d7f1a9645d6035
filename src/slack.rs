use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::config::Credentials;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

#[derive(Debug)]
pub enum SlackError {
    Network(String),
    Api(String),
    Parse(String),
    Io(String),
}

impl std::fmt::Display for SlackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlackError::Network(msg) => write!(f, "Request failed: {}", msg),
            SlackError::Api(msg) => write!(f, "Slack API error: {}", msg),
            SlackError::Parse(msg) => write!(f, "Parse failed: {}", msg),
            SlackError::Io(msg) => write!(f, "File error: {}", msg),
        }
    }
}

impl std::error::Error for SlackError {}

/// Identity returned by `users.info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub real_name: String,
    pub display_name: String,
    pub is_bot: bool,
}

impl UserProfile {
    /// Display name, then real name, then handle, then the raw id.
    pub fn preferred_name(&self) -> &str {
        [&self.display_name, &self.real_name, &self.name]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Outbound calls application code makes back into Slack.
///
/// Errors are passed through untouched; nothing here retries.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError>;

    async fn post_threaded_reply(
        &self,
        channel: &str,
        text: &str,
        thread_ts: &str,
    ) -> Result<(), SlackError>;

    async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        filename: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), SlackError>;

    async fn get_user_info(&self, user_id: &str) -> Result<UserProfile, SlackError>;
}

pub struct SlackWebClient {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatPostMessageRequest<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Serialize)]
struct CompleteUploadRequest<'a> {
    files: Vec<UploadedFile<'a>>,
    channel_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UploadedFile<'a> {
    id: &'a str,
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: SlackUserProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

impl From<SlackUser> for UserProfile {
    fn from(user: SlackUser) -> Self {
        let real_name = if user.real_name.is_empty() {
            user.profile.real_name
        } else {
            user.real_name
        };
        Self {
            id: user.id,
            name: user.name,
            real_name,
            display_name: user.profile.display_name,
            is_bot: user.is_bot,
        }
    }
}

impl SlackWebClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            bot_token: credentials.bot_token().to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    pub async fn chat_post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), SlackError> {
        let payload = ChatPostMessageRequest {
            channel,
            thread_ts,
            text,
        };
        self.post_json("chat.postMessage", &payload).await?;
        Ok(())
    }

    async fn post_json<P: Serialize + ?Sized>(
        &self,
        method: &str,
        payload: &P,
    ) -> Result<Value, SlackError> {
        debug!("Calling Slack {}", method);
        let raw: Value = self
            .client
            .post(self.endpoint(method))
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .json(payload)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackError::Parse(e.to_string()))?;

        check_ok(raw)
    }

    async fn post_form(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, SlackError> {
        debug!("Calling Slack {}", method);
        let raw: Value = self
            .client
            .post(self.endpoint(method))
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .form(params)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackError::Parse(e.to_string()))?;

        check_ok(raw)
    }

    async fn get(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, SlackError> {
        debug!("Calling Slack {}", method);
        let raw: Value = self
            .client
            .get(self.endpoint(method))
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .query(params)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| SlackError::Parse(e.to_string()))?;

        check_ok(raw)
    }
}

#[async_trait]
impl Dispatcher for SlackWebClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError> {
        self.chat_post_message(channel, None, text).await
    }

    async fn post_threaded_reply(
        &self,
        channel: &str,
        text: &str,
        thread_ts: &str,
    ) -> Result<(), SlackError> {
        self.chat_post_message(channel, Some(thread_ts), text).await
    }

    /// Three-step external upload: reserve a URL, send the bytes, then share into the channel.
    async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        filename: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), SlackError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| SlackError::Io(format!("{}: {}", path.display(), e)))?;

        let length = data.len().to_string();
        let raw = self
            .post_form(
                "files.getUploadURLExternal",
                &[("filename", filename), ("length", length.as_str())],
            )
            .await?;
        let reserved: UploadUrlResponse =
            serde_json::from_value(raw).map_err(|e| SlackError::Parse(e.to_string()))?;

        let status = self
            .client
            .post(reserved.upload_url.as_str())
            .body(data)
            .send()
            .await
            .map_err(|e| SlackError::Network(e.to_string()))?
            .status();
        if !status.is_success() {
            return Err(SlackError::Api(format!("file upload returned {}", status)));
        }

        let complete = CompleteUploadRequest {
            files: vec![UploadedFile {
                id: &reserved.file_id,
                title: filename,
            }],
            channel_id: channel,
            thread_ts,
        };
        self.post_json("files.completeUploadExternal", &complete)
            .await?;
        Ok(())
    }

    async fn get_user_info(&self, user_id: &str) -> Result<UserProfile, SlackError> {
        let raw = self.get("users.info", &[("user", user_id)]).await?;
        let response: UsersInfoResponse =
            serde_json::from_value(raw).map_err(|e| SlackError::Parse(e.to_string()))?;
        Ok(response.user.into())
    }
}

/// Turns a Web API body with `"ok": false` into an error, keeping scope hints.
fn check_ok(raw: Value) -> Result<Value, SlackError> {
    let ok = raw.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
    if ok {
        return Ok(raw);
    }

    let error_msg = raw
        .get("error")
        .and_then(|e| e.as_str())
        .unwrap_or("Unknown error");

    let mut details = error_msg.to_string();
    if error_msg == "missing_scope" {
        if let Some(needed) = raw.get("needed").and_then(|v| v.as_str()) {
            details.push_str(&format!(" (needed: {})", needed));
        }
        if let Some(provided) = raw.get("provided").and_then(|v| v.as_str()) {
            details.push_str(&format!(" (provided: {})", provided));
        }
    }

    Err(SlackError::Api(details))
}
