//! Notification channel domain types

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Payload flavour expected by a webhook destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    /// Slack-style incoming webhook (`{"text": ...}`)
    Slack,
    /// DingTalk robot webhook (markdown message)
    #[serde(rename = "dingtalk")]
    DingTalk,
    /// Feishu / Lark bot webhook (text message)
    Feishu,
    /// Plain JSON alert payload
    Generic,
}

impl WebhookKind {
    /// Best-effort classification of an endpoint URL.
    ///
    /// Only used when a channel has no explicit kind configured. Unknown
    /// hosts map to [`WebhookKind::Generic`].
    pub fn detect(endpoint: &str) -> Self {
        let url = endpoint.to_ascii_lowercase();

        if url.contains("hooks.slack.com") {
            Self::Slack
        } else if url.contains("oapi.dingtalk.com") {
            Self::DingTalk
        } else if url.contains("open.feishu.cn") || url.contains("open.larksuite.com") {
            Self::Feishu
        } else {
            Self::Generic
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slack => write!(f, "slack"),
            Self::DingTalk => write!(f, "dingtalk"),
            Self::Feishu => write!(f, "feishu"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for WebhookKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slack" => Ok(Self::Slack),
            "dingtalk" => Ok(Self::DingTalk),
            "feishu" | "lark" => Ok(Self::Feishu),
            "generic" | "webhook" => Ok(Self::Generic),
            _ => Err(DomainError::InvalidChannelKind(s.to_string())),
        }
    }
}

/// A configured notification destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel id referenced by rules
    pub id: String,
    /// Destination endpoint
    pub endpoint: String,
    /// Explicit payload kind, if configured
    pub kind: Option<WebhookKind>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl Channel {
    /// Create a channel without an explicit kind
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            kind: None,
            headers: BTreeMap::new(),
        }
    }

    /// Set an explicit payload kind
    pub fn with_kind(mut self, kind: WebhookKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Configured kind, falling back to endpoint detection
    pub fn effective_kind(&self) -> WebhookKind {
        self.kind
            .unwrap_or_else(|| WebhookKind::detect(&self.endpoint))
    }
}
