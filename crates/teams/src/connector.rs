use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use collaborator_core::config::TeamsConfig;
use collaborator_core::Member;

use crate::activity::ConversationReference;
use crate::outbound::OutboundMessage;

const BOT_FRAMEWORK_SCOPE: &str = "https://api.botframework.com/.default";
const DEFAULT_TENANT: &str = "botframework.com";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const UNKNOWN_MEMBER: &str = "Unknown";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connector request failed: {0}")]
    Request(String),
    #[error("connector returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("bot token acquisition failed: {0}")]
    Auth(String),
    #[error("connector response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

/// Outbound calls to the conversation a message came from.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Sends `message` and returns the id Teams assigned to it.
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        message: &OutboundMessage,
    ) -> Result<String, TransportError>;

    async fn send_typing(&self, reference: &ConversationReference) -> Result<(), TransportError>;

    async fn list_members(
        &self,
        reference: &ConversationReference,
    ) -> Result<Vec<Member>, TransportError>;
}

struct BotCredentials {
    app_id: String,
    app_password: SecretString,
    token_url: String,
}

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(value: String, expires_in: Duration, now: Instant) -> Self {
        Self {
            value: SecretString::from(value),
            refresh_at: now + expires_in.saturating_sub(TOKEN_REFRESH_MARGIN),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMember {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    aad_object_id: Option<String>,
}

impl From<WireMember> for Member {
    fn from(member: WireMember) -> Self {
        Self {
            id: member.aad_object_id.filter(|id| !id.is_empty()).unwrap_or(member.id),
            name: member
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_MEMBER.to_owned()),
        }
    }
}

/// Bot Framework v3 REST client. Without an app id it runs anonymously,
/// which is what the local emulator expects.
pub struct HttpConnectorClient {
    http: Client,
    credentials: Option<BotCredentials>,
    token: Mutex<Option<CachedToken>>,
}

impl HttpConnectorClient {
    pub fn from_config(config: &TeamsConfig, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        let credentials = (!config.is_anonymous()).then(|| {
            let tenant = config.tenant_id.as_deref().filter(|tenant| !tenant.is_empty());
            BotCredentials {
                app_id: config.app_id.clone(),
                app_password: config.app_password.clone(),
                token_url: token_url(tenant.unwrap_or(DEFAULT_TENANT)),
            }
        });
        if credentials.is_none() {
            info!(
                event_name = "teams.connector.anonymous",
                "no app id configured; connector calls are unauthenticated"
            );
        }

        Ok(Self { http, credentials, token: Mutex::new(None) })
    }

    pub fn is_anonymous(&self) -> bool {
        self.credentials.is_none()
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, TransportError> {
        let Some(credentials) = &self.credentials else {
            return Ok(request);
        };

        let mut cached = self.token.lock().await;
        let now = Instant::now();
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(request.bearer_auth(token.value.expose_secret()));
        }

        debug!(
            event_name = "teams.connector.token_refresh",
            app_id = %credentials.app_id,
            "acquiring bot token"
        );
        let response = self
            .http
            .post(&credentials.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.app_id.as_str()),
                ("client_secret", credentials.app_password.expose_secret()),
                ("scope", BOT_FRAMEWORK_SCOPE),
            ])
            .send()
            .await
            .map_err(|error| TransportError::Auth(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Auth(format!("{status}: {body}")));
        }
        let token: TokenResponse =
            response.json().await.map_err(|error| TransportError::Auth(error.to_string()))?;

        let token =
            CachedToken::new(token.access_token, Duration::from_secs(token.expires_in), now);
        let request = request.bearer_auth(token.value.expose_secret());
        *cached = Some(token);
        Ok(request)
    }

    async fn post_activity(
        &self,
        reference: &ConversationReference,
        body: &OutboundMessage,
    ) -> Result<Value, TransportError> {
        let request = self.http.post(activities_url(reference)).json(body);
        let response = self.authorize(request).await?.send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl ConversationClient for HttpConnectorClient {
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        message: &OutboundMessage,
    ) -> Result<String, TransportError> {
        let value = self.post_activity(reference, message).await?;
        let resource: ResourceResponse =
            serde_json::from_value(value)
                .map_err(|error| TransportError::Decode(error.to_string()))?;
        Ok(resource.id)
    }

    async fn send_typing(&self, reference: &ConversationReference) -> Result<(), TransportError> {
        self.post_activity(reference, &OutboundMessage::typing()).await.map(|_| ())
    }

    async fn list_members(
        &self,
        reference: &ConversationReference,
    ) -> Result<Vec<Member>, TransportError> {
        let request = self.http.get(members_url(reference));
        let response = self.authorize(request).await?.send().await?;
        let members: Vec<WireMember> = serde_json::from_value(read_json(response).await?)
            .map_err(|error| TransportError::Decode(error.to_string()))?;
        Ok(members.into_iter().map(Member::from).collect())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status { status: status.as_u16(), body });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|error| TransportError::Decode(error.to_string()))
}

fn token_url(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
}

fn conversation_url(reference: &ConversationReference) -> String {
    format!(
        "{}/v3/conversations/{}",
        reference.service_url.trim_end_matches('/'),
        urlencoding::encode(reference.conversation_id.as_str())
    )
}

fn activities_url(reference: &ConversationReference) -> String {
    format!("{}/activities", conversation_url(reference))
}

fn members_url(reference: &ConversationReference) -> String {
    format!("{}/members", conversation_url(reference))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use secrecy::SecretString;

    use collaborator_core::config::TeamsConfig;
    use collaborator_core::{ConversationId, Member};

    use super::{
        activities_url, members_url, token_url, CachedToken, HttpConnectorClient, WireMember,
    };
    use crate::activity::ConversationReference;

    fn reference() -> ConversationReference {
        ConversationReference {
            service_url: "https://smba.trafficmanager.net/amer/".to_owned(),
            conversation_id: ConversationId("19:abc@thread.v2".to_owned()),
            activity_id: "1".to_owned(),
            bot_id: None,
        }
    }

    #[test]
    fn urls_encode_the_conversation_id() {
        assert_eq!(
            activities_url(&reference()),
            "https://smba.trafficmanager.net/amer/v3/conversations/19%3Aabc%40thread.v2/activities"
        );
        assert!(members_url(&reference()).ends_with("/members"));
        assert_eq!(
            token_url("botframework.com"),
            "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn cached_token_expires_a_minute_early() {
        let now = Instant::now();
        let token = CachedToken::new("t".to_owned(), Duration::from_secs(3600), now);

        assert!(token.is_fresh(now + Duration::from_secs(3539)));
        assert!(!token.is_fresh(now + Duration::from_secs(3540)));

        let short = CachedToken::new("t".to_owned(), Duration::from_secs(30), now);
        assert!(!short.is_fresh(now));
    }

    #[test]
    fn empty_app_id_means_anonymous() {
        let config = TeamsConfig {
            app_id: String::new(),
            app_password: SecretString::from(String::new()),
            tenant_id: None,
        };
        let client =
            HttpConnectorClient::from_config(&config, Duration::from_secs(5)).expect("client");
        assert!(client.is_anonymous());
    }

    #[test]
    fn members_prefer_aad_object_id() {
        let member = Member::from(WireMember {
            id: "29:ana".to_owned(),
            name: None,
            aad_object_id: Some("aad-ana".to_owned()),
        });
        assert_eq!(member, Member { id: "aad-ana".to_owned(), name: "Unknown".to_owned() });
    }
}
