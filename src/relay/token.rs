//! Token lookup interceptor.
//!
//! Exchanges the token carried by a `token` control message for an identity
//! string by form-POSTing it to an external endpoint, and answers with a
//! `login` message carrying that identity.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::InterceptorConfig;
use crate::relay::error::InterceptError;
use crate::relay::intercept::Interceptor;
use crate::relay::message::{Message, MsgId};

/// HTTP-backed [`Interceptor`] for [`crate::relay::ControlId::Token`].
#[derive(Debug, Clone)]
pub struct TokenLookup {
    client: reqwest::Client,
    endpoint: Url,
}

impl TokenLookup {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InterceptError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InterceptError::Setup(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &InterceptorConfig) -> Result<Self, InterceptError> {
        let endpoint = config.token_endpoint.parse().map_err(|e| {
            InterceptError::Setup(format!("invalid token endpoint '{}': {}", config.token_endpoint, e))
        })?;
        Self::new(endpoint, Duration::from_millis(config.timeout_ms))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Interceptor for TokenLookup {
    async fn intercept(&self, message: &Message) -> Result<Message, InterceptError> {
        let token: String = message.decode().map_err(InterceptError::Payload)?;
        let token = unquote(&token);

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&[("token", token)])
            .send()
            .await?
            .error_for_status()?;
        let identity = response.text().await?;

        tracing::debug!(endpoint = %self.endpoint, "Token resolved");
        Message::new(MsgId::login(), &identity).map_err(InterceptError::Encode)
    }
}

/// Tokens may arrive JSON-encoded twice (`"\"abc\""`); strip one quoted layer.
fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn lookup_for(server: &MockServer) -> TokenLookup {
        let endpoint = format!("{}/token", server.uri()).parse().unwrap();
        TokenLookup::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resolves_token_to_login_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string("token=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alice"))
            .expect(1)
            .mount(&server)
            .await;

        let lookup = lookup_for(&server).await;
        let reply = lookup
            .intercept(&Message::new("token", "abc123").unwrap())
            .await
            .unwrap();

        assert_eq!(reply.id().as_str(), "login");
        assert_eq!(reply.decode::<String>().unwrap(), "alice");
    }

    #[tokio::test]
    async fn double_encoded_token_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("token=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alice"))
            .expect(1)
            .mount(&server)
            .await;

        let lookup = lookup_for(&server).await;
        let message = Message::from_json(r#"{"ID":"token","Data":"\"abc123\""}"#).unwrap();
        let reply = lookup.intercept(&message).await.unwrap();
        assert_eq!(reply.decode::<String>().unwrap(), "alice");
    }

    #[tokio::test]
    async fn error_status_is_a_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = lookup_for(&server).await;
        let err = lookup
            .intercept(&Message::new("token", "abc123").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, InterceptError::Lookup(_)));
    }

    #[tokio::test]
    async fn malformed_payload_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("alice"))
            .expect(0)
            .mount(&server)
            .await;

        let lookup = lookup_for(&server).await;
        let err = lookup
            .intercept(&Message::new("token", &42).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, InterceptError::Payload(_)));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let config = InterceptorConfig {
            token_endpoint: "not a url".into(),
            ..InterceptorConfig::default()
        };
        assert!(matches!(
            TokenLookup::from_config(&config),
            Err(InterceptError::Setup(_))
        ));
    }
}
