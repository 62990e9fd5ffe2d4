// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WhatsApp Cloud API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use herald_config::model::{WhatsAppAccount, WhatsAppConfig};
use herald_core::{
    HealthStatus, HeraldError, SendClient, SendError, SendErrorKind, SendReceipt, SendRequest,
};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::classify::{classify_response, classify_transport};
use crate::types::{GraphErrorResponse, MessagesResponse, TemplateMessage};

/// Sends template messages through the Cloud API.
///
/// Each tenant sends from its own phone number when one is configured in
/// `accounts`, otherwise from `default_account`.
#[derive(Clone)]
pub struct CloudApiClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    default_account: Option<WhatsAppAccount>,
    accounts: HashMap<String, WhatsAppAccount>,
}

impl CloudApiClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, HeraldError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HeraldError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            default_account: config.default_account.clone(),
            accounts: config.accounts.clone(),
        })
    }

    fn account_for(&self, tenant_id: &str) -> Option<&WhatsAppAccount> {
        self.accounts
            .get(tenant_id)
            .or(self.default_account.as_ref())
    }

    fn messages_url(&self, account: &WhatsAppAccount) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, self.api_version, account.phone_number_id
        )
    }
}

#[async_trait]
impl SendClient for CloudApiClient {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, SendError> {
        let account = self.account_for(&request.tenant_id).ok_or_else(|| {
            SendError::new(
                SendErrorKind::WabaAccessError,
                format!("no WhatsApp account configured for tenant {}", request.tenant_id),
            )
        })?;

        let response = self
            .client
            .post(self.messages_url(account))
            .bearer_auth(&account.access_token)
            .json(&TemplateMessage::from_request(request))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unreadable_body(status, &e))?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<GraphErrorResponse>(&body).ok();
            let graph = parsed.as_ref().map(|p| &p.error);
            let kind = classify_response(status, graph);
            warn!(
                status = status.as_u16(),
                code = graph.and_then(|g| g.code),
                subcode = graph.and_then(|g| g.error_subcode),
                trace_id = graph.and_then(|g| g.fbtrace_id.as_deref()),
                %kind,
                "cloud API rejected message"
            );
            let message = match graph {
                Some(g) => format!("HTTP {status}: {}", g.message),
                None => format!("HTTP {status}: {body}"),
            };
            return Err(SendError::new(kind, message));
        }

        // An accepted request may already have been delivered; a malformed
        // body must not trigger a resend.
        let message_id = serde_json::from_str::<MessagesResponse>(&body)
            .ok()
            .and_then(|r| r.messages.into_iter().next())
            .map(|m| m.id)
            .ok_or_else(|| {
                SendError::new(
                    SendErrorKind::InvalidRecipient,
                    format!("accepted response carried no message id: {body}"),
                )
            })?;

        debug!(message_id = %message_id, key = %request.idempotency_key, "message accepted");
        Ok(SendReceipt { message_id })
    }

    async fn health_check(&self) -> Result<HealthStatus, HeraldError> {
        let Some(account) = &self.default_account else {
            return Ok(HealthStatus::Degraded("no default account configured".into()));
        };
        let url = format!(
            "{}/{}/{}",
            self.base_url, self.api_version, account.phone_number_id
        );
        match self.client.get(url).bearer_auth(&account.access_token).send().await {
            Ok(r) if r.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(r) => Ok(HealthStatus::Unhealthy(format!("HTTP {}", r.status()))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

/// A success status means the message may already be on its way, so a body
/// that cannot be read is never retried.
fn unreadable_body(status: reqwest::StatusCode, err: &reqwest::Error) -> SendError {
    if status.is_success() {
        warn!(status = status.as_u16(), error = %err, "accepted response body unreadable");
        return SendError::new(
            SendErrorKind::InvalidRecipient,
            format!("accepted response carried no message id: {err}"),
        );
    }
    classify_transport(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::VariableMapping;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(id: &str, token: &str) -> WhatsAppAccount {
        WhatsAppAccount {
            phone_number_id: id.into(),
            access_token: token.into(),
        }
    }

    fn test_client(base_url: &str) -> CloudApiClient {
        let mut config = WhatsAppConfig {
            api_base_url: base_url.to_string(),
            api_version: "v21.0".into(),
            request_timeout_secs: 5,
            default_account: Some(account("111", "default-token")),
            accounts: HashMap::new(),
        };
        config
            .accounts
            .insert("t-acme".into(), account("222", "acme-token"));
        CloudApiClient::new(&config).unwrap()
    }

    fn request(tenant: &str) -> SendRequest {
        SendRequest {
            tenant_id: tenant.into(),
            phone: "+15550000001".into(),
            template_name: "order_update".into(),
            language: "en_US".into(),
            components: VariableMapping {
                header: vec![],
                body: vec!["Ada".into()],
                buttons: vec![],
            },
            idempotency_key: "b-1:0:1".into(),
        }
    }

    fn graph_error(code: i64) -> serde_json::Value {
        serde_json::json!({
            "error": {"message": "rejected", "type": "OAuthException", "code": code, "fbtrace_id": "abc"}
        })
    }

    #[tokio::test]
    async fn send_posts_template_with_tenant_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/222/messages"))
            .and(header("authorization", "Bearer acme-token"))
            .and(body_partial_json(serde_json::json!({
                "to": "+15550000001",
                "biz_opaque_callback_data": "b-1:0:1",
                "template": {"name": "order_update"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "contacts": [{"input": "+15550000001", "wa_id": "15550000001"}],
                "messages": [{"id": "wamid.ABC"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = test_client(&server.uri()).send(&request("t-acme")).await.unwrap();
        assert_eq!(receipt.message_id, "wamid.ABC");
    }

    #[tokio::test]
    async fn unknown_tenant_uses_default_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/111/messages"))
            .and(header("authorization", "Bearer default-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"messages": [{"id": "wamid.DEF"}]})),
            )
            .mount(&server)
            .await;

        let receipt = test_client(&server.uri()).send(&request("t-other")).await.unwrap();
        assert_eq!(receipt.message_id, "wamid.DEF");
    }

    #[tokio::test]
    async fn missing_account_is_an_access_error() {
        let config = WhatsAppConfig::default();
        let client = CloudApiClient::new(&config).unwrap();
        let err = client.send(&request("t-1")).await.unwrap_err();
        assert_eq!(err.kind, SendErrorKind::WabaAccessError);
    }

    #[tokio::test]
    async fn rejections_are_classified() {
        let cases = [
            (429, None, SendErrorKind::RateLimit),
            (400, Some(130429), SendErrorKind::RateLimit),
            (401, Some(190), SendErrorKind::WabaAccessError),
            (400, Some(131026), SendErrorKind::InvalidRecipient),
            (503, None, SendErrorKind::TransientNetwork),
        ];
        for (status, code, expected) in cases {
            let server = MockServer::start().await;
            let template = match code {
                Some(c) => ResponseTemplate::new(status).set_body_json(graph_error(c)),
                None => ResponseTemplate::new(status).set_body_string("unavailable"),
            };
            Mock::given(method("POST")).respond_with(template).mount(&server).await;

            let err = test_client(&server.uri()).send(&request("t-acme")).await.unwrap_err();
            assert_eq!(err.kind, expected, "status {status} code {code:?}");
        }
    }

    #[tokio::test]
    async fn accepted_response_without_id_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri()).send(&request("t-acme")).await.unwrap_err();
        assert_eq!(err.kind, SendErrorKind::InvalidRecipient);
    }

    /// Answers one request with a success status and a body cut short.
    async fn truncated_success_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                received.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"messages\"")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unreadable_accepted_body_is_not_retried() {
        let base = truncated_success_server().await;
        let err = test_client(&base).send(&request("t-acme")).await.unwrap_err();
        assert_eq!(err.kind, SendErrorKind::InvalidRecipient);
        assert!(err.message.contains("no message id"), "{}", err.message);
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let config = WhatsAppConfig {
            api_base_url: server.uri(),
            request_timeout_secs: 1,
            default_account: Some(account("111", "t")),
            ..WhatsAppConfig::default()
        };
        let client = CloudApiClient::new(&config).unwrap();
        let err = client.send(&request("t-1")).await.unwrap_err();
        assert_eq!(err.kind, SendErrorKind::TransientNetwork);
    }

    #[tokio::test]
    async fn health_check_queries_default_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/111"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "111"})))
            .mount(&server)
            .await;

        let status = test_client(&server.uri()).health_check().await.unwrap();
        assert_eq!(status, HealthStatus::Healthy);

        let unconfigured = CloudApiClient::new(&WhatsAppConfig::default()).unwrap();
        assert!(matches!(
            unconfigured.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }
}
