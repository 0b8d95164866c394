use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{ProbeError, StatusProbe, Verdict};
use crate::archive::DiagnosticArchive;
use crate::channel::names_match;
use crate::retry::RetryPolicy;

/// App credentials for the Helix API.
#[derive(Debug, Clone)]
pub struct HelixCredentials {
    pub client_id: String,
    pub auth_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// How a search result set relates to the channel that was asked about.
#[derive(Debug, PartialEq)]
enum Match<'a> {
    None,
    Flag(bool),
    MissingFlag(&'a Value),
}

fn find_match<'a>(name: &str, records: &'a [Value]) -> Match<'a> {
    let hit = records.iter().find(|r| {
        r.get("broadcaster_login")
            .and_then(Value::as_str)
            .is_some_and(|login| names_match(login, name))
    });

    match hit {
        None => Match::None,
        Some(record) => match record.get("is_live").and_then(Value::as_bool) {
            Some(flag) => Match::Flag(flag),
            None => Match::MissingFlag(record),
        },
    }
}

/// Status probe backed by the Helix `search/channels` endpoint.
#[derive(Debug, Clone)]
pub struct HelixProbe {
    client: Client,
    api_base: String,
    credentials: HelixCredentials,
    retry: RetryPolicy,
    archive: Option<DiagnosticArchive>,
}

impl HelixProbe {
    pub const DEFAULT_API_BASE: &'static str = "https://api.twitch.tv";

    pub fn new(client: Client, credentials: HelixCredentials, retry: RetryPolicy) -> Self {
        Self {
            client,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            credentials,
            retry,
            archive: None,
        }
    }

    pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .gzip(true)
            .build()
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_archive(mut self, archive: DiagnosticArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    fn search_url(&self) -> String {
        format!("{}/helix/search/channels", self.api_base.trim_end_matches('/'))
    }

    /// One lookup attempt, no retry.
    async fn lookup(&self, name: &str) -> Result<Verdict, ProbeError> {
        let response = self
            .client
            .get(self.search_url())
            .query(&[("query", name)])
            .header("Client-ID", &self.credentials.client_id)
            .bearer_auth(&self.credentials.auth_key)
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(name, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProbeError::Http {
                channel: name.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::from_reqwest(name, e))?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| ProbeError::Decode {
                channel: name.to_string(),
                message: e.to_string(),
            })?;

        let verdict = match find_match(name, &parsed.data) {
            Match::Flag(true) => Verdict::Live,
            Match::Flag(false) => Verdict::Offline,
            Match::None => {
                debug!(channel = name, results = parsed.data.len(), "No matching channel in search results");
                Verdict::Unknown
            }
            Match::MissingFlag(record) => {
                warn!(channel = name, "Matching channel has no live flag");
                if let Some(archive) = &self.archive {
                    archive.record(name, "null", record).await;
                }
                Verdict::Unknown
            }
        };
        Ok(verdict)
    }
}

#[async_trait]
impl StatusProbe for HelixProbe {
    async fn probe(&self, name: &str) -> Verdict {
        let result = self
            .retry
            .run(
                |attempt| async move {
                    let r = self.lookup(name).await;
                    if let Err(e) = &r {
                        warn!(channel = name, attempt = attempt + 1, error = %e, "Status lookup attempt failed");
                    }
                    r
                },
                ProbeError::is_transient,
            )
            .await;

        match result {
            Ok(verdict) => verdict,
            Err(e) if e.is_transient() => {
                warn!(
                    channel = name,
                    attempts = self.retry.attempts(),
                    error = %e,
                    "Status lookup retries exhausted"
                );
                Verdict::TransientFailure
            }
            Err(e) => {
                error!(channel = name, status = e.status_code(), error = %e, "Status lookup failed");
                Verdict::TransientFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn probe_for(server: &MockServer, attempts: u32) -> HelixProbe {
        let client = HelixProbe::build_client(Duration::from_secs(2)).unwrap();
        HelixProbe::new(
            client,
            HelixCredentials {
                client_id: "cid".into(),
                auth_key: "token".into(),
            },
            RetryPolicy::new(attempts, Duration::from_millis(10)),
        )
        .with_api_base(server.uri())
    }

    #[test]
    fn find_match_is_case_insensitive() {
        let records = vec![
            json!({ "broadcaster_login": "alice_fan", "is_live": true }),
            json!({ "broadcaster_login": "Alice", "is_live": false }),
        ];
        assert_eq!(find_match("alice", &records), Match::Flag(false));
    }

    #[test]
    fn find_match_null_flag() {
        let records = vec![json!({ "broadcaster_login": "bob", "is_live": null })];
        assert!(matches!(find_match("bob", &records), Match::MissingFlag(_)));
        let records = vec![json!({ "broadcaster_login": "bob" })];
        assert!(matches!(find_match("bob", &records), Match::MissingFlag(_)));
    }

    #[test]
    fn find_match_none() {
        let records = vec![json!({ "broadcaster_login": "carol", "is_live": true })];
        assert_eq!(find_match("dave", &records), Match::None);
        assert_eq!(find_match("dave", &[]), Match::None);
    }

    #[tokio::test]
    async fn live_flag_maps_to_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .and(query_param("query", "alice"))
            .and(header("Client-ID", "cid"))
            .and(header("Authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "broadcaster_login": "alice", "is_live": true, "title": "hi" }]
            })))
            .mount(&server)
            .await;

        assert_eq!(probe_for(&server, 3).probe("alice").await, Verdict::Live);
    }

    #[tokio::test]
    async fn missing_flag_is_unknown_and_archived() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "broadcaster_login": "bob", "is_live": null }]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let probe = probe_for(&server, 3).with_archive(DiagnosticArchive::new(dir.path()));

        assert_eq!(probe.probe("bob").await, Verdict::Unknown);
        let archived: Vec<_> = std::fs::read_dir(dir.path().join("status-responses").join("bob"))
            .unwrap()
            .collect();
        assert_eq!(archived.len(), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "broadcaster_login": "carol", "is_live": false }]
            })))
            .mount(&server)
            .await;

        assert_eq!(probe_for(&server, 3).probe("carol").await, Verdict::Offline);
    }

    #[tokio::test]
    async fn exhausted_retries_are_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        assert_eq!(
            probe_for(&server, 3).probe("bob").await,
            Verdict::TransientFailure
        );
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            probe_for(&server, 3).probe("bob").await,
            Verdict::TransientFailure
        );
    }

    #[tokio::test]
    async fn garbage_body_is_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/search/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        assert_eq!(
            probe_for(&server, 1).probe("bob").await,
            Verdict::TransientFailure
        );
    }
}
