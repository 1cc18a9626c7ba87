//! Hostinger DNS REST provider.
//!
//! `GET /api/dns/v1/zones/{domain}` returns the zone as a list of record
//! sets; `PUT` on the same path with `overwrite: false` appends records.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DnsError, DnsResult};
use crate::{DnsProvider, RecordState};

pub struct HostingerDns {
    client: reqwest::Client,
    api_base: String,
    token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RecordSet {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    records: Vec<RecordValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordValue {
    content: String,
    #[serde(default, skip_serializing)]
    is_disabled: bool,
}

#[derive(Debug, Serialize)]
struct ZoneUpdate<'a> {
    overwrite: bool,
    zone: Vec<NewRecordSet<'a>>,
}

#[derive(Debug, Serialize)]
struct NewRecordSet<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    ttl: u32,
    records: Vec<RecordValue>,
}

impl HostingerDns {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> DnsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("sitegrid-dns/0.1")
            .build()
            .map_err(|e| DnsError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    fn zone_url(&self, domain: &str) -> String {
        format!("{}/api/dns/v1/zones/{domain}", self.api_base)
    }

    fn request_err(&self, e: reqwest::Error) -> DnsError {
        if e.is_timeout() {
            DnsError::TimedOut {
                after: self.timeout,
            }
        } else {
            DnsError::Request(e.to_string())
        }
    }

    async fn check_status(resp: reqwest::Response) -> DnsResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(DnsError::Api {
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }
}

#[async_trait]
impl DnsProvider for HostingerDns {
    async fn check(&self, subdomain: &str, domain: &str) -> DnsResult<RecordState> {
        let resp = self
            .client
            .get(self.zone_url(domain))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.request_err(e))?;
        let zone: Vec<RecordSet> = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| DnsError::InvalidResponse(e.to_string()))?;

        // Any record set under the name counts; only A sets carry an address.
        let exists = zone.iter().any(|set| set.name == subdomain);
        let current_ip = zone
            .iter()
            .filter(|set| set.name == subdomain && set.kind.eq_ignore_ascii_case("A"))
            .flat_map(|set| set.records.iter())
            .find(|r| !r.is_disabled)
            .map(|r| r.content.clone());

        debug!(%subdomain, %domain, exists, ?current_ip, "DNS record checked");
        Ok(RecordState { exists, current_ip })
    }

    async fn create_a_record(
        &self,
        subdomain: &str,
        domain: &str,
        ip: &str,
        ttl: u32,
    ) -> DnsResult<()> {
        let body = ZoneUpdate {
            overwrite: false,
            zone: vec![NewRecordSet {
                name: subdomain,
                kind: "A",
                ttl,
                records: vec![RecordValue {
                    content: ip.to_string(),
                    is_disabled: false,
                }],
            }],
        };
        let resp = self
            .client
            .put(self.zone_url(domain))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_err(e))?;
        Self::check_status(resp).await?;

        info!(%subdomain, %domain, %ip, ttl, "DNS A record created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct MockZone {
        records: Arc<Mutex<Vec<Value>>>,
        puts: Arc<Mutex<Vec<Value>>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer test-token")
    }

    async fn get_zone(
        State(zone): State<MockZone>,
        Path(domain): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        if domain != "example.com" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(Value::Array(zone.records.lock().unwrap().clone())))
    }

    async fn put_zone(
        State(zone): State<MockZone>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED;
        }
        zone.puts.lock().unwrap().push(body.clone());
        if let Some(sets) = body["zone"].as_array() {
            zone.records.lock().unwrap().extend(sets.iter().cloned());
        }
        StatusCode::OK
    }

    async fn spawn_mock(zone: MockZone) -> SocketAddr {
        let app = Router::new()
            .route("/api/dns/v1/zones/{domain}", get(get_zone).put(put_zone))
            .with_state(zone);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr, token: &str) -> HostingerDns {
        HostingerDns::new(&format!("http://{addr}"), token, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn check_finds_existing_a_record() {
        let zone = MockZone::default();
        zone.records.lock().unwrap().extend([
            json!({"name": "www", "type": "CNAME", "ttl": 300, "records": [{"content": "example.com."}]}),
            json!({"name": "shop", "type": "A", "ttl": 14400, "records": [{"content": "1.2.3.4", "is_disabled": false}]}),
        ]);
        let dns = client(spawn_mock(zone).await, "test-token");

        let state = dns.check("shop", "example.com").await.unwrap();
        assert_eq!(
            state,
            RecordState {
                exists: true,
                current_ip: Some("1.2.3.4".to_string()),
            }
        );
        let missing = dns.check("blog", "example.com").await.unwrap();
        assert_eq!(missing, RecordState::default());
    }

    #[tokio::test]
    async fn non_a_record_sets_count_as_existing() {
        let zone = MockZone::default();
        zone.records.lock().unwrap().extend([
            json!({"name": "www", "type": "CNAME", "ttl": 300, "records": [{"content": "example.com."}]}),
            json!({"name": "v6", "type": "AAAA", "ttl": 300, "records": [{"content": "2001:db8::1"}]}),
            json!({"name": "off", "type": "A", "ttl": 300, "records": [{"content": "1.2.3.4", "is_disabled": true}]}),
        ]);
        let dns = client(spawn_mock(zone).await, "test-token");

        for name in ["www", "v6", "off"] {
            let state = dns.check(name, "example.com").await.unwrap();
            assert_eq!(
                state,
                RecordState {
                    exists: true,
                    current_ip: None,
                },
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn create_appends_without_overwrite() {
        let zone = MockZone::default();
        let dns = client(spawn_mock(zone.clone()).await, "test-token");

        dns.create_a_record("demo", "example.com", "1.2.3.4", 14400)
            .await
            .unwrap();

        let puts = zone.puts.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0]["overwrite"], false);
        assert_eq!(puts[0]["zone"][0]["name"], "demo");
        assert_eq!(puts[0]["zone"][0]["type"], "A");
        assert_eq!(puts[0]["zone"][0]["ttl"], 14400);
        assert_eq!(puts[0]["zone"][0]["records"][0]["content"], "1.2.3.4");

        let state = dns.check("demo", "example.com").await.unwrap();
        assert_eq!(state.current_ip.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let addr = spawn_mock(MockZone::default()).await;

        let err = client(addr, "wrong").check("demo", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::Api { status: 401, .. }));

        let err = client(addr, "test-token")
            .check("demo", "unknown.org")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_request_error() {
        let dns = HostingerDns::new("http://127.0.0.1:1", "t", Duration::from_secs(2)).unwrap();
        let err = dns.check("demo", "example.com").await.unwrap_err();
        assert!(matches!(err, DnsError::Request(_) | DnsError::TimedOut { .. }));
    }
}
