//! HTTP JSON 어댑터
//!
//! 형식([`HttpFormat`])별로 페이로드를 만들고 POST 한 번으로 전송합니다.
//! 2xx가 아닌 응답은 [`TargetError::Delivery`]입니다.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use courier_core::error::TargetError;
use courier_core::pipeline::BoxFuture;
use courier_core::types::{PolicyResult, Report};

use super::{HttpAuth, HttpFormat, HttpSpec};
use crate::client::{Client, ClientOptions, DeliveryMode};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest 기반 전송 클라이언트
pub struct HttpClient {
    spec: HttpSpec,
    options: ClientOptions,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(spec: HttpSpec, options: ClientOptions) -> Result<Self, TargetError> {
        let http = build_http_client(&spec.certificate_pem, spec.skip_tls).map_err(|reason| {
            TargetError::ClientBuild {
                target: options.name.clone(),
                reason,
            }
        })?;
        Ok(Self {
            spec,
            options,
            http,
        })
    }

    pub fn spec(&self) -> &HttpSpec {
        &self.spec
    }

    fn request_url(&self, now: DateTime<Utc>) -> String {
        match &self.spec.format {
            HttpFormat::Elasticsearch {
                index,
                rotation,
                typeless_api,
            } => {
                let suffix = match rotation.as_str() {
                    "none" => String::new(),
                    "annually" => format!("-{}", now.format("%Y")),
                    "monthly" => format!("-{}", now.format("%Y.%m")),
                    _ => format!("-{}", now.format("%Y.%m.%d")),
                };
                let doc = if *typeless_api { "_doc" } else { "event" };
                format!("{}/{index}{suffix}/{doc}", self.spec.url.trim_end_matches('/'))
            }
            _ => self.spec.url.clone(),
        }
    }

    async fn post(&self, body: Value) -> Result<(), TargetError> {
        let url = self.request_url(Utc::now());
        let mut request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body);

        for (key, value) in &self.spec.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if let HttpAuth::Basic { username, password } = &self.spec.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(|e| TargetError::Delivery {
            target: self.options.name.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_owned());
            warn!(
                target_name = %self.options.name,
                %status,
                body = %body_text,
                "destination returned non-2xx status"
            );
            return Err(TargetError::Delivery {
                target: self.options.name.clone(),
                reason: format!("status {status}"),
            });
        }

        debug!(target_name = %self.options.name, %status, "delivered");
        Ok(())
    }

    fn single_payload(&self, report: &Report, result: &PolicyResult) -> Value {
        let custom = &self.options.custom_fields;
        match &self.spec.format {
            HttpFormat::Loki => {
                let mut stream = serde_json::Map::new();
                stream.insert("source".to_owned(), json!(result.source));
                stream.insert("policy".to_owned(), json!(result.policy));
                stream.insert("status".to_owned(), json!(result.status.as_str()));
                stream.insert("priority".to_owned(), json!(result.priority().as_str()));
                if let Some(ns) = result.namespace().filter(|ns| !ns.is_empty()) {
                    stream.insert("namespace".to_owned(), json!(ns));
                }
                for (k, v) in custom {
                    stream.insert(k.clone(), json!(v));
                }
                let nanos = result.timestamp.timestamp_nanos_opt().unwrap_or_default();
                json!({
                    "streams": [{
                        "stream": stream,
                        "values": [[nanos.to_string(), summary(result)]],
                    }]
                })
            }
            HttpFormat::Elasticsearch { .. } | HttpFormat::Webhook => document(report, result, custom),
            HttpFormat::Slack { channel } => {
                let mut body = json!({ "text": summary(result) });
                if !channel.is_empty() {
                    body["channel"] = json!(channel);
                }
                body
            }
            HttpFormat::Discord => json!({ "content": summary(result) }),
            HttpFormat::Teams => json!({
                "@type": "MessageCard",
                "@context": "http://schema.org/extensions",
                "summary": result.policy,
                "text": summary(result),
            }),
            HttpFormat::GoogleChat => json!({ "text": summary(result) }),
            HttpFormat::Telegram { chat_id } => json!({
                "chat_id": chat_id,
                "text": summary(result),
            }),
            HttpFormat::Jira {
                project_key,
                issue_type,
                labels,
                components,
            } => json!({
                "fields": {
                    "project": { "key": project_key },
                    "summary": format!("{}: {}", result.policy, result.rule),
                    "description": summary(result),
                    "issuetype": { "name": issue_type },
                    "labels": labels,
                    "components": components.iter().map(|c| json!({ "name": c })).collect::<Vec<_>>(),
                }
            }),
            HttpFormat::AlertManager => Value::Array(vec![alert(result, custom)]),
            HttpFormat::Splunk => json!({
                "time": result.timestamp.timestamp(),
                "sourcetype": "courier",
                "event": document(report, result, custom),
            }),
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("name", &self.options.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Client for HttpClient {
    fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn mode(&self) -> DeliveryMode {
        self.spec.mode
    }

    fn endpoint(&self) -> &str {
        &self.spec.url
    }

    fn send<'a>(
        &'a self,
        report: &'a Report,
        result: &'a PolicyResult,
    ) -> BoxFuture<'a, Result<(), TargetError>> {
        Box::pin(async move { self.post(self.single_payload(report, result)).await })
    }

    fn batch_send<'a>(
        &'a self,
        report: &'a Report,
        results: &'a [PolicyResult],
    ) -> BoxFuture<'a, Result<(), TargetError>> {
        Box::pin(async move {
            if let HttpFormat::AlertManager = self.spec.format {
                let alerts = results
                    .iter()
                    .map(|r| alert(r, &self.options.custom_fields))
                    .collect();
                return self.post(Value::Array(alerts)).await;
            }
            for result in results {
                self.post(self.single_payload(report, result)).await?;
            }
            Ok(())
        })
    }
}

/// PEM 인증서와 TLS 검증 옵션으로 reqwest 클라이언트를 만듭니다.
fn build_http_client(pem: &[u8], skip_tls: bool) -> Result<reqwest::Client, String> {
    let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

    if !pem.is_empty() {
        let cert =
            reqwest::Certificate::from_pem(pem).map_err(|e| format!("invalid certificate: {e}"))?;
        builder = builder.add_root_certificate(cert);
    }

    if skip_tls {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(|e| e.to_string())
}

/// 채팅용 한 줄 요약
fn summary(result: &PolicyResult) -> String {
    let mut text = format!(
        "[{}] {}/{} {}",
        result.priority().as_str().to_uppercase(),
        result.policy,
        result.rule,
        result.status
    );
    if let Some(resource) = &result.resource {
        if resource.namespace.is_empty() {
            text.push_str(&format!(" {} {}", resource.kind, resource.name));
        } else {
            text.push_str(&format!(
                " {} {}/{}",
                resource.kind, resource.namespace, resource.name
            ));
        }
    }
    if !result.message.is_empty() {
        text.push_str(": ");
        text.push_str(&result.message);
    }
    text
}

/// 결과 전체를 담은 JSON 문서
fn document(
    report: &Report,
    result: &PolicyResult,
    custom: &std::collections::BTreeMap<String, String>,
) -> Value {
    json!({
        "report": report.name,
        "id": result.id,
        "source": result.source,
        "policy": result.policy,
        "rule": result.rule,
        "message": result.message,
        "status": result.status.as_str(),
        "severity": result.severity.map(|s| s.as_str()).unwrap_or_default(),
        "priority": result.priority().as_str(),
        "category": result.category,
        "resource": result.resource,
        "properties": result.properties,
        "customFields": custom,
        "timestamp": result.timestamp.to_rfc3339(),
    })
}

fn alert(result: &PolicyResult, custom: &std::collections::BTreeMap<String, String>) -> Value {
    let mut labels = serde_json::Map::new();
    labels.insert("alertname".to_owned(), json!(result.policy));
    labels.insert("rule".to_owned(), json!(result.rule));
    labels.insert("status".to_owned(), json!(result.status.as_str()));
    labels.insert("severity".to_owned(), json!(result.priority().as_str()));
    labels.insert("source".to_owned(), json!(result.source));
    if let Some(ns) = result.namespace().filter(|ns| !ns.is_empty()) {
        labels.insert("namespace".to_owned(), json!(ns));
    }
    for (k, v) in custom {
        labels.insert(k.clone(), json!(v));
    }
    json!({
        "labels": labels,
        "annotations": { "message": result.message },
        "startsAt": result.timestamp.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::types::{Resource, ResultStatus, Severity};
    use std::collections::BTreeMap;

    fn spec(format: HttpFormat) -> HttpSpec {
        HttpSpec {
            kind: crate::client::TargetKind::Webhook,
            mode: DeliveryMode::SingleSend,
            format,
            url: "http://x".to_owned(),
            headers: BTreeMap::new(),
            auth: HttpAuth::None,
            skip_tls: false,
            certificate: String::new(),
            certificate_pem: Vec::new(),
        }
    }

    fn client(format: HttpFormat) -> HttpClient {
        let mut options = ClientOptions::new("test");
        options
            .custom_fields
            .insert("cluster".to_owned(), "prod".to_owned());
        HttpClient::new(spec(format), options).unwrap()
    }

    fn result() -> PolicyResult {
        PolicyResult {
            id: "r-1".to_owned(),
            source: "kyverno".to_owned(),
            policy: "require-labels".to_owned(),
            rule: "check-team".to_owned(),
            message: "label missing".to_owned(),
            status: ResultStatus::Fail,
            severity: Some(Severity::High),
            category: String::new(),
            resource: Some(Resource {
                kind: "Pod".to_owned(),
                name: "nginx".to_owned(),
                namespace: "team-a".to_owned(),
                ..Default::default()
            }),
            properties: BTreeMap::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    fn report() -> Report {
        Report {
            id: "rep".to_owned(),
            name: "polr-team-a".to_owned(),
            namespace: "team-a".to_owned(),
            source: "kyverno".to_owned(),
            labels: BTreeMap::new(),
            scope: None,
            results: vec![],
            creation_timestamp: Utc::now(),
        }
    }

    #[test]
    fn summary_includes_priority_resource_and_message() {
        let text = summary(&result());
        assert_eq!(
            text,
            "[ERROR] require-labels/check-team fail Pod team-a/nginx: label missing"
        );
    }

    #[test]
    fn loki_payload_carries_stream_labels_and_custom_fields() {
        let body = client(HttpFormat::Loki).single_payload(&report(), &result());
        let stream = &body["streams"][0]["stream"];
        assert_eq!(stream["namespace"], "team-a");
        assert_eq!(stream["priority"], "error");
        assert_eq!(stream["cluster"], "prod");
        assert_eq!(body["streams"][0]["values"][0][0], "1714557600000000000");
    }

    #[test]
    fn slack_payload_includes_channel_only_when_set() {
        let body = client(HttpFormat::Slack {
            channel: "#alerts".to_owned(),
        })
        .single_payload(&report(), &result());
        assert_eq!(body["channel"], "#alerts");

        let body = client(HttpFormat::Slack {
            channel: String::new(),
        })
        .single_payload(&report(), &result());
        assert!(body.get("channel").is_none());
    }

    #[test]
    fn elasticsearch_url_applies_rotation() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let es = |rotation: &str, typeless_api| {
            client(HttpFormat::Elasticsearch {
                index: "courier".to_owned(),
                rotation: rotation.to_owned(),
                typeless_api,
            })
            .request_url(now)
        };
        assert_eq!(es("daily", true), "http://x/courier-2024.05.01/_doc");
        assert_eq!(es("monthly", true), "http://x/courier-2024.05/_doc");
        assert_eq!(es("annually", false), "http://x/courier-2024/event");
        assert_eq!(es("none", true), "http://x/courier/_doc");
    }

    #[test]
    fn alertmanager_payload_is_alert_list() {
        let body = client(HttpFormat::AlertManager).single_payload(&report(), &result());
        let alerts = body.as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["labels"]["alertname"], "require-labels");
        assert_eq!(alerts[0]["labels"]["cluster"], "prod");
    }

    #[test]
    fn webhook_document_contains_result_fields() {
        let body = client(HttpFormat::Webhook).single_payload(&report(), &result());
        assert_eq!(body["report"], "polr-team-a");
        assert_eq!(body["severity"], "high");
        assert_eq!(body["customFields"]["cluster"], "prod");
    }

    #[test]
    fn client_debug_hides_url_path_and_password() {
        let mut spec = spec(HttpFormat::Slack {
            channel: String::new(),
        });
        spec.url = "https://hooks.slack.com/services/T000/B000/XXXXSECRET".to_owned();
        spec.auth = HttpAuth::Basic {
            username: "courier".to_owned(),
            password: "hunter2".to_owned(),
        };

        let printed = format!("{:?}", HttpClient::new(spec, ClientOptions::new("slack")).unwrap());

        assert!(printed.contains("hooks.slack.com"));
        assert!(!printed.contains("XXXXSECRET"), "{printed}");
        assert!(!printed.contains("hunter2"), "{printed}");
    }
}
