//! 전송 대상 팩토리
//!
//! 설정 노드 하나(와 직속 부모)를 [`Target`] 0개 또는 1개로 변환합니다.
//!
//! 1. 부모와 자식의 시크릿을 각각 조회해 값이 있는 필드를 덮어씀
//! 2. 비어 있는 선택 필드를 부모 값으로 채우고, 둘 다 비었으면 유형별 기본값 적용
//! 3. 필수 필드 검사 (실패 시 경고 로그 후 대상 없음)
//! 4. [`AdapterBuilder`]로 클라이언트 생성
//! 5. 새 ID와 함께 원본 설정을 보관 (핫 리로드 시 같은 ID로 재생성)

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use courier_core::error::TargetError;

use crate::adapters::{
    AdapterBuilder, HttpAuth, HttpFormat, HttpSpec, ObjectStoreProvider, ObjectStoreSpec,
};
use crate::client::{Client, ClientOptions, DeliveryMode, TargetKind};
use crate::config::{
    AwsConfig, ElasticsearchOptions, GcsOptions, HostOptions, JiraOptions, KinesisOptions,
    LokiOptions, S3Options, SecurityHubOptions, SlackOptions, SplunkOptions, TargetConfig,
    TargetsConfig, TelegramOptions, WebhookOptions, inherit, inherit_flag, inherit_or,
};
use crate::filter::{Filters, NamespaceResolver, ReportFilter, ResultFilter};
use crate::secrets::{RetryPolicy, SecretStore, SecretValues, fetch_with_retry, read_mounted};

const DEFAULT_LOKI_PATH: &str = "/loki/api/v1/push";
const DEFAULT_PREFIX: &str = "policy-reporter";
const DEFAULT_ES_INDEX: &str = "policy-reporter";
const DEFAULT_ES_ROTATION: &str = "daily";
const DEFAULT_TELEGRAM_HOST: &str = "https://api.telegram.org";
const DEFAULT_PRODUCT_NAME: &str = "Policy Reporter";
const DEFAULT_COMPANY_NAME: &str = "Kyverno";
const DEFAULT_JIRA_ISSUE_TYPE: &str = "Task";

/// 재생성에 필요한 설정 노드 (채널 목록은 비움)
#[derive(Debug, Clone, PartialEq)]
pub struct TargetNode<T> {
    pub config: TargetConfig<T>,
    pub parent: Option<TargetConfig<T>>,
}

impl<T: Clone> TargetNode<T> {
    pub fn new(config: &TargetConfig<T>, parent: Option<&TargetConfig<T>>) -> Self {
        Self {
            config: without_channels(config),
            parent: parent.map(without_channels),
        }
    }

    /// 자식의 시크릿 참조, 없으면 부모의 참조
    pub fn secret(&self) -> &str {
        if !self.config.secret_ref.is_empty() {
            return &self.config.secret_ref;
        }
        self.parent
            .as_ref()
            .map(|p| p.secret_ref.as_str())
            .unwrap_or_default()
    }
}

fn without_channels<T: Clone>(config: &TargetConfig<T>) -> TargetConfig<T> {
    TargetConfig {
        name: config.name.clone(),
        config: config.config.clone(),
        minimum_severity: config.minimum_severity.clone(),
        filter: config.filter.clone(),
        secret_ref: config.secret_ref.clone(),
        mounted_secret: config.mounted_secret.clone(),
        sources: config.sources.clone(),
        custom_fields: config.custom_fields.clone(),
        skip_existing: config.skip_existing,
        channels: Vec::new(),
        valid: config.valid,
    }
}

/// 유형별 설정 노드
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Loki(TargetNode<LokiOptions>),
    Elasticsearch(TargetNode<ElasticsearchOptions>),
    Slack(TargetNode<SlackOptions>),
    Discord(TargetNode<WebhookOptions>),
    Teams(TargetNode<WebhookOptions>),
    GoogleChat(TargetNode<WebhookOptions>),
    Telegram(TargetNode<TelegramOptions>),
    Jira(TargetNode<JiraOptions>),
    Webhook(TargetNode<WebhookOptions>),
    AlertManager(TargetNode<HostOptions>),
    Splunk(TargetNode<SplunkOptions>),
    S3(TargetNode<S3Options>),
    Kinesis(TargetNode<KinesisOptions>),
    SecurityHub(TargetNode<SecurityHubOptions>),
    Gcs(TargetNode<GcsOptions>),
}

/// 모든 변형에 같은 식을 적용합니다.
macro_rules! each_node {
    ($spec:expr, $node:ident => $body:expr) => {
        match $spec {
            TargetSpec::Loki($node) => $body,
            TargetSpec::Elasticsearch($node) => $body,
            TargetSpec::Slack($node) => $body,
            TargetSpec::Discord($node) => $body,
            TargetSpec::Teams($node) => $body,
            TargetSpec::GoogleChat($node) => $body,
            TargetSpec::Telegram($node) => $body,
            TargetSpec::Jira($node) => $body,
            TargetSpec::Webhook($node) => $body,
            TargetSpec::AlertManager($node) => $body,
            TargetSpec::Splunk($node) => $body,
            TargetSpec::S3($node) => $body,
            TargetSpec::Kinesis($node) => $body,
            TargetSpec::SecurityHub($node) => $body,
            TargetSpec::Gcs($node) => $body,
        }
    };
}

impl TargetSpec {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Loki(_) => TargetKind::Loki,
            Self::Elasticsearch(_) => TargetKind::Elasticsearch,
            Self::Slack(_) => TargetKind::Slack,
            Self::Discord(_) => TargetKind::Discord,
            Self::Teams(_) => TargetKind::Teams,
            Self::GoogleChat(_) => TargetKind::GoogleChat,
            Self::Telegram(_) => TargetKind::Telegram,
            Self::Jira(_) => TargetKind::Jira,
            Self::Webhook(_) => TargetKind::Webhook,
            Self::AlertManager(_) => TargetKind::AlertManager,
            Self::Splunk(_) => TargetKind::Splunk,
            Self::S3(_) => TargetKind::S3,
            Self::Kinesis(_) => TargetKind::Kinesis,
            Self::SecurityHub(_) => TargetKind::SecurityHub,
            Self::Gcs(_) => TargetKind::Gcs,
        }
    }

    pub fn name(&self) -> &str {
        each_node!(self, node => node.config.name.as_str())
    }

    pub fn secret(&self) -> &str {
        each_node!(self, node => node.secret())
    }

    /// 부모 없이 단독으로 생성할 노드로 바꿉니다.
    fn standalone(mut self) -> Self {
        let kind = self.kind();
        each_node!(&mut self, node => {
            node.parent = None;
            inherit(&mut node.config.name, kind.display_name());
        });
        self
    }
}

/// 생성된 전송 대상
#[derive(Debug, Clone)]
pub struct Target {
    /// 생성 시 한 번 발급되며 재생성 후에도 유지
    pub id: String,
    pub kind: TargetKind,
    pub client: Arc<dyn Client>,
    pub spec: TargetSpec,
}

impl Target {
    pub fn name(&self) -> &str {
        self.client.name()
    }

    /// 유효 시크릿 참조 (자식, 없으면 부모)
    pub fn secret(&self) -> &str {
        self.spec.secret()
    }
}

/// 시크릿 값을 유형별 옵션에 반영
trait MapSecret {
    fn map_secret(&mut self, values: &SecretValues);
}

/// 비어 있지 않은 시크릿 값으로 덮어씁니다.
fn overwrite(field: &mut String, value: &str) {
    if !value.is_empty() {
        *field = value.to_owned();
    }
}

impl MapSecret for LokiOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.host.host, &values.host);
    }
}

impl MapSecret for ElasticsearchOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.host.host, &values.host);
        overwrite(&mut self.username, &values.username);
        overwrite(&mut self.password, &values.password);
        overwrite(&mut self.api_key, &values.api_key);
        if values.typeless_api {
            self.typeless_api = true;
        }
    }
}

impl MapSecret for SlackOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.webhook.webhook, &values.webhook);
        overwrite(&mut self.channel, &values.channel);
    }
}

impl MapSecret for WebhookOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.webhook, &values.webhook);
        if !values.token.is_empty() {
            self.headers
                .insert("Authorization".to_owned(), values.token.clone());
        }
    }
}

impl MapSecret for TelegramOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.token, &values.token);
        overwrite(&mut self.webhook.webhook, &values.webhook);
        overwrite(&mut self.webhook.webhook, &values.host);
    }
}

impl MapSecret for JiraOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.host, &values.host);
        overwrite(&mut self.username, &values.username);
        overwrite(&mut self.password, &values.password);
        overwrite(&mut self.api_token, &values.token);
    }
}

impl MapSecret for HostOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.host, &values.host);
    }
}

impl MapSecret for SplunkOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.host.host, &values.host);
        overwrite(&mut self.token, &values.token);
    }
}

impl MapSecret for S3Options {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.aws.access_key_id, &values.access_key_id);
        overwrite(&mut self.aws.secret_access_key, &values.secret_access_key);
        overwrite(&mut self.kms_key_id, &values.kms_key_id);
        overwrite(&mut self.aws.endpoint, &values.host);
    }
}

impl MapSecret for KinesisOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.aws.access_key_id, &values.access_key_id);
        overwrite(&mut self.aws.secret_access_key, &values.secret_access_key);
    }
}

impl MapSecret for SecurityHubOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.aws.access_key_id, &values.access_key_id);
        overwrite(&mut self.aws.secret_access_key, &values.secret_access_key);
        overwrite(&mut self.account_id, &values.account_id);
    }
}

impl MapSecret for GcsOptions {
    fn map_secret(&mut self, values: &SecretValues) {
        overwrite(&mut self.credentials, &values.credentials);
    }
}

/// 설정 트리에서 전송 대상을 만드는 팩토리
#[derive(Clone)]
pub struct TargetFactory {
    secrets: Option<Arc<dyn SecretStore>>,
    resolver: Option<Arc<dyn NamespaceResolver>>,
    builder: Arc<dyn AdapterBuilder>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TargetFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetFactory")
            .field("secrets", &self.secrets.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl TargetFactory {
    pub fn new(builder: Arc<dyn AdapterBuilder>) -> Self {
        Self {
            secrets: None,
            resolver: None,
            builder,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_secrets(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(store);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn NamespaceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 설정 트리 전체에서 전송 대상을 만듭니다.
    ///
    /// 대상을 만든 노드에는 `valid` 표시가 남고, 비어 있는 이름은 기본
    /// 이름으로 채워집니다.
    pub async fn create_targets(&self, config: &mut TargetsConfig) -> Vec<Target> {
        let mut targets = Vec::new();

        self.create_family(&mut config.loki, TargetKind::Loki, TargetSpec::Loki, &mut targets)
            .await;
        self.create_family(
            &mut config.elasticsearch,
            TargetKind::Elasticsearch,
            TargetSpec::Elasticsearch,
            &mut targets,
        )
        .await;
        self.create_family(&mut config.slack, TargetKind::Slack, TargetSpec::Slack, &mut targets)
            .await;
        self.create_family(
            &mut config.discord,
            TargetKind::Discord,
            TargetSpec::Discord,
            &mut targets,
        )
        .await;
        self.create_family(&mut config.teams, TargetKind::Teams, TargetSpec::Teams, &mut targets)
            .await;
        self.create_family(
            &mut config.google_chat,
            TargetKind::GoogleChat,
            TargetSpec::GoogleChat,
            &mut targets,
        )
        .await;
        self.create_family(
            &mut config.telegram,
            TargetKind::Telegram,
            TargetSpec::Telegram,
            &mut targets,
        )
        .await;
        self.create_family(&mut config.jira, TargetKind::Jira, TargetSpec::Jira, &mut targets)
            .await;
        self.create_family(
            &mut config.webhook,
            TargetKind::Webhook,
            TargetSpec::Webhook,
            &mut targets,
        )
        .await;
        self.create_family(
            &mut config.alert_manager,
            TargetKind::AlertManager,
            TargetSpec::AlertManager,
            &mut targets,
        )
        .await;
        self.create_family(&mut config.splunk, TargetKind::Splunk, TargetSpec::Splunk, &mut targets)
            .await;
        self.create_family(&mut config.s3, TargetKind::S3, TargetSpec::S3, &mut targets)
            .await;
        self.create_family(
            &mut config.kinesis,
            TargetKind::Kinesis,
            TargetSpec::Kinesis,
            &mut targets,
        )
        .await;
        self.create_family(
            &mut config.security_hub,
            TargetKind::SecurityHub,
            TargetSpec::SecurityHub,
            &mut targets,
        )
        .await;
        self.create_family(&mut config.gcs, TargetKind::Gcs, TargetSpec::Gcs, &mut targets)
            .await;

        info!(targets = targets.len(), "target tree built");
        targets
    }

    /// 채널 없이 대상 하나를 만듭니다.
    pub async fn create_single(&self, spec: TargetSpec) -> Option<Target> {
        self.create(spec.standalone()).await
    }

    /// 보관된 설정으로 같은 ID의 대상을 다시 만듭니다.
    pub async fn rebuild(&self, target: &Target) -> Option<Target> {
        let client = self.build(&target.spec).await?;
        Some(Target {
            id: target.id.clone(),
            kind: target.kind,
            client,
            spec: target.spec.clone(),
        })
    }

    async fn create_family<T>(
        &self,
        root: &mut Option<TargetConfig<T>>,
        kind: TargetKind,
        wrap: fn(TargetNode<T>) -> TargetSpec,
        out: &mut Vec<Target>,
    ) where
        T: Clone,
    {
        let Some(root) = root.as_mut() else {
            return;
        };

        inherit(&mut root.name, kind.display_name());
        if let Some(target) = self.create(wrap(TargetNode::new(root, None))).await {
            out.push(target);
            root.valid = true;
        }

        let parent = without_channels(root);
        for (i, channel) in root.channels.iter_mut().enumerate() {
            inherit(
                &mut channel.name,
                &format!("{} Channel {}", kind.display_name(), i + 1),
            );
            if let Some(target) = self.create(wrap(TargetNode::new(channel, Some(&parent)))).await {
                out.push(target);
                channel.valid = true;
            }
        }
    }

    async fn create(&self, spec: TargetSpec) -> Option<Target> {
        let client = self.build(&spec).await?;
        Some(Target {
            id: Uuid::new_v4().to_string(),
            kind: spec.kind(),
            client,
            spec,
        })
    }

    async fn build(&self, spec: &TargetSpec) -> Option<Arc<dyn Client>> {
        let kind = spec.kind();
        let result = match spec {
            TargetSpec::Loki(node) => self.loki(node).await,
            TargetSpec::Elasticsearch(node) => self.elasticsearch(node).await,
            TargetSpec::Slack(node) => self.slack(node).await,
            TargetSpec::Discord(node) => self.webhook_family(node, kind, HttpFormat::Discord).await,
            TargetSpec::Teams(node) => self.webhook_family(node, kind, HttpFormat::Teams).await,
            TargetSpec::GoogleChat(node) => {
                self.webhook_family(node, kind, HttpFormat::GoogleChat).await
            }
            TargetSpec::Webhook(node) => self.webhook_family(node, kind, HttpFormat::Webhook).await,
            TargetSpec::Telegram(node) => self.telegram(node).await,
            TargetSpec::Jira(node) => self.jira(node).await,
            TargetSpec::AlertManager(node) => self.alert_manager(node).await,
            TargetSpec::Splunk(node) => self.splunk(node).await,
            TargetSpec::S3(node) => self.s3(node).await,
            TargetSpec::Kinesis(node) => self.kinesis(node).await,
            TargetSpec::SecurityHub(node) => self.security_hub(node).await,
            TargetSpec::Gcs(node) => self.gcs(node).await,
        };

        match result {
            Ok(client) => {
                info!(
                    target_name = client.name(),
                    kind = %kind,
                    mode = client.mode().as_str(),
                    "target configured"
                );
                Some(client)
            }
            Err(e) => {
                warn!(target_name = spec.name(), kind = %kind, error = %e, "target skipped");
                None
            }
        }
    }

    /// 시크릿이 반영된 자식과 부모 설정 사본
    async fn resolve<T>(&self, node: &TargetNode<T>) -> (TargetConfig<T>, TargetConfig<T>)
    where
        T: MapSecret + Clone + Default,
    {
        let mut parent = node.parent.clone().unwrap_or_default();
        self.map_secret_values(&mut parent).await;

        let mut config = node.config.clone();
        self.map_secret_values(&mut config).await;

        (config, parent)
    }

    async fn map_secret_values<T: MapSecret>(&self, config: &mut TargetConfig<T>) {
        if let Some(values) = self
            .secret_values(&config.secret_ref, &config.mounted_secret)
            .await
        {
            config.config.map_secret(&values);
        }
    }

    /// 참조 시크릿을 먼저 읽고, 마운트된 시크릿의 비어 있지 않은 값을 그 위에 덮습니다.
    async fn secret_values(&self, secret_ref: &str, mounted: &str) -> Option<SecretValues> {
        let mut values = None;

        if !secret_ref.is_empty()
            && let Some(store) = &self.secrets
        {
            match fetch_with_retry(store.as_ref(), secret_ref, self.retry).await {
                Ok(found) => values = Some(found),
                Err(e) => {
                    warn!(secret = secret_ref, error = %e, "failed to get secret reference");
                    return None;
                }
            }
        }

        if !mounted.is_empty() {
            match read_mounted(mounted).await {
                Ok(found) => values.get_or_insert_with(SecretValues::default).overlay(found),
                Err(e) => {
                    warn!(path = mounted, error = %e, "failed to read mounted secret");
                    return None;
                }
            }
        }

        values
    }

    /// 인증서를 비동기로 미리 읽은 뒤 HTTP 클라이언트를 만듭니다.
    async fn http(
        &self,
        mut spec: HttpSpec,
        options: ClientOptions,
    ) -> Result<Arc<dyn Client>, TargetError> {
        if !spec.certificate.is_empty() && spec.certificate_pem.is_empty() {
            spec.certificate_pem =
                tokio::fs::read(&spec.certificate)
                    .await
                    .map_err(|e| TargetError::ClientBuild {
                        target: options.name.clone(),
                        reason: format!("failed to read certificate {}: {e}", spec.certificate),
                    })?;
        }
        self.builder.http(spec, options)
    }

    fn client_options<T>(&self, config: &TargetConfig<T>) -> ClientOptions {
        ClientOptions {
            name: config.name.clone(),
            skip_existing_on_startup: config.skip_existing,
            filters: Filters::new(
                ResultFilter::from_config(
                    &config.filter,
                    &config.minimum_severity,
                    &config.sources,
                    self.resolver.clone(),
                ),
                ReportFilter::from_config(&config.filter),
            ),
            custom_fields: config.custom_fields.clone(),
            created_at: Utc::now(),
        }
    }

    async fn loki(&self, node: &TargetNode<LokiOptions>) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.host.host, &p.host.host);
        require(&config.name, "host", &c.host.host)?;
        inherit(&mut c.host.certificate, &p.host.certificate);
        inherit_or(&mut c.path, &p.path, DEFAULT_LOKI_PATH);
        inherit(&mut c.username, &p.username);
        inherit(&mut c.password, &p.password);
        inherit_flag(&mut c.host.skip_tls, p.host.skip_tls);
        if c.host.headers.is_empty() {
            c.host.headers = p.host.headers.clone();
        }
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = HttpSpec {
            kind: TargetKind::Loki,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Loki,
            url: format!("{}{}", c.host.host.trim_end_matches('/'), c.path),
            headers: c.host.headers.clone(),
            auth: basic_auth(&c.username, &c.password),
            skip_tls: c.host.skip_tls,
            certificate: c.host.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn elasticsearch(
        &self,
        node: &TargetNode<ElasticsearchOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.host.host, &p.host.host);
        require(&config.name, "host", &c.host.host)?;
        inherit(&mut c.host.certificate, &p.host.certificate);
        inherit_flag(&mut c.host.skip_tls, p.host.skip_tls);
        inherit(&mut c.username, &p.username);
        inherit(&mut c.password, &p.password);
        inherit(&mut c.api_key, &p.api_key);
        inherit_or(&mut c.index, &p.index, DEFAULT_ES_INDEX);
        inherit_or(&mut c.rotation, &p.rotation, DEFAULT_ES_ROTATION);
        inherit_flag(&mut c.typeless_api, p.typeless_api);
        config.map_base_parent(&parent);

        let c = &config.config;
        let mut headers = c.host.headers.clone();
        let auth = if c.api_key.is_empty() {
            basic_auth(&c.username, &c.password)
        } else {
            headers.insert("Authorization".to_owned(), format!("ApiKey {}", c.api_key));
            HttpAuth::None
        };
        let spec = HttpSpec {
            kind: TargetKind::Elasticsearch,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Elasticsearch {
                index: c.index.clone(),
                rotation: c.rotation.clone(),
                typeless_api: c.typeless_api,
            },
            url: c.host.host.clone(),
            headers,
            auth,
            skip_tls: c.host.skip_tls,
            certificate: c.host.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn slack(&self, node: &TargetNode<SlackOptions>) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        if c.webhook.webhook.is_empty() && c.channel.is_empty() {
            return Err(missing(&config.name, "webhook"));
        }
        inherit(&mut c.webhook.webhook, &p.webhook.webhook);
        require(&config.name, "webhook", &c.webhook.webhook)?;
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = HttpSpec {
            kind: TargetKind::Slack,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Slack {
                channel: c.channel.clone(),
            },
            url: c.webhook.webhook.clone(),
            headers: c.webhook.headers.clone(),
            auth: HttpAuth::None,
            skip_tls: false,
            certificate: String::new(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    /// Discord, Teams, GoogleChat, Webhook 공통
    async fn webhook_family(
        &self,
        node: &TargetNode<WebhookOptions>,
        kind: TargetKind,
        format: HttpFormat,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.webhook, &p.webhook);
        require(&config.name, "webhook", &c.webhook)?;
        inherit(&mut c.certificate, &p.certificate);
        inherit_flag(&mut c.skip_tls, p.skip_tls);
        c.headers = merge_headers(&p.headers, &c.headers);
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = HttpSpec {
            kind,
            mode: DeliveryMode::SingleSend,
            format,
            url: c.webhook.clone(),
            headers: c.headers.clone(),
            auth: HttpAuth::None,
            skip_tls: c.skip_tls,
            certificate: c.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn telegram(
        &self,
        node: &TargetNode<TelegramOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.token, &p.token);
        require(&config.name, "chatId", &c.chat_id)?;
        require(&config.name, "token", &c.token)?;
        inherit(&mut c.webhook.webhook, &p.webhook.webhook);
        inherit(&mut c.webhook.certificate, &p.webhook.certificate);
        inherit_flag(&mut c.webhook.skip_tls, p.webhook.skip_tls);
        c.webhook.headers = merge_headers(&p.webhook.headers, &c.webhook.headers);
        config.map_base_parent(&parent);

        let c = &config.config;
        let host = if c.webhook.webhook.is_empty() {
            DEFAULT_TELEGRAM_HOST
        } else {
            c.webhook.webhook.trim_end_matches('/')
        };
        let spec = HttpSpec {
            kind: TargetKind::Telegram,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Telegram {
                chat_id: c.chat_id.clone(),
            },
            url: format!("{host}/bot{}/sendMessage", c.token),
            headers: c.webhook.headers.clone(),
            auth: HttpAuth::None,
            skip_tls: c.webhook.skip_tls,
            certificate: c.webhook.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn jira(&self, node: &TargetNode<JiraOptions>) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.host, &p.host);
        require(&config.name, "host", &c.host)?;
        inherit(&mut c.certificate, &p.certificate);
        inherit_flag(&mut c.skip_tls, p.skip_tls);
        inherit(&mut c.username, &p.username);
        inherit(&mut c.password, &p.password);
        inherit(&mut c.api_token, &p.api_token);
        inherit(&mut c.project_key, &p.project_key);
        inherit_or(&mut c.issue_type, &p.issue_type, DEFAULT_JIRA_ISSUE_TYPE);
        config.map_base_parent(&parent);

        let c = &config.config;
        let secret = if c.api_token.is_empty() {
            &c.password
        } else {
            &c.api_token
        };
        let spec = HttpSpec {
            kind: TargetKind::Jira,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Jira {
                project_key: c.project_key.clone(),
                issue_type: c.issue_type.clone(),
                labels: c.labels.clone(),
                components: c.components.clone(),
            },
            url: format!("{}/rest/api/2/issue", c.host.trim_end_matches('/')),
            headers: BTreeMap::new(),
            auth: basic_auth(&c.username, secret),
            skip_tls: c.skip_tls,
            certificate: c.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn alert_manager(
        &self,
        node: &TargetNode<HostOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.host, &p.host);
        require(&config.name, "host", &c.host)?;
        inherit(&mut c.certificate, &p.certificate);
        inherit_flag(&mut c.skip_tls, p.skip_tls);
        c.headers = merge_headers(&p.headers, &c.headers);
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = HttpSpec {
            kind: TargetKind::AlertManager,
            mode: DeliveryMode::BatchSend,
            format: HttpFormat::AlertManager,
            url: format!("{}/api/v2/alerts", c.host.trim_end_matches('/')),
            headers: c.headers.clone(),
            auth: HttpAuth::None,
            skip_tls: c.skip_tls,
            certificate: c.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn splunk(
        &self,
        node: &TargetNode<SplunkOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.host.host, &p.host.host);
        inherit(&mut c.token, &p.token);
        require(&config.name, "host", &c.host.host)?;
        require(&config.name, "token", &c.token)?;
        inherit(&mut c.host.certificate, &p.host.certificate);
        inherit_flag(&mut c.host.skip_tls, p.host.skip_tls);
        config.map_base_parent(&parent);

        let c = &config.config;
        let mut headers = c.host.headers.clone();
        headers.insert("Authorization".to_owned(), format!("Splunk {}", c.token));
        let spec = HttpSpec {
            kind: TargetKind::Splunk,
            mode: DeliveryMode::SingleSend,
            format: HttpFormat::Splunk,
            url: format!("{}/services/collector", c.host.host.trim_end_matches('/')),
            headers,
            auth: HttpAuth::None,
            skip_tls: c.host.skip_tls,
            certificate: c.host.certificate.clone(),
            certificate_pem: Vec::new(),
        };
        self.http(spec, self.client_options(&config)).await
    }

    async fn s3(&self, node: &TargetNode<S3Options>) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.bucket, &p.bucket);
        require(&config.name, "bucket", &c.bucket)?;
        c.aws.map_aws_parent(&p.aws);
        if c.aws.endpoint.is_empty() && !has_aws_identity() {
            return Err(missing(&config.name, "endpoint"));
        }
        inherit(&mut c.aws.region, &env_region());
        check_aws(&config.name, &c.aws, &p.aws)?;
        inherit_or(&mut c.prefix, &p.prefix, DEFAULT_PREFIX);
        inherit(&mut c.kms_key_id, &p.kms_key_id);
        inherit(&mut c.server_side_encryption, &p.server_side_encryption);
        inherit_flag(&mut c.bucket_key_enabled, p.bucket_key_enabled);
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = ObjectStoreSpec {
            kind: TargetKind::S3,
            provider: ObjectStoreProvider::S3 {
                aws: c.aws.clone(),
                kms_key_id: c.kms_key_id.clone(),
                server_side_encryption: c.server_side_encryption.clone(),
                bucket_key_enabled: c.bucket_key_enabled,
                path_style: c.path_style,
            },
            bucket: c.bucket.clone(),
            prefix: c.prefix.clone(),
        };
        self.builder.object_store(spec, self.client_options(&config))
    }

    async fn kinesis(
        &self,
        node: &TargetNode<KinesisOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        c.aws.map_aws_parent(&p.aws);
        require(&config.name, "endpoint", &c.aws.endpoint)?;
        check_aws(&config.name, &c.aws, &p.aws)?;
        inherit(&mut c.stream_name, &p.stream_name);
        require(&config.name, "streamName", &c.stream_name)?;
        config.map_base_parent(&parent);

        let options = self.client_options(&config);
        self.builder.kinesis(config.config, options)
    }

    async fn security_hub(
        &self,
        node: &TargetNode<SecurityHubOptions>,
    ) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.account_id, &p.account_id);
        require(&config.name, "accountId", &c.account_id)?;
        inherit(&mut c.aws.region, &env_region());
        check_aws(&config.name, &c.aws, &p.aws)?;
        c.aws.map_aws_parent(&p.aws);
        inherit_or(&mut c.product_name, &p.product_name, DEFAULT_PRODUCT_NAME);
        inherit_or(&mut c.company_name, &p.company_name, DEFAULT_COMPANY_NAME);
        if c.delay_in_seconds == 0 {
            c.delay_in_seconds = p.delay_in_seconds;
        }
        config.map_base_parent(&parent);

        let options = self.client_options(&config);
        self.builder.security_hub(config.config, options)
    }

    async fn gcs(&self, node: &TargetNode<GcsOptions>) -> Result<Arc<dyn Client>, TargetError> {
        let (mut config, parent) = self.resolve(node).await;
        let (c, p) = (&mut config.config, &parent.config);

        inherit(&mut c.bucket, &p.bucket);
        require(&config.name, "bucket", &c.bucket)?;
        inherit(&mut c.credentials, &p.credentials);
        require(&config.name, "credentials", &c.credentials)?;
        inherit_or(&mut c.prefix, &p.prefix, DEFAULT_PREFIX);
        config.map_base_parent(&parent);

        let c = &config.config;
        let spec = ObjectStoreSpec {
            kind: TargetKind::Gcs,
            provider: ObjectStoreProvider::Gcs {
                credentials: c.credentials.clone(),
            },
            bucket: c.bucket.clone(),
            prefix: c.prefix.clone(),
        };
        self.builder.object_store(spec, self.client_options(&config))
    }
}

fn missing(target: &str, field: &str) -> TargetError {
    TargetError::MissingField {
        target: target.to_owned(),
        field: field.to_owned(),
    }
}

fn require(target: &str, field: &str, value: &str) -> Result<(), TargetError> {
    if value.is_empty() {
        Err(missing(target, field))
    } else {
        Ok(())
    }
}

fn basic_auth(username: &str, password: &str) -> HttpAuth {
    if username.is_empty() {
        HttpAuth::None
    } else {
        HttpAuth::Basic {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }
}

/// 부모 헤더 위에 자식 헤더를 덮어씁니다.
fn merge_headers(
    parent: &BTreeMap<String, String>,
    child: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut headers = parent.clone();
    headers.extend(child.iter().map(|(k, v)| (k.clone(), v.clone())));
    headers
}

fn env_var(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn env_region() -> String {
    env_var("AWS_REGION")
}

/// IRSA 또는 Pod Identity 환경 여부
fn has_aws_identity() -> bool {
    let irsa = !env_var("AWS_ROLE_ARN").is_empty()
        && !env_var("AWS_WEB_IDENTITY_TOKEN_FILE").is_empty();
    let pod_identity = !env_var("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE").is_empty()
        && !env_var("AWS_CONTAINER_CREDENTIALS_FULL_URI").is_empty();
    irsa || pod_identity
}

fn check_aws(target: &str, config: &AwsConfig, parent: &AwsConfig) -> Result<(), TargetError> {
    let ambient = has_aws_identity();

    if !ambient && config.access_key_id.is_empty() && parent.access_key_id.is_empty() {
        return Err(missing(target, "accessKeyId"));
    }
    if !ambient && config.secret_access_key.is_empty() && parent.secret_access_key.is_empty() {
        return Err(missing(target, "secretAccessKey"));
    }
    if config.region.is_empty() && parent.region.is_empty() {
        return Err(missing(target, "region"));
    }
    Ok(())
}
