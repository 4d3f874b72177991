//! S3, GCS 업로드 어댑터
//!
//! 리포트의 결과 묶음을 JSON 오브젝트 하나로 씁니다.
//! 키 형식: `<prefix>/<namespace|cluster>/<report>-<timestamp>.json`

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use tracing::debug;

use courier_core::error::TargetError;
use courier_core::pipeline::BoxFuture;
use courier_core::types::{PolicyResult, Report};

use super::{ObjectStoreProvider, ObjectStoreSpec};
use crate::client::{Client, ClientOptions, DeliveryMode};

/// 오브젝트 스토리지 전송 클라이언트
pub struct ObjectStoreClient {
    spec: ObjectStoreSpec,
    options: ClientOptions,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("name", &self.options.name)
            .field("bucket", &self.spec.bucket)
            .field("prefix", &self.spec.prefix)
            .finish()
    }
}

impl ObjectStoreClient {
    pub fn new(spec: ObjectStoreSpec, options: ClientOptions) -> Result<Self, TargetError> {
        let store = build_store(&spec).map_err(|reason| TargetError::ClientBuild {
            target: options.name.clone(),
            reason,
        })?;
        Ok(Self::with_store(spec, options, store))
    }

    /// 이미 만들어진 스토어로 클라이언트를 구성합니다.
    pub fn with_store(
        spec: ObjectStoreSpec,
        options: ClientOptions,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            spec,
            options,
            store,
        }
    }

    async fn upload(&self, report: &Report, results: &[PolicyResult]) -> Result<(), TargetError> {
        let key = object_key(&self.spec.prefix, report, Utc::now());
        let body = serde_json::json!({
            "report": report.name,
            "namespace": report.namespace,
            "source": report.source,
            "customFields": self.options.custom_fields,
            "results": results,
        });
        let data = serde_json::to_vec(&body).map_err(|e| self.delivery_error(e))?;

        self.store
            .put(&key, Bytes::from(data).into())
            .await
            .map_err(|e| self.delivery_error(e))?;

        debug!(
            target_name = %self.options.name,
            bucket = %self.spec.bucket,
            key = %key,
            results = results.len(),
            "uploaded report"
        );
        Ok(())
    }

    fn delivery_error(&self, e: impl std::fmt::Display) -> TargetError {
        TargetError::Delivery {
            target: self.options.name.clone(),
            reason: e.to_string(),
        }
    }
}

impl Client for ObjectStoreClient {
    fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::BatchSend
    }

    fn endpoint(&self) -> &str {
        &self.spec.bucket
    }

    fn send<'a>(
        &'a self,
        report: &'a Report,
        result: &'a PolicyResult,
    ) -> BoxFuture<'a, Result<(), TargetError>> {
        Box::pin(async move { self.upload(report, std::slice::from_ref(result)).await })
    }

    fn batch_send<'a>(
        &'a self,
        report: &'a Report,
        results: &'a [PolicyResult],
    ) -> BoxFuture<'a, Result<(), TargetError>> {
        Box::pin(async move { self.upload(report, results).await })
    }
}

fn build_store(spec: &ObjectStoreSpec) -> Result<Arc<dyn ObjectStore>, String> {
    match &spec.provider {
        ObjectStoreProvider::S3 {
            aws,
            kms_key_id,
            server_side_encryption,
            bucket_key_enabled,
            path_style,
        } => {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(&spec.bucket)
                .with_virtual_hosted_style_request(!path_style);

            if !aws.region.is_empty() {
                builder = builder.with_region(&aws.region);
            }
            if !aws.access_key_id.is_empty() {
                builder = builder
                    .with_access_key_id(&aws.access_key_id)
                    .with_secret_access_key(&aws.secret_access_key);
            }
            if !aws.endpoint.is_empty() {
                builder = builder
                    .with_endpoint(&aws.endpoint)
                    .with_allow_http(aws.endpoint.starts_with("http://"));
            }
            if server_side_encryption == "aws:kms" || !kms_key_id.is_empty() {
                builder = builder
                    .with_sse_kms_encryption(kms_key_id)
                    .with_bucket_key(*bucket_key_enabled);
            }

            let store = builder.build().map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
        ObjectStoreProvider::Gcs { credentials } => {
            let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&spec.bucket);
            if !credentials.is_empty() {
                builder = builder.with_service_account_key(credentials);
            }
            let store = builder.build().map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
    }
}

/// 리포트 업로드 키
fn object_key(prefix: &str, report: &Report, now: DateTime<Utc>) -> Path {
    let scope = if report.namespace.is_empty() {
        "cluster"
    } else {
        report.namespace.as_str()
    };
    let name = format!("{}-{}.json", report.name, now.format("%Y%m%dT%H%M%S%.3fZ"));
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        Path::from(format!("{scope}/{name}"))
    } else {
        Path::from(format!("{prefix}/{scope}/{name}"))
    }
}
