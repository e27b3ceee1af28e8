use crate::{Error, ObjectStore as ObjectStoreTrait, Result};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{error::SdkError, primitives::ByteStream};

const HTTP_PRECONDITION_FAILED: u16 = 412;
const HTTP_CONFLICT: u16 = 409;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS provider chain.
    ///
    /// `endpoint` targets an S3-compatible service (e.g. MinIO) with path-style addressing.
    pub async fn from_env(region: &str, endpoint: Option<&str>) -> anyhow::Result<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectStoreTrait for S3ObjectStore {
    async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("s3 PutObject bucket={bucket} key={key}"))
            .map_err(Error::Upload)?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<bool> {
        let res = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .if_none_match("*")
            .body(ByteStream::from(bytes))
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err))
                if err.raw().status().as_u16() == HTTP_PRECONDITION_FAILED =>
            {
                Ok(false)
            }
            Err(err) => Err(Error::Upload(anyhow::Error::from(err).context(format!(
                "s3 conditional PutObject bucket={bucket} key={key}"
            )))),
        }
    }

    async fn replace_if_unchanged(
        &self,
        bucket: &str,
        key: &str,
        expected: &[u8],
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<bool> {
        let current = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(resp) => resp,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Ok(false)
            }
            Err(err) => {
                return Err(Error::Storage(anyhow::Error::from(err).context(format!(
                    "s3 GetObject bucket={bucket} key={key}"
                ))))
            }
        };
        let Some(etag) = current.e_tag().map(str::to_string) else {
            return Err(Error::Storage(anyhow::anyhow!(
                "s3 GetObject bucket={bucket} key={key} returned no ETag"
            )));
        };
        let body = current
            .body
            .collect()
            .await
            .context("s3 GetObject body collect")
            .map_err(Error::Storage)?
            .into_bytes();
        if body.as_ref() != expected {
            return Ok(false);
        }

        // If-Match pins the write to the exact version compared above.
        let res = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .if_match(etag)
            .body(ByteStream::from(bytes))
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err))
                if matches!(
                    err.raw().status().as_u16(),
                    HTTP_PRECONDITION_FAILED | HTTP_CONFLICT
                ) =>
            {
                Ok(false)
            }
            Err(err) => Err(Error::Upload(anyhow::Error::from(err).context(format!(
                "s3 If-Match PutObject bucket={bucket} key={key}"
            )))),
        }
    }

    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 GetObject bucket={bucket} key={key}"))
            .map_err(Error::Storage)?;

        let bytes = resp
            .body
            .collect()
            .await
            .context("s3 GetObject body collect")
            .map_err(Error::Storage)?
            .into_bytes()
            .to_vec();
        Ok(bytes)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 DeleteObject bucket={bucket} key={key}"))
            .map_err(Error::Storage)?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .with_context(|| format!("s3 ListObjectsV2 bucket={bucket} prefix={prefix}"))
                .map_err(Error::Storage)?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn scan_uri(&self, bucket: &str, key: &str) -> String {
        format!("s3://{bucket}/{key}")
    }
}
