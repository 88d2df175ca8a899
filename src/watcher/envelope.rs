use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("message body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object key '{0}' is not valid percent-encoded UTF-8")]
    Key(String),
}

/// A new log object referenced by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
    #[serde(default)]
    size: u64,
}

/// Extract the objects referenced by a queue message body.
///
/// The body is an S3 event notification, either delivered directly or
/// wrapped in an SNS notification whose `Message` holds the event as a
/// string. Events without `Records` (such as `s3:TestEvent`) reference no
/// objects.
pub fn parse_envelope(body: &str) -> Result<Vec<ObjectRef>, EnvelopeError> {
    let mut value: Value = serde_json::from_str(body)?;

    if value.get("Records").is_none() {
        if let Some(Value::String(inner)) = value.get("Message") {
            value = serde_json::from_str(inner)?;
        }
    }

    let event: S3Event = serde_json::from_value(value)?;
    event
        .records
        .into_iter()
        .map(|record| {
            Ok(ObjectRef {
                bucket: record.s3.bucket.name,
                key: decode_key(&record.s3.object.key)?,
                size: record.s3.object.size,
            })
        })
        .collect()
}

/// Object keys in event notifications are form-encoded.
fn decode_key(key: &str) -> Result<String, EnvelopeError> {
    let plus_decoded = key.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| EnvelopeError::Key(key.to_string()))
}
