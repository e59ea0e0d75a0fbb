//! S3 event notification payloads
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! notification is ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event contains no records")]
    Empty,

    #[error("Object key is not valid percent-encoded UTF-8: {0}")]
    InvalidKey(String),
}

impl From<EventError> for AppError {
    fn from(err: EventError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// URL-encoded, with spaces as `+`
    pub key: String,
}

/// A decoded bucket and key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Decode an object key as it appears in a notification
pub fn decode_key(raw: &str) -> Result<String, EventError> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|key| key.into_owned())
        .map_err(|_| EventError::InvalidKey(raw.to_string()))
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).replace("%20", "+"))
        .collect::<Vec<_>>()
        .join("/")
}

impl S3Event {
    /// Every object the event names, keys decoded, in delivery order
    pub fn objects(&self) -> Result<Vec<ObjectRef>, EventError> {
        if self.records.is_empty() {
            return Err(EventError::Empty);
        }

        self.records
            .iter()
            .map(|record| {
                Ok(ObjectRef {
                    bucket: record.s3.bucket.name.clone(),
                    key: decode_key(&record.s3.object.key)?,
                })
            })
            .collect()
    }

    /// A single-record event naming `bucket`/`key`, encoded the way S3 does
    pub fn for_object(bucket: &str, key: &str) -> Self {
        Self {
            records: vec![S3EventRecord {
                event_name: None,
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: bucket.to_string(),
                    },
                    object: S3Object {
                        key: encode_key(key),
                    },
                },
            }],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_key() {
        assert_eq!(decode_key("incoming/release+1.zip").unwrap(), "incoming/release 1.zip");
        assert_eq!(decode_key("incoming/r%C3%A9sum%C3%A9.zip").unwrap(), "incoming/résumé.zip");
        assert_eq!(decode_key("incoming/a%2Bb.zip").unwrap(), "incoming/a+b.zip");
        assert!(decode_key("incoming/%FF%FE.zip").is_err());
    }

    #[test]
    fn test_parse_notification() {
        let event: S3Event = serde_json::from_value(json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "firmware", "arn": "arn:aws:s3:::firmware" },
                    "object": { "key": "incoming/release+v2.zip", "size": 1024, "eTag": "abc" }
                }
            }]
        }))
        .unwrap();

        let objects = event.objects().unwrap();
        assert_eq!(
            objects,
            vec![ObjectRef {
                bucket: "firmware".into(),
                key: "incoming/release v2.zip".into()
            }]
        );
        assert_eq!(event.records[0].event_name.as_deref(), Some("ObjectCreated:Put"));
    }

    #[test]
    fn test_empty_event_rejected() {
        let event: S3Event = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(event.objects(), Err(EventError::Empty)));
    }

    #[test]
    fn test_for_object_decodes_back() {
        let event = S3Event::for_object("fw", "incoming/team a/release+1.zip");
        assert_eq!(event.records[0].s3.object.key, "incoming/team+a/release%2B1.zip");
        assert_eq!(event.objects().unwrap()[0].key, "incoming/team a/release+1.zip");
    }
}
