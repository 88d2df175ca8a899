//! In-memory implementations of the capability traits shared by the
//! integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use edgeship::discovery::{
    BucketNotifications, DiscoveryError, EndpointCatalog, EndpointPage, EndpointRef,
};
use edgeship::parser::LogRecord;
use edgeship::pusher::{LogSink, SinkError};
use edgeship::watcher::{ObjectError, ObjectStore, QueueArn, QueueClient, QueueError, QueueMessage};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Ten lines: two headers, seven well-formed lines and one corrupted timestamp.
pub const SAMPLE_LOG: &str = "#Version: 1.0
#Fields: date time x-edge-location sc-bytes c-ip cs-method cs(Host) cs-uri-stem sc-status
2020-06-18\t03:38:13\tSYD4-C1\t4522\t203.0.113.10\tGET\td111111abcdef8.cloudfront.net\t/index.html\t200
2020-06-18\t03:38:14\tSYD4-C1\t1021\t203.0.113.10\tGET\td111111abcdef8.cloudfront.net\t/app.css\t200
2020-06-18\t03:38:12\tSYD4-C1\t8810\t203.0.113.11\tGET\td111111abcdef8.cloudfront.net\t/app.js\t200
2020-06-18\tXX:38:15\tSYD4-C1\t312\t203.0.113.12\tGET\td111111abcdef8.cloudfront.net\t/favicon.ico\t404
2020-06-18\t03:38:16\tSYD4-C1\t4522\t203.0.113.13\tGET\td111111abcdef8.cloudfront.net\t/index.html\t200
2020-06-18\t03:38:16\tSYD4-C1\t0\t203.0.113.13\tHEAD\td111111abcdef8.cloudfront.net\t/index.html\t304
2020-06-18\t03:38:17\tMEL50-C2\t77\t198.51.100.7\tGET\td111111abcdef8.cloudfront.net\t/robots.txt\t200
2020-06-18\t03:38:18\tMEL50-C2\t5120\t198.51.100.7\tPOST\td111111abcdef8.cloudfront.net\t/api/submit\t201
";

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

/// An S3 object-created notification body for one object.
pub fn s3_event(bucket: &str, key: &str) -> String {
    serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": {"name": bucket},
                "object": {"key": key, "size": 0}
            }
        }]
    })
    .to_string()
}

pub fn message(id: &str, body: String) -> QueueMessage {
    QueueMessage {
        id: id.to_string(),
        receipt_handle: format!("receipt-{}", id),
        body,
    }
}

pub fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ===== Discovery =====

#[derive(Default)]
pub struct FakeCatalog {
    /// Listing pages, addressed by markers `page-1`, `page-2`, ...
    pub pages: Vec<Vec<EndpointRef>>,
    pub tags: HashMap<String, BTreeMap<String, String>>,
    /// Endpoint ids whose tag lookup fails.
    pub broken_tags: HashSet<String>,
    /// Configured log bucket per endpoint id.
    pub log_buckets: HashMap<String, String>,
    pub list_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn add_endpoint(&mut self, page: usize, id: &str, endpoint_tags: BTreeMap<String, String>) {
        while self.pages.len() <= page {
            self.pages.push(Vec::new());
        }
        self.pages[page].push(EndpointRef {
            id: id.to_string(),
            arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
        });
        self.tags.insert(id.to_string(), endpoint_tags);
    }
}

#[async_trait]
impl EndpointCatalog for FakeCatalog {
    async fn list_endpoints(&self, marker: Option<&str>) -> Result<EndpointPage, DiscoveryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let index = match marker {
            None => 0,
            Some(marker) => marker
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| DiscoveryError::List(format!("bad marker {}", marker)))?,
        };

        let endpoints = self.pages.get(index).cloned().unwrap_or_default();
        let next_marker = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(EndpointPage {
            endpoints,
            next_marker,
        })
    }

    async fn list_tags(&self, endpoint: &EndpointRef) -> Result<BTreeMap<String, String>, DiscoveryError> {
        if self.broken_tags.contains(&endpoint.id) {
            return Err(DiscoveryError::Tags {
                resource: endpoint.arn.clone(),
                message: "AccessDenied".to_string(),
            });
        }
        Ok(self.tags.get(&endpoint.id).cloned().unwrap_or_default())
    }

    async fn log_bucket(&self, endpoint_id: &str) -> Result<String, DiscoveryError> {
        Ok(self.log_buckets.get(endpoint_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    pub queues: HashMap<String, Vec<String>>,
}

#[async_trait]
impl BucketNotifications for FakeNotifications {
    async fn notification_queues(&self, bucket: &str) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.queues.get(bucket).cloned().unwrap_or_default())
    }
}

// ===== Log sink =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Append {
    pub group: String,
    pub stream: String,
    pub messages: Vec<String>,
    pub token: Option<String>,
}

#[derive(Default)]
struct SinkState {
    groups: HashSet<String>,
    streams: HashSet<(String, String)>,
    tokens: HashMap<(String, String), String>,
    appends: Vec<Append>,
    /// Appends still to reject with a stale token, regardless of token.
    stale_rejections: usize,
    /// Appends still to answer with an already-accepted conflict.
    accepted_rejections: usize,
    issued: usize,
}

/// A log store that tracks an upload token per stream and rejects appends
/// carrying the wrong one.
#[derive(Default)]
pub struct FakeSink {
    state: Mutex<SinkState>,
    pub put_calls: AtomicUsize,
    pub create_group_calls: AtomicUsize,
    pub create_stream_calls: AtomicUsize,
}

impl FakeSink {
    /// Reject the next `count` appends as stale.
    pub fn reject_next(&self, count: usize) {
        self.state.lock().unwrap().stale_rejections = count;
    }

    /// Answer the next `count` appends as already accepted, carrying the
    /// stream's current token.
    pub fn already_accepted_next(&self, count: usize) {
        self.state.lock().unwrap().accepted_rejections = count;
    }

    /// Move the stream's token on as if another writer had appended.
    pub fn advance_token(&self, group: &str, stream: &str) {
        let mut state = self.state.lock().unwrap();
        state.issued += 1;
        let token = format!("seq-{}", state.issued);
        state.tokens.insert((group.to_string(), stream.to_string()), token);
    }

    pub fn appends(&self) -> Vec<Append> {
        self.state.lock().unwrap().appends.clone()
    }

    pub fn messages(&self, group: &str, stream: &str) -> Vec<String> {
        self.appends()
            .into_iter()
            .filter(|a| a.group == group && a.stream == stream)
            .flat_map(|a| a.messages)
            .collect()
    }

    pub fn has_stream(&self, group: &str, stream: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .streams
            .contains(&(group.to_string(), stream.to_string()))
    }
}

#[async_trait]
impl LogSink for FakeSink {
    async fn create_group(&self, group: &str) -> Result<(), SinkError> {
        self.create_group_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.groups.insert(group.to_string()) {
            Ok(())
        } else {
            Err(SinkError::AlreadyExists)
        }
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        self.create_stream_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if !state.groups.contains(group) {
            return Err(SinkError::Service(format!("log group {} does not exist", group)));
        }
        if state.streams.insert((group.to_string(), stream.to_string())) {
            Ok(())
        } else {
            Err(SinkError::AlreadyExists)
        }
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        records: &[LogRecord],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, SinkError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let key = (group.to_string(), stream.to_string());

        if !state.streams.contains(&key) {
            return Err(SinkError::StreamNotFound {
                group: group.to_string(),
                stream: stream.to_string(),
            });
        }

        let expected = state.tokens.get(&key).cloned();
        if state.stale_rejections > 0 {
            state.stale_rejections -= 1;
            return Err(SinkError::InvalidSequenceToken { expected });
        }
        if state.accepted_rejections > 0 {
            state.accepted_rejections -= 1;
            return Err(SinkError::DataAlreadyAccepted { expected });
        }
        if expected.as_deref() != sequence_token {
            return Err(SinkError::InvalidSequenceToken { expected });
        }

        state.appends.push(Append {
            group: group.to_string(),
            stream: stream.to_string(),
            messages: records.iter().map(|r| r.message.clone()).collect(),
            token: sequence_token.map(str::to_string),
        });
        state.issued += 1;
        let next = format!("seq-{}", state.issued);
        state.tokens.insert(key, next.clone());
        Ok(Some(next))
    }

    async fn sequence_token(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError> {
        let state = self.state.lock().unwrap();
        let key = (group.to_string(), stream.to_string());
        if !state.streams.contains(&key) {
            return Err(SinkError::StreamNotFound {
                group: group.to_string(),
                stream: stream.to_string(),
            });
        }
        Ok(state.tokens.get(&key).cloned())
    }
}

// ===== Queue and objects =====

pub enum Poll {
    Messages(Vec<QueueMessage>),
    Error(&'static str),
}

/// A queue replaying scripted poll results, then returning empty polls.
#[derive(Default)]
pub struct FakeQueue {
    polls: Mutex<VecDeque<Poll>>,
    deleted: Mutex<Vec<String>>,
    pub resolve_fails: bool,
    pub receive_calls: AtomicUsize,
}

impl FakeQueue {
    pub fn with_polls(polls: Vec<Poll>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    /// A queue whose address lookup always fails.
    pub fn unresolvable() -> Self {
        Self {
            resolve_fails: true,
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn resolve_queue_url(&self, queue: &QueueArn) -> Result<String, QueueError> {
        if self.resolve_fails {
            return Err(QueueError::Resolve {
                queue: queue.to_string(),
                message: "AWS.SimpleQueueService.NonExistentQueue".to_string(),
            });
        }
        Ok(format!(
            "https://sqs.{}.amazonaws.com/{}/{}",
            queue.region, queue.account_id, queue.name
        ))
    }

    async fn receive(
        &self,
        _queue_url: &str,
        _max_messages: i32,
        _wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(Poll::Messages(messages)) => Ok(messages),
            Some(Poll::Error(message)) => Err(QueueError::Receive(message.to_string())),
            None => {
                // Stand-in for a long poll that comes back empty.
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.deleted.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub objects: HashMap<(String, String), Vec<u8>>,
    /// Time each download takes.
    pub latency: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn insert(&mut self, bucket: &str, key: &str, content: Vec<u8>) {
        self.objects.insert((bucket.to_string(), key.to_string()), content);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ObjectError::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "NoSuchKey".to_string(),
            })
    }
}
