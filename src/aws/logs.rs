use crate::parser::LogRecord;
use crate::pusher::{LogSink, SinkError};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::error::{DisplayErrorContext, SdkError};
use aws_sdk_cloudwatchlogs::operation::put_log_events::PutLogEventsError;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;

pub struct CloudWatchLogsSink {
    client: Client,
}

impl CloudWatchLogsSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn put_error(err: SdkError<PutLogEventsError>, group: &str, stream: &str) -> SinkError {
    match err.as_service_error() {
        Some(PutLogEventsError::InvalidSequenceTokenException(e)) => SinkError::InvalidSequenceToken {
            expected: e.expected_sequence_token().map(str::to_string),
        },
        Some(PutLogEventsError::DataAlreadyAcceptedException(e)) => SinkError::DataAlreadyAccepted {
            expected: e.expected_sequence_token().map(str::to_string),
        },
        Some(PutLogEventsError::ResourceNotFoundException(_)) => SinkError::StreamNotFound {
            group: group.to_string(),
            stream: stream.to_string(),
        },
        _ => SinkError::Service(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl LogSink for CloudWatchLogsSink {
    async fn create_group(&self, group: &str) -> Result<(), SinkError> {
        match self.client.create_log_group().log_group_name(group).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().map(|s| s.is_resource_already_exists_exception()) == Some(true) => {
                Err(SinkError::AlreadyExists)
            }
            Err(e) => Err(SinkError::Service(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let result = self
            .client
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().map(|s| s.is_resource_already_exists_exception()) == Some(true) => {
                Err(SinkError::AlreadyExists)
            }
            Err(e) => Err(SinkError::Service(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        records: &[LogRecord],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, SinkError> {
        let events = records
            .iter()
            .map(|record| {
                InputLogEvent::builder()
                    .timestamp(record.timestamp.timestamp_millis())
                    .message(&record.message)
                    .build()
                    .map_err(|e| SinkError::Service(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .client
            .put_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .set_log_events(Some(events))
            .set_sequence_token(sequence_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| put_error(e, group, stream))?;

        Ok(response.next_sequence_token)
    }

    async fn sequence_token(&self, group: &str, stream: &str) -> Result<Option<String>, SinkError> {
        let response = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(stream)
            .send()
            .await
            .map_err(|e| SinkError::Service(DisplayErrorContext(&e).to_string()))?;

        response
            .log_streams
            .unwrap_or_default()
            .into_iter()
            .find(|candidate| candidate.log_stream_name.as_deref() == Some(stream))
            .map(|found| found.upload_sequence_token)
            .ok_or_else(|| SinkError::StreamNotFound {
                group: group.to_string(),
                stream: stream.to_string(),
            })
    }
}
