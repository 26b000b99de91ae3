use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{SourceError, SourceResult};
use crate::models::{DeviceId, Reading, SessionId, SourceKind, SubjectId, VitalSigns};

use super::{CaptureBackend, ReadingSource};

/// REST client for the clinic backend.
///
/// * `POST /api/measurement-sessions/` queues a capture for a device.
/// * `GET /api/patients/<id>/measurements/latest/` returns the newest
///   measurement or `null`.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CreatedSession {
    id: Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Deserialize)]
struct MeasurementRecord {
    id: Option<Value>,
    patient: Option<Value>,
    timestamp: DateTime<Utc>,
    blood_pressure: Option<String>,
    temperature: Option<f64>,
    spo2: Option<f64>,
    heart_rate: Option<f64>,
    source: SourceKind,
}

impl MeasurementRecord {
    fn into_reading(self, requested: &SubjectId) -> Reading {
        let subject_id = self
            .patient
            .as_ref()
            .map(|value| SubjectId::new(id_from_json(value)))
            .unwrap_or_else(|| requested.clone());

        let reading = Reading::new(
            subject_id,
            self.source,
            self.timestamp,
            VitalSigns {
                blood_pressure: self.blood_pressure,
                temperature: self.temperature,
                spo2: self.spo2,
                heart_rate: self.heart_rate,
            },
        );

        match self.id {
            Some(id) => reading.with_record_id(id_from_json(&id)),
            None => reading,
        }
    }
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// `{base}/api/patients/{id}/measurements/latest/`, with the id
    /// percent-encoded as a single path segment.
    fn latest_reading_url(&self, subject_id: &SubjectId) -> SourceResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| SourceError::Network(format!("invalid base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::Network(format!("base url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "api",
                "patients",
                subject_id.as_str(),
                "measurements",
                "latest",
                "",
            ]);
        Ok(url)
    }
}

#[async_trait]
impl CaptureBackend for HttpBackend {
    async fn create_capture_session(
        &self,
        subject_id: &SubjectId,
        device_id: &DeviceId,
    ) -> SourceResult<SessionId> {
        let body = json!({
            "patient": id_to_json(subject_id.as_str()),
            "device": id_to_json(device_id.as_str()),
        });

        let resp = self
            .client
            .post(self.api_url("measurement-sessions/"))
            .json(&body)
            .send()
            .await
            .map_err(|err| SourceError::Network(format!("session request failed: {err}")))?;

        let status = resp.status();
        if status.is_success() {
            let created: CreatedSession = resp.json().await.map_err(|err| {
                SourceError::Network(format!("malformed session response: {err}"))
            })?;
            return Ok(SessionId::new(id_from_json(&created.id)));
        }

        let message = error_message(status, resp).await;
        if status.is_client_error() {
            Err(SourceError::DeviceUnavailable(message))
        } else {
            Err(SourceError::Network(message))
        }
    }
}

#[async_trait]
impl ReadingSource for HttpBackend {
    async fn latest_reading(&self, subject_id: &SubjectId) -> SourceResult<Option<Reading>> {
        let url = self.latest_reading_url(subject_id)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SourceError::Network(format!("latest reading request failed: {err}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::SubjectNotFound(subject_id.clone()));
        }
        if !status.is_success() {
            return Err(SourceError::Network(error_message(status, resp).await));
        }

        let record: Option<MeasurementRecord> = resp
            .json()
            .await
            .map_err(|err| SourceError::Network(format!("malformed measurement: {err}")))?;

        debug!(
            "latest reading for subject {}: {}",
            subject_id,
            if record.is_some() { "present" } else { "none" }
        );

        Ok(record.map(|record| record.into_reading(subject_id)))
    }
}

async fn error_message(status: StatusCode, resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error)
        .unwrap_or(text);

    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}

/// The backend keys rows by integer; anything numeric goes over the wire as a
/// JSON number.
fn id_to_json(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(number) => json!(number),
        Err(_) => json!(id),
    }
}

fn id_from_json(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn creates_session_with_numeric_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/measurement-sessions/"))
            .and(body_json(json!({ "patient": 42, "device": 1 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 17,
                "patient": 42,
                "device": 1,
                "status": "pending",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&format!("{}/", server.uri()));
        let session_id = backend
            .create_capture_session(&SubjectId::from(42), &DeviceId::from(1))
            .await
            .unwrap();

        assert_eq!(session_id, SessionId::from("17"));
    }

    #[tokio::test]
    async fn missing_device_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/measurement-sessions/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "error": "patient and device are required" })),
            )
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend
            .create_capture_session(&SubjectId::from(42), &DeviceId::from(9))
            .await
            .unwrap_err();

        match err {
            SourceError::DeviceUnavailable(message) => {
                assert!(message.contains("patient and device are required"), "{message}")
            }
            other => panic!("expected DeviceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_on_create_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/measurement-sessions/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend
            .create_capture_session(&SubjectId::from(1), &DeviceId::from(1))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn decodes_latest_measurement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients/42/measurements/latest/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 301,
                "patient": 42,
                "timestamp": "2026-03-01T09:15:12.123456Z",
                "blood_pressure": "120/80",
                "temperature": 36.8,
                "spo2": 98.0,
                "heart_rate": 72.0,
                "source": "device",
            })))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let reading = backend
            .latest_reading(&SubjectId::from(42))
            .await
            .unwrap()
            .expect("reading present");

        assert_eq!(reading.record_id.as_deref(), Some("301"));
        assert_eq!(reading.subject_id, SubjectId::from(42));
        assert_eq!(reading.source, SourceKind::Device);
        assert_eq!(reading.values.blood_pressure.as_deref(), Some("120/80"));
        assert_eq!(
            reading.captured_at,
            DateTime::parse_from_rfc3339("2026-03-01T09:15:12.123456Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[tokio::test]
    async fn null_body_means_no_reading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients/7/measurements/latest/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        assert_eq!(backend.latest_reading(&SubjectId::from(7)).await, Ok(None));
    }

    #[tokio::test]
    async fn subject_id_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients/ward%2F3%3Fbed=1/measurements/latest/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&format!("{}/", server.uri()));
        assert_eq!(
            backend.latest_reading(&SubjectId::from("ward/3?bed=1")).await,
            Ok(None)
        );
    }

    #[tokio::test]
    async fn unknown_patient_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients/5/measurements/latest/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend.latest_reading(&SubjectId::from(5)).await.unwrap_err();
        assert_eq!(err, SourceError::SubjectNotFound(SubjectId::from(5)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn garbage_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/patients/5/measurements/latest/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend.latest_reading(&SubjectId::from(5)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
