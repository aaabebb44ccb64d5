//! HTTP client for the CMMS REST API.
//!
//! Authenticates once with `POST {base}/auth/login` and reuses the bearer
//! token for the client's lifetime. A `401` answer clears the token and the
//! request is retried once with a fresh login.
//!
//! Asset references are CMMS asset codes; they are resolved to numeric asset
//! ids with `GET {base}/assets?codes=...` before a work order or activity
//! links to them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode, multipart};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use assetguard_shared::{
    ActivityId, ActivityRequest, AssetGuardError, CmmsConfig, ImagePayload, Priority, Result,
    WorkOrderId, WorkOrderKind, WorkOrderRequest, WorkOrderService, resolve_secret,
};

use crate::schedule::{activity_duration, due_date, format_timestamp, truncate_title};

/// User-Agent string for CMMS requests.
const USER_AGENT: &str = concat!("AssetGuard/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "cmms";

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkOrderBody<'a> {
    title: String,
    description: &'a str,
    status: &'static str,
    priority: Priority,
    #[serde(rename = "type")]
    kind: WorkOrderKind,
    due_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    asset_ids: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityBody<'a> {
    work_order_id: Value,
    description: &'a str,
    planned_start_date: String,
    planned_end_date: String,
    status: &'static str,
    duration_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    problem_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_id: Option<Value>,
}

/// Numeric ids travel as JSON numbers, anything else as a string.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

/// Pull `data.id` out of a CMMS response body.
fn response_id(body: &Value) -> Result<String> {
    match body.pointer("/data/id") {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(AssetGuardError::collaborator(
            SERVICE,
            format!("response carries no data.id: {body}"),
        )),
    }
}

/// Asset ids from an assets listing, either a bare array or `{"data": [...]}`.
fn asset_ids(body: &Value) -> Result<Vec<Value>> {
    let assets = match body {
        Value::Array(assets) => assets,
        Value::Object(_) => body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AssetGuardError::collaborator(SERVICE, format!("unexpected assets response: {body}"))
            })?,
        _ => {
            return Err(AssetGuardError::collaborator(
                SERVICE,
                format!("unexpected assets response: {body}"),
            ));
        }
    };
    Ok(assets
        .iter()
        .filter_map(|asset| asset.get("id"))
        .filter(|id| !id.is_null())
        .cloned()
        .collect())
}

// ---------------------------------------------------------------------------
// CmmsClient
// ---------------------------------------------------------------------------

/// Live [`WorkOrderService`] backed by the CMMS REST API.
pub struct CmmsClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    days_until_due: i64,
    token: Mutex<Option<String>>,
}

impl CmmsClient {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        days_until_due: i64,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AssetGuardError::config(format!("invalid CMMS base URL '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AssetGuardError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            days_until_due,
            token: Mutex::new(None),
        })
    }

    /// Build a client from the `[cmms]` section; credentials come from the
    /// environment variables it names.
    pub fn from_config(config: &CmmsConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            resolve_secret(&config.username_env)?,
            resolve_secret(&config.password_env)?,
            Duration::from_secs(config.timeout_secs),
            config.days_until_due,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn login(&self) -> Result<String> {
        let url = self.endpoint("auth/login");
        let response = self
            .client
            .post(&url)
            .json(&LoginBody {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| AssetGuardError::Network(format!("{url}: {e}")))?;

        let body = read_json(&url, response).await?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| AssetGuardError::collaborator(SERVICE, "login response carries no token"))?;
        debug!("CMMS login succeeded");
        Ok(token.to_string())
    }

    /// Cached token, logging in on first use.
    async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Send an authorized request built by `build`, retrying once on `401`.
    async fn send<F>(&self, url: &str, build: F) -> Result<Value>
    where
        F: Fn(&Client) -> Result<RequestBuilder>,
    {
        for attempt in 0..2 {
            let token = self.token().await?;
            let response = build(&self.client)?
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| AssetGuardError::Network(format!("{url}: {e}")))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                debug!(%url, "CMMS token rejected, logging in again");
                *self.token.lock().await = None;
                continue;
            }
            return read_json(url, response).await;
        }
        Err(AssetGuardError::collaborator(SERVICE, format!("{url}: unauthorized")))
    }

    /// Resolve asset codes to CMMS asset ids.
    ///
    /// Codes the CMMS does not know are dropped with a warning, so the
    /// result can be shorter than `codes`.
    pub async fn resolve_asset_ids(&self, codes: &[String]) -> Result<Vec<Value>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let joined = codes.join(",");
        let url = self.endpoint("assets");
        let response = self
            .send(&url, |client| Ok(client.get(&url).query(&[("codes", joined.as_str())])))
            .await?;
        let ids = asset_ids(&response)?;
        if ids.len() < codes.len() {
            warn!(codes = %joined, resolved = ids.len(), "some asset codes are unknown to the CMMS");
        }
        Ok(ids)
    }
}

async fn read_json(url: &str, response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AssetGuardError::collaborator(
            SERVICE,
            format!("{url}: HTTP {status}: {text}"),
        ));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| AssetGuardError::collaborator(SERVICE, format!("{url}: invalid JSON: {e}")))
}

#[async_trait]
impl WorkOrderService for CmmsClient {
    #[instrument(skip_all, fields(kind = request.kind.as_str(), priority = request.priority.as_str()))]
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<WorkOrderId> {
        let asset_ids = self.resolve_asset_ids(&request.asset_refs).await?;
        let body = WorkOrderBody {
            title: truncate_title(&request.title),
            description: &request.summary,
            status: "NEW",
            priority: request.priority,
            kind: request.kind,
            due_date: format_timestamp(due_date(Utc::now(), request.priority, self.days_until_due)),
            notes: request.notes.as_deref(),
            asset_ids,
        };

        let url = self.endpoint("work-orders");
        let response = self.send(&url, |client| Ok(client.post(&url).json(&body))).await?;
        let id = WorkOrderId(response_id(&response)?);
        info!(work_order_id = %id, "CMMS work order created");
        Ok(id)
    }

    #[instrument(skip_all, fields(work_order_id = %work_order_id))]
    async fn create_activity(
        &self,
        work_order_id: &WorkOrderId,
        request: &ActivityRequest,
    ) -> Result<ActivityId> {
        let asset_id = match request.asset_ref.as_ref() {
            Some(code) => self
                .resolve_asset_ids(std::slice::from_ref(code))
                .await?
                .into_iter()
                .next(),
            None => None,
        };
        let duration = activity_duration(request.priority, request.duration_minutes);
        let start = Utc::now();
        let body = ActivityBody {
            work_order_id: id_value(&work_order_id.0),
            description: &request.description,
            planned_start_date: format_timestamp(start),
            planned_end_date: format_timestamp(start + chrono::Duration::minutes(i64::from(duration))),
            status: "PENDING",
            duration_minutes: duration,
            notes: request.notes.as_deref(),
            problem_type: &request.problem_type,
            asset_id,
        };

        let url = self.endpoint("work-activities");
        let response = self.send(&url, |client| Ok(client.post(&url).json(&body))).await?;
        let id = ActivityId(response_id(&response)?);
        debug!(activity_id = %id, duration, "CMMS activity created");
        Ok(id)
    }

    #[instrument(skip_all, fields(work_order_id = %work_order_id, name = %image.name))]
    async fn upload_annotated_image(
        &self,
        work_order_id: &WorkOrderId,
        image: &ImagePayload,
    ) -> Result<()> {
        let url = self.endpoint("attachments/upload");
        let content_type = image.content_type();
        // Multipart forms are single-use, so each attempt builds its own.
        let response = self
            .send(&url, |client| {
                let file = multipart::Part::bytes(image.bytes.clone())
                    .file_name(image.name.clone())
                    .mime_str(content_type)
                    .map_err(|e| AssetGuardError::Network(format!("{url}: {e}")))?;
                let form = multipart::Form::new()
                    .text("sourceObjectType", "WORK_ORDER")
                    .text("sourceObjectId", work_order_id.0.clone())
                    .text("name", image.name.clone())
                    .text("type", content_type)
                    .part("file", file);
                Ok(client.post(&url).multipart(form))
            })
            .await?;

        debug!(response = %response, "CMMS attachment uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_partial_json(serde_json::json!({"username": "ai"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "jwt-1"})))
            .expect(1)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> CmmsClient {
        CmmsClient::new(
            &format!("{}/api", server.uri()),
            "ai",
            "secret",
            Duration::from_secs(5),
            7,
        )
        .expect("client")
    }

    fn work_order(priority: Priority) -> WorkOrderRequest {
        WorkOrderRequest {
            title: "Repair 2 defect(s) on ElectricityDistribution".into(),
            summary: "Detections: 2".into(),
            notes: None,
            asset_refs: vec![],
            priority,
            kind: WorkOrderKind::Maintenance,
        }
    }

    #[tokio::test]
    async fn creates_work_order_with_cached_token() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/work-orders"))
            .and(header("authorization", "Bearer jwt-1"))
            .and(body_partial_json(serde_json::json!({
                "status": "NEW",
                "priority": "HIGH",
                "type": "MAINTENANCE"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 17}})))
            .expect(2)
            .mount(&server)
            .await;

        let cmms = client(&server);
        let first = cmms.create_work_order(&work_order(Priority::High)).await.expect("create");
        let second = cmms.create_work_order(&work_order(Priority::High)).await.expect("create");
        assert_eq!(first, WorkOrderId("17".into()));
        assert_eq!(second.0, "17");
    }

    #[tokio::test]
    async fn activity_duration_is_adjusted_by_priority() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/work-activities"))
            .and(body_partial_json(serde_json::json!({
                "workOrderId": 17,
                "status": "PENDING",
                "durationMinutes": 180,
                "problemType": "ELECTRICAL"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": "act-9"}})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ActivityRequest {
            description: "Repair corrosion on ElectricityDistribution".into(),
            notes: None,
            priority: Priority::Critical,
            problem_type: "ELECTRICAL".into(),
            asset_ref: None,
            duration_minutes: 120,
        };
        let id = client(&server)
            .create_activity(&WorkOrderId("17".into()), &request)
            .await
            .expect("activity");
        assert_eq!(id, ActivityId("act-9".into()));
    }

    fn activity(asset_ref: Option<&str>) -> ActivityRequest {
        ActivityRequest {
            description: "Inspect PL-1 (PowerLine) ahead of Storm".into(),
            notes: None,
            priority: Priority::High,
            problem_type: "SAFETY".into(),
            asset_ref: asset_ref.map(str::to_string),
            duration_minutes: 120,
        }
    }

    #[tokio::test]
    async fn work_order_links_resolved_asset_ids() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/assets"))
            .and(query_param("codes", "A002,A005"))
            .and(header("authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 2, "code": "A002"},
                {"id": 5, "code": "A005"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-orders"))
            .and(body_partial_json(serde_json::json!({"assetIds": [2, 5]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 18}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = work_order(Priority::Critical);
        request.asset_refs = vec!["A002".into(), "A005".into()];
        let id = client(&server).create_work_order(&request).await.expect("create");
        assert_eq!(id.0, "18");
    }

    #[tokio::test]
    async fn activity_carries_resolved_asset_id() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/assets"))
            .and(query_param("codes", "A002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": 2, "code": "A002"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-activities"))
            .and(body_partial_json(serde_json::json!({"workOrderId": 17, "assetId": 2})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 40}})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .create_activity(&WorkOrderId("17".into()), &activity(Some("A002")))
            .await
            .expect("activity");
        assert_eq!(id.0, "40");
    }

    #[tokio::test]
    async fn unknown_asset_code_leaves_activity_unlinked() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-activities"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 41}})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .create_activity(&WorkOrderId("17".into()), &activity(Some("NOPE-1")))
            .await
            .expect("activity");

        let requests = server.received_requests().await.expect("recorded requests");
        let created = requests
            .iter()
            .find(|r| r.url.path() == "/api/work-activities")
            .expect("activity request");
        let body: Value = serde_json::from_slice(&created.body).expect("json body");
        assert!(body.get("assetId").is_none());
    }

    #[tokio::test]
    async fn activity_without_asset_skips_the_lookup() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/assets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-activities"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 42}})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .create_activity(&WorkOrderId("17".into()), &activity(None))
            .await
            .expect("activity");
    }

    #[tokio::test]
    async fn uploads_annotated_image_as_multipart() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/attachments/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"id": 3}})))
            .expect(1)
            .mount(&server)
            .await;

        let image = ImagePayload::new("annotated_pole.png", vec![0x89, b'P', b'N', b'G']);
        client(&server)
            .upload_annotated_image(&WorkOrderId("17".into()), &image)
            .await
            .expect("upload");

        let requests = server.received_requests().await.expect("recorded requests");
        let upload = requests
            .iter()
            .find(|r| r.url.path() == "/api/attachments/upload")
            .expect("upload request");
        let body = String::from_utf8_lossy(&upload.body);
        assert!(body.contains("WORK_ORDER"));
        assert!(body.contains("annotated_pole.png"));
        assert!(body.contains("image/png"));
    }

    #[tokio::test]
    async fn rejected_token_triggers_one_relogin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "jwt-1"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-orders"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/work-orders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"id": 5}})))
            .mount(&server)
            .await;

        let id = client(&server)
            .create_work_order(&work_order(Priority::Low))
            .await
            .expect("create after relogin");
        assert_eq!(id.0, "5");
    }

    #[tokio::test]
    async fn server_errors_surface_as_collaborator_errors() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/work-orders"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_work_order(&work_order(Priority::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetGuardError::Collaborator { .. }));
        assert!(err.to_string().contains("database down"));
    }

    #[tokio::test]
    async fn failed_login_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_work_order(&work_order(Priority::Medium))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 401"));
    }

    #[test]
    fn ids_keep_their_json_type() {
        assert_eq!(id_value("17"), serde_json::json!(17));
        assert_eq!(id_value("WO-17"), serde_json::json!("WO-17"));
        assert!(response_id(&serde_json::json!({"data": {}})).is_err());
    }

    #[test]
    fn asset_listing_shapes() {
        let bare = serde_json::json!([{"id": 2}, {"code": "A009"}, {"id": null}]);
        assert_eq!(asset_ids(&bare).expect("bare"), vec![serde_json::json!(2)]);

        let wrapped = serde_json::json!({"data": [{"id": "7"}]});
        assert_eq!(asset_ids(&wrapped).expect("wrapped"), vec![serde_json::json!("7")]);

        assert!(asset_ids(&serde_json::json!({"items": []})).is_err());
        assert!(asset_ids(&serde_json::json!("assets")).is_err());
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = CmmsClient::new("not a url", "u", "p", Duration::from_secs(1), 7)
            .err()
            .expect("error");
        assert!(matches!(err, AssetGuardError::Config { .. }));
    }
}
