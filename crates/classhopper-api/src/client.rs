//! HTTP client for the iClass endpoints.

use crate::models::ScheduleResponse;
use crate::{ApiError, ApiResult, Course, LoginSession, ScheduleOutcome, SignInOutcome, SignInReceipt};
use chrono::{NaiveDate, Utc};
use classhopper_core::{ApiConfig, Config};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use token_auth::TokenManager;
use tracing::{debug, info, warn};

/// Business API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    tokens: Arc<TokenManager>,
    http: Client,
}

impl ApiClient {
    /// Build a client with its own connection pool, using the configured
    /// timeouts and TLS mode.
    pub fn new(config: &Config, tokens: Arc<TokenManager>) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.api.request_timeout)
            .connect_timeout(config.api.connect_timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;

        Ok(Self::with_http(config.api.clone(), tokens, http))
    }

    pub fn with_http(config: ApiConfig, tokens: Arc<TokenManager>, http: Client) -> Self {
        Self {
            config,
            tokens,
            http,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Log a student in by id.
    pub async fn login(&self, student_id: &str) -> ApiResult<LoginSession> {
        debug!(student_id, "Logging in");

        let session = self
            .tokens
            .with_valid_token(|credential| async move {
                let response = self
                    .http
                    .get(&self.config.login_url)
                    .query(&[
                        ("phone", student_id),
                        ("password", ""),
                        ("userLevel", "1"),
                        ("verificationType", "2"),
                        ("verificationUrl", ""),
                    ])
                    // This endpoint takes the raw token, without a scheme.
                    .header(AUTHORIZATION, credential.token.as_str())
                    .send()
                    .await?;

                let body = read_json(response).await?;
                let result = body
                    .get("result")
                    .filter(|r| r.is_object())
                    .ok_or_else(|| refusal(&body, "login response has no result"))?;

                let session: LoginSession = serde_json::from_value(result.clone())
                    .map_err(|e| ApiError::Protocol(e.to_string()))?;
                if session.user_id.is_empty() || session.session_id.is_empty() {
                    return Err(ApiError::Protocol(
                        "login result is missing id or sessionId".to_string(),
                    ));
                }
                Ok::<_, ApiError>(session)
            })
            .await?;

        info!(user_id = %session.user_id, "Logged in");
        Ok(session)
    }

    /// Courses scheduled for `date`.
    pub async fn fetch_schedule(
        &self,
        session: &LoginSession,
        date: NaiveDate,
    ) -> ApiResult<ScheduleOutcome> {
        let date_str = date.format("%Y%m%d").to_string();
        debug!(date = %date_str, "Fetching schedule");

        let outcome = self
            .tokens
            .with_valid_token(|credential| {
                let date_str = date_str.as_str();
                async move {
                    let response = self
                        .http
                        .get(&self.config.schedule_url)
                        .query(&[("dateStr", date_str), ("id", session.user_id.as_str())])
                        .header("sessionId", session.session_id.as_str())
                        .header(AUTHORIZATION, credential.bearer())
                        .send()
                        .await?;

                    let body = read_json(response).await?;
                    let parsed: ScheduleResponse = serde_json::from_value(body)
                        .map_err(|e| ApiError::Protocol(e.to_string()))?;
                    Ok::<_, ApiError>(ScheduleOutcome::from_response(parsed))
                }
            })
            .await?;

        match &outcome {
            ScheduleOutcome::Courses(courses) => {
                info!(date = %date_str, count = courses.len(), "Schedule fetched")
            }
            ScheduleOutcome::NoClasses => info!(date = %date_str, "No classes scheduled"),
        }
        Ok(outcome)
    }

    /// Submit one sign-in for a course schedule id.
    pub async fn sign_in(
        &self,
        session: &LoginSession,
        course_schedule_id: &str,
    ) -> ApiResult<SignInReceipt> {
        let receipt = self
            .tokens
            .with_valid_token(|credential| async move {
                let submitted_at = Utc::now();
                let timestamp = submitted_at.timestamp_millis().to_string();

                debug!(course_schedule_id, "Submitting sign-in");
                let response = self
                    .http
                    .post(&self.config.sign_url)
                    .query(&[
                        ("courseSchedId", course_schedule_id),
                        ("timestamp", timestamp.as_str()),
                    ])
                    .form(&[("id", session.user_id.as_str())])
                    .header(AUTHORIZATION, credential.bearer())
                    .send()
                    .await?;

                let body = read_json(response).await?;
                match body.get("result") {
                    Some(result) => Ok(SignInReceipt {
                        course_schedule_id: course_schedule_id.to_string(),
                        submitted_at,
                        result: result.clone(),
                    }),
                    None => Err(refusal(&body, "unknown error")),
                }
            })
            .await?;

        info!(course_schedule_id, "Signed in");
        Ok(receipt)
    }

    /// Sign in to `course` unless it is already marked signed.
    pub async fn sign_in_course(
        &self,
        session: &LoginSession,
        course: &Course,
    ) -> ApiResult<SignInOutcome> {
        if course.is_signed() {
            debug!(course_schedule_id = %course.id, "Already signed, skipping submission");
            return Ok(SignInOutcome::AlreadySigned);
        }
        self.sign_in(session, &course.id)
            .await
            .map(SignInOutcome::Signed)
    }

    /// Log in with `student_id` and sign in to `course_schedule_id`.
    pub async fn sign_in_student(
        &self,
        student_id: &str,
        course_schedule_id: &str,
    ) -> ApiResult<SignInReceipt> {
        let session = self.login(student_id).await?;
        self.sign_in(&session, course_schedule_id).await
    }
}

/// Map the status line, then parse the body as JSON.
async fn read_json(response: Response) -> ApiResult<Value> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        warn!("Credential refused by API");
        return Err(ApiError::CredentialExpired);
    }

    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Protocol(format!("HTTP {}: {}", status.as_u16(), text)));
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Protocol(format!("invalid JSON: {e}")))
}

/// `Rejected` with the server's `msg`, or `default` when it gave none.
fn refusal(body: &Value, default: &str) -> ApiError {
    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(default);
    ApiError::Rejected(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use classhopper_core::AuthConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AUTH_PATH: &str = "/api/user/third-auth";
    const LOGIN_PATH: &str = "/app/user/login.action";
    const SCHEDULE_PATH: &str = "/app/course/get_stu_course_sched.action";
    const SIGN_PATH: &str = "/app/course/stu_scan_sign.action";

    fn client_for(server: &MockServer) -> ApiClient {
        let auth = AuthConfig {
            auth_url: format!("{}{AUTH_PATH}", server.uri()),
            app_key: "buaa-classhopper-android".to_string(),
            app_secret: "unit-secret".to_string(),
            fallback_ttl: Duration::from_secs(7200),
        };
        let api = ApiConfig {
            login_url: format!("{}{LOGIN_PATH}", server.uri()),
            schedule_url: format!("{}{SCHEDULE_PATH}", server.uri()),
            sign_url: format!("{}{SIGN_PATH}", server.uri()),
            ..ApiConfig::default()
        };
        let tokens = Arc::new(TokenManager::new(auth, "device-1", Client::new()));
        ApiClient::with_http(api, tokens, Client::new())
    }

    async fn mount_auth(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path(AUTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1,
                "msg": "ok",
                "data": { "token": "tok-1", "expireAt": "2099-01-01T00:00:00.000Z" }
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    fn session() -> LoginSession {
        LoginSession {
            user_id: "u-1".to_string(),
            session_id: "sess-1".to_string(),
            real_name: "Li Hua".to_string(),
            academy_name: "Computer Science".to_string(),
        }
    }

    fn course(id: &str, sign_status: &str) -> Course {
        Course {
            id: id.to_string(),
            course_name: "Compilers".to_string(),
            classroom_name: "J3-101".to_string(),
            sign_status: sign_status.to_string(),
            class_begin_time: "2024-05-01 08:00:00".to_string(),
            class_end_time: "2024-05-01 09:35:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_reads_result() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .and(query_param("phone", "21370001"))
            .and(query_param("userLevel", "1"))
            .and(query_param("verificationType", "2"))
            .and(header("Authorization", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "STATUS": "0",
                "result": {
                    "id": "u-1",
                    "sessionId": "sess-1",
                    "realName": "Li Hua",
                    "academyName": "Computer Science"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client_for(&server).login("21370001").await.unwrap();
        assert_eq!(session, self::session());
    }

    #[tokio::test]
    async fn test_login_refusal_carries_message() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "STATUS": "1", "msg": "no such user" })),
            )
            .mount(&server)
            .await;

        match client_for(&server).login("0").await.unwrap_err() {
            ApiError::Rejected(message) => assert_eq!(message, "no such user"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_schedule_is_no_classes() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(SCHEDULE_PATH))
            .and(query_param("dateStr", "20240501"))
            .and(query_param("id", "u-1"))
            .and(header("sessionId", "sess-1"))
            .and(header("Authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "STATUS": "0",
                "total": "0",
                "result": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let outcome = client_for(&server)
            .fetch_schedule(&session(), date)
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoClasses);
    }

    #[tokio::test]
    async fn test_schedule_lists_courses() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(SCHEDULE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "STATUS": "0",
                "total": "2",
                "result": [
                    {
                        "id": "cs-1",
                        "courseName": "Compilers",
                        "classroomName": "J3-101",
                        "signStatus": "1",
                        "classBeginTime": "2024-05-01 08:00:00",
                        "classEndTime": "2024-05-01 09:35:00"
                    },
                    {
                        "id": 2,
                        "courseName": "Networks",
                        "classroomName": "J3-202",
                        "signStatus": "0",
                        "classBeginTime": "2024-05-01 10:00:00",
                        "classEndTime": "2024-05-01 11:35:00"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let outcome = client_for(&server)
            .fetch_schedule(&session(), date)
            .await
            .unwrap();

        let courses = outcome.courses();
        assert_eq!(courses.len(), 2);
        assert!(courses[0].is_signed());
        assert_eq!(courses[1].id, "2");
    }

    #[tokio::test]
    async fn test_malformed_schedule_is_protocol_error() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(SCHEDULE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let err = client_for(&server)
            .fetch_schedule(&session(), date)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_sign_in_submits_once() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .and(query_param("courseSchedId", "cs-9"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(body_string_contains("id=u-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "STATUS": "0", "result": { "stuSignStatus": "1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client_for(&server)
            .sign_in(&session(), "cs-9")
            .await
            .unwrap();
        assert_eq!(receipt.course_schedule_id, "cs-9");
        assert_eq!(receipt.result["stuSignStatus"], "1");
    }

    #[tokio::test]
    async fn test_sign_in_refused() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "STATUS": "1", "msg": "outside sign-in window" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        match client_for(&server).sign_in(&session(), "cs-9").await.unwrap_err() {
            ApiError::Rejected(message) => assert_eq!(message, "outside sign-in window"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_already_signed_course_makes_no_request() {
        let server = MockServer::start().await;
        mount_auth(&server, 0).await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .sign_in_course(&session(), &course("cs-1", "1"))
            .await
            .unwrap();
        assert_eq!(outcome, SignInOutcome::AlreadySigned);
    }

    #[tokio::test]
    async fn test_unsigned_course_is_submitted() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .and(query_param("courseSchedId", "cs-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .sign_in_course(&session(), &course("cs-2", "0"))
            .await
            .unwrap();
        assert!(matches!(outcome, SignInOutcome::Signed(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_twice_surfaces_after_one_retry() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .sign_in(&session(), "cs-9")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::CredentialExpired));
    }

    #[tokio::test]
    async fn test_unauthorized_then_success() {
        let server = MockServer::start().await;
        mount_auth(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(SCHEDULE_PATH))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SCHEDULE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "STATUS": "2" })))
            .expect(1)
            .mount(&server)
            .await;

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let outcome = client_for(&server)
            .fetch_schedule(&session(), date)
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::NoClasses);
    }

    #[tokio::test]
    async fn test_auth_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AUTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "bad signature" })))
            .mount(&server)
            .await;

        let err = client_for(&server).login("21370001").await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn test_sign_in_student_logs_in_first() {
        let server = MockServer::start().await;
        mount_auth(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "id": "u-1", "sessionId": "sess-1", "realName": "Li Hua", "academyName": "CS" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(SIGN_PATH))
            .and(body_string_contains("id=u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client_for(&server)
            .sign_in_student("21370001", "cs-3")
            .await
            .unwrap();
        assert_eq!(receipt.course_schedule_id, "cs-3");
    }
}
