//! Business payloads.
//!
//! The backend is loose about scalar types (ids arrive as strings or
//! numbers), so identifier fields are read leniently into `String`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

/// Authenticated student session returned by login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    #[serde(rename = "id", deserialize_with = "lenient_string", default)]
    pub user_id: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub session_id: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub real_name: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub academy_name: String,
}

/// One scheduled class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Course schedule id, used for sign-in.
    #[serde(deserialize_with = "lenient_string", default)]
    pub id: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub course_name: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub classroom_name: String,
    /// `"1"` once the student has signed in.
    #[serde(deserialize_with = "lenient_string", default)]
    pub sign_status: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub class_begin_time: String,
    #[serde(deserialize_with = "lenient_string", default)]
    pub class_end_time: String,
}

impl Course {
    pub fn is_signed(&self) -> bool {
        self.sign_status == "1"
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleResponse {
    #[serde(rename = "STATUS", deserialize_with = "lenient_string", default)]
    pub status: String,
    #[serde(default)]
    pub result: Option<Vec<Course>>,
}

/// Result of a schedule query. A day without classes is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Courses(Vec<Course>),
    NoClasses,
}

impl ScheduleOutcome {
    pub(crate) fn from_response(response: ScheduleResponse) -> Self {
        match response.result {
            _ if response.status == "2" => ScheduleOutcome::NoClasses,
            Some(courses) if !courses.is_empty() => ScheduleOutcome::Courses(courses),
            _ => ScheduleOutcome::NoClasses,
        }
    }

    pub fn courses(&self) -> &[Course] {
        match self {
            ScheduleOutcome::Courses(courses) => courses,
            ScheduleOutcome::NoClasses => &[],
        }
    }
}

/// Server acknowledgement of a sign-in submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SignInReceipt {
    pub course_schedule_id: String,
    pub submitted_at: DateTime<Utc>,
    /// The `result` member of the response, verbatim.
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// The course was already marked signed; nothing was submitted.
    AlreadySigned,
    Signed(SignInReceipt),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_course_accepts_numeric_ids() {
        let course: Course = serde_json::from_value(json!({
            "id": 4711,
            "courseName": "Compilers",
            "classroomName": "J3-101",
            "signStatus": 0,
            "classBeginTime": "2024-05-01 08:00:00",
            "classEndTime": "2024-05-01 09:35:00"
        }))
        .unwrap();

        assert_eq!(course.id, "4711");
        assert_eq!(course.sign_status, "0");
        assert!(!course.is_signed());
    }

    #[test]
    fn test_status_two_means_no_classes() {
        let response: ScheduleResponse = serde_json::from_value(json!({
            "STATUS": "2",
            "result": [{ "id": "1", "courseName": "x" }]
        }))
        .unwrap();
        assert_eq!(ScheduleOutcome::from_response(response), ScheduleOutcome::NoClasses);
    }

    #[test]
    fn test_missing_result_means_no_classes() {
        let response: ScheduleResponse =
            serde_json::from_value(json!({ "STATUS": "0", "total": "0" })).unwrap();
        let outcome = ScheduleOutcome::from_response(response);
        assert_eq!(outcome, ScheduleOutcome::NoClasses);
        assert!(outcome.courses().is_empty());
    }

    #[test]
    fn test_login_session_fields() {
        let session: LoginSession = serde_json::from_value(json!({
            "id": "u-1",
            "sessionId": "s-1",
            "realName": "Li Hua",
            "academyName": "Computer Science",
            "extra": true
        }))
        .unwrap();
        assert_eq!(session.user_id, "u-1");
        assert_eq!(session.session_id, "s-1");
    }
}
