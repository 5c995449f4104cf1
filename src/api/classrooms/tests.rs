use axum::http::{Method, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;

use crate::core::time::now_utc;
use crate::db::models::ScheduleRow;
use crate::services::accounts;
use crate::services::schedule_analysis::ScheduleAnalysis;
use crate::test_support::{self, TestContext};

const CLASSROOM: &str = "schoolA-11-c";

fn rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap()
}

fn rows(subject: &str) -> Value {
    json!([
        { "session": "1", "time": "7:45–9:05", "sunday": subject },
        { "session": "2", "time": "9:20–10:40", "monday": subject }
    ])
}

async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn schedule_versions_over_http() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());
    let base = format!("/api/v1/classrooms/{CLASSROOM}");

    let upload = Some(json!({ "schedule": rows("Math") }));
    let (status, first) =
        send(&ctx, Method::POST, &format!("{base}/schedules"), &token, upload).await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    assert_eq!(first["uploadedBy"], student.name.as_str());
    let first_id = first["id"].as_str().expect("id").to_string();

    let (_, second) = send(
        &ctx,
        Method::POST,
        &format!("{base}/schedules"),
        &token,
        Some(json!({ "schedule": rows("Physics") })),
    )
    .await;
    let second_id = second["id"].as_str().expect("id").to_string();

    let (status, history) =
        send(&ctx, Method::GET, &format!("{base}/schedules"), &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().expect("array").len(), 2);

    let (_, active) = send(&ctx, Method::GET, &format!("{base}/schedule"), &token, None).await;
    assert_eq!(active["activeScheduleId"], second_id.as_str());

    let (status, pointer) = send(
        &ctx,
        Method::PUT,
        &format!("{base}/schedule/active"),
        &token,
        Some(json!({ "versionId": first_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {pointer}");

    let (status, edited) = send(
        &ctx,
        Method::PUT,
        &format!("{base}/schedule"),
        &token,
        Some(json!({ "schedule": rows("Chemistry") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {edited}");
    assert_eq!(edited["id"], first_id.as_str());
    assert_eq!(edited["schedule"][0]["sunday"], "Chemistry");

    let (status, pointer) =
        send(&ctx, Method::DELETE, &format!("{base}/schedules/{first_id}"), &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pointer["activeScheduleId"], second_id.as_str());

    let (status, _) =
        send(&ctx, Method::DELETE, &format!("{base}/schedules/{first_id}"), &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &ctx,
        Method::PUT,
        &format!("{base}/schedule/active"),
        &token,
        Some(json!({ "versionId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outsiders_cannot_touch_a_classroom() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());

    let (status, _) =
        send(&ctx, Method::GET, "/api/v1/classrooms/schoolB-9-a/schedules", &token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn image_upload_stores_extracted_rows() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());
    ctx.analyzer.respond_with(ScheduleAnalysis {
        schedule: vec![ScheduleRow {
            session: "1".to_string(),
            time: "7:45–9:05".to_string(),
            sunday: Some("Math".to_string()),
            ..ScheduleRow::default()
        }],
        errors: None,
    });
    let body = json!({ "imageBase64": STANDARD.encode(b"png bytes"), "mimeType": "image/png" });

    let (status, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/classrooms/{CLASSROOM}/schedules/analyze"),
        &token,
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["version"]["schedule"][0]["sunday"], "Math");
    assert_eq!(ctx.analyzer.calls(), vec!["image/png".to_string()]);
}

#[tokio::test]
async fn image_upload_accepts_photos_larger_than_default_body_limit() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());
    ctx.analyzer.respond_with(ScheduleAnalysis {
        schedule: vec![ScheduleRow {
            session: "1".to_string(),
            time: "7:45–9:05".to_string(),
            ..ScheduleRow::default()
        }],
        errors: None,
    });
    // 3 MB decoded, about 4 MB once encoded: above axum's 2 MB default, below the 10 MB cap.
    let photo = vec![0x89_u8; 3 * 1024 * 1024];
    let body = json!({ "imageBase64": STANDARD.encode(&photo), "mimeType": "image/png" });

    let (status, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/classrooms/{CLASSROOM}/schedules/analyze"),
        &token,
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(ctx.analyzer.calls(), vec!["image/png".to_string()]);
}

#[test]
fn image_body_limit_covers_base64_expansion() {
    let ten_mb = 10 * 1024 * 1024;
    let limit = super::image_body_limit(ten_mb);
    assert!(limit >= (ten_mb as usize).div_ceil(3) * 4);
    assert_eq!(super::image_body_limit(3), 4 + super::IMAGE_BODY_OVERHEAD);
}

#[tokio::test]
async fn failed_analysis_is_unprocessable_and_stores_nothing() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());
    ctx.analyzer.respond_with(ScheduleAnalysis::failed("The image is not a timetable"));
    let base = format!("/api/v1/classrooms/{CLASSROOM}");

    let body =
        json!({ "imageBase64": STANDARD.encode(b"cat photo"), "mimeType": "image/jpeg" });
    let (status, error) =
        send(&ctx, Method::POST, &format!("{base}/schedules/analyze"), &token, Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["detail"], "The image is not a timetable");

    let body =
        json!({ "imageBase64": STANDARD.encode(b"doc"), "mimeType": "application/pdf" });
    let (status, _) =
        send(&ctx, Method::POST, &format!("{base}/schedules/analyze"), &token, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.analyzer.calls().len(), 1);

    let (_, history) = send(&ctx, Method::GET, &format!("{base}/schedules"), &token, None).await;
    assert!(history.as_array().expect("array").is_empty());
}

#[tokio::test]
async fn commitment_fans_out_and_invitee_accepts() {
    let ctx = test_support::setup_test_context().await;
    let author = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let classmate = test_support::insert_student(&ctx.state, "sami@school.org").await;
    let teacher = test_support::insert_teacher(&ctx.state, "omar@school.org", "c").await;
    let author_token = test_support::bearer_token(&author.uid, ctx.state.settings());
    let classmate_token = test_support::bearer_token(&classmate.uid, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher.uid, ctx.state.settings());

    let (status, created) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/classrooms/{CLASSROOM}/explanations"),
        &author_token,
        Some(json!({
            "subject": "Physics",
            "session": "2",
            "day": "monday",
            "learningOutcome": "Newton's laws",
            "explanationDate": rfc3339(now_utc() + Duration::days(3)),
            "invitees": [classmate.uid]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["invitationsSent"], 1);
    assert_eq!(created["teachersNotified"], 1);

    let (_, notifications) =
        send(&ctx, Method::GET, "/api/v1/notifications", &teacher_token, None).await;
    let notifications = notifications.as_array().expect("array").clone();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["studentName"], author.name.as_str());

    let (_, invitations) =
        send(&ctx, Method::GET, "/api/v1/invitations", &classmate_token, None).await;
    let invitation_id = invitations[0]["id"].as_str().expect("invitation id").to_string();

    let (status, answer) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/invitations/{invitation_id}/accept"),
        &classmate_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {answer}");
    assert_eq!(answer["status"], "accepted");
    assert_eq!(answer["invitationRemoved"], true);

    let (_, explanations) = send(
        &ctx,
        Method::GET,
        &format!("/api/v1/classrooms/{CLASSROOM}/explanations"),
        &teacher_token,
        None,
    )
    .await;
    let contributors = explanations[0]["contributors"].as_array().expect("contributors");
    assert!(contributors.iter().all(|contributor| contributor["status"] == "accepted"));

    let notification_id = notifications[0]["id"].as_str().expect("notification id");
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/notifications/{notification_id}"),
            Some(&teacher_token),
            None,
        ))
        .await
        .expect("dismiss");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn teachers_clear_explanations_and_students_cannot() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let teacher = test_support::insert_teacher(&ctx.state, "omar@school.org", "c").await;
    let student_token = test_support::bearer_token(&student.uid, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher.uid, ctx.state.settings());
    let uri = format!("/api/v1/classrooms/{CLASSROOM}/explanations");

    let (status, _) = send(
        &ctx,
        Method::POST,
        &uri,
        &teacher_token,
        Some(json!({
            "subject": "Physics",
            "session": "1",
            "day": "sunday",
            "explanationDate": rfc3339(now_utc())
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &ctx,
        Method::POST,
        &uri,
        &student_token,
        Some(json!({
            "subject": "Physics",
            "session": "1",
            "day": "sunday",
            "explanationDate": rfc3339(now_utc())
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&ctx, Method::DELETE, &uri, &student_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cleared) = send(&ctx, Method::DELETE, &uri, &teacher_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["deleted"], 1);
}

#[tokio::test]
async fn rollover_endpoint_finishes_elapsed_sessions() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let token = test_support::bearer_token(&student.uid, ctx.state.settings());
    let base = format!("/api/v1/classrooms/{CLASSROOM}");

    let upload = Some(json!({ "schedule": rows("Math") }));
    send(&ctx, Method::POST, &format!("{base}/schedules"), &token, upload).await;
    let (status, _) = send(
        &ctx,
        Method::POST,
        &format!("{base}/explanations"),
        &token,
        Some(json!({
            "subject": "Math",
            "session": "1",
            "day": "sunday",
            "explanationDate": rfc3339(now_utc() - Duration::days(2))
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, result) =
        send(&ctx, Method::POST, &format!("{base}/rollover"), &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["finished"], 1);

    let (_, explanations) =
        send(&ctx, Method::GET, &format!("{base}/explanations"), &token, None).await;
    assert_eq!(explanations[0]["status"], "Finished");
}

#[tokio::test]
async fn classmates_are_listed_and_only_they_can_be_invited() {
    let ctx = test_support::setup_test_context().await;
    let author = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let classmate = test_support::insert_student(&ctx.state, "sami@school.org").await;
    let teacher = test_support::insert_teacher(&ctx.state, "omar@school.org", "c").await;
    let other_class = accounts::register(
        ctx.state.store().as_ref(),
        ctx.state.identity().as_ref(),
        test_support::student_registration("noor@school.org", "d"),
    )
    .await
    .expect("insert student");
    let token = test_support::bearer_token(&author.uid, ctx.state.settings());
    let base = format!("/api/v1/classrooms/{CLASSROOM}");

    let (status, members) = send(&ctx, Method::GET, &format!("{base}/members"), &token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {members}");
    let uids: Vec<_> = members
        .as_array()
        .expect("array")
        .iter()
        .map(|member| member["uid"].as_str().expect("uid").to_string())
        .collect();
    assert_eq!(uids, vec![author.uid.clone(), classmate.uid.clone()]);

    for outsider in [&teacher.uid, &other_class.uid] {
        let (status, _) = send(
            &ctx,
            Method::POST,
            &format!("{base}/explanations"),
            &token,
            Some(json!({
                "subject": "Physics",
                "session": "2",
                "day": "monday",
                "explanationDate": rfc3339(now_utc() + Duration::days(1)),
                "invitees": [classmate.uid, outsider]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (_, explanations) =
        send(&ctx, Method::GET, &format!("{base}/explanations"), &token, None).await;
    assert!(explanations.as_array().expect("array").is_empty());

    let outsider_token = test_support::bearer_token(&other_class.uid, ctx.state.settings());
    let (status, _) =
        send(&ctx, Method::GET, &format!("{base}/members"), &outsider_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn teachers_mark_completion_and_profile_stats_follow() {
    let ctx = test_support::setup_test_context().await;
    let student = test_support::insert_student(&ctx.state, "lina@school.org").await;
    let teacher = test_support::insert_teacher(&ctx.state, "omar@school.org", "c").await;
    let student_token = test_support::bearer_token(&student.uid, ctx.state.settings());
    let teacher_token = test_support::bearer_token(&teacher.uid, ctx.state.settings());
    let base = format!("/api/v1/classrooms/{CLASSROOM}");

    let (_, created) = send(
        &ctx,
        Method::POST,
        &format!("{base}/explanations"),
        &student_token,
        Some(json!({
            "subject": "Physics",
            "session": "1",
            "day": "sunday",
            "explanationDate": rfc3339(now_utc())
        })),
    )
    .await;
    let explanation_id = created["explanation"]["id"].as_str().expect("id").to_string();
    let completion = format!("{base}/explanations/{explanation_id}/completion");

    let (status, _) = send(
        &ctx,
        Method::PUT,
        &completion,
        &student_token,
        Some(json!({ "completionStatus": "explained" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, marked) = send(
        &ctx,
        Method::PUT,
        &completion,
        &teacher_token,
        Some(json!({ "completionStatus": "explained" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {marked}");
    assert_eq!(marked["completionStatus"], "explained");

    let stats_uri = format!("/api/v1/users/{}/stats", student.uid);
    for token in [&student_token, &teacher_token] {
        let (status, stats) = send(&ctx, Method::GET, &stats_uri, token, None).await;
        assert_eq!(status, StatusCode::OK, "response: {stats}");
        let by_subject = json!([{ "subject": "Physics", "count": 1 }]);
        assert_eq!(stats, json!({ "total": 1, "bySubject": by_subject }));
    }

    let (status, _) = send(
        &ctx,
        Method::PUT,
        &format!("{base}/explanations/ghost/completion"),
        &teacher_token,
        Some(json!({ "completionStatus": "explained" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
