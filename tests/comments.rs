//! Comment integration tests.

mod common;

use common::*;
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

async fn project_with_issue(app: &TestApp, owner: &TestUser) -> (Uuid, String) {
    let project = app.create_project(owner, "Discussions").await;
    let issue = app
        .create_issue(owner, project, json!({ "title": "Talk about me" }))
        .await;
    (project, format!("/issues/{}/comments", issue["id"].as_str().unwrap()))
}

#[tokio::test]
#[serial]
async fn member_comments_and_reads_thread_in_order() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("Owner").await;
    let member = app.create_user("Member").await;
    let (project, path) = project_with_issue(&app, &owner).await;
    app.add_member(&owner, project, &member, "member").await;

    let first = app
        .post(&path, &member.token, json!({ "body": "  Can you reproduce?  " }))
        .await;
    assert_status!(first, 200);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["body"], "Can you reproduce?");
    assert_eq!(first["author_id"], member.id.to_string());
    assert_eq!(first["author"]["name"], "Member");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = app
        .post(&path, &owner.token, json!({ "body": "Yes, on Firefox." }))
        .await;
    assert_status!(second, 200);

    let response = app.get(&path, &member.token).await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    let bodies: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, ["Can you reproduce?", "Yes, on Firefox."]);
}

#[tokio::test]
#[serial]
async fn blank_comment_is_rejected() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("Owner").await;
    let (_, path) = project_with_issue(&app, &owner).await;

    let response = app.post(&path, &owner.token, json!({ "body": " \n\t " })).await;

    assert_error_code(response, 400, "VALIDATION_ERROR").await;
}

#[tokio::test]
#[serial]
async fn outsider_cannot_read_or_write_comments() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("Owner").await;
    let outsider = app.create_user("Outsider").await;
    let (_, path) = project_with_issue(&app, &owner).await;

    let read = app.get(&path, &outsider.token).await;
    assert_error_code(read, 403, "FORBIDDEN").await;

    let write = app
        .post(&path, &outsider.token, json!({ "body": "Let me in" }))
        .await;
    assert_error_code(write, 403, "FORBIDDEN").await;
}

#[tokio::test]
#[serial]
async fn comments_on_missing_issue_return_404() {
    let app = TestApp::spawn().await;
    let user = app.create_user("Someone").await;

    let response = app
        .get(&format!("/issues/{}/comments", Uuid::new_v4()), &user.token)
        .await;

    assert_error_code(response, 404, "NOT_FOUND").await;
}

#[tokio::test]
#[serial]
async fn deleting_issue_removes_its_comments() {
    let app = TestApp::spawn().await;
    let owner = app.create_user("Owner").await;
    let (_, path) = project_with_issue(&app, &owner).await;
    app.post(&path, &owner.token, json!({ "body": "Soon gone" }))
        .await;

    let issue_path = path.trim_end_matches("/comments").to_string();
    let response = app.delete(&issue_path, &owner.token).await;
    assert_status!(response, 204);

    let response = app.get(&path, &owner.token).await;
    assert_error_code(response, 404, "NOT_FOUND").await;
}
