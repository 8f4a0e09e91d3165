mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn creator_becomes_sole_admin_member() {
    let app = spawn_app().await;
    let (token, user_id) = app.register("user@example.com").await;

    let project = app.create_project(&token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/projects/{project_id}/members"),
            Some(&token),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let members = body["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["user_id"], user_id.as_str());
    assert_eq!(members[0]["role"], "admin");
}

#[tokio::test]
async fn listing_is_filtered_by_membership() {
    let app = spawn_app().await;
    let (token, _) = app.register("user@example.com").await;
    let (other_token, _) = app.register("user1@example.com").await;

    let p1 = app.create_project(&token, "Project one").await;
    let p2 = app.create_project(&token, "Project two").await;
    let p3 = app.create_project(&other_token, "Other project").await;

    let (status, body) = app.request("GET", "/api/projects", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["projects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&p1["id"].as_str().unwrap()));
    assert!(ids.contains(&p2["id"].as_str().unwrap()));
    assert!(!ids.contains(&p3["id"].as_str().unwrap()));
}

#[tokio::test]
async fn non_member_cannot_see_project() {
    let app = spawn_app().await;
    let (owner_token, _) = app.register("user@example.com").await;
    let (outsider_token, _) = app.register("outsider@example.com").await;

    let project = app.create_project(&owner_token, "Hidden project").await;
    let project_id = project["id"].as_str().unwrap();

    // Detail and member listing both report not-found, not forbidden
    let (status, _) = app
        .request(
            "GET",
            &format!("/api/projects/{project_id}"),
            Some(&outsider_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/projects/{project_id}/members"),
            Some(&outsider_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_project_requires_name() {
    let app = spawn_app().await;
    let (token, _) = app.register("user@example.com").await;

    let (status, _) = app
        .request(
            "POST",
            "/api/projects",
            Some(&token),
            Some(json!({"name": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.count("SELECT COUNT(*) FROM projects").await, 0);
}

#[tokio::test]
async fn project_detail_includes_description() {
    let app = spawn_app().await;
    let (token, user_id) = app.register("user@example.com").await;

    let project = app.create_project(&token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/projects/{project_id}"),
            Some(&token),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Sample project title");
    assert_eq!(body["description"], "Sample description");
    assert_eq!(body["created_by"], user_id.as_str());
}

#[tokio::test]
async fn only_admin_updates_project() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (dev_token, _) = app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Before").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/projects/{project_id}/members"),
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // A non-admin member can see the project but not rename it
    let (status, _) = app
        .request(
            "PATCH",
            &format!("/api/projects/{project_id}"),
            Some(&dev_token),
            Some(json!({"name": "After"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/projects/{project_id}"),
            Some(&admin_token),
            Some(json!({"name": "After"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "After");
}

#[tokio::test]
async fn add_member_by_admin() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (_, dev_id) = app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/projects/{project_id}/members"),
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], dev_id.as_str());
    assert_eq!(body["role"], "developer");
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        2
    );
}

#[tokio::test]
async fn add_member_rejects_duplicates() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();
    let url = format!("/api/projects/{project_id}/members");

    let payload = json!({"email": "dev@example.com", "role": "developer"});
    let (status, _) = app
        .request("POST", &url, Some(&admin_token), Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request("POST", &url, Some(&admin_token), Some(payload))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        2
    );
}

#[tokio::test]
async fn add_member_requires_admin_role() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (dev_token, _) = app.register("dev@example.com").await;
    let (outsider_token, _) = app.register("outsider@example.com").await;
    app.register("target@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();
    let url = format!("/api/projects/{project_id}/members");

    let (status, _) = app
        .request(
            "POST",
            &url,
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Neither a non-admin member nor a complete outsider may add members
    for token in [&dev_token, &outsider_token] {
        let (status, _) = app
            .request(
                "POST",
                &url,
                Some(token),
                Some(json!({"email": "target@example.com", "role": "developer"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        2
    );
}

#[tokio::test]
async fn add_member_validates_payload() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();
    let url = format!("/api/projects/{project_id}/members");

    // Unknown user is not-found
    let (status, _) = app
        .request(
            "POST",
            &url,
            Some(&admin_token),
            Some(json!({"email": "abc@cde.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Missing role is a validation error
    let (status, _) = app
        .request(
            "POST",
            &url,
            Some(&admin_token),
            Some(json!({"email": "admin@example.com", "role": "  "})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn remove_member_by_admin() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (_, dev_id) = app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/projects/{project_id}/members"),
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/projects/{project_id}/members/{dev_id}"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        1
    );
}

#[tokio::test]
async fn remove_absent_membership_is_not_found() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (_, stranger_id) = app.register("stranger@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/projects/{project_id}/members/{stranger_id}"),
            Some(&admin_token),
            None,
        )
        .await;

    // Never a silent no-op, and the registry row count is untouched
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        1
    );
}

#[tokio::test]
async fn remove_member_requires_admin_role() {
    let app = spawn_app().await;
    let (admin_token, admin_id) = app.register("admin@example.com").await;
    let (dev_token, _) = app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/projects/{project_id}/members"),
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/projects/{project_id}/members/{admin_id}"),
            Some(&dev_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        2
    );
}

#[tokio::test]
async fn delete_project_cascades() {
    let app = spawn_app().await;
    let (token, user_id) = app.register("user@example.com").await;

    let project = app.create_project(&token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();
    let issue = app
        .create_issue(&token, project_id, &user_id, json!({}))
        .await;
    let issue_id = issue["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/issues/{issue_id}/comments"),
            Some(&token),
            Some(json!({"text": "a comment"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/projects/{project_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.count("SELECT COUNT(*) FROM projects").await, 0);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM project_memberships").await,
        0
    );
    assert_eq!(app.count("SELECT COUNT(*) FROM issues").await, 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM comments").await, 0);
}

#[tokio::test]
async fn delete_project_requires_admin_role() {
    let app = spawn_app().await;
    let (admin_token, _) = app.register("admin@example.com").await;
    let (dev_token, _) = app.register("dev@example.com").await;

    let project = app.create_project(&admin_token, "Sample project title").await;
    let project_id = project["id"].as_str().unwrap();

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/projects/{project_id}/members"),
            Some(&admin_token),
            Some(json!({"email": "dev@example.com", "role": "developer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/projects/{project_id}"),
            Some(&dev_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.count("SELECT COUNT(*) FROM projects").await, 1);
}
