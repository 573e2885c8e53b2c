//! Integration tests for projects, clips and the resolution preview.

mod common;

use axum::http::StatusCode;
use common::{body_json, delete, get, post_json};
use serde_json::json;
use sqlx::PgPool;

use reelforge_db::repositories::ClipRepo;

#[sqlx::test(migrations = "../db/migrations")]
async fn create_then_get_project(pool: PgPool) {
    let response = post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/projects",
        json!({"name": "Night market", "resolution": "1280x720", "fps": 24}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["upscale_multiplier"], 2.0);

    let response = get(common::build_test_app(pool), &format!("/api/v1/projects/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["resolution"], "1280x720");
    assert_eq!(json["data"]["fps"], 24);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn malformed_resolution_is_rejected(pool: PgPool) {
    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/projects",
        json!({"name": "Bad", "resolution": "wide"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_project_is_404(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/api/v1/projects/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deleting_a_project_removes_its_clips(pool: PgPool) {
    let project_id = common::seed_project(&pool).await;
    let clip = common::seed_completed_clip(&pool, project_id, 0).await;

    let response = delete(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/projects/{project_id}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(ClipRepo::find_by_id(&pool, clip.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deleting_a_clip_removes_its_file(pool: PgPool) {
    let output = tempfile::tempdir().unwrap();
    let project_id = common::seed_project(&pool).await;
    let clip = common::seed_completed_clip(&pool, project_id, 0).await;
    let stored = clip.output_path.clone().unwrap();
    let file = output.path().join(&stored);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"video").unwrap();

    let state = common::test_state_with(pool.clone(), true, output.path().to_path_buf());
    let response = delete(common::build_app(state), &format!("/api/v1/clips/{}", clip.id)).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!file.exists());
    assert!(ClipRepo::find_by_id(&pool, clip.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deleting_a_clip_without_files_still_succeeds(pool: PgPool) {
    let project_id = common::seed_project(&pool).await;
    let clip = common::seed_completed_clip(&pool, project_id, 0).await;

    let response = delete(
        common::build_test_app(pool),
        &format!("/api/v1/clips/{}", clip.id),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn resolution_preview_scales_over_budget_requests(pool: PgPool) {
    let response = get(
        common::build_test_app(pool),
        "/api/v1/resolution/preview?width=1920&height=1080&frame_count=81&model_id=wan&mode=image_to_video",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["was_scaled"], true);
    let width = data["width"].as_u64().unwrap();
    let height = data["height"].as_u64().unwrap();
    assert_eq!(width % 8, 0);
    assert_eq!(height % 8, 0);
    assert!(width * height * 81 <= data["pixel_budget"].as_u64().unwrap());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn resolution_preview_uses_project_resolution(pool: PgPool) {
    let project_id = common::seed_project(&pool).await;
    let response = get(
        common::build_test_app(pool),
        &format!("/api/v1/resolution/preview?project_id={project_id}&frame_count=81"),
    )
    .await;
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["requested_width"], 832);
    assert_eq!(data["width"], 832);
    assert_eq!(data["was_scaled"], false);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn resolution_preview_rejects_unknown_model(pool: PgPool) {
    let response = get(
        common::build_test_app(pool),
        "/api/v1/resolution/preview?width=640&height=360&model_id=sora",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
