//! Progress events flow from the bus into the job store.

use std::sync::Arc;
use std::time::Duration;

use reelforge_core::job_type::JobType;
use reelforge_db::models::job::SubmitJob;
use reelforge_db::repositories::JobRepo;
use reelforge_events::{ProgressBus, ProgressPersistence, ProgressReporter};
use sqlx::PgPool;

#[sqlx::test(migrations = "../db/migrations")]
async fn reporter_progress_is_persisted(pool: PgPool) {
    let job = JobRepo::submit(
        &pool,
        &SubmitJob {
            project_id: None,
            job_type: JobType::Upscale,
            settings: serde_json::json!({}),
            clip_ids: vec![],
        },
    )
    .await
    .unwrap();
    JobRepo::claim_next(&pool, JobType::Upscale).await.unwrap().unwrap();

    let bus = Arc::new(ProgressBus::default());
    let writer = tokio::spawn(ProgressPersistence::run(pool.clone(), bus.subscribe()));

    let reporter = ProgressReporter::new(Arc::clone(&bus), job.id);
    reporter.report(10.0, "Inputs resolved");
    reporter.tick(47.5);

    let mut persisted = 0;
    for _ in 0..50 {
        persisted = JobRepo::find_by_id(&pool, job.id)
            .await
            .unwrap()
            .unwrap()
            .progress_percent;
        if persisted == 47 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(persisted, 47);

    drop(reporter);
    drop(bus);
    tokio::time::timeout(Duration::from_secs(1), writer)
        .await
        .expect("writer stops when the bus closes")
        .unwrap();
}
