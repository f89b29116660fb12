use std::{env, sync::Once};

use inkread::{
    config,
    service::{InkreadApi, InkreadService},
    upload::UploadedFile,
    upstream::CredentialState,
};

static INIT: Once = Once::new();

fn init_config_once() {
    INIT.call_once(|| {
        assert!(
            env::var("GEMINI_API_KEY_1").is_ok_and(|v| !v.trim().is_empty()),
            "GEMINI_API_KEY_1 must be set for live tests"
        );
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires a live Gemini API key"]
async fn live_probe_uses_primary_credential() {
    init_config_once();
    let service = InkreadService::from_config(config::get_config()).expect("service builds");
    let reply = service.probe().await.expect("probe succeeds");
    assert!(!reply.is_empty(), "probe reply should not be empty");

    let status = service.router_status();
    assert!(status.healthy, "router should be healthy: {status:?}");
    assert_eq!(status.primary_state, CredentialState::Active);
    assert_eq!(status.request_counters.primary, 1);
}

#[tokio::test]
#[ignore = "Requires a live Gemini API key"]
async fn live_summary_for_grade_four() {
    init_config_once();
    let service = InkreadService::from_config(config::get_config()).expect("service builds");
    let summary = service
        .summarize(
            "Plants make their own food using sunlight, water and carbon dioxide. \
             This process is called photosynthesis and it releases oxygen.",
            "4",
        )
        .await
        .expect("summary succeeds");
    assert!(summary.summary_length > 0);
    assert_eq!(summary.grade_level, "4");
}

#[tokio::test]
#[ignore = "Requires a live Gemini API key"]
async fn live_unreadable_image_fails_cleanly() {
    init_config_once();
    let service = InkreadService::from_config(config::get_config()).expect("service builds");
    let receipt = service
        .upload(vec![UploadedFile::new(
            "blank.png",
            Some("image/png".into()),
            b"not really a png".to_vec(),
        )])
        .await
        .expect("upload accepted");

    let outcome = service.extract(&receipt.session_id, false).await;
    assert_eq!(outcome.total_files_processed, 1);
    assert_eq!(outcome.items.len(), 1);
    assert!(service.delete_session(&receipt.session_id));
}
