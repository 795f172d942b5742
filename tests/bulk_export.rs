//! End-to-end bulk export: HTTP surface, job engine, inquirer and the
//! lock handshake, against a recording upstream double.

mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use serde_json::{json, Value};

use content_exporter::{
    locker, AppState, BlobWriter, ContentExporter, ContentNotificationHandler,
    EnrichedContentFetcher, FullExporter, HttpClient, MemoryDocumentStore, MemoryMessageSource,
    MessageListener, MessageMapper, MessageSource, RetryPolicy, StoreInquirer,
};

use support::{spawn_upstream, wait_for, FakeUpstream};

const UUID_ONE: &str = "11111111-1111-1111-1111-111111111111";

fn pipeline_for(upstream: &FakeUpstream) -> Arc<ContentExporter> {
    let client = HttpClient::new(Duration::from_secs(5), RetryPolicy::none()).unwrap();
    let fetcher = Arc::new(EnrichedContentFetcher::new(
        client.clone(),
        upstream.base_url.clone(),
        None,
        None,
    ));
    let writer = Arc::new(BlobWriter::new(
        client,
        upstream.base_url.clone(),
        format!("{}/__gtg", upstream.base_url),
    ));
    Arc::new(ContentExporter::new(fetcher, writer))
}

async fn spawn_api(state: Arc<AppState>) -> String {
    let app = content_exporter::web::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn wait_for_finished(client: &reqwest::Client, api: &str, job_id: &str) -> Result<Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let body: Value = client
            .get(format!("{api}/jobs/{job_id}"))
            .send()
            .await?
            .json()
            .await?;
        if body["Status"] == "Finished" {
            return Ok(body);
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "job never finished: {body}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn bulk_happy_path_exports_one_document() -> Result<()> {
    let upstream = spawn_upstream().await;
    *upstream.state.fetch_body.lock().unwrap() = format!(r#"{{"uuid":"{UUID_ONE}"}}"#);

    let store = Arc::new(MemoryDocumentStore::new());
    store.insert(
        "content",
        json!({
            "uuid": UUID_ONE,
            "type": "Article",
            "firstPublishedDate": "2021-01-02T10:00:00Z",
        }),
    );

    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{api}/export"))
        .header("X-Request-Id", "tid_bulk")
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let job: Value = response.json().await?;
    assert_eq!(job["Status"], "Starting");
    let job_id = job["ID"].as_str().expect("job id").to_string();

    let finished = wait_for_finished(&client, &api, &job_id).await?;
    assert_eq!(finished["Progress"], 1);
    assert_eq!(finished["ApproximateCount"], 1);
    assert!(finished.get("Failed").is_none());
    assert!(finished.get("ErrorMessage").is_none());

    let requests = upstream.state.content_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, format!("/enrichedcontent/{UUID_ONE}"));
    assert_eq!(requests[0].tid, "tid_bulk");
    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[1].path, format!("/content/{UUID_ONE}"));
    assert_eq!(requests[1].query, "date=2021-01-02");
    assert_eq!(requests[1].tid, "tid_bulk");
    Ok(())
}

#[tokio::test]
async fn failing_upload_lands_in_the_failed_list() -> Result<()> {
    let upstream = spawn_upstream().await;
    upstream
        .state
        .put_status
        .store(503, std::sync::atomic::Ordering::SeqCst);

    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("content", json!({"uuid": UUID_ONE, "type": "Article"}));

    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let job: Value = client
        .post(format!("{api}/export"))
        .send()
        .await?
        .json()
        .await?;
    let finished =
        wait_for_finished(&client, &api, job["ID"].as_str().expect("job id")).await?;

    assert_eq!(finished["Progress"], 1);
    assert_eq!(finished["Failed"], json!([UUID_ONE]));
    Ok(())
}

#[tokio::test]
async fn empty_store_finishes_immediately_with_zero_progress() -> Result<()> {
    let upstream = spawn_upstream().await;
    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(Arc::new(MemoryDocumentStore::new()))),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let job: Value = client
        .post(format!("{api}/export"))
        .send()
        .await?
        .json()
        .await?;
    let finished =
        wait_for_finished(&client, &api, job["ID"].as_str().expect("job id")).await?;

    // Zero-valued fields are omitted from the body.
    assert!(finished.get("Progress").is_none());
    assert!(finished.get("ApproximateCount").is_none());
    assert!(upstream.state.content_requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn candidate_ids_restrict_the_export() -> Result<()> {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("content", json!({"uuid": UUID_ONE, "type": "Article"}));
    store.insert(
        "content",
        json!({"uuid": "22222222-2222-2222-2222-222222222222", "type": "Article"}),
    );

    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let job: Value = client
        .post(format!("{api}/export"))
        .json(&json!({"ids": UUID_ONE}))
        .send()
        .await?
        .json()
        .await?;
    let finished =
        wait_for_finished(&client, &api, job["ID"].as_str().expect("job id")).await?;

    assert_eq!(finished["Progress"], 1);
    let puts: Vec<_> = upstream
        .state
        .content_requests()
        .into_iter()
        .filter(|r| r.method == "PUT")
        .collect();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].path, format!("/content/{UUID_ONE}"));
    Ok(())
}

#[tokio::test]
async fn a_second_export_is_rejected_while_one_runs() -> Result<()> {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryDocumentStore::new());
    for i in 0..50 {
        store.insert(
            "content",
            json!({"uuid": format!("00000000-0000-0000-0000-{i:012}"), "type": "Article"}),
        );
    }

    // A throttle keeps the first job running while the second request lands.
    let engine = Arc::new(FullExporter::new(
        1,
        Duration::from_millis(50),
        pipeline_for(&upstream),
    ));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("{api}/export"))
        .send()
        .await?
        .json()
        .await?;
    let job_id = first["ID"].as_str().expect("job id").to_string();

    // Wait for the job to reach RUNNING before the second attempt.
    {
        let client = client.clone();
        let api = api.clone();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let jobs: Value = client.get(format!("{api}/jobs")).send().await?.json().await?;
            if jobs.as_array().is_some_and(|jobs| !jobs.is_empty()) {
                break;
            }
            anyhow::ensure!(tokio::time::Instant::now() < deadline, "job never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let second = client.post(format!("{api}/export")).send().await?;
    assert_eq!(second.status(), reqwest::StatusCode::BAD_REQUEST);

    wait_for_finished(&client, &api, &job_id).await?;
    Ok(())
}

#[tokio::test]
async fn unknown_jobs_are_a_404() -> Result<()> {
    let upstream = spawn_upstream().await;
    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(Arc::new(MemoryDocumentStore::new()))),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;

    let response = reqwest::get(format!("{api}/jobs/missing")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Job missing not found");
    Ok(())
}

#[tokio::test]
async fn store_failure_surfaces_on_the_job() -> Result<()> {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryDocumentStore::new());
    store.set_fail_open(true);

    let engine = Arc::new(FullExporter::new(2, Duration::ZERO, pipeline_for(&upstream)));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    let job: Value = client
        .post(format!("{api}/export"))
        .send()
        .await?
        .json()
        .await?;
    let finished =
        wait_for_finished(&client, &api, job["ID"].as_str().expect("job id")).await?;

    let message = finished["ErrorMessage"].as_str().expect("error message");
    assert!(message.contains("content collection"), "got: {message}");
    assert!(upstream.state.content_requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn health_surface_reports_collaborators() -> Result<()> {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryDocumentStore::new());
    let http = HttpClient::new(Duration::from_secs(5), RetryPolicy::none()).unwrap();
    let fetcher = Arc::new(EnrichedContentFetcher::new(
        http.clone(),
        upstream.base_url.clone(),
        None,
        None,
    ));
    let writer = Arc::new(BlobWriter::new(
        http,
        upstream.base_url.clone(),
        format!("{}/__gtg", upstream.base_url),
    ));
    let source = Arc::new(MemoryMessageSource::new());

    let health = content_exporter::HealthService::new(
        "content-exporter",
        "content-exporter",
        "exports content",
    )
    .with_store_check(store.clone())
    .with_fetcher_check(fetcher.clone())
    .with_writer_check(writer.clone())
    .with_queue_check(source.clone());

    let engine = Arc::new(FullExporter::new(
        2,
        Duration::ZERO,
        Arc::new(ContentExporter::new(fetcher, writer)),
    ));
    let (bulk_lock, _signals) = locker();
    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: false,
        collection: "content".to_string(),
    });
    let app = content_exporter::web::service_router(state, health);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let api = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let report: Value = reqwest::get(format!("{api}/__health")).await?.json().await?;
    assert_eq!(report["ok"], true);
    assert_eq!(report["checks"].as_array().map(Vec::len), Some(4));

    let gtg = reqwest::get(format!("{api}/__gtg")).await?;
    assert_eq!(gtg.status(), reqwest::StatusCode::OK);
    assert_eq!(gtg.text().await?, "OK");

    // A dead queue flips good-to-go to 503.
    source.shutdown().await;
    let gtg = reqwest::get(format!("{api}/__gtg")).await?;
    assert_eq!(gtg.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn lock_handshake_pauses_incremental_for_the_whole_job() -> Result<()> {
    let upstream = spawn_upstream().await;
    *upstream.state.fetch_body.lock().unwrap() = format!(r#"{{"uuid":"{UUID_ONE}"}}"#);

    let store = Arc::new(MemoryDocumentStore::new());
    store.insert("content", json!({"uuid": UUID_ONE, "type": "Article"}));

    let pipeline = pipeline_for(&upstream);
    // A throttle keeps the job alive long enough to observe the pause.
    let engine = Arc::new(FullExporter::new(
        2,
        Duration::from_millis(500),
        pipeline.clone(),
    ));
    let (bulk_lock, signals) = locker();

    // Incremental side: a running listener with in-flight traffic.
    let source = Arc::new(MemoryMessageSource::new());
    let handler = Arc::new(ContentNotificationHandler::new(pipeline, Duration::ZERO));
    let listener = MessageListener::new(
        source.clone(),
        MessageMapper::new(Regex::new("http://methode-article-mapper/content/.*").unwrap()),
        handler,
        4,
    );
    let run = tokio::spawn(listener.clone().run(signals));

    for i in 0..5 {
        source
            .publish(content_exporter::BrokerMessage::new(
                json!({
                    "contentURI": format!("http://methode-article-mapper/content/33333333-3333-3333-3333-{i:012}"),
                    "payload": {"title": "x"},
                })
                .to_string(),
                format!("tid_{i}"),
            ))
            .await
            .unwrap();
    }

    let state = Arc::new(AppState {
        exporter: engine,
        inquirer: Arc::new(StoreInquirer::new(store)),
        locker: bulk_lock,
        incremental_enabled: true,
        collection: "content".to_string(),
    });
    let api = spawn_api(state).await;
    let client = reqwest::Client::new();

    // The handshake must complete and the job must be accepted.
    let response = client.post(format!("{api}/export")).send().await?;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    assert!(listener.is_paused());

    let job: Value = response.json().await?;
    wait_for_finished(&client, &api, job["ID"].as_str().expect("job id")).await?;

    // The job's completion releases the lock and the listener resumes.
    {
        let listener = listener.clone();
        wait_for("listener resume", move || !listener.is_paused()).await;
    }

    // New incremental traffic flows again after the release.
    let before = upstream.state.content_requests().len();
    source
        .publish(content_exporter::BrokerMessage::new(
            json!({
                "contentURI": "http://methode-article-mapper/content/44444444-4444-4444-4444-444444444444",
                "payload": {"title": "x"},
            })
            .to_string(),
            "tid_after",
        ))
        .await
        .unwrap();
    {
        let upstream_state = upstream.state.clone();
        wait_for("post-release traffic", move || {
            upstream_state.content_requests().len() > before
        })
        .await;
    }

    listener.stop().await;
    run.await?;
    Ok(())
}
