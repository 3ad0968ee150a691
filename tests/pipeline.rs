use batch_harvest::codec::encode_record_batch;
use batch_harvest::lifecycle::BatchProgress;
use batch_harvest::{
    Batcher, BatchStatus, ClientConfig, MockHttpClient, PipelineStage, PollPolicy,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Output-file payload with `bad` of `total` records carrying non-JSON content.
fn output_payload(total: usize, bad: &[usize]) -> String {
    let records: Vec<Value> = (0..total)
        .map(|i| {
            let content = if bad.contains(&i) {
                "I'm sorry, I can't do that.".to_string()
            } else {
                json!({"index": i, "label": "ok"}).to_string()
            };
            json!({
                "id": format!("batch_req_{}", i),
                "custom_id": format!("request-{}", i),
                "response": {
                    "status_code": 200,
                    "request_id": format!("req_{}", i),
                    "body": {
                        "object": "chat.completion",
                        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
                    }
                },
                "error": null
            })
        })
        .collect();
    encode_record_batch(&records).unwrap()
}

fn batch_json(status: &str, completed: u64, total: u64, output: Option<&str>) -> String {
    json!({
        "id": "batch_e2e",
        "object": "batch",
        "endpoint": "/v1/chat/completions",
        "input_file_id": "file-in",
        "completion_window": "24h",
        "status": status,
        "output_file_id": output,
        "error_file_id": null,
        "request_counts": {"total": total, "completed": completed, "failed": 0}
    })
    .to_string()
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_full_pipeline_with_mock_client() {
    let mock = MockHttpClient::new();
    mock.add_ok(
        "POST /files",
        r#"{"id":"file-in","object":"file","purpose":"batch","filename":"requests.jsonl"}"#,
    );
    mock.add_ok("POST /batches", batch_json("validating", 0, 0, None));
    mock.add_ok("GET /batches/batch_e2e", batch_json("in_progress", 3, 10, None));
    mock.add_ok("GET /batches/batch_e2e", batch_json("finalizing", 10, 10, None));
    mock.add_ok(
        "GET /batches/batch_e2e",
        batch_json("completed", 10, 10, Some("file-out")),
    );
    mock.add_ok("GET /files/file-out/content", output_payload(10, &[2, 5, 8]));

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("requests.jsonl");
    std::fs::write(&input, "{\"custom_id\":\"request-0\"}\n").unwrap();
    let output_dir = dir.path().join("output");

    let seen = Arc::new(Mutex::new(Vec::<BatchProgress>::new()));
    let sink = seen.clone();
    let batcher = Batcher::new(Arc::new(mock.clone()), PollPolicy::default())
        .with_progress(Arc::new(move |p: &BatchProgress| sink.lock().push(p.clone())));

    let report = batcher.run(&input, &output_dir).await.unwrap();

    assert_eq!(report.stage, PipelineStage::Extracted);
    assert_eq!(report.batch.status, BatchStatus::Completed);
    assert!(report.harvest.succeeded());

    let harvested = report.harvest.file().unwrap();
    assert_eq!(harvested.path, output_dir.join("file-out.jsonl"));
    assert_eq!(harvested.records, 10);

    let extraction = report.extraction.unwrap();
    assert_eq!(extraction.target, output_dir.join("_file-out.jsonl"));
    assert_eq!(extraction.extracted, 7);
    assert_eq!(extraction.failed, 3);

    let extracted: Vec<Value> = std::fs::read_to_string(&extraction.target)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let indices: Vec<u64> = extracted
        .iter()
        .map(|v| v["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 3, 4, 6, 7, 9]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|w| w[0].completed <= w[1].completed));
    assert!(seen.iter().all(|p| p.completed <= p.total));
}

#[test_log::test(tokio::test)]
async fn test_full_pipeline_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"id":"file-in","object":"file","purpose":"batch"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/batches"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(batch_json("validating", 0, 0, None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    // First poll sees the batch still running, every later poll sees it done
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_e2e"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(batch_json("in_progress", 1, 4, None)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/batches/batch_e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_json(
            "completed",
            4,
            4,
            Some("file-out"),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/files/file-out/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string(output_payload(4, &[])))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(format!("{}/v1", server.uri()), "sk-test")
        .with_poll_policy(PollPolicy::default().with_interval_ms(10));
    let batcher = Batcher::from_config(&config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("requests.jsonl");
    std::fs::write(&input, "{\"custom_id\":\"request-0\"}\n").unwrap();

    let report = batcher.run(&input, dir.path()).await.unwrap();

    assert_eq!(report.stage, PipelineStage::Extracted);
    let extraction = report.extraction.unwrap();
    assert_eq!(extraction.extracted, 4);
    assert_eq!(extraction.failed, 0);
}

#[tokio::test]
async fn test_listing_endpoints() {
    let mock = MockHttpClient::new();
    mock.add_ok(
        "GET /files?purpose=batch",
        r#"{"object":"list","data":[{"id":"file-in","purpose":"batch"}]}"#,
    );
    mock.add_ok(
        "GET /batches",
        format!(r#"{{"object":"list","data":[{}]}}"#, batch_json("completed", 1, 1, Some("file-out"))),
    );

    let batcher = Batcher::new(Arc::new(mock), PollPolicy::default());
    let files = batcher.list_files().await.unwrap();
    assert_eq!(files[0].id.to_string(), "file-in");
    let batches = batcher.list_batches().await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].status, BatchStatus::Completed);
}
