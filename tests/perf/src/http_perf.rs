use crate::memory_storage;
use axum::http::StatusCode;
use blobstorage::{AppState, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Start a test server in the background
async fn start_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let state = AppState {
        storage: memory_storage(256 * 1024),
    };
    let router = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 0)); // Random port
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", bound_addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (base_url, handle)
}

#[tokio::test]
async fn http_save_vs_block_upload_latency() {
    let (base_url, _server) = start_test_server().await;
    let client = reqwest::Client::new();

    let sizes = vec![
        ("1KB", 1024),
        ("100KB", 100 * 1024),
        ("1MB", 1024 * 1024),
        ("4MB", 4 * 1024 * 1024),
    ];

    println!("\n=== HTTP Save vs Block Upload Latency ===");

    for (name, size) in sizes {
        let data = vec![0xAB; size];

        let url = format!("{}/blobs/saved-{}", base_url, name);
        let start = Instant::now();
        let response = client.put(&url).body(data.clone()).send().await.unwrap();
        let save_time = start.elapsed();
        assert_eq!(response.status(), StatusCode::CREATED);

        let url = format!("{}/blobs/uploaded-{}", base_url, name);
        let start = Instant::now();
        let response = client.post(&url).body(data).send().await.unwrap();
        let upload_time = start.elapsed();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["size"], size);

        println!("{}: save {:?}, block upload {:?}", name, save_time, upload_time);
    }
}

#[tokio::test]
async fn http_get_latency() {
    let (base_url, _server) = start_test_server().await;
    let client = reqwest::Client::new();

    let sizes = vec![
        ("1KB", 1024),
        ("100KB", 100 * 1024),
        ("1MB", 1024 * 1024),
    ];

    println!("\n=== HTTP GET Latency ===");

    for (name, size) in &sizes {
        let data = vec![0xAB; *size];
        let url = format!("{}/blobs/test-{}", base_url, name);

        // Pre-populate through the block writer
        client.post(&url).body(data).send().await.unwrap();

        // Measure GET
        let start = Instant::now();
        let response = client.get(&url).send().await.unwrap();
        let bytes = response.bytes().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(bytes.len(), *size);

        println!("{}: {:?} ({:.2} MB/s)",
                 name,
                 elapsed,
                 *size as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64());
    }
}

#[tokio::test]
async fn http_delete_latency() {
    let (base_url, _server) = start_test_server().await;
    let client = reqwest::Client::new();
    let data = vec![0xAB; 1024];

    println!("\n=== HTTP DELETE Latency ===");

    let mut total = std::time::Duration::ZERO;
    let iterations = 10;

    for i in 0..iterations {
        let url = format!("{}/blobs/delete-test-{}", base_url, i);

        // Pre-populate
        client.put(&url).body(data.clone()).send().await.unwrap();

        // Measure DELETE
        let start = Instant::now();
        let response = client.delete(&url).send().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        total += elapsed;
    }

    let avg = total / iterations;
    println!("Average: {:?}", avg);
}

#[tokio::test]
async fn http_concurrent_uploads() {
    let (base_url, _server) = start_test_server().await;
    let client = Arc::new(reqwest::Client::new());
    let num_requests = 50;
    let data = vec![0xAB; 512 * 1024]; // 512KB per request, 2 blocks

    println!("\n=== HTTP Concurrent Block Uploads ===");

    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for i in 0..num_requests {
        let client = Arc::clone(&client);
        let base_url = base_url.clone();
        let data = data.clone();

        tasks.spawn(async move {
            let url = format!("{}/blobs/concurrent-{}", base_url, i);
            client.post(&url).body(data).send().await.unwrap()
        });
    }

    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.unwrap().status(), StatusCode::CREATED);
    }

    let elapsed = start.elapsed();
    let ops_per_sec = num_requests as f64 / elapsed.as_secs_f64();

    println!("Requests: {}", num_requests);
    println!("Total time: {:?}", elapsed);
    println!("Throughput: {:.2} req/sec", ops_per_sec);
    println!("Avg latency: {:.2}ms", elapsed.as_millis() as f64 / num_requests as f64);
}
