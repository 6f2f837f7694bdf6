use crate::memory_storage;
use blobstorage_core::{AzureStorage, OpenMode};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

fn write_blocks(storage: &AzureStorage, name: &str, data: &[u8], piece: usize) {
    let mut file = storage.open(name, OpenMode::Write).unwrap();
    for chunk in data.chunks(piece) {
        file.write_content(chunk).unwrap();
    }
    file.close().unwrap();
}

/// Test concurrent block writers on different blobs
#[tokio::test]
async fn concurrent_writers_different_blobs() {
    let storage = memory_storage(64 * 1024);
    let num_tasks = 100;
    let data = Arc::new(vec![0xAB; 256 * 1024]); // 256KB per blob, 4 blocks

    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for i in 0..num_tasks {
        let storage = Arc::clone(&storage);
        let data = Arc::clone(&data);
        tasks.spawn_blocking(move || {
            let name = format!("object-{}", i);
            write_blocks(&storage, &name, &data, 8 * 1024);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let elapsed = start.elapsed();
    let ops_per_sec = num_tasks as f64 / elapsed.as_secs_f64();

    for i in (0..num_tasks).step_by(25) {
        assert_eq!(storage.size(&format!("object-{}", i)).unwrap(), 256 * 1024);
    }

    println!("\n=== Concurrent Block Writers (Different Blobs) ===");
    println!("Tasks: {}", num_tasks);
    println!("Total time: {:?}", elapsed);
    println!("Throughput: {:.2} blobs/sec", ops_per_sec);
    println!("Avg latency: {:.2}ms", elapsed.as_millis() as f64 / num_tasks as f64);
}

/// Test concurrent reads of the same blob
#[tokio::test]
async fn concurrent_reads_same_blob() {
    let storage = memory_storage(64 * 1024);
    let data = vec![0xAB; 100 * 1024]; // 100KB blob
    storage.save("shared-object", &mut Cursor::new(data)).unwrap();

    let num_tasks = 100;
    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for _ in 0..num_tasks {
        let storage = Arc::clone(&storage);
        tasks.spawn_blocking(move || {
            let mut file = storage.open("shared-object", OpenMode::Read).unwrap();
            assert_eq!(file.read_content().unwrap().len(), 100 * 1024);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let elapsed = start.elapsed();
    let ops_per_sec = num_tasks as f64 / elapsed.as_secs_f64();

    println!("\n=== Concurrent Reads (Same Blob) ===");
    println!("Tasks: {}", num_tasks);
    println!("Blob size: 100KB");
    println!("Total time: {:?}", elapsed);
    println!("Throughput: {:.2} ops/sec", ops_per_sec);
}

/// Test mixed workload: block writes, saves, reads, deletes
#[tokio::test]
async fn mixed_workload() {
    let storage = memory_storage(4 * 1024);
    let data = Arc::new(vec![0xAB; 10 * 1024]); // 10KB per blob

    for i in 0..50 {
        let name = format!("existing-{}", i);
        storage.save(&name, &mut Cursor::new(data.as_slice())).unwrap();
    }

    let num_tasks = 100;
    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for i in 0..num_tasks {
        let storage = Arc::clone(&storage);
        let data = Arc::clone(&data);

        tasks.spawn_blocking(move || match i % 10 {
            // 30% block writes (0-2)
            0..=2 => write_blocks(&storage, &format!("new-{}", i), &data, 1024),
            // 20% single-request saves (3-4)
            3..=4 => {
                storage
                    .save(&format!("saved-{}", i), &mut Cursor::new(data.as_slice()))
                    .unwrap();
            }
            // 30% reads (5-7)
            5..=7 => {
                let _ = storage
                    .open(&format!("existing-{}", i % 50), OpenMode::Read)
                    .and_then(|mut file| file.read_content());
            }
            // 20% deletes (8-9)
            _ => {
                let _ = storage.delete(&format!("existing-{}", i % 50));
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let elapsed = start.elapsed();
    let ops_per_sec = num_tasks as f64 / elapsed.as_secs_f64();

    println!("\n=== Mixed Workload ===");
    println!("Tasks: {}", num_tasks);
    println!("Mix: 30% block writes, 20% saves, 30% reads, 20% deletes");
    println!("Total time: {:?}", elapsed);
    println!("Throughput: {:.2} ops/sec", ops_per_sec);
}

/// Large blobs through the block writer, by block size
#[tokio::test]
async fn large_blob_block_sizes() {
    let size = 16 * 1024 * 1024;
    let data = vec![0xAB; size];

    println!("\n=== Large Blob Block Sizes (16MB) ===");

    for (name, buffer_size) in [("64KB", 64 * 1024), ("1MB", 1024 * 1024), ("4MB", 4 * 1024 * 1024)] {
        let storage = memory_storage(buffer_size);

        let start = Instant::now();
        write_blocks(&storage, "large", &data, 256 * 1024);
        let write_time = start.elapsed();

        let start = Instant::now();
        let mut file = storage.open("large", OpenMode::Read).unwrap();
        let retrieved = file.read_content().unwrap();
        let read_time = start.elapsed();

        assert_eq!(retrieved.len(), size);

        println!("\n{} blocks ({} blocks):", name, size.div_ceil(buffer_size));
        println!("  WRITE: {:?} ({:.2} MB/s)",
                 write_time,
                 size as f64 / (1024.0 * 1024.0) / write_time.as_secs_f64());
        println!("  READ: {:?} ({:.2} MB/s)",
                 read_time,
                 size as f64 / (1024.0 * 1024.0) / read_time.as_secs_f64());
    }
}
