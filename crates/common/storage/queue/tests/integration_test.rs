// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::HashSet,
    fs::OpenOptions,
    io::Write,
    path::Path,
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use spool_common_telemetry::logging::init_default_ut_logging;
use spool_storage_queue::{
    BytesCodec, DurableQueue, FileQueue, JsonCodec, QueueBuilder, QueueError, StringCodec,
};
use tempfile::TempDir;

fn open_string_queue(path: &Path, name: &str) -> DurableQueue<String> {
    QueueBuilder::new()
        .name(name)
        .path(path)
        .codec(StringCodec)
        .build()
        .unwrap()
}

#[test]
fn test_queue_fifo_order() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let queue = open_string_queue(temp_dir.path(), "fifo");

    for i in 0..100 {
        queue.enqueue(&format!("message-{i:04}")).unwrap();
    }

    for i in 0..100 {
        assert_eq!(queue.dequeue().unwrap().unwrap(), format!("message-{i:04}"));
    }
    assert!(queue.dequeue().unwrap().is_none());

    queue.close().unwrap();
}

#[test]
fn test_queue_durability_across_reopen() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();

    {
        let queue = open_string_queue(&path, "durable");
        for i in 0..50 {
            queue.enqueue(&format!("msg-{i}")).unwrap();
        }
        for _ in 0..10 {
            queue.dequeue().unwrap();
        }
        queue.flush().unwrap();
        queue.close().unwrap();
    }

    {
        let queue = open_string_queue(&path, "durable");
        assert_eq!(queue.len().unwrap(), 40);

        let remaining: Vec<String> = queue.iter().unwrap().map(Result::unwrap).collect();
        let expected: Vec<String> = (10..50).map(|i| format!("msg-{i}")).collect();
        assert_eq!(remaining, expected);

        queue.close().unwrap();
    }
}

#[test]
fn test_key_monotonicity_across_reopen() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let mut keys = Vec::new();
    {
        let queue = open_string_queue(temp_dir.path(), "keys");
        for i in 0..5 {
            keys.push(queue.enqueue(&i.to_string()).unwrap());
        }
        queue.close().unwrap();
    }
    {
        let queue = open_string_queue(temp_dir.path(), "keys");
        assert_eq!(queue.last_key(), 5);
        for i in 5..10 {
            keys.push(queue.enqueue(&i.to_string()).unwrap());
        }
        queue.close().unwrap();
    }

    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(keys, (1..=10).collect::<Vec<u64>>());
}

#[test]
fn test_clear_resets_numbering_and_persists() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open_string_queue(temp_dir.path(), "clear");
        queue.drain_all(["a", "b", "c"].map(String::from)).unwrap();
        queue.clear().unwrap();
        assert_eq!(queue.len().unwrap(), 0);
        assert_eq!(queue.enqueue(&"d".to_string()).unwrap(), 1);
        queue.close().unwrap();
    }

    let queue = open_string_queue(temp_dir.path(), "clear");
    assert_eq!(queue.len().unwrap(), 1);
    assert_eq!(queue.dequeue().unwrap().as_deref(), Some("d"));
}

#[test]
fn test_queues_with_distinct_names_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let left = open_string_queue(temp_dir.path(), "left");
    let right = open_string_queue(temp_dir.path(), "right");

    left.enqueue(&"l".to_string()).unwrap();
    right.enqueue(&"r".to_string()).unwrap();

    assert_eq!(left.len().unwrap(), 1);
    assert_eq!(right.dequeue().unwrap().as_deref(), Some("r"));
    assert_eq!(left.dequeue().unwrap().as_deref(), Some("l"));
}

#[test]
fn test_recovery_ignores_torn_tail() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open_string_queue(temp_dir.path(), "torn");
        queue.drain_all(["one", "two"].map(String::from)).unwrap();
        queue.close().unwrap();
    }
    {
        let mut file = OpenOptions::new()
            .append(true)
            .open(temp_dir.path().join("torn"))
            .unwrap();
        file.write_all(&[0xff, 0x00, 0x00, 0x00, 0x01]).unwrap();
    }

    let queue = open_string_queue(temp_dir.path(), "torn");
    assert_eq!(queue.len().unwrap(), 2);
    assert_eq!(queue.enqueue(&"three".to_string()).unwrap(), 3);
    queue.close().unwrap();

    let queue = open_string_queue(temp_dir.path(), "torn");
    let values: Vec<String> = queue.iter().unwrap().map(Result::unwrap).collect();
    assert_eq!(values, vec!["one", "two", "three"]);
}

#[test]
fn test_concurrent_producers_and_consumers() {
    init_default_ut_logging();
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;

    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_string_queue(temp_dir.path(), "concurrent"));
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    queue.enqueue(&format!("{p}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let consumers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut taken = Vec::new();
                while let Some(value) = queue.dequeue().unwrap() {
                    taken.push(value);
                }
                taken
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for consumer in consumers {
        for value in consumer.join().unwrap() {
            assert!(seen.insert(value.clone()), "{value} delivered twice");
        }
    }
    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_per_producer_order_is_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_string_queue(temp_dir.path(), "ordered"));

    let producers: Vec<_> = (0..2)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    queue.enqueue(&format!("{p}:{i}")).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut last = [None::<u32>; 2];
    while let Some(value) = queue.dequeue().unwrap() {
        let (p, i) = value.split_once(':').unwrap();
        let (p, i): (usize, u32) = (p.parse().unwrap(), i.parse().unwrap());
        assert!(last[p].is_none_or(|prev| prev < i));
        last[p] = Some(i);
    }
    assert_eq!(last, [Some(199), Some(199)]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DeviceEvent {
    device_id: String,
    kind:      String,
    value:     i64,
}

#[test]
fn test_json_codec_queue() {
    let temp_dir = TempDir::new().unwrap();
    let events: Vec<DeviceEvent> = (0..3)
        .map(|i| DeviceEvent {
            device_id: format!("device-{i}"),
            kind:      "temperature".to_string(),
            value:     20 + i,
        })
        .collect();

    {
        let queue = QueueBuilder::new()
            .name("events")
            .path(temp_dir.path())
            .codec(JsonCodec::<DeviceEvent>::new())
            .build()
            .unwrap();
        queue.drain_all(&events).unwrap();
        assert!(queue.contains(&events[1]).unwrap());
        queue.close().unwrap();
    }

    let queue = QueueBuilder::new()
        .name("events")
        .path(temp_dir.path())
        .codec(JsonCodec::<DeviceEvent>::new())
        .build()
        .unwrap();
    for event in &events {
        assert_eq!(&queue.require_dequeue().unwrap(), event);
    }
    assert!(matches!(
        queue.require_dequeue(),
        Err(QueueError::NoSuchElement { .. })
    ));
}

#[test]
fn test_bytes_codec_queue() {
    let temp_dir = TempDir::new().unwrap();
    let queue = QueueBuilder::new()
        .name("raw")
        .path(temp_dir.path())
        .codec(BytesCodec)
        .build()
        .unwrap();

    let payload = Bytes::from(vec![0xABu8; 4096]);
    queue.enqueue(&payload).unwrap();
    assert!(queue.contains_raw(&payload).unwrap());
    assert_eq!(queue.peek().unwrap(), Some(payload.clone()));
    assert_eq!(queue.dequeue().unwrap(), Some(payload));
}

#[test]
fn test_large_drain_compacts_and_survives_reopen() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("large");

    {
        let queue = open_string_queue(temp_dir.path(), "large");
        for i in 0..5000 {
            queue.enqueue(&format!("value-{i}")).unwrap();
        }
        queue.flush().unwrap();
        let full_size = std::fs::metadata(&file).unwrap().len();

        for _ in 0..4990 {
            queue.dequeue().unwrap().unwrap();
        }
        queue.close().unwrap();
        assert!(std::fs::metadata(&file).unwrap().len() < full_size);
    }

    let queue = open_string_queue(temp_dir.path(), "large");
    assert_eq!(queue.len().unwrap(), 10);
    assert_eq!(queue.peek().unwrap().as_deref(), Some("value-4990"));
    assert_eq!(queue.enqueue(&"next".to_string()).unwrap(), 5001);
}

#[test]
fn test_dequeue_survives_blocked_compaction() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("events.compact");

    {
        let queue = open_string_queue(temp_dir.path(), "events");
        for i in 0..1024 {
            queue.enqueue(&format!("value-{i}")).unwrap();
        }
        std::fs::create_dir(&blocker).unwrap();

        for i in 0..400 {
            assert_eq!(queue.dequeue().unwrap(), Some(format!("value-{i}")));
        }
        assert_eq!(queue.len().unwrap(), 624);
        queue.close().unwrap();
    }

    {
        let queue = open_string_queue(temp_dir.path(), "events");
        assert_eq!(queue.len().unwrap(), 624);
        queue.close().unwrap();
    }

    std::fs::remove_dir(&blocker).unwrap();
    let queue = open_string_queue(temp_dir.path(), "events");
    assert_eq!(queue.len().unwrap(), 624);
    assert_eq!(queue.peek().unwrap().as_deref(), Some("value-400"));
    assert_eq!(queue.enqueue(&"next".to_string()).unwrap(), 1025);
    assert!(!blocker.exists());
}

#[test]
fn test_overlapping_producers_and_consumers_deliver_once() {
    init_default_ut_logging();
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_string_queue(temp_dir.path(), "overlap"));
    let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));
    let done = Arc::new(AtomicBool::new(false));

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            let done = done.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut taken = Vec::new();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    match queue.dequeue().unwrap() {
                        Some(value) => taken.push(value),
                        None if finished => break,
                        None => thread::yield_now(),
                    }
                }
                taken
            })
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    queue.enqueue(&format!("{p}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let mut seen = HashSet::new();
    for consumer in consumers {
        let taken = consumer.join().unwrap();
        let mut last_seen = [None; PRODUCERS];
        for value in taken {
            let (p, i) = value.split_once('-').unwrap();
            let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
            assert!(last_seen[p] < Some(i), "{value} taken out of order");
            last_seen[p] = Some(i);
            assert!(seen.insert(value.clone()), "{value} delivered twice");
        }
    }
    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_close_racing_consumers_loses_nothing() {
    init_default_ut_logging();
    const TOTAL: usize = 2000;
    const CONSUMERS: usize = 4;

    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_string_queue(temp_dir.path(), "closing"));
    for i in 0..TOTAL {
        queue.enqueue(&format!("value-{i}")).unwrap();
    }

    let barrier = Arc::new(Barrier::new(CONSUMERS + 1));
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut taken = Vec::new();
                loop {
                    match queue.dequeue() {
                        Ok(Some(value)) => taken.push(value),
                        Ok(None) => thread::yield_now(),
                        Err(QueueError::Closed { .. }) => break,
                        Err(error) => panic!("unexpected dequeue error: {error}"),
                    }
                }
                taken
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(5));
    queue.close().unwrap();

    let mut seen = HashSet::new();
    for consumer in consumers {
        for value in consumer.join().unwrap() {
            assert!(seen.insert(value.clone()), "{value} delivered twice");
        }
    }

    let reopened = open_string_queue(temp_dir.path(), "closing");
    while let Some(value) = reopened.dequeue().unwrap() {
        assert!(seen.insert(value.clone()), "{value} both delivered and retained");
    }
    assert_eq!(seen.len(), TOTAL);
}

#[test]
fn test_flush_alone_is_durable() {
    init_default_ut_logging();
    let temp_dir = TempDir::new().unwrap();

    let queue = open_string_queue(temp_dir.path(), "flushed");
    for i in 0..10 {
        queue.enqueue(&format!("value-{i}")).unwrap();
    }
    assert_eq!(queue.dequeue().unwrap().as_deref(), Some("value-0"));
    queue.flush().unwrap();
    std::mem::forget(queue);

    let queue = open_string_queue(temp_dir.path(), "flushed");
    assert_eq!(queue.len().unwrap(), 9);
    assert_eq!(queue.peek().unwrap().as_deref(), Some("value-1"));
    assert_eq!(queue.enqueue(&"value-10".to_string()).unwrap(), 11);
}
