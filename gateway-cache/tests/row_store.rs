use gateway_cache::{CacheProtocol, RowStore};

async fn protocol() -> CacheProtocol {
    let row = RowStore::connect("sqlite::memory:").await.unwrap();
    let protocol = CacheProtocol::new(row, None, 3600);
    protocol.migrate().await.unwrap();
    protocol
}

#[tokio::test]
async fn miss_then_hit_after_write() {
    let protocol = protocol().await;
    let key = "llm:cache:m1:abc:def";

    let miss = protocol.read(key, "m1", "abc", "def").await;
    assert!(miss.output.is_none());
    assert!(!miss.cached);

    protocol.write(key, "m1", "hello", "abc", "def", "world").await;

    let hit = protocol.read(key, "m1", "abc", "def").await;
    assert_eq!(hit.output.as_deref(), Some("world"));
    assert!(hit.cached);
}

#[tokio::test]
async fn write_is_idempotent_under_unique_key() {
    let protocol = protocol().await;
    let key = "llm:cache:m1:abc:def";
    protocol.write(key, "m1", "hello", "abc", "def", "first").await;
    protocol.write(key, "m1", "hello", "abc", "def", "second").await;

    let hit = protocol.read(key, "m1", "abc", "def").await;
    assert_eq!(hit.output.as_deref(), Some("first"));
}

#[tokio::test]
async fn empty_output_is_never_written() {
    let protocol = protocol().await;
    let key = "llm:cache:m1:abc:def";
    protocol.write(key, "m1", "hello", "abc", "def", "").await;
    let miss = protocol.read(key, "m1", "abc", "def").await;
    assert!(miss.output.is_none());
}

#[tokio::test]
async fn distinct_fingerprints_are_distinct_entries() {
    let protocol = protocol().await;
    protocol.write("llm:cache:m1:a:p1", "m1", "hello", "a", "p1", "out-1").await;
    protocol.write("llm:cache:m1:a:p2", "m1", "hello", "a", "p2", "out-2").await;

    assert_eq!(protocol.read("llm:cache:m1:a:p1", "m1", "a", "p1").await.output.as_deref(), Some("out-1"));
    assert_eq!(protocol.read("llm:cache:m1:a:p2", "m1", "a", "p2").await.output.as_deref(), Some("out-2"));
}
