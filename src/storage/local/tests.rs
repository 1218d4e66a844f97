use super::*;

#[tokio::test]
async fn test_put_writes_object_and_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path(), "messaging-media");

    let reference = store
        .put("org1/msg42", b"\xFF\xD8\xFFimage", "image/jpeg")
        .await
        .unwrap();
    assert_eq!(reference.bucket, "messaging-media");
    assert_eq!(reference.key, "org1/msg42");
    assert_eq!(reference.content_type, "image/jpeg");

    let path = dir.path().join("messaging-media").join("org1").join("msg42");
    assert!(path.exists());

    let (bytes, ct) = store.read("org1/msg42").unwrap();
    assert_eq!(bytes, b"\xFF\xD8\xFFimage");
    assert_eq!(ct, "image/jpeg");
}

#[tokio::test]
async fn test_put_overwrites_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path(), "messaging-media");

    store.put("org1/m", b"first", "text/plain").await.unwrap();
    store
        .put("org1/m", b"second", "application/pdf")
        .await
        .unwrap();

    let (bytes, ct) = store.read("org1/m").unwrap();
    assert_eq!(bytes, b"second");
    assert_eq!(ct, "application/pdf");
}

#[test]
fn test_object_path_cannot_escape_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(dir.path(), "b");
    let path = store.object_path("../../etc/passwd");
    assert!(path.starts_with(dir.path().join("b")));
    assert!(!path.components().any(|c| c == std::path::Component::ParentDir));
}

#[tokio::test]
async fn test_put_failure_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the bucket directory should be
    std::fs::write(dir.path().join("blocked"), b"x").unwrap();
    let store = LocalObjectStore::new(dir.path(), "blocked");

    let err = store.put("org1/m", b"data", "image/png").await.unwrap_err();
    assert!(matches!(err, RelayError::Storage(_)));
}
