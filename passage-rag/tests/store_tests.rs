//! Index artifact persistence on disk.

use passage_rag::{Index, IndexMetadata, IndexStore, JsonIndexStore, Passage, RagError};

fn sample_index() -> Index {
    let metadata = IndexMetadata {
        total_chunks: 3,
        chunk_size: 500,
        overlap: 50,
        embedding_model: "text-search-doc".into(),
        query_model: Some("text-search-query".into()),
        embedding_dimension: 4,
        total_tokens_used: 1234,
    };
    let passages = vec![
        Passage {
            id: 0,
            text: "Первый абзац.".into(),
            char_start: 0,
            char_end: 13,
            embedding: vec![0.1, -0.333_333_34, 1.0e-7, 0.987_654_3],
        },
        Passage {
            id: 1,
            text: "Degraded passage".into(),
            char_start: 8,
            char_end: 24,
            embedding: Vec::new(),
        },
        Passage {
            id: 2,
            text: "Last \"quoted\" one".into(),
            char_start: 20,
            char_end: 37,
            embedding: vec![0.031_25, -0.25, 12.75, 0.5],
        },
    ];
    Index::new(metadata, passages).unwrap()
}

#[tokio::test]
async fn save_then_load_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc_index.json");
    let index = sample_index();

    JsonIndexStore.save(&index, &path).await.unwrap();
    let loaded = JsonIndexStore.load(&path).await.unwrap();

    assert_eq!(loaded, index);
    assert_eq!(loaded.failed_passages(), vec![1]);
    for (a, b) in loaded.passages().iter().zip(index.passages()) {
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.embedding), bits(&b.embedding));
    }
}

#[tokio::test]
async fn artifact_is_self_describing_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc_index.json");
    JsonIndexStore.save(&sample_index(), &path).await.unwrap();

    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["metadata"]["total_chunks"], 3);
    assert_eq!(value["metadata"]["embedding_model"], "text-search-doc");
    assert_eq!(value["passages"][0]["text"], "Первый абзац.");
    assert_eq!(value["passages"][1]["embedding"], serde_json::json!([]));
    assert!(!dir.path().join("doc_index.json.tmp").exists());
}

#[tokio::test]
async fn save_replaces_existing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc_index.json");
    tokio::fs::write(&path, "stale").await.unwrap();

    JsonIndexStore.save(&sample_index(), &path).await.unwrap();
    assert_eq!(JsonIndexStore.load(&path).await.unwrap(), sample_index());
}

#[tokio::test]
async fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JsonIndexStore.load(&dir.path().join("absent.json")).await.unwrap_err();
    assert!(matches!(err, RagError::Io { .. }));
}

#[tokio::test]
async fn save_into_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("doc_index.json");
    let err = JsonIndexStore.save(&sample_index(), &path).await.unwrap_err();
    assert!(matches!(err, RagError::Io { .. }));
}

#[tokio::test]
async fn load_rejects_malformed_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");

    tokio::fs::write(&path, "{ not json").await.unwrap();
    assert!(matches!(JsonIndexStore.load(&path).await, Err(RagError::IndexFormatError(_))));

    let inconsistent = serde_json::json!({
        "metadata": {
            "total_chunks": 2, "chunk_size": 500, "overlap": 50,
            "embedding_model": "doc", "embedding_dimension": 2, "total_tokens_used": 0
        },
        "passages": [
            { "id": 0, "text": "a", "embedding": [1.0, 0.0], "char_start": 0, "char_end": 1 }
        ]
    });
    tokio::fs::write(&path, inconsistent.to_string()).await.unwrap();
    let err = JsonIndexStore.load(&path).await.unwrap_err();
    assert!(matches!(err, RagError::IndexFormatError(_)));
    assert!(err.to_string().contains("declares 2 chunks"));
}
