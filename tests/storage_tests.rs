use sacco_cms::storage::{LocalStorage, MockStorageService, StorageError, StorageService};
use std::path::PathBuf;
use uuid::Uuid;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("sacco-cms-storage-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success_records_url() {
        let mock = MockStorageService::new();
        let stored = mock.save("news", "cover.jpg", b"JPEG").await.unwrap();

        assert!(stored.url.starts_with("/static/uploads/news/"));
        assert!(stored.url.ends_with("_cover.jpg"));
        assert_eq!(stored.file_type(), "JPG");
        assert_eq!(mock.saved().await, vec![stored.url]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        let result = mock.save("news", "cover.jpg", b"JPEG").await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(mock.saved().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_remove_forgets_url() {
        let mock = MockStorageService::new();
        let kept = mock.save("news", "a.jpg", b"A").await.unwrap();
        let dropped = mock.save("news", "b.jpg", b"B").await.unwrap();

        mock.remove(&dropped.url).await.unwrap();
        assert_eq!(mock.saved().await, vec![kept.url]);
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        let stored = mock.save("forms", "../../etc/passwd", b"x").await.unwrap();
        assert!(!stored.url.contains(".."));
        assert!(stored.url.ends_with("_passwd"));
    }
}

#[cfg(test)]
mod local_tests {
    use super::*;

    #[tokio::test]
    async fn test_local_storage_writes_under_folder() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root);

        let stored = storage
            .save("forms", "Loan Form.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        let file_name = stored.url.rsplit('/').next().unwrap();
        assert!(stored.url.starts_with("/static/uploads/forms/"));
        assert!(file_name.ends_with("_Loan_Form.pdf"));
        assert_eq!(stored.size_bytes, 8);
        assert_eq!(stored.file_type(), "PDF");

        let on_disk = tokio::fs::read(root.join("forms").join(file_name)).await.unwrap();
        assert_eq!(on_disk, b"%PDF-1.4");

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_same_name_never_overwrites() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root);

        let first = storage.save("slider", "a.png", b"one").await.unwrap();
        let second = storage.save("slider", "a.png", b"two").await.unwrap();
        assert_ne!(first.url, second.url);

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root);
        let result = storage.save("slider", "empty.png", b"").await;
        assert!(matches!(result, Err(StorageError::EmptyFile(name)) if name == "empty.png"));
    }

    #[tokio::test]
    async fn test_remove_deletes_stored_file() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root);

        let stored = storage.save("forms", "loan.pdf", b"%PDF").await.unwrap();
        let file_name = stored.url.rsplit('/').next().unwrap().to_string();
        assert!(root.join("forms").join(&file_name).is_file());

        storage.remove(&stored.url).await.unwrap();
        assert!(!root.join("forms").join(&file_name).exists());

        // Already gone, or never ours: both are fine.
        storage.remove(&stored.url).await.unwrap();
        storage.remove("https://cdn.example.com/x.png").await.unwrap();

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_ensure_folders_creates_each_folder() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root);
        let folders = sacco_cms::schema::upload_folders();

        storage.ensure_folders(&folders).await.unwrap();
        for folder in folders {
            assert!(root.join(folder).is_dir(), "{folder} missing");
        }

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
