use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::model::{NewVideo, Video};

/// Persistence for video rows. The pipeline only ever reads ids and file
/// references from it and writes back the thumbnail column.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: NewVideo) -> Result<Video>;

    async fn get(&self, id: i64) -> Result<Option<Video>>;

    async fn exists(&self, id: i64) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Video>>;

    /// Updates only the thumbnail column. Returns `false` when the row is gone.
    async fn set_thumbnail(&self, id: i64, thumbnail: &str) -> Result<bool>;

    /// Deletes the row and hands back what was deleted.
    async fn delete(&self, id: i64) -> Result<Option<Video>>;
}

pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoStore for PgVideoRepository {
    async fn insert(&self, video: NewVideo) -> Result<Video> {
        let video = sqlx::query_as::<_, Video>(
            r#"
            INSERT INTO videos (title, description, category, video_file, thumbnail)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(video.title)
        .bind(video.description)
        .bind(video.category)
        .bind(video.video_file)
        .bind(video.thumbnail)
        .fetch_one(&self.pool)
        .await?;

        Ok(video)
    }

    async fn get(&self, id: i64) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM videos WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn list(&self) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>("SELECT * FROM videos ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(videos)
    }

    async fn set_thumbnail(&self, id: i64, thumbnail: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET thumbnail = $1 WHERE id = $2")
            .bind(thumbnail)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>("DELETE FROM videos WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryVideoStore {
    videos: RwLock<BTreeMap<i64, Video>>,
    last_id: AtomicI64,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row under a caller-chosen id; later inserts continue after it.
    #[doc(hidden)]
    pub async fn insert_with_id(&self, id: i64, video: NewVideo) -> Video {
        self.last_id.fetch_max(id, Ordering::SeqCst);
        let video = Self::row(id, video);
        self.videos.write().await.insert(id, video.clone());
        video
    }

    fn row(id: i64, video: NewVideo) -> Video {
        Video {
            id,
            created_at: OffsetDateTime::now_utc().date(),
            title: video.title,
            description: video.description,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            category: video.category,
        }
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn insert(&self, video: NewVideo) -> Result<Video> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let video = Self::row(id, video);
        self.videos.write().await.insert(id, video.clone());
        Ok(video)
    }

    async fn get(&self, id: i64) -> Result<Option<Video>> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        Ok(self.videos.read().await.contains_key(&id))
    }

    async fn list(&self) -> Result<Vec<Video>> {
        Ok(self.videos.read().await.values().rev().cloned().collect())
    }

    async fn set_thumbnail(&self, id: i64, thumbnail: &str) -> Result<bool> {
        let mut videos = self.videos.write().await;
        match videos.get_mut(&id) {
            Some(video) => {
                video.thumbnail = Some(thumbnail.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<Option<Video>> {
        Ok(self.videos.write().await.remove(&id))
    }
}
