use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::model::{Playlist, PlaylistRepository, ProviderChannel, StoredChannel};
use crate::m3u::ParsedChannel;

// sqlite caps bound parameters per statement, 6 per row keeps well under it
const INSERT_BATCH_ROWS: usize = 1000;

pub struct SqlxPlaylistRepository {
    pool: SqlitePool,
}

impl SqlxPlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_channels(
        tx: &mut Transaction<'_, Sqlite>,
        playlist_id: &str,
        channels: &[ParsedChannel],
    ) -> Result<()> {
        for (batch_index, batch) in channels.chunks(INSERT_BATCH_ROWS).enumerate() {
            let offset = batch_index * INSERT_BATCH_ROWS;

            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO channels (playlist_id, position, name, url, logo, group_title) ",
            );
            builder.push_values(batch.iter().enumerate(), |mut row, (i, channel)| {
                row.push_bind(playlist_id)
                    .push_bind((offset + i) as i64)
                    .push_bind(&channel.name)
                    .push_bind(&channel.url)
                    .push_bind(&channel.logo)
                    .push_bind(&channel.group);
            });

            builder
                .build()
                .execute(&mut **tx)
                .await
                .context("Failed to insert channels")?;
        }

        Ok(())
    }
}

#[async_trait]
impl PlaylistRepository for SqlxPlaylistRepository {
    async fn create(&self, playlist: &Playlist, channels: &[ParsedChannel]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO playlists (id, provider_name, source_url, channel_count, created_at, refreshed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&playlist.id)
        .bind(&playlist.provider_name)
        .bind(&playlist.source_url)
        .bind(channels.len() as i64)
        .bind(playlist.created_at)
        .bind(playlist.refreshed_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert playlist")?;

        Self::insert_channels(&mut tx, &playlist.id, channels).await?;

        tx.commit().await?;
        debug!(
            "Stored playlist {} with {} channels",
            playlist.id,
            channels.len()
        );
        Ok(())
    }

    async fn replace_channels(
        &self,
        playlist_id: &str,
        channels: &[ParsedChannel],
        refreshed_at: i64,
    ) -> Result<Option<Playlist>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE playlists SET channel_count = ?, refreshed_at = ? WHERE id = ?",
        )
        .bind(channels.len() as i64)
        .bind(refreshed_at)
        .bind(playlist_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update playlist")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM channels WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear channels")?;

        Self::insert_channels(&mut tx, playlist_id, channels).await?;

        let playlist = sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .fetch_one(&mut *tx)
            .await?;

        // readers see the old set until this commit lands
        tx.commit().await?;
        debug!(
            "Replaced channels of playlist {} ({} channels)",
            playlist_id,
            channels.len()
        );
        Ok(Some(playlist))
    }

    async fn get(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        let playlist = sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(playlist)
    }

    async fn find_by_provider_name(&self, provider_name: &str) -> Result<Option<Playlist>> {
        let playlist = sqlx::query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE provider_name = ? ORDER BY created_at, id LIMIT 1",
        )
        .bind(provider_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(playlist)
    }

    async fn list(&self) -> Result<Vec<Playlist>> {
        let playlists =
            sqlx::query_as::<_, Playlist>("SELECT * FROM playlists ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(playlists)
    }

    async fn get_channels(&self, playlist_id: &str) -> Result<Vec<ParsedChannel>> {
        let channels = sqlx::query_as::<_, StoredChannel>(
            r#"
            SELECT name, url, logo, group_title FROM channels
            WHERE playlist_id = ?
            ORDER BY position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(channels.into_iter().map(ParsedChannel::from).collect())
    }

    async fn all_channels(&self) -> Result<Vec<ProviderChannel>> {
        // one statement, so a concurrent refresh is seen either entirely or not at all
        let channels = sqlx::query_as::<_, ProviderChannel>(
            r#"
            SELECT c.playlist_id, p.provider_name, c.name, c.url, c.logo, c.group_title
            FROM channels c
            JOIN playlists p ON p.id = c.playlist_id
            ORDER BY p.created_at, p.id, c.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    async fn delete(&self, playlist_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM channels WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}
