use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: i64,
}

pub type DynUserRepository = Arc<dyn UserRepository + Send + Sync>;

#[automock]
#[async_trait]
pub trait UserRepository {
    async fn create(&self, user: &User) -> Result<()>;

    /// Inserts the user only while the table is empty, returns false otherwise.
    /// Check and insert share one transaction so two setups can't both win.
    async fn create_first(&self, user: &User) -> Result<bool>;

    async fn get(&self, user_id: &str) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn list(&self) -> Result<Vec<User>>;
    async fn count(&self) -> Result<i64>;
    async fn delete(&self, user_id: &str) -> Result<bool>;
}
