//! Repository layer: async trait abstractions over Postgres (sqlx) with
//! in-memory fallbacks used for development without a database and for tests.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AppError, Card, User};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<User, AppError>;
    async fn update(&self, user: User) -> Result<User, AppError>;
}

#[async_trait]
pub trait CardRepository: Send + Sync {
    async fn create(&self, card: Card) -> Result<Card, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Card, AppError>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Card>, AppError>;
    async fn list(&self) -> Result<Vec<Card>, AppError>;
    /// Lookup used by the duplicate-company checks; absence is not an error.
    async fn find_by_company_name(&self, name: &str) -> Result<Option<Card>, AppError>;
    async fn update(&self, card: Card) -> Result<Card, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
    /// Drops every card; only the reseed path calls this.
    async fn clear(&self) -> Result<(), AppError>;
}

fn map_unique(e: sqlx::Error, conflict: &str) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AppError::Conflict(conflict.to_string());
        }
    }
    AppError::Internal(e.to_string())
}

fn row_to_user(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        biz: row.get("biz"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_card(row: &PgRow) -> Card {
    Card {
        id: row.get("id"),
        company_name: row.get("company_name"),
        company_description: row.get("company_description"),
        company_address: row.get("company_address"),
        company_phone: row.get("company_phone"),
        company_photo: row.get("company_photo"),
        card_number: row.get("card_number"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: User) -> Result<User, AppError> {
        let row = sqlx::query(
            r#"INSERT INTO users (id, name, email, password_hash, biz, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, name, email, password_hash, biz, created_at, updated_at"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.biz)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "email already exists"))?;
        Ok(row_to_user(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        let row = sqlx::query(
            r#"SELECT id, name, email, password_hash, biz, created_at, updated_at
               FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
        Ok(row_to_user(&row))
    }

    async fn find_by_email(&self, email: &str) -> Result<User, AppError> {
        let row = sqlx::query(
            r#"SELECT id, name, email, password_hash, biz, created_at, updated_at
               FROM users WHERE lower(email) = lower($1)"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
        Ok(row_to_user(&row))
    }

    async fn update(&self, user: User) -> Result<User, AppError> {
        let row = sqlx::query(
            r#"UPDATE users SET name = $2, email = $3, password_hash = $4, biz = $5, updated_at = $6
               WHERE id = $1
               RETURNING id, name, email, password_hash, biz, created_at, updated_at"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.biz)
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique(e, "email already exists"))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
        Ok(row_to_user(&row))
    }
}

#[derive(Clone)]
pub struct PostgresCardRepository {
    pool: PgPool,
}

impl PostgresCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CARD_COLUMNS: &str = "id, company_name, company_description, company_address, company_phone, company_photo, card_number, user_id, created_at";

#[async_trait]
impl CardRepository for PostgresCardRepository {
    async fn create(&self, card: Card) -> Result<Card, AppError> {
        let row = sqlx::query(
            r#"INSERT INTO cards (id, company_name, company_description, company_address, company_phone, company_photo, card_number, user_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING id, company_name, company_description, company_address, company_phone, company_photo, card_number, user_id, created_at"#,
        )
        .bind(card.id)
        .bind(&card.company_name)
        .bind(&card.company_description)
        .bind(&card.company_address)
        .bind(&card.company_phone)
        .bind(&card.company_photo)
        .bind(card.card_number)
        .bind(card.user_id)
        .bind(card.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "card number already exists"))?;
        Ok(row_to_card(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Card, AppError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .ok_or_else(|| AppError::NotFound("card not found".into()))?;
        Ok(row_to_card(&row))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Card>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(rows.iter().map(row_to_card).collect())
    }

    async fn list(&self) -> Result<Vec<Card>, AppError> {
        let rows = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(rows.iter().map(row_to_card).collect())
    }

    async fn find_by_company_name(&self, name: &str) -> Result<Option<Card>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE lower(company_name) = lower($1)"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(row.as_ref().map(row_to_card))
    }

    async fn update(&self, card: Card) -> Result<Card, AppError> {
        let row = sqlx::query(
            r#"UPDATE cards SET company_name = $2, company_description = $3, company_address = $4, company_phone = $5, company_photo = $6
               WHERE id = $1
               RETURNING id, company_name, company_description, company_address, company_phone, company_photo, card_number, user_id, created_at"#,
        )
        .bind(card.id)
        .bind(&card.company_name)
        .bind(&card.company_description)
        .bind(&card.company_address)
        .bind(&card.company_phone)
        .bind(&card.company_photo)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("card not found".into()))?;
        Ok(row_to_card(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("card not found".into()));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM cards")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }
}

// In-memory repositories for dev fallback and tests.

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    inner: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, AppError> {
        let mut map = self.inner.write().await;
        if map.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict("email already exists".into()));
        }
        map.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        let map = self.inner.read().await;
        map.get(&id).cloned().ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    async fn find_by_email(&self, email: &str) -> Result<User, AppError> {
        let map = self.inner.read().await;
        map.values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| AppError::NotFound("user not found".into()))
    }

    async fn update(&self, user: User) -> Result<User, AppError> {
        let mut map = self.inner.write().await;
        if !map.contains_key(&user.id) {
            return Err(AppError::NotFound("user not found".into()));
        }
        // Mirrors the unique index on lower(email).
        if map.values().any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict("email already exists".into()));
        }
        map.insert(user.id, user.clone());
        Ok(user)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCardRepository {
    inner: Arc<RwLock<HashMap<Uuid, Card>>>,
}

impl InMemoryCardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardRepository for InMemoryCardRepository {
    async fn create(&self, card: Card) -> Result<Card, AppError> {
        let mut map = self.inner.write().await;
        // Mirrors the unique index on card_number.
        if map.values().any(|c| c.card_number == card.card_number) {
            return Err(AppError::Conflict("card number already exists".into()));
        }
        map.insert(card.id, card.clone());
        Ok(card)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Card, AppError> {
        let map = self.inner.read().await;
        map.get(&id).cloned().ok_or_else(|| AppError::NotFound("card not found".into()))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Card>, AppError> {
        let map = self.inner.read().await;
        let mut cards: Vec<Card> =
            map.values().filter(|c| c.user_id == Some(user_id)).cloned().collect();
        cards.sort_by_key(|c| c.created_at);
        Ok(cards)
    }

    async fn list(&self) -> Result<Vec<Card>, AppError> {
        let map = self.inner.read().await;
        let mut cards: Vec<Card> = map.values().cloned().collect();
        cards.sort_by_key(|c| c.created_at);
        Ok(cards)
    }

    async fn find_by_company_name(&self, name: &str) -> Result<Option<Card>, AppError> {
        let map = self.inner.read().await;
        Ok(map.values().find(|c| c.company_name.eq_ignore_ascii_case(name)).cloned())
    }

    async fn update(&self, card: Card) -> Result<Card, AppError> {
        let mut map = self.inner.write().await;
        if !map.contains_key(&card.id) {
            return Err(AppError::NotFound("card not found".into()));
        }
        map.insert(card.id, card.clone());
        Ok(card)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut map = self.inner.write().await;
        map.remove(&id).ok_or_else(|| AppError::NotFound("card not found".into()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.inner.write().await.clear();
        Ok(())
    }
}

/// Factory selecting between drivers; main falls back to in-memory when
/// Postgres is unavailable.
#[derive(Debug, Clone)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn postgres(pool: PgPool) -> (Arc<dyn UserRepository>, Arc<dyn CardRepository>) {
        (
            Arc::new(PostgresUserRepository::new(pool.clone())),
            Arc::new(PostgresCardRepository::new(pool)),
        )
    }

    pub fn in_memory() -> (Arc<dyn UserRepository>, Arc<dyn CardRepository>) {
        (Arc::new(InMemoryUserRepository::new()), Arc::new(InMemoryCardRepository::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now, DEFAULT_COMPANY_PHOTO};

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: email.into(),
            password_hash: "hash".into(),
            biz: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn card(name: &str, number: i32, owner: Option<Uuid>) -> Card {
        Card {
            id: Uuid::new_v4(),
            company_name: name.into(),
            company_description: None,
            company_address: None,
            company_phone: None,
            company_photo: DEFAULT_COMPANY_PHOTO.into(),
            card_number: number,
            user_id: owner,
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn in_memory_users_enforce_email_uniqueness() {
        let repo = InMemoryUserRepository::new();
        repo.create(user("a@b.com")).await.unwrap();
        let err = repo.create(user("A@B.COM")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut other = repo.create(user("c@d.com")).await.unwrap();
        other.email = "a@b.com".into();
        assert!(matches!(repo.update(other).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn in_memory_cards_filter_by_owner() {
        let repo = InMemoryCardRepository::new();
        let owner = Uuid::new_v4();
        repo.create(card("Acme", 100001, Some(owner))).await.unwrap();
        repo.create(card("Globex", 100002, Some(owner))).await.unwrap();
        repo.create(card("Initech", 100003, Some(Uuid::new_v4()))).await.unwrap();
        repo.create(card("Unowned", 100004, None)).await.unwrap();

        let mine = repo.find_by_user(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|c| c.user_id == Some(owner)));
        assert_eq!(repo.list().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn in_memory_cards_reject_duplicate_numbers() {
        let repo = InMemoryCardRepository::new();
        repo.create(card("Acme", 123456, None)).await.unwrap();
        let err = repo.create(card("Globex", 123456, None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn in_memory_card_delete_and_clear() {
        let repo = InMemoryCardRepository::new();
        let c = repo.create(card("Acme", 100001, None)).await.unwrap();
        repo.delete(c.id).await.unwrap();
        assert!(matches!(repo.delete(c.id).await, Err(AppError::NotFound(_))));

        repo.create(card("Globex", 100002, None)).await.unwrap();
        repo.clear().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_company_lookup_is_case_insensitive() {
        let repo = InMemoryCardRepository::new();
        repo.create(card("Acme", 100001, None)).await.unwrap();
        assert!(repo.find_by_company_name("acme").await.unwrap().is_some());
        assert!(repo.find_by_company_name("globex").await.unwrap().is_none());
    }
}
