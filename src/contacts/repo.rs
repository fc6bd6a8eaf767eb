use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Contact, ContactUpdate, NewContact};
use crate::accounts::repo::StoreError;

/// Contact persistence. Every lookup is scoped to an owner; a record that
/// exists under another owner is `NotFound`, same as one that does not exist.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Contact>, StoreError>;
    async fn create(&self, owner: Uuid, new: NewContact) -> Result<Contact, StoreError>;
    async fn get_for_owner(&self, owner: Uuid, id: i64) -> Result<Contact, StoreError>;
    async fn update_for_owner(
        &self,
        owner: Uuid,
        id: i64,
        update: ContactUpdate,
    ) -> Result<Contact, StoreError>;
    async fn delete_for_owner(&self, owner: Uuid, id: i64) -> Result<(), StoreError>;
}

const CONTACT_COLUMNS: &str =
    "id, user_id, name, email, phone, company, position, notes, created_at, updated_at";

fn not_found_or(e: sqlx::Error, what: &'static str) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        e => StoreError::Backend(anyhow::Error::new(e).context(what)),
    }
}

#[derive(Clone)]
pub struct PgContactStore {
    db: PgPool,
}

impl PgContactStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Contact>, StoreError> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, Contact>(&sql)
            .bind(owner)
            .fetch_all(&self.db)
            .await
            .context("list contacts")?;
        Ok(rows)
    }

    async fn create(&self, owner: Uuid, new: NewContact) -> Result<Contact, StoreError> {
        let sql = format!(
            "INSERT INTO contacts (user_id, name, email, phone, company, position, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {CONTACT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Contact>(&sql)
            .bind(owner)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.company)
            .bind(&new.position)
            .bind(&new.notes)
            .fetch_one(&self.db)
            .await
            .context("insert contact")?;
        Ok(row)
    }

    async fn get_for_owner(&self, owner: Uuid, id: i64) -> Result<Contact, StoreError> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_one(&self.db)
            .await
            .map_err(|e| not_found_or(e, "find contact"))
    }

    async fn update_for_owner(
        &self,
        owner: Uuid,
        id: i64,
        update: ContactUpdate,
    ) -> Result<Contact, StoreError> {
        let sql = format!(
            "UPDATE contacts
                SET name = COALESCE($3, name),
                    email = COALESCE($4, email),
                    phone = COALESCE($5, phone),
                    company = COALESCE($6, company),
                    position = COALESCE($7, position),
                    notes = COALESCE($8, notes),
                    updated_at = now()
              WHERE id = $1 AND user_id = $2
             RETURNING {CONTACT_COLUMNS}"
        );
        sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .bind(owner)
            .bind(update.name)
            .bind(update.email)
            .bind(update.phone)
            .bind(update.company)
            .bind(update.position)
            .bind(update.notes)
            .fetch_one(&self.db)
            .await
            .map_err(|e| not_found_or(e, "update contact"))
    }

    async fn delete_for_owner(&self, owner: Uuid, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM contacts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await
            .context("delete contact")?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::accounts::repo::{AccountStore, PgAccountStore};
    use crate::accounts::repo_types::NewAccount;

    async fn owner(pool: &PgPool, username: &str) -> Uuid {
        PgAccountStore::new(pool.clone())
            .create_account(NewAccount {
                username: username.into(),
                email: format!("{username}@example.com"),
                first_name: None,
                last_name: None,
                password_hash: "hash".into(),
                verification_token: format!("tok-{username}"),
                token_issued_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn lookups_are_scoped_to_the_owner(pool: PgPool) {
        let ana = owner(&pool, "ana").await;
        let bo = owner(&pool, "bo").await;
        let store = PgContactStore::new(pool);

        let carla = store
            .create(ana, NewContact { name: "Carla".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(carla.owner_id, ana);
        assert_eq!(store.list_for_owner(ana).await.unwrap().len(), 1);
        assert!(store.list_for_owner(bo).await.unwrap().is_empty());

        assert!(matches!(store.get_for_owner(bo, carla.id).await, Err(StoreError::NotFound)));
        let rename = ContactUpdate { name: Some("x".into()), ..Default::default() };
        assert!(matches!(
            store.update_for_owner(bo, carla.id, rename).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(store.delete_for_owner(bo, carla.id).await, Err(StoreError::NotFound)));

        let update = ContactUpdate { company: Some("Acme".into()), ..Default::default() };
        let updated = store.update_for_owner(ana, carla.id, update).await.unwrap();
        assert_eq!(updated.name, "Carla");
        assert_eq!(updated.company.as_deref(), Some("Acme"));
        store.delete_for_owner(ana, carla.id).await.unwrap();
        assert!(matches!(store.get_for_owner(ana, carla.id).await, Err(StoreError::NotFound)));
    }
}
