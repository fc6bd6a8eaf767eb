use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::ContactStore;
use super::repo_types::{Contact, ContactUpdate, NewContact};
use crate::accounts::repo::StoreError;

/// In-process `ContactStore` for router tests.
#[derive(Default)]
pub struct MemoryContactStore {
    contacts: Mutex<Vec<Contact>>,
    next_id: Mutex<i64>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Contact>, StoreError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn create(&self, owner: Uuid, new: NewContact) -> Result<Contact, StoreError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let now = OffsetDateTime::now_utc();
        let contact = Contact {
            id,
            owner_id: owner,
            name: new.name,
            email: new.email,
            phone: new.phone,
            company: new.company,
            position: new.position,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.contacts.lock().unwrap().push(contact.clone());
        Ok(contact)
    }

    async fn get_for_owner(&self, owner: Uuid, id: i64) -> Result<Contact, StoreError> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id && c.owner_id == owner)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_for_owner(
        &self,
        owner: Uuid,
        id: i64,
        update: ContactUpdate,
    ) -> Result<Contact, StoreError> {
        let mut contacts = self.contacts.lock().unwrap();
        let c = contacts
            .iter_mut()
            .find(|c| c.id == id && c.owner_id == owner)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = update.name {
            c.name = name;
        }
        c.email = update.email.or(c.email.take());
        c.phone = update.phone.or(c.phone.take());
        c.company = update.company.or(c.company.take());
        c.position = update.position.or(c.position.take());
        c.notes = update.notes.or(c.notes.take());
        c.updated_at = OffsetDateTime::now_utc();
        Ok(c.clone())
    }

    async fn delete_for_owner(&self, owner: Uuid, id: i64) -> Result<(), StoreError> {
        let mut contacts = self.contacts.lock().unwrap();
        let before = contacts.len();
        contacts.retain(|c| !(c.id == id && c.owner_id == owner));
        if contacts.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
