use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Contact;

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    #[serde(rename = "contact_id")]
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            user_id: c.owner_id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            company: c.company,
            position: c.position,
            notes: c.notes,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}
