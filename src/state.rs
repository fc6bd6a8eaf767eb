use std::sync::Arc;

use tracing::{info, warn};

use crate::accounts::repo::{AccountStore, PgAccountStore};
use crate::auth::password;
use crate::config::AppConfig;
use crate::contacts::repo::{ContactStore, PgContactStore};
use crate::db;
use crate::email::{LogMailer, MailtrapMailer, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await;
        password::warm_up();

        let mailer: Arc<dyn Mailer> = match config.mail.api_key.clone() {
            Some(key) => {
                info!("mailtrap mailer enabled");
                Arc::new(MailtrapMailer::new(key, config.mail.clone())?)
            }
            None => {
                warn!("MAILTRAP_API_KEY not set; verification emails are only logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self::from_parts(
            Arc::new(PgAccountStore::new(pool.clone())),
            Arc::new(PgContactStore::new(pool)),
            config,
            mailer,
        ))
    }

    pub fn from_parts(
        store: Arc<dyn AccountStore>,
        contacts: Arc<dyn ContactStore>,
        config: Arc<AppConfig>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            contacts,
            config,
            mailer,
        }
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::fake_with(
            Arc::new(crate::accounts::memory::MemoryAccountStore::new()),
            Arc::new(crate::email::testing::RecordingMailer::default()),
        )
    }

    pub fn fake_with(
        store: Arc<crate::accounts::memory::MemoryAccountStore>,
        mailer: Arc<crate::email::testing::RecordingMailer>,
    ) -> Self {
        Self::from_parts(
            store,
            Arc::new(crate::contacts::memory::MemoryContactStore::new()),
            Arc::new(crate::config::test_config()),
            mailer,
        )
    }
}
