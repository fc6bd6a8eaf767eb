use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::MailConfig;

const MAILTRAP_SEND_URL: &str = "https://send.api.mailtrap.io/api/send";

/// Outbound verification mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, to_email: &str, name: &str, link: &str) -> anyhow::Result<()>;
}

/// Dev sender: logs the link instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, to_email: &str, name: &str, link: &str) -> anyhow::Result<()> {
        info!(%to_email, %name, %link, "verification email (log only)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MailtrapPayload<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    template_uuid: &'a str,
    template_variables: Map<String, Value>,
}

/// Sends through Mailtrap's template API with a bounded request timeout.
#[derive(Clone)]
pub struct MailtrapMailer {
    client: reqwest::Client,
    api_key: String,
    config: MailConfig,
}

impl MailtrapMailer {
    pub fn new(api_key: String, config: MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("build mail http client")?;
        Ok(Self { client, api_key, config })
    }

    fn payload<'a>(&'a self, to_email: &'a str, name: &str, link: &str) -> MailtrapPayload<'a> {
        let mut vars = Map::new();
        vars.insert("name".into(), Value::from(name));
        vars.insert("email_verification_link".into(), Value::from(link));
        let company = [
            ("company_info_name", &self.config.company_name),
            ("company_info_address", &self.config.company_address),
            ("company_info_city", &self.config.company_city),
            ("company_info_zip_code", &self.config.company_zip),
            ("company_info_country", &self.config.company_country),
        ];
        for (k, v) in company {
            vars.insert(k.into(), Value::from(v.as_str()));
        }
        MailtrapPayload {
            from: Address {
                email: &self.config.from_email,
                name: Some(&self.config.from_name),
            },
            to: vec![Address { email: to_email, name: None }],
            template_uuid: &self.config.template_id,
            template_variables: vars,
        }
    }
}

#[async_trait]
impl Mailer for MailtrapMailer {
    async fn send_verification(&self, to_email: &str, name: &str, link: &str) -> anyhow::Result<()> {
        let res = self
            .client
            .post(MAILTRAP_SEND_URL)
            .header("Api-Token", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&self.payload(to_email, name, link))
            .send()
            .await
            .context("mailtrap send")?;
        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            anyhow::bail!("mailtrap api error: {status}");
        }
        info!(%to_email, "verification email sent");
        Ok(())
    }
}
