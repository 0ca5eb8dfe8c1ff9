//! OTP delivery.
//!
//! The core only needs "send this code to this contact". Delivery is
//! best-effort: one attempt, bounded by a timeout, never retried here.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, info_span, Instrument};
use url::Url;

use super::model::Contact;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const MAILGUN_BASE_URL: &str = "https://api.mailgun.net/";
const TEXTLOCAL_BASE_URL: &str = "https://api.textlocal.in/";

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_email_otp(&self, email_id: &str, otp: &str) -> Result<()>;

    async fn send_sms_otp(&self, phone_number: &str, otp: &str) -> Result<()>;

    /// Route the code to the channel matching the contact.
    async fn send_otp(&self, contact: &Contact, otp: &str) -> Result<()> {
        match contact {
            Contact::Email(email_id) => self
                .send_email_otp(email_id, otp)
                .await
                .context("could not send the verification OTP to the email ID"),
            Contact::Phone(number) => self
                .send_sms_otp(number, otp)
                .await
                .context("could not send the verification OTP to the device"),
        }
    }
}

/// Local dev gateway that logs deliveries instead of sending them.
#[derive(Clone, Debug)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn send_email_otp(&self, email_id: &str, otp: &str) -> Result<()> {
        info!(email_id, "otp email send stub");
        debug!(otp, "otp email payload");
        Ok(())
    }

    async fn send_sms_otp(&self, phone_number: &str, otp: &str) -> Result<()> {
        info!(phone_number, "otp sms send stub");
        debug!(otp, "otp sms payload");
        Ok(())
    }
}

/// Mailgun for email, Textlocal for SMS.
#[derive(Clone, Debug)]
pub struct HttpNotificationGateway {
    client: Client,
    mailgun_url: Url,
    mailgun_domain: String,
    mailgun_api_key: SecretString,
    textlocal_url: Url,
    textlocal_api_key: SecretString,
    textlocal_sender: String,
}

impl HttpNotificationGateway {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        mailgun_domain: String,
        mailgun_api_key: SecretString,
        textlocal_api_key: SecretString,
        textlocal_sender: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            mailgun_url: Url::parse(MAILGUN_BASE_URL)?,
            mailgun_domain,
            mailgun_api_key,
            textlocal_url: Url::parse(TEXTLOCAL_BASE_URL)?,
            textlocal_api_key,
            textlocal_sender,
        })
    }

    /// Point both providers somewhere else, e.g. a local mock server.
    ///
    /// # Errors
    /// Returns an error if either URL does not parse.
    pub fn with_base_urls(mut self, mailgun: &str, textlocal: &str) -> Result<Self> {
        self.mailgun_url = Url::parse(mailgun).context("invalid Mailgun base URL")?;
        self.textlocal_url = Url::parse(textlocal).context("invalid Textlocal base URL")?;
        Ok(self)
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send_email_otp(&self, email_id: &str, otp: &str) -> Result<()> {
        let url = self
            .mailgun_url
            .join(&format!("v3/{}/messages", self.mailgun_domain))?;
        let from = format!("no-reply@{}", self.mailgun_domain);
        let text = format!("Your {} verification code is {otp}", env!("CARGO_PKG_NAME"));
        let subject = format!("Verify your {} account", env!("CARGO_PKG_NAME"));

        let span = info_span!("mailgun.send", http.method = "POST", url = %url);
        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(self.mailgun_api_key.expose_secret()))
            .form(&[
                ("from", from.as_str()),
                ("to", email_id),
                ("subject", subject.as_str()),
                ("text", text.as_str()),
            ])
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("mailgun send failed: {status} {body}"));
        }
        Ok(())
    }

    async fn send_sms_otp(&self, phone_number: &str, otp: &str) -> Result<()> {
        let url = self.textlocal_url.join("send/")?;
        let message = format!("Your {} login OTP is {otp}", env!("CARGO_PKG_NAME"));

        let span = info_span!("textlocal.send", http.method = "POST", url = %url);
        let response = self
            .client
            .post(url)
            .query(&[
                ("apikey", self.textlocal_api_key.expose_secret()),
                ("numbers", phone_number),
                ("message", message.as_str()),
                ("sender", self.textlocal_sender.as_str()),
            ])
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("textlocal send failed: {status} {body}"));
        }
        Ok(())
    }
}
