use crate::{
    iam::{
        memory::MemoryStore,
        notification::{HttpNotificationGateway, LogNotificationGateway, NotificationGateway},
        postgres::PgStore,
        repository::{ChallengeRepository, UserRepository},
        AuthService, IamConfig,
    },
    warden,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub seed_email_id: String,
    pub seed_phone_number: String,
    pub password_hash_cost: u32,
    pub mailgun_domain: Option<String>,
    pub mailgun_api_key: Option<SecretString>,
    pub textlocal_api_key: Option<SecretString>,
    pub textlocal_sender: String,
}

type Stores = (Arc<dyn UserRepository>, Arc<dyn ChallengeRepository>);

async fn stores(dsn: Option<&str>) -> Result<Stores> {
    if let Some(dsn) = dsn {
        let store = Arc::new(PgStore::connect(dsn).await?);
        let users: Arc<dyn UserRepository> = store.clone();
        let challenges: Arc<dyn ChallengeRepository> = store;
        Ok((users, challenges))
    } else {
        warn!("No DSN configured, users and challenges are kept in memory");
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserRepository> = store.clone();
        let challenges: Arc<dyn ChallengeRepository> = store;
        Ok((users, challenges))
    }
}

fn gateway(args: &Args) -> Result<Arc<dyn NotificationGateway>> {
    match (
        &args.mailgun_domain,
        &args.mailgun_api_key,
        &args.textlocal_api_key,
    ) {
        (Some(domain), Some(mailgun_key), Some(textlocal_key)) => {
            let gateway = HttpNotificationGateway::new(
                domain.clone(),
                mailgun_key.clone(),
                textlocal_key.clone(),
                args.textlocal_sender.clone(),
            )
            .context("Failed to build notification gateway")?;
            Ok(Arc::new(gateway))
        }
        (None, None, None) => {
            warn!("No Mailgun/Textlocal credentials configured, codes are only logged");
            Ok(Arc::new(LogNotificationGateway))
        }
        _ => Err(anyhow!(
            "Mailgun and Textlocal credentials must be configured together"
        )),
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store or gateway cannot be built, the seed user
/// cannot be verified, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let notifier = gateway(&args)?;
    let (users, challenges) = stores(args.dsn.as_deref()).await?;

    let config = IamConfig::new(args.seed_email_id, args.seed_phone_number, args.token_secret)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_challenge_ttl_seconds(args.challenge_ttl_seconds)
        .with_password_hash_cost(args.password_hash_cost);

    let service = AuthService::new(users, challenges, notifier, config);

    service
        .verify_seed_user()
        .await
        .map_err(|err| anyhow!("Failed to verify seed user: {err}"))?;

    info!("Seed user verified");

    warden::new(args.port, Arc::new(service)).await
}
