use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let string = |name: &str| matches.get_one::<String>(name).cloned();
    let secret = |name: &str| string(name).map(SecretString::from);

    Ok(Action::Server(Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: string("dsn"),
        token_secret: secret("token-secret")
            .context("missing required argument: --token-secret")?,
        token_ttl_seconds: matches
            .get_one::<i64>("token-ttl-seconds")
            .copied()
            .unwrap_or(86400),
        challenge_ttl_seconds: matches
            .get_one::<i64>("challenge-ttl-seconds")
            .copied()
            .unwrap_or(60),
        seed_email_id: string("seed-email-id")
            .context("missing required argument: --seed-email-id")?,
        seed_phone_number: string("seed-phone-number")
            .context("missing required argument: --seed-phone-number")?,
        password_hash_cost: matches
            .get_one::<u32>("password-hash-cost")
            .copied()
            .unwrap_or(14),
        mailgun_domain: string("mailgun-domain"),
        mailgun_api_key: secret("mailgun-api-key"),
        textlocal_api_key: secret("textlocal-api-key"),
        textlocal_sender: string("textlocal-sender").unwrap_or_else(|| "TXTLCL".to_string()),
    }))
}
