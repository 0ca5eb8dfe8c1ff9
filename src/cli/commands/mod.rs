use crate::iam::config::{MAX_CHALLENGE_TTL_SECONDS, MAX_TOKEN_TTL_SECONDS};
use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("warden")
        .about("OTP challenges, password login and signed sessions")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("WARDEN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Postgres connection string, users and challenges are kept in memory when omitted")
                .env("WARDEN_DSN"),
        )
        .arg(
            Arg::new("token-secret")
                .long("token-secret")
                .help("HS256 secret used to sign session tokens")
                .env("WARDEN_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Session token lifetime in seconds")
                .default_value("86400")
                .env("WARDEN_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_SECONDS)),
        )
        .arg(
            Arg::new("challenge-ttl-seconds")
                .long("challenge-ttl-seconds")
                .help("Minimum seconds between two codes for the same contact")
                .default_value("60")
                .env("WARDEN_CHALLENGE_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_CHALLENGE_TTL_SECONDS)),
        )
        .arg(
            Arg::new("seed-email-id")
                .long("seed-email-id")
                .help("Email ID of the root administrator created at startup")
                .env("WARDEN_SEED_EMAIL_ID")
                .required(true),
        )
        .arg(
            Arg::new("seed-phone-number")
                .long("seed-phone-number")
                .help("Phone number of the root administrator created at startup")
                .env("WARDEN_SEED_PHONE_NUMBER")
                .required(true),
        )
        .arg(
            Arg::new("password-hash-cost")
                .long("password-hash-cost")
                .help("bcrypt cost factor")
                .default_value("14")
                .env("WARDEN_PASSWORD_HASH_COST")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
        .arg(
            Arg::new("mailgun-domain")
                .long("mailgun-domain")
                .help("Mailgun sending domain")
                .env("WARDEN_MAILGUN_DOMAIN")
                .requires("mailgun-api-key"),
        )
        .arg(
            Arg::new("mailgun-api-key")
                .long("mailgun-api-key")
                .help("Mailgun API key")
                .env("WARDEN_MAILGUN_API_KEY")
                .hide_env_values(true)
                .requires("mailgun-domain"),
        )
        .arg(
            Arg::new("textlocal-api-key")
                .long("textlocal-api-key")
                .help("Textlocal API key")
                .env("WARDEN_TEXTLOCAL_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("textlocal-sender")
                .long("textlocal-sender")
                .help("Sender name shown on SMS messages")
                .default_value("TXTLCL")
                .env("WARDEN_TEXTLOCAL_SENDER"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("WARDEN_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
