use crate::cli::actions::{Action, server::Args};
use crate::mailer::SmtpConfig;
use anyhow::{Context, Result};
use chrono::NaiveTime;
use secrecy::SecretString;

struct TokenArgs {
    rsa_private_key_path: String,
    rsa_public_key_path: String,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
    grace_period_seconds: u64,
    otp_ttl_seconds: u64,
    issuer: String,
    audience: Vec<String>,
    cookie_path: String,
}

fn parse_token_args(matches: &clap::ArgMatches) -> Result<TokenArgs> {
    let rsa_private_key_path = matches
        .get_one::<String>("rsa-private-key-path")
        .cloned()
        .context("missing required argument: --rsa-private-key-path")?;
    let rsa_public_key_path = matches
        .get_one::<String>("rsa-public-key-path")
        .cloned()
        .context("missing required argument: --rsa-public-key-path")?;

    Ok(TokenArgs {
        rsa_private_key_path,
        rsa_public_key_path,
        access_ttl_seconds: matches
            .get_one::<u64>("access-ttl-seconds")
            .copied()
            .unwrap_or(900),
        refresh_ttl_seconds: matches
            .get_one::<u64>("refresh-ttl-seconds")
            .copied()
            .unwrap_or(604_800),
        grace_period_seconds: matches
            .get_one::<u64>("grace-period-seconds")
            .copied()
            .unwrap_or(10),
        otp_ttl_seconds: matches
            .get_one::<u64>("otp-ttl-seconds")
            .copied()
            .unwrap_or(300),
        issuer: matches
            .get_one::<String>("issuer")
            .cloned()
            .unwrap_or_else(|| "mein-idaas".to_string()),
        audience: matches
            .get_many::<String>("audience")
            .map(|values| values.cloned().collect())
            .unwrap_or_else(|| vec!["self-hosted-idaas".to_string()]),
        cookie_path: matches
            .get_one::<String>("cookie-path")
            .cloned()
            .unwrap_or_else(|| "/api/v1/auth".to_string()),
    })
}

struct HashingArgs {
    memory_kib: u32,
    time_cost: u32,
    parallelism: u32,
    key_length: usize,
    salt_length: usize,
}

fn parse_hashing_args(matches: &clap::ArgMatches) -> HashingArgs {
    HashingArgs {
        memory_kib: matches
            .get_one::<u32>("argon2-memory-kib")
            .copied()
            .unwrap_or(65536),
        time_cost: matches.get_one::<u32>("argon2-time").copied().unwrap_or(3),
        parallelism: matches
            .get_one::<u32>("argon2-parallelism")
            .copied()
            .unwrap_or(4),
        key_length: matches
            .get_one::<usize>("argon2-key-length")
            .copied()
            .unwrap_or(32),
        salt_length: matches
            .get_one::<usize>("argon2-salt-length")
            .copied()
            .unwrap_or(16),
    }
}

/// SMTP is optional: without a host the server logs outbound email. With a
/// host, the username and password become mandatory.
fn parse_smtp_args(matches: &clap::ArgMatches) -> Result<Option<SmtpConfig>> {
    let Some(host) = matches.get_one::<String>("smtp-host").cloned() else {
        return Ok(None);
    };

    let username = matches
        .get_one::<String>("smtp-username")
        .cloned()
        .context("missing required argument: --smtp-username (required with --smtp-host)")?;
    let password = matches
        .get_one::<String>("smtp-password")
        .cloned()
        .context("missing required argument: --smtp-password (required with --smtp-host)")?;

    Ok(Some(SmtpConfig {
        host,
        port: matches.get_one::<u16>("smtp-port").copied().unwrap_or(587),
        username,
        password: SecretString::from(password),
        sender_name: matches
            .get_one::<String>("smtp-sender-name")
            .cloned()
            .unwrap_or_else(|| "Mein IDaaS".to_string()),
        accept_invalid_certs: matches.get_flag("smtp-accept-invalid-certs"),
    }))
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(4000);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let tokens = parse_token_args(matches)?;
    let hashing = parse_hashing_args(matches);
    let smtp = parse_smtp_args(matches)?;

    let mailer_queue_capacity = matches
        .get_one::<usize>("mailer-queue-capacity")
        .copied()
        .unwrap_or(128);
    let janitor_time = matches
        .get_one::<NaiveTime>("janitor-time")
        .copied()
        .context("missing required argument: --janitor-time")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        rsa_private_key_path: tokens.rsa_private_key_path,
        rsa_public_key_path: tokens.rsa_public_key_path,
        access_ttl_seconds: tokens.access_ttl_seconds,
        refresh_ttl_seconds: tokens.refresh_ttl_seconds,
        grace_period_seconds: tokens.grace_period_seconds,
        otp_ttl_seconds: tokens.otp_ttl_seconds,
        issuer: tokens.issuer,
        audience: tokens.audience,
        cookie_path: tokens.cookie_path,
        argon2_memory_kib: hashing.memory_kib,
        argon2_time: hashing.time_cost,
        argon2_parallelism: hashing.parallelism,
        argon2_key_length: hashing.key_length,
        argon2_salt_length: hashing.salt_length,
        smtp,
        mailer_queue_capacity,
        janitor_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_from(extra: &[&str]) -> clap::ArgMatches {
        let mut args = vec![
            "idaas",
            "--dsn",
            "postgres://localhost:5432/idaas",
            "--rsa-private-key-path",
            "/tmp/private.pem",
            "--rsa-public-key-path",
            "/tmp/public.pem",
        ];
        args.extend_from_slice(extra);
        crate::cli::commands::new().get_matches_from(args)
    }

    fn cleared_smtp_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("IDAAS_SMTP_HOST", None::<&str>),
                ("IDAAS_SMTP_USERNAME", None::<&str>),
                ("IDAAS_SMTP_PASSWORD", None::<&str>),
                ("IDAAS_PORT", None::<&str>),
                ("IDAAS_ACCESS_TTL_SECONDS", None::<&str>),
                ("IDAAS_AUDIENCE", None::<&str>),
                ("IDAAS_JANITOR_TIME", None::<&str>),
            ],
            f,
        );
    }

    #[test]
    fn server_action_with_defaults() {
        cleared_smtp_env(|| {
            let matches = matches_from(&[]);
            let action = handler(&matches);
            assert!(action.is_ok());
            if let Ok(Action::Server(args)) = action {
                assert_eq!(args.port, 4000);
                assert_eq!(args.access_ttl_seconds, 900);
                assert_eq!(args.refresh_ttl_seconds, 604_800);
                assert_eq!(args.grace_period_seconds, 10);
                assert_eq!(args.issuer, "mein-idaas");
                assert_eq!(args.audience, vec!["self-hosted-idaas".to_string()]);
                assert!(args.smtp.is_none());
            }
        });
    }

    #[test]
    fn smtp_host_requires_credentials() {
        cleared_smtp_env(|| {
            let matches = matches_from(&["--smtp-host", "smtp.example.test"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--smtp-username"));
            }
        });
    }

    #[test]
    fn full_smtp_configuration() {
        cleared_smtp_env(|| {
            let matches = matches_from(&[
                "--smtp-host",
                "smtp.example.test",
                "--smtp-username",
                "no-reply@example.test",
                "--smtp-password",
                "hunter2hunter2",
                "--smtp-accept-invalid-certs",
            ]);
            let action = handler(&matches);
            assert!(action.is_ok());
            if let Ok(Action::Server(args)) = action {
                let smtp = args.smtp.expect("smtp config");
                assert_eq!(smtp.host, "smtp.example.test");
                assert_eq!(smtp.port, 587);
                assert!(smtp.accept_invalid_certs);
            }
        });
    }
}
