pub mod hashing;
pub mod logging;
pub mod smtp;
pub mod tokens;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("idaas")
        .about("Self-hosted identity and token lifecycle service")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("4000")
                .env("IDAAS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("IDAAS_DSN")
                .required(true),
        );

    let command = tokens::with_args(command);
    let command = hashing::with_args(command);
    let command = smtp::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn required_args() -> Vec<&'static str> {
        vec![
            "idaas",
            "--dsn",
            "postgres://localhost:5432/idaas",
            "--rsa-private-key-path",
            "/tmp/idaas-private.pem",
            "--rsa-public-key-path",
            "/tmp/idaas-public.pem",
        ]
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "idaas");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Self-hosted identity and token lifecycle service".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    /// Clear every variable other tests set, and take temp-env's lock so
    /// env-reading tests cannot race each other.
    fn with_clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("IDAAS_PORT", None::<&str>),
                ("IDAAS_ACCESS_TTL_SECONDS", None),
                ("IDAAS_JANITOR_TIME", None),
                ("IDAAS_LOG_LEVEL", None),
                ("IDAAS_AUDIENCE", None),
            ],
            f,
        );
    }

    #[test]
    fn test_defaults() {
        with_clean_env(|| {
            let command = new();
            let matches = command.get_matches_from(required_args());

            assert_eq!(matches.get_one::<u16>("port").copied(), Some(4000));
            assert_eq!(
                matches.get_one::<u64>("access-ttl-seconds").copied(),
                Some(900)
            );
            assert_eq!(
                matches.get_one::<u64>("refresh-ttl-seconds").copied(),
                Some(604_800)
            );
            assert_eq!(
                matches.get_one::<u64>("grace-period-seconds").copied(),
                Some(10)
            );
            assert_eq!(
                matches.get_one::<u64>("otp-ttl-seconds").copied(),
                Some(300)
            );
            assert_eq!(
                matches.get_one::<String>("issuer").cloned(),
                Some("mein-idaas".to_string())
            );
            assert_eq!(
                matches.get_one::<String>("cookie-path").cloned(),
                Some("/api/v1/auth".to_string())
            );
            assert_eq!(
                matches.get_one::<u32>("argon2-memory-kib").copied(),
                Some(65536)
            );
            assert_eq!(
                matches.get_one::<NaiveTime>("janitor-time").copied(),
                NaiveTime::from_hms_opt(12, 0, 0)
            );
            assert!(!matches.get_flag("smtp-accept-invalid-certs"));
        });
    }

    #[test]
    fn test_audience_comma_list() {
        with_clean_env(|| {
            let mut args = required_args();
            args.extend(["--audience", "my-game-server,smoking-app"]);
            let matches = new().get_matches_from(args);
            let audience: Vec<String> = matches
                .get_many::<String>("audience")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            assert_eq!(
                audience,
                vec!["my-game-server".to_string(), "smoking-app".to_string()]
            );
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("IDAAS_PORT", Some("8443")),
                ("IDAAS_DSN", Some("postgres://localhost:5432/idaas")),
                ("IDAAS_RSA_PRIVATE_KEY_PATH", Some("/tmp/private.pem")),
                ("IDAAS_RSA_PUBLIC_KEY_PATH", Some("/tmp/public.pem")),
                ("IDAAS_ACCESS_TTL_SECONDS", Some("600")),
                ("IDAAS_JANITOR_TIME", Some("03:30")),
                ("IDAAS_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["idaas"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8443));
                assert_eq!(
                    matches.get_one::<u64>("access-ttl-seconds").copied(),
                    Some(600)
                );
                assert_eq!(
                    matches.get_one::<NaiveTime>("janitor-time").copied(),
                    NaiveTime::from_hms_opt(3, 30, 0)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("IDAAS_LOG_LEVEL", Some(level)),
                    ("IDAAS_DSN", Some("postgres://localhost:5432/idaas")),
                    ("IDAAS_RSA_PRIVATE_KEY_PATH", Some("/tmp/private.pem")),
                    ("IDAAS_RSA_PUBLIC_KEY_PATH", Some("/tmp/public.pem")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["idaas"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_janitor_time_rejects_garbage() {
        let mut args = required_args();
        args.extend(["--janitor-time", "25:99"]);
        let result = new().try_get_matches_from(args);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_dsn_fails() {
        temp_env::with_vars(
            [
                ("IDAAS_DSN", None::<&str>),
                ("IDAAS_RSA_PRIVATE_KEY_PATH", Some("/tmp/private.pem")),
                ("IDAAS_RSA_PUBLIC_KEY_PATH", Some("/tmp/public.pem")),
            ],
            || {
                let result = new().try_get_matches_from(vec!["idaas"]);
                assert!(result.is_err());
            },
        );
    }
}
