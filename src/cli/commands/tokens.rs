use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("rsa-private-key-path")
                .long("rsa-private-key-path")
                .help("Path to the PEM-encoded RSA private key used to sign tokens")
                .env("IDAAS_RSA_PRIVATE_KEY_PATH")
                .required(true),
        )
        .arg(
            Arg::new("rsa-public-key-path")
                .long("rsa-public-key-path")
                .help("Path to the PEM-encoded RSA public key used to verify tokens")
                .env("IDAAS_RSA_PUBLIC_KEY_PATH")
                .required(true),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token lifetime in seconds")
                .env("IDAAS_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token lifetime in seconds")
                .env("IDAAS_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("grace-period-seconds")
                .long("grace-period-seconds")
                .help("Window during which a rotation retry reuses the already-issued child token")
                .env("IDAAS_GRACE_PERIOD_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("Lifetime of one-time codes in seconds")
                .env("IDAAS_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("issuer")
                .long("issuer")
                .help("Token issuer claim")
                .env("IDAAS_ISSUER")
                .default_value("mein-idaas"),
        )
        .arg(
            Arg::new("audience")
                .long("audience")
                .help("Access token audience, comma-separated for multiple values")
                .env("IDAAS_AUDIENCE")
                .value_delimiter(',')
                .default_value("self-hosted-idaas"),
        )
        .arg(
            Arg::new("cookie-path")
                .long("cookie-path")
                .help("Path attribute of the refresh cookie")
                .env("IDAAS_COOKIE_PATH")
                .default_value("/api/v1/auth"),
        )
}
