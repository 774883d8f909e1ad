use chrono::NaiveTime;
use clap::{Arg, Command, builder::ValueParser};

#[must_use]
pub fn validator_wall_clock_time() -> ValueParser {
    ValueParser::from(
        move |value: &str| -> std::result::Result<NaiveTime, String> {
            NaiveTime::parse_from_str(value, "%H:%M")
                .map_err(|_| format!("expected HH:MM, got '{value}'"))
        },
    )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new("smtp-host")
                .long("smtp-host")
                .help("SMTP relay host; when absent, outbound email is logged instead of sent")
                .env("IDAAS_SMTP_HOST"),
        )
        .arg(
            Arg::new("smtp-port")
                .long("smtp-port")
                .help("SMTP relay port")
                .env("IDAAS_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("smtp-username")
                .long("smtp-username")
                .help("SMTP username; also the From address")
                .env("IDAAS_SMTP_USERNAME"),
        )
        .arg(
            Arg::new("smtp-password")
                .long("smtp-password")
                .help("SMTP password")
                .env("IDAAS_SMTP_PASSWORD"),
        )
        .arg(
            Arg::new("smtp-sender-name")
                .long("smtp-sender-name")
                .help("Display name on outbound email")
                .env("IDAAS_SMTP_SENDER_NAME")
                .default_value("Mein IDaaS"),
        )
        .arg(
            Arg::new("smtp-accept-invalid-certs")
                .long("smtp-accept-invalid-certs")
                .help("Skip SMTP certificate verification (development only)")
                .env("IDAAS_SMTP_ACCEPT_INVALID_CERTS")
                .action(clap::ArgAction::SetTrue),
        );

    command
        .arg(
            Arg::new("mailer-queue-capacity")
                .long("mailer-queue-capacity")
                .help("Bounded capacity of the outbound email queue")
                .env("IDAAS_MAILER_QUEUE_CAPACITY")
                .default_value("128")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("janitor-time")
                .long("janitor-time")
                .help("Local wall-clock time (HH:MM) of the daily expired-token purge")
                .env("IDAAS_JANITOR_TIME")
                .default_value("12:00")
                .value_parser(validator_wall_clock_time()),
        )
}
