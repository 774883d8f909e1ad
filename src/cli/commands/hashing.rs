use clap::{Arg, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("argon2-memory-kib")
                .long("argon2-memory-kib")
                .help("Argon2 memory cost in KiB for new hashes")
                .env("IDAAS_ARGON2_MEMORY_KIB")
                .default_value("65536")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("argon2-time")
                .long("argon2-time")
                .help("Argon2 time cost (iterations) for new hashes")
                .env("IDAAS_ARGON2_TIME")
                .default_value("3")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("argon2-parallelism")
                .long("argon2-parallelism")
                .help("Argon2 parallelism for new hashes")
                .env("IDAAS_ARGON2_PARALLELISM")
                .default_value("4")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("argon2-key-length")
                .long("argon2-key-length")
                .help("Derived key length in bytes")
                .env("IDAAS_ARGON2_KEY_LENGTH")
                .default_value("32")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("argon2-salt-length")
                .long("argon2-salt-length")
                .help("Salt length in bytes")
                .env("IDAAS_ARGON2_SALT_LENGTH")
                .default_value("16")
                .value_parser(clap::value_parser!(usize)),
        )
}
