use crate::cli::duration::parse_duration;
use crate::exporter::GIT_COMMIT_HASH;
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

mod collectors;

#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let cmd = Command::new("cloud_exporter")
        .about("Cloud resource metric exporter for Prometheus")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(GIT_COMMIT_HASH)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("9512")
                .env("CLOUD_EXPORTER_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("IP address to bind to (default: [::]:<port>, falling back to 0.0.0.0:<port>)")
                .env("CLOUD_EXPORTER_LISTEN")
                .value_name("IP"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .help("Target to inventory and scan, optionally grouped by unit")
                .env("CLOUD_EXPORTER_TARGETS")
                .value_name("[unit=]address,...")
                .value_delimiter(',') // split CLI and env values by comma
                .action(ArgAction::Append), // allow repeated flags
        )
        .arg(
            Arg::new("cache.path")
                .long("cache.path")
                .help("Directory for snapshot cache files (path or file:// URL), caching is off when unset")
                .env("CLOUD_EXPORTER_CACHE_PATH")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("scrape.time")
                .long("scrape.time")
                .help("Default collection interval")
                .default_value("5m")
                .env("CLOUD_EXPORTER_SCRAPE_TIME")
                .value_name("DURATION")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new("scrape.time.exporter")
                .long("scrape.time.exporter")
                .help("Collection interval of the exporter collector")
                .default_value("10s")
                .env("CLOUD_EXPORTER_SCRAPE_TIME_EXPORTER")
                .value_name("DURATION")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new("scrape.time.portscan")
                .long("scrape.time.portscan")
                .help("Collection interval of the portscan collector")
                .default_value("3h")
                .env("CLOUD_EXPORTER_SCRAPE_TIME_PORTSCAN")
                .value_name("DURATION")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new("backoff")
                .long("backoff")
                .help("Delays after consecutive failed passes, 'none' retries on the normal interval")
                .default_value("1m,5m,10m,30m")
                .env("CLOUD_EXPORTER_BACKOFF")
                .value_name("DURATION,..."),
        )
        .arg(
            Arg::new("portscan.ports")
                .long("portscan.ports")
                .help("Ports to scan, ranges allowed")
                .default_value("22,3389")
                .env("CLOUD_EXPORTER_PORTSCAN_PORTS")
                .value_name("22,80,8000-8100"),
        )
        .arg(
            Arg::new("portscan.parallel")
                .long("portscan.parallel")
                .help("Number of targets scanned at the same time")
                .default_value("2")
                .env("CLOUD_EXPORTER_PORTSCAN_PARALLEL")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("portscan.threads")
                .long("portscan.threads")
                .help("Number of connections in flight per target")
                .default_value("1000")
                .env("CLOUD_EXPORTER_PORTSCAN_THREADS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("portscan.timeout")
                .long("portscan.timeout")
                .help("Connect timeout per port")
                .default_value("5s")
                .env("CLOUD_EXPORTER_PORTSCAN_TIMEOUT")
                .value_name("DURATION")
                .value_parser(parse_duration),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        );

    collectors::add_collectors_args(cmd)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("CLOUD_EXPORTER_PORT", None::<&str>),
                ("CLOUD_EXPORTER_TARGETS", None),
                ("CLOUD_EXPORTER_SCRAPE_TIME", None),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["cloud_exporter"]);

                assert_eq!(matches.get_one::<u16>("port").copied(), Some(9512));
                assert_eq!(
                    matches.get_one::<Duration>("scrape.time").copied(),
                    Some(Duration::from_secs(300))
                );
                assert_eq!(
                    matches.get_one::<Duration>("scrape.time.portscan").copied(),
                    Some(Duration::from_secs(10_800))
                );
                assert_eq!(
                    matches.get_one::<String>("portscan.ports").map(String::as_str),
                    Some("22,3389")
                );
                assert!(matches.get_many::<String>("target").is_none());
            },
        );
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "cloud_exporter");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_targets_and_durations() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "cloud_exporter",
            "--port",
            "8080",
            "--target",
            "prod=10.0.0.1,prod=10.0.0.2",
            "--target",
            "10.0.0.3",
            "--scrape.time",
            "90",
            "--portscan.timeout",
            "2s",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));

        let targets: Vec<String> = matches
            .get_many::<String>("target")
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(targets, vec!["prod=10.0.0.1", "prod=10.0.0.2", "10.0.0.3"]);

        assert_eq!(
            matches.get_one::<Duration>("scrape.time").copied(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            matches.get_one::<Duration>("portscan.timeout").copied(),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let result = new().try_get_matches_from(vec!["cloud_exporter", "--scrape.time", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_targets_env() {
        temp_env::with_var("CLOUD_EXPORTER_TARGETS", Some("a=10.0.0.1,b=10.0.0.2"), || {
            let command = new();
            let matches = command.get_matches_from(vec!["cloud_exporter"]);

            let targets: Vec<String> = matches
                .get_many::<String>("target")
                .unwrap()
                .cloned()
                .collect();
            assert_eq!(targets, vec!["a=10.0.0.1", "b=10.0.0.2"]);
        });
    }
}
