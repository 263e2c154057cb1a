use crate::{
    cache::local_path,
    cli::{actions::Action, duration::parse_duration_list},
    collectors::{COLLECTOR_NAMES, Collector, all_factories, config::CollectorConfig},
    engine::BackoffLadder,
    portscan::{PortscanConfig, StaticTargets, parse_port_ranges},
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use std::time::Duration;
use tracing::{info, warn};

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    // Get the port or return an error
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    // Get the listen address (None means auto-detect)
    let listen = matches.get_one::<String>("listen").map(ToString::to_string);

    let targets = get_targets(matches)?;

    if targets.is_empty() {
        warn!("No targets configured, inventory and portscan will publish nothing");
    } else {
        info!(targets = targets.len(), "Loaded targets");
    }

    let collectors = get_enabled_collectors(matches);

    let config = CollectorConfig::new()
        .with_enabled(&collectors)
        .with_scrape_interval(duration_arg(matches, "scrape.time")?)
        .with_interval("exporter", duration_arg(matches, "scrape.time.exporter")?)
        .with_interval("portscan", duration_arg(matches, "scrape.time.portscan")?)
        .with_backoff(get_backoff(matches)?)
        .with_cache_dir(get_cache_dir(matches)?)
        .with_portscan(get_portscan_config(matches)?);

    Ok(Action::Run {
        port,
        listen,
        config,
        targets,
    })
}

fn duration_arg(matches: &ArgMatches, id: &str) -> Result<Duration> {
    matches
        .get_one::<Duration>(id)
        .copied()
        .ok_or_else(|| anyhow!("--{id} is required"))
}

fn get_targets(matches: &ArgMatches) -> Result<StaticTargets> {
    let entries: Vec<&String> = matches
        .get_many::<String>("target")
        .map(Iterator::collect)
        .unwrap_or_default();

    StaticTargets::parse(&entries)
}

/// `none` (or an empty value) disables the ladder.
fn get_backoff(matches: &ArgMatches) -> Result<Vec<Duration>> {
    let raw = matches
        .get_one::<String>("backoff")
        .map_or("", |s| s.trim());

    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let tiers = parse_duration_list(raw)?;

    BackoffLadder::new(tiers.clone())?;

    Ok(tiers)
}

fn get_cache_dir(matches: &ArgMatches) -> Result<Option<std::path::PathBuf>> {
    matches
        .get_one::<String>("cache.path")
        .map(|location| {
            local_path(location).with_context(|| format!("Invalid --cache.path '{location}'"))
        })
        .transpose()
}

fn get_portscan_config(matches: &ArgMatches) -> Result<PortscanConfig> {
    let defaults = PortscanConfig::default();

    let ports = match matches.get_one::<String>("portscan.ports") {
        Some(raw) => parse_port_ranges(raw).context("Invalid --portscan.ports")?,
        None => defaults.ports,
    };

    let parallel = matches
        .get_one::<usize>("portscan.parallel")
        .copied()
        .unwrap_or(defaults.parallel);

    let threads = matches
        .get_one::<usize>("portscan.threads")
        .copied()
        .unwrap_or(defaults.threads);

    if parallel == 0 || threads == 0 {
        return Err(anyhow!(
            "--portscan.parallel and --portscan.threads must be at least 1"
        ));
    }

    let timeout = matches
        .get_one::<Duration>("portscan.timeout")
        .copied()
        .unwrap_or(defaults.timeout);

    Ok(PortscanConfig {
        ports,
        parallel,
        threads,
        timeout,
    })
}

pub fn get_enabled_collectors(matches: &ArgMatches) -> Vec<String> {
    let factories = all_factories();

    COLLECTOR_NAMES
        .iter()
        .filter(|&name| {
            let enable_flag = format!("collector.{name}");
            let disable_flag = format!("no-collector.{name}");

            // If explicitly disabled, skip it
            if matches.get_flag(&disable_flag) {
                return false;
            }

            // If explicitly enabled, include it
            if matches.get_flag(&enable_flag) {
                return true;
            }

            // Otherwise, check the collector's default setting
            factories
                .get(name)
                .is_some_and(|factory| factory().enabled_by_default())
        })
        .map(|&name| name.to_string())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use crate::portscan::PortRange;

    fn run(args: &[&str]) -> Result<Action> {
        let mut argv = vec!["cloud_exporter"];
        argv.extend_from_slice(args);
        let matches = commands::new().get_matches_from(argv);
        handler(&matches)
    }

    #[test]
    fn test_get_enabled_collectors_defaults() {
        let command = commands::new();
        let matches = command.get_matches_from(vec!["cloud_exporter"]);
        let enabled = get_enabled_collectors(&matches);

        assert!(enabled.contains(&"inventory".to_string()));
        assert!(enabled.contains(&"exporter".to_string()));
        assert!(!enabled.contains(&"portscan".to_string()));
    }

    #[test]
    fn test_get_enabled_collectors_explicit_enable() {
        let command = commands::new();
        let matches = command.get_matches_from(vec!["cloud_exporter", "--collector.portscan"]);
        let enabled = get_enabled_collectors(&matches);

        assert!(enabled.contains(&"portscan".to_string()));
        assert!(enabled.contains(&"inventory".to_string()));
    }

    #[test]
    fn test_get_enabled_collectors_explicit_disable() {
        let command = commands::new();
        let matches = command.get_matches_from(vec!["cloud_exporter", "--no-collector.inventory"]);
        let enabled = get_enabled_collectors(&matches);

        assert!(!enabled.contains(&"inventory".to_string()));
        assert!(enabled.contains(&"exporter".to_string()));
    }

    #[test]
    fn test_handler_builds_config() {
        let action = run(&[
            "--port",
            "9000",
            "--target",
            "prod=10.0.0.1,prod=10.0.0.2,10.0.0.3",
            "--scrape.time",
            "2m",
            "--backoff",
            "30s,2m",
            "--collector.portscan",
            "--portscan.ports",
            "22,8000-8010",
            "--portscan.parallel",
            "4",
        ])
        .unwrap();

        let Action::Run {
            port,
            listen,
            config,
            targets,
        } = action;

        assert_eq!(port, 9000);
        assert!(listen.is_none());
        assert_eq!(targets.len(), 3);
        assert!(config.is_enabled("portscan"));
        assert_eq!(config.interval_for("inventory"), Duration::from_secs(120));
        assert_eq!(config.interval_for("exporter"), Duration::from_secs(10));
        assert_eq!(
            config.backoff,
            vec![Duration::from_secs(30), Duration::from_secs(120)]
        );
        assert_eq!(
            config.portscan.ports,
            vec![
                PortRange::new(22, 22).unwrap(),
                PortRange::new(8000, 8010).unwrap()
            ]
        );
        assert_eq!(config.portscan.parallel, 4);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_backoff_none_disables_ladder() {
        let Action::Run { config, .. } = run(&["--backoff", "none"]).unwrap();
        assert!(config.backoff.is_empty());
    }

    #[test]
    fn test_cache_path_accepts_file_url() {
        let Action::Run { config, .. } = run(&["--cache.path", "file:///var/cache/exporter"]).unwrap();
        assert_eq!(
            config.cache_dir,
            Some(std::path::PathBuf::from("/var/cache/exporter"))
        );
        assert_eq!(
            config.cache_location("inventory").as_deref(),
            Some("/var/cache/exporter/inventory.json")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(run(&["--target", "not-an-ip"]).is_err());
        assert!(run(&["--backoff", "5m,1m"]).is_err());
        assert!(run(&["--cache.path", "s3://bucket/cache"]).is_err());
        assert!(run(&["--portscan.ports", "70000"]).is_err());
        assert!(run(&["--portscan.threads", "0"]).is_err());
    }
}
