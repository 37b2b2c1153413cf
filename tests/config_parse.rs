use broadcaster::config::Config;
use std::time::Duration;

#[test]
fn parse_example_config() {
    let raw = include_str!("../broadcaster.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.broadcast.cooldown_ms, 1000);
    assert_eq!(cfg.progress.step_percent, 5);
    assert_eq!(cfg.report.max_per_page * cfg.report.max_pages, 150);
    assert!(cfg.simulation.workers >= 1);
    assert!(!cfg.output.out_dir.is_empty());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[broadcast]\ncooldown_ms = 900\n").expect("parse TOML");
    assert_eq!(cfg.broadcast.cooldown_ms, 900);
    assert_eq!(cfg.broadcast.max_message_len, 2000);
    assert_eq!(cfg.progress.heartbeat_ms, 3000);
    assert_eq!(cfg.report.reason_max_len, 100);
}

#[test]
fn pacing_shrinks_with_workers() {
    let cfg = Config::default();
    assert_eq!(cfg.broadcast.pacing_interval(1), Duration::from_millis(1000));
    assert_eq!(cfg.broadcast.pacing_interval(4), Duration::from_millis(250));
    assert_eq!(cfg.broadcast.pacing_interval(0), Duration::from_millis(1000));
}
