// tests/config_load.rs
// Mutates process env; every test that touches it is #[serial].

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

use feed_relay::config::{load_from, resolve_path, ENV_CONFIG_PATH, ENV_STATE_PATH};
use feed_relay::StrategyKind;

/// Snapshot & restore env vars for the duration of a test.
struct EnvSnapshot {
    saved: Vec<(String, Option<String>)>,
}
impl EnvSnapshot {
    fn set(pairs: &[(&str, Option<&str>)]) -> Self {
        let mut saved = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            saved.push((k.to_string(), env::var(k).ok()));
            match v {
                Some(val) => env::set_var(k, val),
                None => env::remove_var(k),
            }
        }
        Self { saved }
    }
}
impl Drop for EnvSnapshot {
    fn drop(&mut self) {
        for (k, v) in self.saved.drain(..) {
            match v {
                Some(val) => env::set_var(&k, val),
                None => env::remove_var(&k),
            }
        }
    }
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

#[test]
#[serial]
fn toml_file_with_per_source_overrides() {
    let _env = EnvSnapshot::set(&[(ENV_STATE_PATH, None)]);
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "relay.toml",
        r##"
refresh_interval = 120
max_post_age_days = 3
delay_between_posts = 0.5
state_path = "data/state.json"

[forum]
command = "python3"
args = ["-m", "forumscraper"]

[[feeds]]
name = "Rust"
url = "https://www.reddit.com/r/rust/.rss"
webhook = "https://discord.test/api/webhooks/1/a"
webhook_name = "Crab"
embed_color = "#ff8800"

[[feeds]]
url = "https://forum.test/threads/t.1/"
webhook = "https://discord.test/api/webhooks/2/b"
strategy = "xenforo"
max_post_age_days = 0
"##,
    );

    let cfg = load_from(&path).unwrap();
    assert_eq!(cfg.refresh_interval, 120);
    assert_eq!(cfg.delay_between_posts, 0.5);
    assert_eq!(cfg.state_path, PathBuf::from("data/state.json"));
    assert_eq!(cfg.forum.command, "python3");
    assert_eq!(cfg.forum.args, ["-m", "forumscraper"]);
    assert_eq!(cfg.forum.timeout_secs, 120);

    let rust = &cfg.feeds[0];
    assert_eq!(rust.display_name(), "Rust");
    assert_eq!(rust.overrides().username.as_deref(), Some("Crab"));
    assert_eq!(rust.overrides().color, Some(0xff8800));
    assert_eq!(rust.max_age_days(cfg.max_post_age_days), 3);

    let forum = &cfg.feeds[1];
    assert_eq!(forum.kind(), StrategyKind::Forum);
    assert_eq!(forum.max_age_days(cfg.max_post_age_days), 0);
}

#[test]
#[serial]
fn json_file_is_detected_by_extension() {
    let _env = EnvSnapshot::set(&[(ENV_STATE_PATH, None)]);
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "config.json",
        r#"{"sources": [{"url": "https://a/rss", "webhook": "https://w", "embed_color": 255}]}"#,
    );

    let cfg = load_from(&path).unwrap();
    assert_eq!(cfg.feeds.len(), 1);
    assert_eq!(cfg.feeds[0].overrides().color, Some(255));
    assert_eq!(cfg.state_path, PathBuf::from("state.json"));
}

#[test]
#[serial]
fn state_path_env_overrides_file() {
    let _env = EnvSnapshot::set(&[(ENV_STATE_PATH, Some("/tmp/relay-state.json"))]);
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "c.toml", "state_path = \"ignored.json\"\n");

    let cfg = load_from(&path).unwrap();
    assert_eq!(cfg.state_path, PathBuf::from("/tmp/relay-state.json"));
}

#[test]
#[serial]
fn invalid_files_are_errors() {
    let _env = EnvSnapshot::set(&[(ENV_STATE_PATH, None)]);
    let dir = tempfile::tempdir().unwrap();

    assert!(load_from(&dir.path().join("absent.toml")).is_err());

    let bad = write(dir.path(), "bad.toml", "feeds = [[[");
    assert!(load_from(&bad).is_err());

    let negative = write(dir.path(), "neg.toml", "delay_between_posts = -1.0\n");
    let err = load_from(&negative).unwrap_err();
    assert!(format!("{err:#}").contains("delay_between_posts"));

    let color = write(
        dir.path(),
        "color.json",
        r##"{"feeds": [{"url": "u", "webhook": "w", "embed_color": "#zzzzzz"}]}"##,
    );
    assert!(load_from(&color).is_err());
}

#[test]
#[serial]
fn explicit_path_wins_over_env() {
    let _env = EnvSnapshot::set(&[(ENV_CONFIG_PATH, Some("/etc/relay/env.toml"))]);
    assert_eq!(
        resolve_path(Some(Path::new("cli.toml"))),
        PathBuf::from("cli.toml")
    );
    assert_eq!(resolve_path(None), PathBuf::from("/etc/relay/env.toml"));
}

#[test]
#[serial]
fn default_path_is_config_toml() {
    let _env = EnvSnapshot::set(&[(ENV_CONFIG_PATH, None)]);
    // the crate root has neither config.toml nor config.json
    assert_eq!(resolve_path(None), PathBuf::from("config.toml"));
}
