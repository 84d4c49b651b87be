use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use ahash::AHashSet;
use tempfile::TempDir;

use crate::config::{Config, LogLevel};

use super::*;

const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
b:x:500:500::/home/b:/bin/bash
a:x:1000:1000::/home/a:/bin/bash
";

fn test_config(dir: &Path) -> Config {
    fs::write(dir.join("passwd"), PASSWD).unwrap();

    Config {
        subuid_file: dir.join("subuid"),
        subgid_file: dir.join("subgid"),
        minimum_user_id: 1000,
        service_timeout: 1,
        filtered_user_names: AHashSet::new(),
        log_level: LogLevel::Info,
        passwd_file: dir.join("passwd"),
    }
}

#[test]
fn test_cycle_writes_both_files() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let result = run_cycle(&config).unwrap();

    assert!(result.changed);
    assert_eq!(
        fs::read_to_string(&config.subuid_file).unwrap(),
        "a:100000000:65536\n"
    );
    assert_eq!(
        fs::read_to_string(&config.subgid_file).unwrap(),
        "a:100000000:65536\n"
    );
}

#[test]
fn test_second_cycle_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    assert!(run_cycle(&config).unwrap().changed);
    assert!(!run_cycle(&config).unwrap().changed);

    assert_eq!(
        fs::read_to_string(&config.subuid_file).unwrap(),
        "a:100000000:65536\n"
    );
}

#[test]
fn test_new_user_grows_mapping_in_uid_order() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    run_cycle(&config).unwrap();

    let mut passwd = PASSWD.to_owned();
    passwd.push_str("c:x:1500:1500::/home/c:/bin/bash\n");
    fs::write(&config.passwd_file, passwd).unwrap();

    let result = run_cycle(&config).unwrap();

    assert!(result.changed);
    assert_eq!(
        fs::read_to_string(&config.subuid_file).unwrap(),
        "a:100000000:65536\nc:150000000:65536\n"
    );
}

#[test]
fn test_stale_sibling_is_repaired() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    run_cycle(&config).unwrap();
    fs::remove_file(&config.subgid_file).unwrap();

    let result = run_cycle(&config).unwrap();

    assert!(result.changed);
    assert_eq!(
        fs::read_to_string(&config.subgid_file).unwrap(),
        "a:100000000:65536\n"
    );
}

#[test]
fn test_corrupt_mapping_file_is_rewritten() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    run_cycle(&config).unwrap();
    fs::write(&config.subuid_file, "not a mapping\n").unwrap();

    assert!(run_cycle(&config).unwrap().changed);
    assert_eq!(
        fs::read_to_string(&config.subuid_file).unwrap(),
        "a:100000000:65536\n"
    );
}

#[test]
fn test_unavailable_user_database_fails_the_cycle() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.passwd_file = dir.path().join("missing-passwd");

    assert!(matches!(
        run_cycle(&config).unwrap_err(),
        CycleError::Directory(_)
    ));
    assert!(!config.subuid_file.exists());
    assert!(!config.subgid_file.exists());
}

#[test]
fn test_failed_persist_leaves_targets_unchanged() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    // Unwritable destination: the subuid file's directory does not exist
    config.subuid_file = dir.path().join("missing").join("subuid");

    let err = run_cycle(&config).unwrap_err();

    assert!(matches!(err, CycleError::Persist { ref path, .. } if *path == config.subuid_file));
    assert!(!config.subuid_file.exists());
    assert!(!config.subgid_file.exists());
}

#[test]
fn test_denied_replace_leaves_seeded_content_unchanged() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    run_cycle(&config).unwrap();
    let seeded = fs::read_to_string(&config.subgid_file).unwrap();

    // A new user forces a rewrite, while the subuid destination is occupied
    // by a non-empty directory so the replace step must fail
    let mut passwd = PASSWD.to_owned();
    passwd.push_str("c:x:1500:1500::/home/c:/bin/bash\n");
    fs::write(&config.passwd_file, passwd).unwrap();

    fs::remove_file(&config.subuid_file).unwrap();
    fs::create_dir(&config.subuid_file).unwrap();
    fs::write(config.subuid_file.join("occupant"), "x").unwrap();

    let err = run_cycle(&config).unwrap_err();

    assert!(matches!(
        err,
        CycleError::Persist {
            ref path,
            source: WriteError::Replace { .. },
        } if *path == config.subuid_file
    ));
    assert_eq!(fs::read_to_string(&config.subgid_file).unwrap(), seeded);
    assert!(config.subuid_file.join("occupant").exists());
}

#[test]
fn test_daemon_survives_failing_cycles() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.passwd_file = dir.path().join("missing-passwd");

    let token = ShutdownToken::with_poll_interval(Duration::from_millis(5));
    let loop_token = token.clone();
    let handle = thread::spawn(move || run(&config, &loop_token));

    thread::sleep(Duration::from_millis(50));
    token.request_shutdown();

    handle.join().unwrap();
}

#[test]
fn test_shutdown_interrupts_long_sleep() {
    let token = ShutdownToken::with_poll_interval(Duration::from_millis(5));
    let waiter = token.clone();
    let handle = thread::spawn(move || waiter.wait(Duration::from_secs(30)));

    thread::sleep(Duration::from_millis(20));
    let requested_at = Instant::now();
    token.request_shutdown();

    assert!(handle.join().unwrap());
    assert!(requested_at.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_wait_handles_enormous_timeout() {
    let token = ShutdownToken::with_poll_interval(Duration::from_millis(5));
    let waiter = token.clone();
    let handle = thread::spawn(move || waiter.wait(Duration::from_secs(u64::MAX)));

    thread::sleep(Duration::from_millis(20));
    token.request_shutdown();

    // join fails if the waiting thread panicked instead of sleeping
    assert!(handle.join().unwrap());
}

#[test]
fn test_wait_times_out_without_shutdown() {
    let token = ShutdownToken::with_poll_interval(Duration::from_millis(1));

    assert!(!token.wait(Duration::from_millis(10)));
    assert!(!token.should_stop());
}

#[test]
fn test_request_shutdown_is_idempotent() {
    let token = ShutdownToken::new();

    assert!(!token.should_stop());
    token.request_shutdown();
    token.request_shutdown();
    assert!(token.should_stop());
}
