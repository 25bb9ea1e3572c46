mod common;
use crate::common::builders::ConfigFileBuilder;

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use serverwrap::config::{
    load_and_validate, load_for_launch, load_from_path, parse_duration, ConfigFile,
};
use serverwrap::errors::SupervisorError;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(result: Result<ConfigFile, SupervisorError>, needle: &str) {
    match result {
        Err(SupervisorError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message '{msg}' does not mention '{needle}'");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_full_config_is_resolved() {
    let file = write_config(
        r#"
[server]
program = "java"
args = ["-Xmx1024M", "-jar", "minecraft_server.jar", "nogui"]
working_dir = "/srv/minecraft"

[server.env]
JAVA_HOME = "/opt/java"

[readiness]
ready_pattern = "Done \\("
failure_pattern = "FAILED TO BIND"
startup_timeout = "2m"

[shutdown]
stop_command = "stop"
stop_timeout = "45s"
handle_signals = false

[commands]
poll_interval = "20ms"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.command.program, "java");
    assert_eq!(cfg.command.args.len(), 4);
    assert_eq!(
        cfg.command.working_dir.as_deref(),
        Some(std::path::Path::new("/srv/minecraft"))
    );
    assert_eq!(cfg.command.env.get("JAVA_HOME").map(String::as_str), Some("/opt/java"));

    assert!(cfg.markers.ready.is_match("Done (4.1s)!"));
    assert!(cfg.markers.failure.as_ref().unwrap().is_match("**** FAILED TO BIND TO PORT!"));
    assert_eq!(cfg.startup_timeout, Some(Duration::from_secs(120)));

    assert_eq!(cfg.options.stop_command.to_line(), "stop\n");
    assert_eq!(cfg.options.stop_timeout, Duration::from_secs(45));
    assert_eq!(cfg.options.poll_interval, Duration::from_millis(20));
    assert!(!cfg.options.handle_signals);
}

#[cfg(unix)]
#[test]
fn test_defaults_apply_for_missing_sections() {
    let file = write_config(
        r#"
[server]
cmd = "./run.sh"

[readiness]
ready_pattern = "ready"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.command.program, "sh");
    assert_eq!(cfg.command.args, vec!["-c".to_string(), "./run.sh".to_string()]);
    assert!(cfg.markers.failure.is_none());
    assert_eq!(cfg.startup_timeout, None);
    assert_eq!(cfg.options.stop_command.name, "stop");
    assert_eq!(cfg.options.stop_timeout, Duration::from_secs(30));
    assert_eq!(cfg.options.poll_interval, Duration::from_millis(50));
    assert!(cfg.options.handle_signals);
}

#[test]
fn test_cli_command_overrides_server_section() {
    let file = write_config(
        r#"
[server]
cmd = "ignored"
working_dir = "/tmp"

[readiness]
ready_pattern = "ready"
"#,
    );

    let argv = ["./bedrock_server".to_string(), "--quiet".to_string()];
    let cfg = load_for_launch(file.path(), &argv).unwrap();

    assert_eq!(cfg.command.program, "./bedrock_server");
    assert_eq!(cfg.command.args, vec!["--quiet".to_string()]);
    assert!(cfg.command.working_dir.is_some());
}

#[test]
fn test_missing_ready_pattern_is_rejected() {
    let raw = ConfigFileBuilder::new().cmd("./run.sh").raw();
    expect_config_error(ConfigFile::try_from(raw), "ready_pattern");
}

#[test]
fn test_missing_command_is_rejected() {
    let raw = ConfigFileBuilder::new().ready_pattern("ready").raw();
    expect_config_error(ConfigFile::try_from(raw), "must set `cmd` or `program`");
}

#[test]
fn test_cmd_and_program_together_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .program("java", &["-jar", "server.jar"])
        .ready_pattern("ready")
        .raw();
    expect_config_error(ConfigFile::try_from(raw), "not both");
}

#[test]
fn test_invalid_regex_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("Done (")
        .raw();
    expect_config_error(ConfigFile::try_from(raw), "ready_pattern");

    // The same text is fine as a literal.
    let cfg = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("Done (")
        .literal(true)
        .build();
    assert!(cfg.markers.ready.is_match("Done (1s)"));
}

#[test]
fn test_bad_durations_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("ready")
        .stop_timeout("soon")
        .raw();
    expect_config_error(ConfigFile::try_from(raw), "shutdown.stop_timeout");

    let mut raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("ready")
        .raw();
    raw.commands.poll_interval = "0ms".to_string();
    expect_config_error(ConfigFile::try_from(raw), "poll_interval");

    let raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("ready")
        .stop_timeout("6000000000000000h")
        .raw();
    expect_config_error(ConfigFile::try_from(raw), "too large");
}

#[test]
fn test_empty_stop_command_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .cmd("./run.sh")
        .ready_pattern("ready")
        .stop_command("  ")
        .raw();
    expect_config_error(ConfigFile::try_from(raw), "stop_command");
}

#[test]
fn test_malformed_toml_is_toml_error() {
    let file = write_config("[server\ncmd = ");
    match load_from_path(file.path()) {
        Err(SupervisorError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {:?}", other),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    match load_from_path(dir.path().join("nope.toml")) {
        Err(SupervisorError::IoError(_)) => {}
        other => panic!("Expected IoError, got: {:?}", other),
    }
}

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("").is_err());
    assert!(parse_duration("18446744073709551615m").is_err());
}
