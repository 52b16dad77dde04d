use crate::auth::{self, TokenGate, ACCESS_TOKEN_ENV, TOKEN_FILE_NAME};
use crate::config::{self, ConfigError, Settings};
use crate::runtime::{
    append_runtime_log, bootstrap_state_root, default_state_root_path, drain_queue_once,
    load_status_board, run_loop, StatePaths,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Run,
    Drain,
    Doctor,
    Init,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "run" => CliVerb::Run,
        "drain" => CliVerb::Drain,
        "doctor" => CliVerb::Doctor,
        "init" => CliVerb::Init,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  run      [--state-root <path>]       Start the queue worker and heartbeat".to_string(),
        "  drain    [--state-root <path>]       Process every queued event once and exit"
            .to_string(),
        "  doctor   [--state-root <path>]       Check settings, state layout and credentials"
            .to_string(),
        "  init     [--state-root <path>]       Write a starter config.yaml".to_string(),
        "  help                                 Show this help".to_string(),
        "  --version                            Print the spaceflow version".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Run => cmd_run(&args[1..]),
        CliVerb::Drain => cmd_drain(&args[1..]),
        CliVerb::Doctor => cmd_doctor(&args[1..]),
        CliVerb::Init => cmd_init(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}

pub(crate) fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

fn parse_state_root(verb: &str, args: &[String]) -> Result<PathBuf, String> {
    match args {
        [] => default_state_root_path().map_err(|e| e.to_string()),
        [flag, value] if flag == "--state-root" => Ok(PathBuf::from(value)),
        _ => Err(format!("usage: {verb} [--state-root <path>]")),
    }
}

pub(crate) fn ensure_runtime_root(root: PathBuf) -> Result<StatePaths, String> {
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    Ok(paths)
}

fn load_settings(paths: &StatePaths) -> Result<Settings, String> {
    config::load_settings(&paths.root).map_err(map_config_err)
}

fn cmd_run(args: &[String]) -> Result<String, String> {
    let paths = ensure_runtime_root(parse_state_root("run", args)?)?;
    let settings = load_settings(&paths)?;
    run_loop(&paths.root, settings).map_err(|e| e.to_string())?;
    Ok(format!("runtime stopped\nstate_root={}", paths.root.display()))
}

fn cmd_drain(args: &[String]) -> Result<String, String> {
    let paths = ensure_runtime_root(parse_state_root("drain", args)?)?;
    let settings = load_settings(&paths)?;

    let gate = TokenGate::new();
    if let Err(err) = auth::refresh_gate(&paths.root, &gate) {
        append_runtime_log(&paths, "error", "auth.token.error", &err.to_string());
    }

    let drained = drain_queue_once(&paths.root, &settings, &gate).map_err(|e| e.to_string())?;
    Ok(format!(
        "drained\nstate_root={}\nevents={drained}",
        paths.root.display()
    ))
}

fn cmd_init(args: &[String]) -> Result<String, String> {
    let paths = ensure_runtime_root(parse_state_root("init", args)?)?;
    let settings_file = paths.settings_file();
    if settings_file.exists() {
        return Err(format!(
            "refusing to overwrite existing {}",
            settings_file.display()
        ));
    }
    config::save_settings(&paths.root, &config::starter_settings()).map_err(map_config_err)?;
    Ok(format!(
        "initialized\nstate_root={}\nconfig={}",
        paths.root.display(),
        settings_file.display()
    ))
}

#[derive(Debug, Clone)]
struct DoctorFinding {
    id: String,
    ok: bool,
    detail: String,
    remediation: String,
}

fn doctor_finding(
    id: impl Into<String>,
    ok: bool,
    detail: impl Into<String>,
    remediation: impl Into<String>,
) -> DoctorFinding {
    DoctorFinding {
        id: id.into(),
        ok,
        detail: detail.into(),
        remediation: remediation.into(),
    }
}

fn can_write_directory(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path).map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    let probe = path.join(format!(".spaceflow-doctor-{}", std::process::id()));
    fs::write(&probe, b"ok").map_err(|e| format!("failed to write {}: {e}", probe.display()))?;
    fs::remove_file(&probe).map_err(|e| format!("failed to remove {}: {e}", probe.display()))
}

fn cmd_doctor(args: &[String]) -> Result<String, String> {
    let paths = ensure_runtime_root(parse_state_root("doctor", args)?)?;
    let mut findings = Vec::new();

    let config_path = paths.settings_file();
    findings.push(doctor_finding(
        "config.path",
        config_path.exists(),
        format!("config={}", config_path.display()),
        "run `spaceflow init` to create a starter config",
    ));

    let settings = match load_settings(&paths) {
        Ok(settings) => {
            findings.push(doctor_finding(
                "config.parse",
                true,
                "settings parsed and validated",
                "none",
            ));
            Some(settings)
        }
        Err(err) => {
            findings.push(doctor_finding(
                "config.parse",
                false,
                format!("settings load failed: {err}"),
                format!("fix {} and retry `spaceflow doctor`", config_path.display()),
            ));
            None
        }
    };

    if let Some(settings) = settings.as_ref() {
        findings.push(doctor_finding(
            "config.handlers",
            !settings.handlers.is_empty(),
            format!("handlers={}", settings.handlers.len()),
            "add at least one handlers entry to config.yaml",
        ));
    }

    findings.push(match can_write_directory(&paths.root) {
        Ok(_) => doctor_finding(
            "state.root",
            true,
            format!("writable={}", paths.root.display()),
            "none",
        ),
        Err(err) => doctor_finding(
            "state.root",
            false,
            err,
            "grant write permission to the state root",
        ),
    });

    let credential = auth::credential_health(&paths.root);
    findings.push(doctor_finding(
        "auth.credential",
        credential.ok,
        match credential.source.as_deref() {
            Some(source) => format!("source={source}"),
            None => "source=none".to_string(),
        },
        credential.reason.unwrap_or_else(|| {
            format!("set {ACCESS_TOKEN_ENV} or write runtime/{TOKEN_FILE_NAME}")
        }),
    ));

    let failed = findings.iter().filter(|f| !f.ok).count();
    let summary = if failed == 0 { "healthy" } else { "unhealthy" };
    let mut lines = vec![
        format!("summary={summary}"),
        format!("checks_total={}", findings.len()),
        format!("checks_failed={failed}"),
    ];
    for finding in findings {
        lines.push(format!(
            "check:{}={}",
            finding.id,
            if finding.ok { "ok" } else { "fail" }
        ));
        lines.push(format!("check:{}.detail={}", finding.id, finding.detail));
        if !finding.ok {
            lines.push(format!(
                "check:{}.remediation={}",
                finding.id, finding.remediation
            ));
        }
    }

    if let Ok(board) = load_status_board(&paths) {
        for (key, entry) in &board.entries {
            lines.push(format!("status:{key}={} {}", entry.tone.as_str(), entry.text));
        }
    }

    Ok(lines.join("\n"))
}
