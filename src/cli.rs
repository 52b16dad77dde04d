use crate::commands;

/// Entry point behind the `spaceflow` binary. Version flags are answered
/// here; every verb goes to the command engine.
pub fn run(args: Vec<String>) -> Result<String, String> {
    match args.first().map(String::as_str) {
        Some("--version") | Some("-V") => Ok(version_line()),
        _ => commands::run_cli(args),
    }
}

fn version_line() -> String {
    format!("spaceflow {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_flag_reports_the_crate_version() {
        for flag in ["--version", "-V"] {
            let output = run(vec![flag.to_string()]).expect("version");
            assert_eq!(output, format!("spaceflow {}", env!("CARGO_PKG_VERSION")));
        }
    }

    #[test]
    fn spaceflow_verbs_reach_the_command_engine() {
        let help = run(vec!["help".to_string()]).expect("help");
        for verb in ["run", "drain", "doctor", "init"] {
            assert!(help.contains(verb), "help is missing the `{verb}` verb");
        }

        let err = run(vec!["serve".to_string()]).expect_err("unknown verb");
        assert!(err.contains("unknown command `serve`"));
    }
}
