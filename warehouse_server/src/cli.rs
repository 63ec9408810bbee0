use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // RZP_KEY_SECRET and WH_MAIL_RELAY_TOKEN are never printed
    const DISPLAY_ENVS: [&str; 14] = [
        "RUST_LOG",
        "WH_DATABASE_URL",
        "WH_STORE_CURRENCY",
        "RZP_KEY_ID",
        "WH_RZP_API_URL",
        "WH_MAIL_RELAY_URL",
        "WH_MAIL_FROM",
        "WH_RECONCILE_INTERVAL_MINS",
        "WH_JOB_ATTEMPTS",
        "WH_JOB_BACKOFF_MS",
        "WH_DELIVERY_WORKERS",
        "WH_RECONCILE_WORKERS",
        "WH_JOB_TIMEOUT_SECS",
        "WH_TRUSTED_PRIVILEGE_LEVEL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
