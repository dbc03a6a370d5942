//! Terminal detection utilities

use std::env;
use std::io::{IsTerminal, stdout};

/// Check if stdout is connected to an interactive terminal
pub fn is_interactive() -> bool {
    if !stdout().is_terminal() {
        return false;
    }

    // CI runners may allocate a TTY but nobody is watching
    !is_ci_environment()
}

/// Whether coloured output should be produced
pub fn use_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    let term = env::var("TERM").unwrap_or_default();
    is_interactive() && term != "dumb"
}

fn is_ci_environment() -> bool {
    let ci_vars = [
        "CI",
        "CONTINUOUS_INTEGRATION",
        "JENKINS_URL",
        "GITHUB_ACTIONS",
        "GITLAB_CI",
        "BUILDKITE",
    ];

    ci_vars.iter().any(|var| env::var(var).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_detection() {
        // Depends on the environment, must not panic
        let _ = is_interactive();
        let _ = use_color();
        let _ = is_ci_environment();
    }
}
