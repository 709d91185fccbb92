//! Reload command safety model (spec §4.9). A `reload_cmd` must pass both a
//! blacklist of destructive verbs/shell metacharacters and an allow-list of
//! regular expressions before it is ever handed to a shell — defense in
//! depth, not either check alone.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{AcmeError, Result};

/// Destructive verbs that must never appear in a reload command, regardless
/// of the allow-list.
const BLACKLISTED_VERBS: &[&str] = &[
    "rm", "dd", "mkfs", "wget", "curl", "chmod", "chown", "eval", "exec", "source", "bash", "sh",
    "python", "perl", "ruby", "nc", "ncat",
];

/// Shell metacharacters that would let a command escape the allow-listed
/// form: redirection, pipelines, process substitution, command chaining,
/// newlines.
const BLACKLISTED_CHARS: &[char] = &['|', '&', ';', '>', '<', '`', '$', '\n', '\r'];

const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

static ALLOW_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^systemctl (reload|restart) [a-zA-Z0-9@._-]+$",
        r"^service [a-zA-Z0-9@._-]+ (reload|restart)$",
        r"^nginx -s reload$",
        r"^(apache2ctl|apachectl|httpd) (graceful|restart)$",
        r"^caddy reload(\s+--config\s+\S+)?$",
        r"^kill -HUP \d+$",
        r"^pkill -HUP [a-zA-Z0-9._-]+$",
        r"^docker restart [a-zA-Z0-9][a-zA-Z0-9_.-]*$",
        r"^docker-compose restart [a-zA-Z0-9][a-zA-Z0-9_.-]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("reload allow-list pattern is valid"))
    .collect()
});

/// Reject a command containing shell metacharacters or a blacklisted verb.
fn check_blacklist(command: &str) -> Result<()> {
    if command.chars().any(|c| BLACKLISTED_CHARS.contains(&c)) {
        return Err(AcmeError::reload(format!(
            "reload command contains a disallowed shell metacharacter: {command}"
        )));
    }
    let has_destructive_verb = command
        .split_whitespace()
        .any(|word| BLACKLISTED_VERBS.contains(&word));
    if has_destructive_verb {
        return Err(AcmeError::reload(format!(
            "reload command contains a blacklisted verb: {command}"
        )));
    }
    Ok(())
}

/// Require the command to match one of the curated allow-list patterns.
fn check_allow_list(command: &str) -> Result<()> {
    if ALLOW_PATTERNS.iter().any(|re| re.is_match(command)) {
        Ok(())
    } else {
        Err(AcmeError::reload(format!(
            "reload command does not match any allow-listed form: {command}"
        )))
    }
}

/// Validate a reload command. Both the blacklist and allow-list checks must
/// pass; neither alone is sufficient (spec §4.9, §8 S6).
pub fn validate_reload_command(command: &str) -> Result<()> {
    check_blacklist(command)?;
    check_allow_list(command)?;
    Ok(())
}

/// Validate and execute a reload command through a shell, with a
/// 30-second wall-clock timeout. The command is never passed any
/// user-supplied argument that didn't already pass both safety checks.
pub async fn run_reload_command(command: &str) -> Result<()> {
    validate_reload_command(command)?;

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output();

    let output = tokio::time::timeout(RELOAD_TIMEOUT, child)
        .await
        .map_err(|_| AcmeError::reload(format!("reload command timed out after {RELOAD_TIMEOUT:?}: {command}")))?
        .map_err(|e| AcmeError::reload(format!("failed to spawn reload command: {e}")))?;

    if !output.status.success() {
        return Err(AcmeError::reload(format!(
            "reload command exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_accepts_known_forms() {
        assert!(validate_reload_command("systemctl reload nginx").is_ok());
        assert!(validate_reload_command("service nginx restart").is_ok());
        assert!(validate_reload_command("nginx -s reload").is_ok());
        assert!(validate_reload_command("apachectl graceful").is_ok());
        assert!(validate_reload_command("caddy reload").is_ok());
        assert!(validate_reload_command("kill -HUP 1234").is_ok());
        assert!(validate_reload_command("pkill -HUP nginx").is_ok());
        assert!(validate_reload_command("docker restart my_proxy").is_ok());
        assert!(validate_reload_command("docker-compose restart web").is_ok());
    }

    #[test]
    fn test_rejects_chained_destructive_command() {
        let result = validate_reload_command("systemctl reload nginx && rm -rf /");
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_blacklisted_verb_even_if_allow_list_shaped() {
        assert!(validate_reload_command("rm -rf /etc/nginx").is_err());
        assert!(validate_reload_command("curl http://evil.example").is_err());
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        assert!(validate_reload_command("systemctl reload nginx; echo pwned").is_err());
        assert!(validate_reload_command("systemctl reload nginx > /tmp/out").is_err());
        assert!(validate_reload_command("echo `whoami`").is_err());
    }

    #[test]
    fn test_rejects_command_not_on_allow_list() {
        assert!(validate_reload_command("systemctl status nginx").is_err());
        assert!(validate_reload_command("echo hi").is_err());
    }
}
