//! Deploy-target validation (spec §4.9). Every rule is its own small
//! function so each can be unit tested in isolation.

use std::path::{Path, PathBuf};

use crate::error::{AcmeError, Result};

/// Paths and path prefixes a deploy target must never fall under, regardless
/// of configured allow-list.
const DANGER_LIST: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    "/etc/crontab",
    "/etc/cron.d",
    "/etc/init.d",
    "/etc/systemd",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/root/.ssh",
    "/var/spool/cron",
];

/// Deploy paths allowed when the operator configures no explicit allow-list.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "/etc/ssl",
    "/etc/nginx/ssl",
    "/etc/nginx/certs",
    "/etc/apache2/ssl",
    "/etc/httpd/ssl",
    "/etc/letsencrypt",
    "/var/lib/letsync",
    "/opt/certs",
    "/home",
    "/root/certs",
];

const ALLOWED_EXTENSIONS: &[&str] = &[".pem", ".crt", ".key", ".cer", ".chain"];

/// Directory permission mode for a created deploy directory (spec §4.9).
pub const DIR_MODE: u32 = 0o750;
/// Permission mode for the cert/fullchain files.
pub const CERT_FILE_MODE: u32 = 0o644;
/// Permission mode for the private key file.
pub const KEY_FILE_MODE: u32 = 0o600;

/// Validate a deploy path: absolute, no `..`, not under the danger list, and
/// (if an allow-list is configured) prefixed by one of its entries.
pub fn validate_deploy_path(path: &str, allow_list: &[String]) -> Result<()> {
    if !path.starts_with('/') {
        return Err(AcmeError::deploy(format!("deploy path must be absolute: {path}")));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(AcmeError::deploy(format!("deploy path must not contain '..': {path}")));
    }
    if DANGER_LIST.iter().any(|danger| path_has_prefix(path, danger)) {
        return Err(AcmeError::deploy(format!("deploy path is on the danger list: {path}")));
    }

    let effective_allow_list: Vec<&str> = if allow_list.is_empty() {
        DEFAULT_ALLOW_LIST.to_vec()
    } else {
        allow_list.iter().map(String::as_str).collect()
    };

    if !effective_allow_list.is_empty()
        && !effective_allow_list.iter().any(|allowed| path_has_prefix(path, allowed))
    {
        return Err(AcmeError::deploy(format!(
            "deploy path is not under any configured allow-list entry: {path}"
        )));
    }

    Ok(())
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Validate a single filename from a cert binding's `file_mapping` (spec
/// §4.9): no path separators, not `.`/`..`, no leading dot, bounded length,
/// and an allow-listed extension.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(AcmeError::deploy(format!("invalid filename length: {name}")));
    }
    if name == "." || name == ".." {
        return Err(AcmeError::deploy(format!("filename must not be '.' or '..': {name}")));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(AcmeError::deploy(format!("filename must not contain path separators: {name}")));
    }
    if name.starts_with('.') {
        return Err(AcmeError::deploy(format!("filename must not start with '.': {name}")));
    }
    if !ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return Err(AcmeError::deploy(format!(
            "filename extension must be one of {ALLOWED_EXTENSIONS:?}: {name}"
        )));
    }
    Ok(())
}

/// The three files a binding writes: cert, private key, fullchain.
pub struct DeployFiles<'a> {
    pub cert_name: &'a str,
    pub key_name: &'a str,
    pub fullchain_name: &'a str,
    pub cert_pem: &'a [u8],
    pub key_pem: &'a [u8],
    pub fullchain_pem: &'a [u8],
}

/// Atomically write the three certificate files into `deploy_path`, creating
/// the directory (mode 0750) if absent. Each file is written to a sibling
/// temp path and renamed into place so a reader never observes a partial
/// write (spec §4.9, §8 property "atomic deploy").
#[cfg(unix)]
pub async fn write_deploy_files(deploy_path: &str, files: DeployFiles<'_>, allow_list: &[String]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    validate_deploy_path(deploy_path, allow_list)?;
    validate_filename(files.cert_name)?;
    validate_filename(files.key_name)?;
    validate_filename(files.fullchain_name)?;

    let dir = PathBuf::from(deploy_path);
    if !dir.exists() {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AcmeError::deploy(format!("failed to create deploy directory: {e}")))?;
        tokio::fs::set_permissions(&dir, std::fs::Permissions::from_mode(DIR_MODE))
            .await
            .map_err(|e| AcmeError::deploy(format!("failed to set deploy directory mode: {e}")))?;
    }

    write_file_atomic(&dir.join(files.cert_name), files.cert_pem, CERT_FILE_MODE).await?;
    write_file_atomic(&dir.join(files.key_name), files.key_pem, KEY_FILE_MODE).await?;
    write_file_atomic(&dir.join(files.fullchain_name), files.fullchain_pem, CERT_FILE_MODE).await?;

    Ok(())
}

#[cfg(unix)]
async fn write_file_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp-deploy");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| AcmeError::deploy(format!("failed to write {}: {e}", path.display())))?;
    tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| AcmeError::deploy(format!("failed to set permissions on {}: {e}", path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AcmeError::deploy(format!("failed to rename into {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_deploy_path_rejects_relative() {
        assert!(validate_deploy_path("etc/ssl", &[]).is_err());
    }

    #[test]
    fn test_validate_deploy_path_rejects_dotdot() {
        assert!(validate_deploy_path("/etc/ssl/../passwd", &[]).is_err());
    }

    #[test]
    fn test_validate_deploy_path_rejects_danger_list() {
        assert!(validate_deploy_path("/etc/systemd/ssl", &[]).is_err());
        assert!(validate_deploy_path("/bin/ssl", &[]).is_err());
    }

    #[test]
    fn test_validate_deploy_path_accepts_default_allow_list() {
        assert!(validate_deploy_path("/etc/ssl/mysite", &[]).is_ok());
        assert!(validate_deploy_path("/var/lib/letsync/certs", &[]).is_ok());
    }

    #[test]
    fn test_validate_deploy_path_rejects_outside_configured_allow_list() {
        let allow_list = vec!["/opt/myapp".to_string()];
        assert!(validate_deploy_path("/etc/ssl/mysite", &allow_list).is_err());
        assert!(validate_deploy_path("/opt/myapp/certs", &allow_list).is_ok());
    }

    #[test]
    fn test_validate_filename_rules() {
        assert!(validate_filename("cert.pem").is_ok());
        assert!(validate_filename("../cert.pem").is_err());
        assert!(validate_filename("sub/cert.pem").is_err());
        assert!(validate_filename(".hidden.pem").is_err());
        assert!(validate_filename("cert.txt").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
    }
}
