// file: src/network/transfer.rs
// version: 1.1.0
// guid: 19906638-fb0e-42ca-a4df-94777dec7ac9

//! Artifact retrieval onto the host and text-file provisioning

use super::elevation::shell_quote;
use super::executor::{HostRunner, RemoteShell};
use crate::{ProvisionError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

/// Remote staging area for pushed files
const REMOTE_TMP: &str = "/tmp";

/// `true` when `source` is an absolute URL with a scheme and a host
pub fn is_url(source: &str) -> bool {
    Url::parse(source)
        .map(|u| !u.scheme().is_empty() && has_host(&u))
        .unwrap_or(false)
}

fn has_host(url: &Url) -> bool {
    matches!(url.host_str(), Some(host) if !host.is_empty())
}

/// File name the artifact will have on the host
pub fn artifact_name(source: &str) -> String {
    if let Ok(url) = Url::parse(source) {
        if has_host(&url) {
            if let Some(name) = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
            {
                return name.to_string();
            }
        }
    }
    Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn local_path(source: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(source).into_owned())
}

/// Place `source` into `dest_dir` on the host; returns the remote file path.
///
/// URLs are downloaded by the host itself. Anything else must exist on the
/// local filesystem and is copied over SCP.
pub async fn fetch<S>(runner: &mut HostRunner<'_, S>, source: &str, dest_dir: &str) -> Result<String>
where
    S: RemoteShell + ?Sized,
{
    runner
        .run(&format!("mkdir -p {}", dest_dir))
        .await
        .map_err(|e| ProvisionError::transfer(format!("Error getting - {}: {}", source, e)))?;

    let name = artifact_name(source);

    if is_url(source) {
        let cmd = format!("cd {} ; curl -f -k -L -O {}", dest_dir, shell_quote(source));
        runner.run(&cmd).await.map_err(|e| {
            error!("Failed to download file {}", source);
            ProvisionError::transfer(format!("Error getting file - {}: {}", source, e))
        })?;
        info!("Downloaded {} on host", source);
        return Ok(format!("{}/{}", dest_dir, name));
    }

    let local = local_path(source);
    if local.exists() {
        let absolute_dir = runner
            .run(&format!("cd {} > /dev/null ; pwd", dest_dir))
            .await
            .map(|out| out.trim().to_string())
            .map_err(|e| {
                ProvisionError::transfer(format!("Unable to resolve {} on host: {}", dest_dir, e))
            })?;
        let remote = format!("{}/{}", absolute_dir, name);
        runner.upload(&local, &remote).await?;
        info!("Copied {} to host at {}", local.display(), remote);
        return Ok(remote);
    }

    error!(
        "File {} is neither a valid URL nor a valid local path",
        source
    );
    Err(ProvisionError::transfer(format!(
        "File {} is neither a valid URL nor a valid local path",
        source
    )))
}

/// Decompress a single `.gz` layer in place; returns the resulting path
pub async fn gunzip<S>(runner: &mut HostRunner<'_, S>, remote_path: &str) -> Result<String>
where
    S: RemoteShell + ?Sized,
{
    match remote_path.strip_suffix(".gz") {
        Some(stripped) => {
            runner.sudo(&format!("gunzip -f {}", remote_path)).await?;
            Ok(stripped.to_string())
        }
        None => Ok(remote_path.to_string()),
    }
}

/// Write `lines` to `remote_path` via a local owner-only temp file, a remote
/// temp copy and a final elevated move
pub async fn push_text<S>(
    runner: &mut HostRunner<'_, S>,
    remote_path: &str,
    lines: &[String],
) -> Result<()>
where
    S: RemoteShell + ?Sized,
{
    let base = Path::new(remote_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blx".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}.", base))
        .tempfile()
        .map_err(|e| {
            ProvisionError::transfer(format!("Failed to create temp file for {}: {}", remote_path, e))
        })?;
    restrict_to_owner(tmp.path())?;

    for line in lines {
        writeln!(tmp, "{}", line)?;
    }
    tmp.flush()?;

    let tmp_name = tmp
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ProvisionError::transfer("Temp file has no name"))?;
    let staged = format!("{}/{}", REMOTE_TMP, tmp_name);

    runner.upload(tmp.path(), &staged).await?;
    runner
        .sudo(&format!("mv -f {} {}", staged, remote_path))
        .await?;
    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PassthroughDelivery, ScriptedShell};

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/blx.tar.gz"));
        assert!(is_url("http://10.0.0.1:8080/pkgs/blx.tar.gz"));
        assert!(!is_url("/opt/blx.tar.gz"));
        assert!(!is_url("relative/blx.tar.gz"));
        assert!(!is_url("file:///opt/blx.tar.gz"));
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name("https://example.com/a/blx-14.1.tar.gz"), "blx-14.1.tar.gz");
        assert_eq!(artifact_name("/opt/images/ofed.iso.gz"), "ofed.iso.gz");
    }

    #[tokio::test]
    async fn test_fetch_url_downloads_on_host() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let path = fetch(&mut runner, "https://example.com/blx.tar.gz", "/w/blx_install")
            .await
            .unwrap();

        assert_eq!(path, "/w/blx_install/blx.tar.gz");
        assert_eq!(script.count_matching("curl -f -k -L -O 'https://example.com/blx.tar.gz'"), 1);
        assert!(script.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_local_file_uploads_to_absolute_dir() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.lic");
        std::fs::write(&local, "license").unwrap();

        let mut shell = ScriptedShell::new();
        let script = shell.script();
        script.respond("pwd", "/home/admin/.blx_provisioner/license\n");
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let remote = fetch(&mut runner, local.to_str().unwrap(), "~/.blx_provisioner/license")
            .await
            .unwrap();

        assert_eq!(remote, "/home/admin/.blx_provisioner/license/a.lic");
        assert_eq!(script.uploads(), vec![remote]);
    }

    #[tokio::test]
    async fn test_fetch_local_file_fails_when_dir_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.lic");
        std::fs::write(&local, "license").unwrap();

        let mut shell = ScriptedShell::new();
        let script = shell.script();
        script.fail_on("pwd", "cd: permission denied");
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let err = fetch(&mut runner, local.to_str().unwrap(), "/w/license")
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Transfer(_)));
        assert!(script.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_missing_source_is_transfer_error() {
        let mut shell = ScriptedShell::new();
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        let err = fetch(&mut runner, "/definitely/not/here.tar.gz", "/w/x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Transfer(_)));
    }

    #[tokio::test]
    async fn test_push_text_stages_then_moves() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        push_text(
            &mut runner,
            "/etc/blx/blx.conf",
            &["a".to_string(), "b".to_string()],
        )
        .await
        .unwrap();

        let uploads = script.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].starts_with("/tmp/blx.conf."));
        assert_eq!(script.uploaded_content(&uploads[0]).as_deref(), Some("a\nb\n"));
        assert_eq!(
            script.count_matching(&format!("mv -f {} /etc/blx/blx.conf", uploads[0])),
            1
        );
    }

    #[tokio::test]
    async fn test_gunzip_only_touches_gz() {
        let mut shell = ScriptedShell::new();
        let script = shell.script();
        let delivery = PassthroughDelivery;
        let mut runner = HostRunner::new(&mut shell, &delivery, Some("/w"));

        assert_eq!(gunzip(&mut runner, "/w/ofed.iso.gz").await.unwrap(), "/w/ofed.iso");
        assert_eq!(gunzip(&mut runner, "/w/ofed.iso").await.unwrap(), "/w/ofed.iso");
        assert_eq!(script.count_matching("gunzip"), 1);
    }
}
