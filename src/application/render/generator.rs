use std::{
    io::{self, SeekFrom},
    path::Path,
    process::Stdio,
    time::Instant,
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    process::Command,
};
use tracing::{debug, warn};
use url::Url;

use super::types::RenderError;

const SOURCE: &str = "application::render::generator";

/// Run the site generator in `workdir` with `-b <base_url>`.
///
/// Both output streams of the child write to the same anonymous temp file, so
/// the returned text keeps the order in which lines were produced. The output
/// is returned alongside the failure when the generator exits unsuccessfully.
pub(crate) async fn run_generator(
    program: &Path,
    workdir: &Path,
    base_url: &Url,
) -> (String, Result<(), RenderError>) {
    let started_at = Instant::now();

    let capture = match tempfile::tempfile() {
        Ok(file) => file,
        Err(err) => return (String::new(), Err(RenderError::Capture(err))),
    };
    let (stdout, stderr) = match (capture.try_clone(), capture.try_clone()) {
        (Ok(stdout), Ok(stderr)) => (stdout, stderr),
        (Err(err), _) | (_, Err(err)) => return (String::new(), Err(RenderError::Capture(err))),
    };

    let mut command = Command::new(program);
    command
        .arg("-b")
        .arg(base_url.as_str())
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    debug!(
        target = SOURCE,
        program = %program.display(),
        workdir = %workdir.display(),
        base_url = %base_url,
        "running site generator"
    );

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                target = SOURCE,
                program = %program.display(),
                error = %err,
                "failed to spawn site generator"
            );
            return (String::new(), Err(RenderError::Start(err)));
        }
    };
    drop(command);

    debug!(target = SOURCE, "waiting for render to complete");
    let status = child.wait().await;

    let output = match read_capture(capture).await {
        Ok(output) => output,
        Err(err) => {
            warn!(target = SOURCE, error = %err, "failed to read generator output");
            String::new()
        }
    };

    let result = match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(RenderError::Build { status }),
        Err(err) => Err(RenderError::Wait(err)),
    };

    debug!(
        target = SOURCE,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        output_bytes = output.len(),
        success = result.is_ok(),
        "site generator finished"
    );

    (output, result)
}

async fn read_capture(capture: std::fs::File) -> io::Result<String> {
    let mut file = File::from_std(capture);
    file.seek(SeekFrom::Start(0)).await?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    fn base() -> Url {
        Url::parse("http://localhost:8080/preview/abcd/").expect("url")
    }

    #[tokio::test]
    async fn combines_stdout_and_stderr_in_order() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            dir.path(),
            "fake-hugo",
            "echo \"first $1 $2\"\necho second >&2\necho third",
        );

        let (output, result) = run_generator(&script, dir.path(), &base()).await;

        result.expect("generator succeeds");
        assert_eq!(
            output,
            "first -b http://localhost:8080/preview/abcd/\nsecond\nthird\n"
        );
    }

    #[tokio::test]
    async fn runs_inside_workdir() {
        let dir = TempDir::new().expect("temp dir");
        let workdir = dir.path().join("site");
        fs::create_dir_all(&workdir).expect("workdir");
        let script = write_script(dir.path(), "fake-hugo", "touch built.marker");

        let (_, result) = run_generator(&script, &workdir, &base()).await;

        result.expect("generator succeeds");
        assert!(workdir.join("built.marker").exists());
    }

    #[tokio::test]
    async fn failing_exit_keeps_output() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(dir.path(), "fake-hugo", "echo 'Error: template broke' >&2\nexit 3");

        let (output, result) = run_generator(&script, dir.path(), &base()).await;

        match result {
            Err(RenderError::Build { status }) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(output.contains("template broke"));
    }

    #[tokio::test]
    async fn missing_program_reports_start_failure() {
        let dir = TempDir::new().expect("temp dir");
        let (output, result) =
            run_generator(&dir.path().join("no-such-hugo"), dir.path(), &base()).await;

        assert!(matches!(result, Err(RenderError::Start(_))));
        assert!(output.is_empty());
    }
}
