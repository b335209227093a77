//! Integration tests for the `devssr` binary.

use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "devssr-cli", "--bin", "devssr", "--"]);
    cmd
}

#[test]
fn test_version_prints_name() {
    let output = cargo_bin()
        .arg("version")
        .output()
        .expect("Failed to run version command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("devssr "), "unexpected stdout: {stdout}");
}

#[test]
fn test_inspect_json_image_from_stylesheet_is_inlined() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src/images")).unwrap();
    std::fs::write(dir.path().join("src/images/logo.png"), [0u8; 10]).unwrap();

    let output = cargo_bin()
        .args(["--json", "inspect", "~/images/logo.png", "--issuer", "src/app.css", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run inspect command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be valid JSON");

    assert_eq!(json["target"], "client");
    assert_eq!(json["size"], 10);
    assert_eq!(json["loaders"][0]["loader"], "url-loader");
    assert_eq!(json["disposition"]["kind"], "inline");
    assert_eq!(json["disposition"]["encoding"], "base64");
}

#[test]
fn test_inspect_json_image_from_script_is_emitted() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src/images")).unwrap();
    std::fs::write(dir.path().join("src/images/logo.png"), [0u8; 10]).unwrap();

    let output = cargo_bin()
        .args(["--json", "inspect", "~/images/logo.png", "--issuer", "src/app.js", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run inspect command");

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["loaders"][0]["loader"], "file-loader");
    assert_eq!(json["disposition"]["kind"], "emit");
}

/// Two-target config whose engine commands are plain shell.
fn write_config(root: &Path, server_command: Option<&str>) {
    let mut server = serde_json::json!({
        "name": "server",
        "kind": "node",
        "entry": {"server": ["./src/server.js"]},
        "output": {"path": "dist/server", "filename": "index.js"}
    });
    if let Some(command) = server_command {
        server["command"] = command.into();
    }
    let config = serde_json::json!({
        "targets": [
            {
                "name": "client",
                "entry": {"client": ["./src/client.js"]},
                "output": {
                    "path": "dist",
                    "filename": "assets/[name].js",
                    "public_path": "/"
                },
                "plugins": [
                    {"type": "assets-manifest", "output": "manifest.json", "chunk_manifest": "chunk-manifest.json"}
                ],
                "command": "mkdir -p {outdir}/assets && printf 'c' > {outdir}/assets/client.js"
            },
            server
        ]
    });
    std::fs::write(
        root.join("devssr.config.json"),
        serde_json::to_string(&config).unwrap(),
    )
    .unwrap();
}

const SERVER_COMMAND: &str = "printf 'exports.default = () => 1' > {outdir}/index.js";

#[cfg(unix)]
#[test]
fn test_build_without_engine_command_fails() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), None);

    let output = cargo_bin()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run build command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("No build command configured for target `server`"),
        "unexpected stderr: {stderr}"
    );
}

#[cfg(unix)]
#[test]
fn test_build_json_writes_outputs_and_manifests() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), Some(SERVER_COMMAND));

    let output = cargo_bin()
        .args(["--json", "build", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run build command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    assert_eq!(json["ok"], true);
    assert_eq!(json["targets"][0]["name"], "client");
    assert_eq!(json["targets"][1]["files"][0], "index.js");

    assert_eq!(
        std::fs::read_to_string(dir.path().join("dist/assets/client.js")).unwrap(),
        "c"
    );
    assert!(dir.path().join("dist/server/index.js").exists());

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("dist/manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["client"][0], "/assets/client.js");
}

#[cfg(unix)]
#[test]
fn test_build_fails_when_manifest_cannot_be_written() {
    let dir = tempdir().unwrap();
    write_config(dir.path(), Some(SERVER_COMMAND));
    // a directory where the manifest file should go
    std::fs::create_dir_all(dir.path().join("dist/manifest.json")).unwrap();

    let output = cargo_bin()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run build command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("manifest.json"), "unexpected stderr: {stderr}");
    // the compiled outputs are still written
    assert!(dir.path().join("dist/assets/client.js").exists());
}
