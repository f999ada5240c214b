use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use uuid::Uuid;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content)
        .unwrap_or_else(|e| panic!("write {} failed: {e}", path.display()));
}

fn run_host(home: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_bilidown-host");
    Command::new(exe)
        .args(args)
        .env("BILIDOWN_HOME", home)
        .env("RUST_LOG", "info")
        .output()
        .expect("run bilidown-host")
}

fn describe(out: &Output) -> String {
    format!(
        "status={:?}, stdout={}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

#[test]
fn list_channels_prints_every_channel_and_exits() {
    let dir = unique_temp_dir("bilidown-host-list");
    let _cleanup = CleanupDir(dir.clone());
    let config = dir.join("config.json");

    let out = run_host(&dir, &["--config", config.to_str().expect("utf8 path"), "--list-channels"]);
    assert!(out.status.success(), "list-channels failed: {}", describe(&out));

    let stdout = String::from_utf8_lossy(&out.stdout);
    let channels: Vec<&str> = stdout.lines().collect();
    assert_eq!(channels.len(), 11, "stdout: {stdout}");
    for expected in [
        "bilibili:getVideoInfo",
        "bilibili:loginWithPassword",
        "bilibili:getLoginQrCodeStatus",
        "bilibili:logOut",
        "config:getAll",
        "config:set",
    ] {
        assert!(channels.contains(&expected), "missing {expected}: {stdout}");
    }

    // 只读启动不写配置文件
    assert!(!config.exists());
}

#[test]
fn saved_session_is_restored_on_startup() {
    let dir = unique_temp_dir("bilidown-host-restore");
    let _cleanup = CleanupDir(dir.clone());
    write_file(
        &dir.join("config.json"),
        r#"{ "cookieString": "SESSDATA=s; bili_jct=XYZ", "theme": "dark" }"#,
    );

    // 未传 --config 时使用 BILIDOWN_HOME 下的 config.json
    let out = run_host(&dir, &["--list-channels"]);
    assert!(out.status.success(), "list-channels failed: {}", describe(&out));

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("已恢复登录会话（2 条 Cookie）"), "stderr: {stderr}");
    assert!(!String::from_utf8_lossy(&out.stdout).contains("已恢复"));
}

#[test]
fn corrupt_config_fails_startup() {
    let dir = unique_temp_dir("bilidown-host-corrupt");
    let _cleanup = CleanupDir(dir.clone());
    write_file(&dir.join("config.json"), "{not json");

    let out = run_host(&dir, &["--list-channels"]);
    assert!(!out.status.success(), "must fail: {}", describe(&out));
    assert!(String::from_utf8_lossy(&out.stderr).contains("读取配置失败"), "{}", describe(&out));
}

#[test]
fn non_loopback_listen_address_is_refused() {
    let dir = unique_temp_dir("bilidown-host-listen");
    let _cleanup = CleanupDir(dir.clone());

    let out = run_host(&dir, &["--listen", "0.0.0.0:0"]);
    assert!(!out.status.success(), "must fail: {}", describe(&out));
    assert!(String::from_utf8_lossy(&out.stderr).contains("回环地址"), "{}", describe(&out));
}

struct CleanupDir(PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
