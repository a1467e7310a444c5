//! systemd unit generation and installation for the daemon.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::error::AppError;

/// Render the unit that keeps `exe daemon` running under systemd.
pub fn render_unit(exe: &Path, db_path: &Path) -> String {
    format!(
        "[Unit]
Description=Port Master Monitor Service
After=network.target

[Service]
ExecStart=\"{exe}\" --db \"{db}\" daemon
Restart=always
User=root

[Install]
WantedBy=multi-user.target
",
        exe = unit_quote(exe),
        db = unit_quote(db_path),
    )
}

/// Escape a path for use inside a double-quoted `ExecStart=` word.
fn unit_quote(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('%', "%%")
}

/// Write the unit file, then reload, enable and start it.
///
/// Returns the path of the written unit.
pub fn install_service(config: &Config) -> Result<PathBuf, AppError> {
    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let exe = std::env::current_exe()?;
    let unit_path = config.unit_path();
    std::fs::write(&unit_path, render_unit(&exe, &config.db_path))
        .map_err(|e| AppError::Io(format!("writing {}: {e}", unit_path.display())))?;
    tracing::info!("Wrote {}", unit_path.display());

    for args in systemctl_steps(&config.service_name) {
        run_systemctl(&args)?;
    }
    tracing::info!("Service {} enabled and started", config.service_name);
    Ok(unit_path)
}

fn systemctl_steps(service: &str) -> Vec<Vec<String>> {
    vec![
        vec!["daemon-reload".to_string()],
        vec!["enable".to_string(), service.to_string()],
        vec!["start".to_string(), service.to_string()],
    ]
}

fn run_systemctl(args: &[String]) -> Result<(), AppError> {
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| AppError::Io(format!("failed to run systemctl: {e}")))?;
    if !output.status.success() {
        return Err(AppError::Io(format!(
            "systemctl {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_unit_runs_daemon_with_restart() {
        let unit = render_unit(
            Path::new("/usr/local/bin/portquota"),
            Path::new("/root/port_usage.db"),
        );
        assert!(unit.contains("Description=Port Master Monitor Service"));
        assert!(unit.contains("After=network.target"));
        assert!(unit.contains(
            r#"ExecStart="/usr/local/bin/portquota" --db "/root/port_usage.db" daemon"#
        ));
        assert!(unit.contains("Restart=always"));
        assert!(unit.contains("User=root"));
        assert!(unit.trim_end().ends_with("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_render_unit_quotes_paths_with_spaces() {
        let unit = render_unit(
            Path::new("/opt/port quota/portquota"),
            Path::new("/var/lib/port quota/usage.db"),
        );
        assert!(unit.contains(
            r#"ExecStart="/opt/port quota/portquota" --db "/var/lib/port quota/usage.db" daemon"#
        ));

        let odd = render_unit(Path::new("/usr/bin/portquota"), Path::new("/srv/100%\"q\".db"));
        assert!(odd.contains(r#"--db "/srv/100%%\"q\".db" daemon"#));
    }

    #[test]
    fn test_systemctl_steps_in_order() {
        let steps = systemctl_steps("port_master");
        assert_eq!(
            steps,
            vec![
                vec!["daemon-reload".to_string()],
                vec!["enable".to_string(), "port_master".to_string()],
                vec!["start".to_string(), "port_master".to_string()],
            ]
        );
    }
}
