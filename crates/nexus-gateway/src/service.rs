//! OS service units — run the gateway under systemd (Linux) or launchd
//! (macOS).
//!
//! Both units are fixed templates parameterized only by the executable path
//! and the config path. Paths are gated through the argument sanitizer
//! before they land in an exec line.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;

use nexus_core::sanitize::check_argument;

pub const SYSTEMD_UNIT_NAME: &str = "nexus.service";
pub const LAUNCHD_LABEL: &str = "com.haasonsaas.nexus";

/// Render the systemd user unit.
pub fn render_systemd_unit(exec_path: &str, config_path: &str) -> String {
    format!(
        "[Unit]\n\
         Description=Nexus multi-agent messaging gateway\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={exec_path} --config {config_path}\n\
         Restart=on-failure\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    )
}

/// Render the launchd property list.
pub fn render_launchd_plist(exec_path: &str, config_path: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n\
         <dict>\n\
         \t<key>Label</key>\n\
         \t<string>{LAUNCHD_LABEL}</string>\n\
         \t<key>ProgramArguments</key>\n\
         \t<array>\n\
         \t\t<string>{exec_path}</string>\n\
         \t\t<string>--config</string>\n\
         \t\t<string>{config_path}</string>\n\
         \t</array>\n\
         \t<key>RunAtLoad</key>\n\
         \t<true/>\n\
         \t<key>KeepAlive</key>\n\
         \t<true/>\n\
         </dict>\n\
         </plist>\n"
    )
}

/// `$XDG_CONFIG_HOME/systemd/user/nexus.service` (or `~/.config/...`).
pub fn systemd_unit_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.config")
    });
    PathBuf::from(base)
        .join("systemd")
        .join("user")
        .join(SYSTEMD_UNIT_NAME)
}

/// `~/Library/LaunchAgents/com.haasonsaas.nexus.plist`.
pub fn launchd_plist_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{LAUNCHD_LABEL}.plist"))
}

fn unit_for_platform(exec_path: &str, config_path: &str) -> (PathBuf, String) {
    if cfg!(target_os = "macos") {
        (
            launchd_plist_path(),
            render_launchd_plist(exec_path, config_path),
        )
    } else {
        (
            systemd_unit_path(),
            render_systemd_unit(exec_path, config_path),
        )
    }
}

/// Write the service unit for the currently running executable.
pub fn install(config_path: Option<&str>) -> anyhow::Result<()> {
    let exec = std::env::current_exe().context("resolving current executable")?;
    let exec = exec.to_string_lossy().to_string();
    let config = match config_path {
        Some(p) => p.to_string(),
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{home}/.nexus/nexus.toml")
        }
    };

    if let Err(e) = check_argument(&exec) {
        bail!("executable path is not service-safe: {e}");
    }
    if let Err(e) = check_argument(&config) {
        bail!("config path is not service-safe: {e}");
    }

    let (path, contents) = unit_for_platform(&exec, &config);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "service unit installed");
    println!("Installed service unit at {}", path.display());
    Ok(())
}

/// Remove the installed unit, if present.
pub fn uninstall() -> anyhow::Result<()> {
    let path = if cfg!(target_os = "macos") {
        launchd_plist_path()
    } else {
        systemd_unit_path()
    };
    match fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "service unit removed");
            println!("Removed service unit at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No service unit installed at {}", path.display());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
