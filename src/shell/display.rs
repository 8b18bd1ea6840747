//! Text rendering for shell output

use std::fmt::Write;

use chrono::Local;

use crate::core::mods::{ModEntry, ModState};
use crate::core::{Instance, LogChunk, LogSource, Release, SupervisorStatus};

pub fn instances(instances: &[Instance]) -> String {
    if instances.is_empty() {
        return "No instances registered. Use `add <path>` or `download <tag>`.".to_string();
    }
    let mut out = String::new();
    for (index, instance) in instances.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {}  ({})",
            index,
            instance.display_name(),
            instance.path.display()
        );
    }
    out.truncate(out.trim_end().len());
    out
}

/// Details of the selected instance alongside the supervisor state
pub fn status(status: &SupervisorStatus, downloading: Option<&str>) -> String {
    let mut out = format!("State: {}", status.state);
    if let Some(name) = &status.instance {
        let _ = write!(out, "\nInstance: {}", name);
    }
    if let Some(pid) = status.pid {
        let _ = write!(out, "\nPID: {}", pid);
    }
    if let Some(pgid) = status.pgid {
        let _ = write!(out, "\nProcess group: {}", pgid);
    }
    if let Some(dir) = &status.working_dir {
        let _ = write!(out, "\nWorking directory: {}", dir.display());
    }
    if let Some(started) = status.started_at {
        let _ = write!(
            out,
            "\nStarted: {}",
            started.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(file) = downloading {
        let _ = write!(out, "\nDownloading: {}", file);
    }
    out
}

/// Captured output, one chunk per line, child streams tagged
pub fn logs(chunks: &[LogChunk]) -> String {
    if chunks.is_empty() {
        return "(no output captured)".to_string();
    }
    chunks
        .iter()
        .map(|chunk| match chunk.source {
            LogSource::Stderr => format!("[{}] {}", chunk.source.label(), chunk.text),
            _ => chunk.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn releases(releases: &[Release]) -> String {
    if releases.is_empty() {
        return "No releases published.".to_string();
    }
    let mut out = String::new();
    for release in releases {
        let preferred = release.preferred_asset().map(|a| a.name.as_str());
        let _ = writeln!(out, "{}", release.tag_name);
        for asset in &release.assets {
            let marker = if Some(asset.name.as_str()) == preferred { "*" } else { " " };
            let _ = writeln!(out, "  {} {}", marker, asset.name);
        }
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn mods(entries: &[ModEntry]) -> String {
    if entries.is_empty() {
        return "No mods installed.".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            let check = match entry.state {
                ModState::Enabled => "[x]",
                ModState::Disabled => "[ ]",
            };
            format!("{} {}", check, entry.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::ProcessState;
    use crate::core::release::ReleaseAsset;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn instance_list_is_numbered_from_zero() {
        let list = instances(&[
            Instance::new("Build v1", "/opt/game/bin"),
            Instance::new("", "/opt/other/Skakavi-Krompir-Linux"),
        ]);
        assert_eq!(
            list,
            "  0  Build v1  (/opt/game/bin)\n  1  Skakavi-Krompir-Linux  (/opt/other/Skakavi-Krompir-Linux)"
        );
    }

    #[test]
    fn idle_status_is_one_line() {
        let idle = SupervisorStatus {
            state: ProcessState::Idle,
            pid: None,
            pgid: None,
            instance: None,
            working_dir: None,
            started_at: None,
        };
        assert_eq!(status(&idle, None), "State: Idle");
    }

    #[test]
    fn running_status_lists_process_details() {
        let running = SupervisorStatus {
            state: ProcessState::Running,
            pid: Some(4242),
            pgid: Some(4242),
            instance: Some("Build v1".into()),
            working_dir: Some(PathBuf::from("/opt/game")),
            started_at: Some(Utc::now()),
        };
        let text = status(&running, Some("Skakavi-Krompir-Linux"));
        assert!(text.starts_with("State: Running\nInstance: Build v1\nPID: 4242"));
        assert!(text.contains("Working directory: /opt/game"));
        assert!(text.ends_with("Downloading: Skakavi-Krompir-Linux"));
    }

    #[test]
    fn stderr_lines_are_tagged() {
        let chunk = |source, text: &str| LogChunk {
            seq: 0,
            at: Utc::now(),
            source,
            text: text.to_string(),
        };
        let text = logs(&[
            chunk(LogSource::Launcher, "--- Launching game ---"),
            chunk(LogSource::Stdout, "hello"),
            chunk(LogSource::Stderr, "oops"),
        ]);
        assert_eq!(
            text,
            format!("--- Launching game ---\nhello\n[{}] oops", LogSource::Stderr.label())
        );
    }

    #[test]
    fn releases_mark_the_preferred_asset() {
        let release = Release {
            tag_name: "v1.1".into(),
            assets: vec![ReleaseAsset {
                name: "source.zip".into(),
                browser_download_url: "https://example.invalid/src".into(),
            }],
        };
        assert_eq!(releases(&[release]), "v1.1\n  * source.zip");
    }

    #[test]
    fn mods_show_checkboxes() {
        let entries = vec![
            ModEntry {
                name: "a.py".into(),
                file_name: "a.py".into(),
                state: ModState::Enabled,
            },
            ModEntry {
                name: "b.skmod".into(),
                file_name: "b.skmod.disabled".into(),
                state: ModState::Disabled,
            },
        ];
        assert_eq!(mods(&entries), "[x] a.py\n[ ] b.skmod");
    }
}
