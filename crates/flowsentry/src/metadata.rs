// Rust guideline compliant 2026-07-25

//! Metadata directory: a copy of the run's configuration next to its
//! results, so an output directory is self-describing.

use crate::config::Settings;
use chrono::Utc;
use std::io::Write as _;
use std::path::PathBuf;

/// Create `<output>/<metadata_dir>/` with the copied config file, the
/// copied whitelist, and an `info.txt` describing the run.
///
/// # Errors
///
/// Propagates filesystem errors; a missing config or whitelist source file
/// is skipped, not fatal.
pub fn write_metadata(settings: &Settings, dir_name: &str) -> std::io::Result<PathBuf> {
    let dir = settings.output_dir.join(dir_name);
    std::fs::create_dir_all(&dir)?;

    for source in [&settings.config_path, &settings.whitelist] {
        if let Some(path) = source
            && path.is_file()
            && let Some(file_name) = path.file_name()
        {
            std::fs::copy(path, dir.join(file_name))?;
        }
    }

    let mut info = std::fs::File::create(dir.join("info.txt"))?;
    writeln!(info, "flowsentry version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        info,
        "input: {}",
        settings
            .filepath
            .as_ref()
            .map_or_else(|| "-".to_owned(), |p| p.display().to_string())
    )?;
    writeln!(info, "output: {}", settings.output_dir.display())?;
    writeln!(info, "time window width: {} seconds", settings.width)?;
    writeln!(info, "started: {}", Utc::now().to_rfc3339())?;
    Ok(dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::write_metadata;
    use crate::cli::Cli;
    use crate::config::{RawConfig, Settings};
    use clap::Parser as _;

    #[test]
    fn metadata_dir_holds_config_whitelist_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("test.conf");
        std::fs::write(&conf, "[parameters]\nverbose = 1\n").unwrap();
        let whitelist = dir.path().join("whitelist.conf");
        std::fs::write(&whitelist, "10.0.0.1\n").unwrap();

        let out = dir.path().join("out");
        let cli = Cli::parse_from([
            "flowsentry",
            "-c",
            conf.to_str().unwrap(),
            "-W",
            whitelist.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-f",
            "flows.binetflow",
        ]);
        let mut settings = Settings::resolve(&cli, &RawConfig::default());
        settings.metadata_dir = Some("metadata".to_owned());
        std::fs::create_dir_all(&settings.output_dir).unwrap();

        let meta = write_metadata(&settings, "metadata").unwrap();
        assert!(meta.join("test.conf").is_file());
        assert!(meta.join("whitelist.conf").is_file());
        let info = std::fs::read_to_string(meta.join("info.txt")).unwrap();
        assert!(info.contains("flowsentry version"));
        assert!(info.contains("flows.binetflow"));
    }

    #[test]
    fn missing_sources_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from(["flowsentry", "-o", dir.path().to_str().unwrap()]);
        let settings = Settings::resolve(&cli, &RawConfig::default());

        let meta = write_metadata(&settings, "metadata").unwrap();
        assert!(meta.join("info.txt").is_file());
        assert!(!meta.join("test.conf").exists());
    }
}
