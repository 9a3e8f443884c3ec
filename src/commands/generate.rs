//! Generate testdata command implementation.
//!
//! Writes a synthetic observation stream for the configured roles that can be
//! replayed with `--test-data-file`.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use procrate_exporter::config::Config;
use procrate_exporter::replay::generate_test_data;

/// Generates synthetic test data JSON file for testing purposes.
pub fn command_generate_testdata(
    output: PathBuf,
    frames: usize,
    interval: u64,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if frames == 0 || interval == 0 {
        return Err("frames and interval must be greater than 0".into());
    }

    let roles = config.role_names();
    debug!(
        "Generating test data: roles={:?}, frames={}, interval={}s, output={}",
        roles,
        frames,
        interval,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let test_data = generate_test_data(&mut rng, &roles, frames, interval);

    // Write to file as pretty-printed JSON
    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated test data: {} roles x {} frames in {}",
        roles.len(),
        test_data.frames.len(),
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use procrate_exporter::replay::load_test_data_from_file;

    #[test]
    fn test_generate_writes_replayable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdata.json");

        command_generate_testdata(path.clone(), 5, 2, &Config::default()).unwrap();

        let data = load_test_data_from_file(&path).unwrap();
        assert_eq!(data.frames.len(), 5);
        assert_eq!(data.frames[0].len(), 4);
        assert_eq!(data.frames[0][0].role, "manager");
    }

    #[test]
    fn test_generate_rejects_zero_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdata.json");
        assert!(command_generate_testdata(path.clone(), 0, 2, &Config::default()).is_err());
        assert!(!path.exists());
    }
}
