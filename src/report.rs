//! Hand-off artifacts for the encoding step.
//!
//! Extraction only writes WAV files. Encoding, archiving and tagging happen
//! later, driven by a generated shell script and a JSON manifest of the
//! completion records.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of one clip, in resolved container coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub name: String,
    pub segment: u32,
    pub start_time: f64,
    pub stop_time: f64,
    pub start_frame: i64,
    pub end_frame: i64,
    /// Frames actually written (extraction mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_written: Option<u64>,
    /// Output file relative to the WAV directory (extraction mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Onset score (verification mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onset_score: Option<f64>,
    /// Window started behind the read cursor, so the clip is misaligned
    #[serde(default)]
    pub misaligned: bool,
    /// Container ended before the window did, so the clip is short
    #[serde(default)]
    pub truncated: bool,
}

/// Format a frame position as `h:m:ss.sss`
pub fn format_timestamp(frame: i64, sample_rate: u32) -> String {
    let sign = if frame < 0 { "-" } else { "" };
    let mut x = frame.unsigned_abs() as f64 / sample_rate.max(1) as f64;
    let h = (x / 3600.0) as u64;
    x -= h as f64 * 3600.0;
    let m = (x / 60.0) as u64;
    let s = x - m as f64 * 60.0;
    format!("{}{}:{}:{:06.3}", sign, h, m, s)
}

/// Subdirectory for a clip: its first `depth` underscore-separated name parts.
pub fn clip_subdir(name: &str, depth: usize) -> Option<String> {
    if depth == 0 {
        return None;
    }
    Some(name.split('_').take(depth).collect::<Vec<_>>().join("_"))
}

/// Path of a clip's WAV file relative to the output directory
pub fn clip_relative_path(name: &str, depth: usize) -> PathBuf {
    let file = format!("{}.wav", name);
    match clip_subdir(name, depth) {
        Some(subdir) => Path::new(&subdir).join(file),
        None => PathBuf::from(file),
    }
}

fn shell_quote(path: &Path) -> String {
    let text = path.display().to_string();
    if text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c))
    {
        text
    } else {
        format!("'{}'", text.replace('\'', "'\\''"))
    }
}

/// Tagging command the encode script hands off to once the archive is built
#[derive(Debug, Clone, Copy)]
pub struct TagStep<'a> {
    pub command: &'a str,
    /// Subdirectory depth used for the clips, passed on as `--subdirs`
    pub subdirs: usize,
    pub base: &'a Path,
}

/// Generate the encode script.
///
/// # Arguments
/// * `log_file` - Companion log, copied next to the encoded files
/// * `wav_dir` - Directory holding the extracted clips
/// * `mp3_dir` - Directory the encoder writes to; also the archive root
/// * `encoder` - Encoder command, invoked as `<encoder> <wav> <mp3>`
/// * `tag` - Optional tagging step appended after the archive
/// * `records` - Completion records of the written clips
///
/// # Returns
/// Complete script content as a string
pub fn generate_encode_script(
    log_file: &Path,
    wav_dir: &Path,
    mp3_dir: &Path,
    encoder: &str,
    tag: Option<&TagStep>,
    records: &[CompletionRecord],
) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/sh\n");
    script.push_str(&format!("mkdir {}\n", shell_quote(mp3_dir)));

    let mut made_dirs: Vec<PathBuf> = Vec::new();
    for record in records {
        let Some(output) = &record.output else {
            continue;
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !made_dirs.iter().any(|d| d == parent) {
                script.push_str(&format!("mkdir {}\n", shell_quote(&mp3_dir.join(parent))));
                made_dirs.push(parent.to_path_buf());
            }
        }
        let mp3 = output.with_extension("mp3");
        script.push_str(&format!(
            "{} {} {}\n",
            encoder,
            shell_quote(&wav_dir.join(output)),
            shell_quote(&mp3_dir.join(mp3))
        ));
    }

    let mut tar = mp3_dir.as_os_str().to_owned();
    tar.push(".tar");
    script.push_str(&format!("cp {} {}\n", shell_quote(log_file), shell_quote(mp3_dir)));
    script.push_str(&format!(
        "tar cf {} {}\n",
        shell_quote(Path::new(&tar)),
        shell_quote(mp3_dir)
    ));

    if let Some(tag) = tag.filter(|t| !t.command.trim().is_empty()) {
        let base = shell_quote(tag.base);
        script.push_str(&format!("echo {} {}\n", tag.command, base));
        if tag.subdirs > 0 {
            script.push_str(&format!("{} --subdirs {} {}\n", tag.command, tag.subdirs, base));
        } else {
            script.push_str(&format!("{} {}\n", tag.command, base));
        }
    }
    script
}

/// Write the encode script and make it executable by its owner.
pub fn write_encode_script(path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Write the completion records as a JSON array.
pub fn write_manifest(path: &Path, records: &[CompletionRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    Ok(())
}
