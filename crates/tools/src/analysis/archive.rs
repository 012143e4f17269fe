//! 棋譜アーカイブ（gzip圧縮tar）の走査

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;

/// アーカイブ内の棋譜1つ分
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// `.tgz` / `.tar.gz` アーカイブから `.sgf` エントリをすべて読み出す。
pub fn read_sgf_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file =
        File::open(path).with_context(|| format!("failed to open archive {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut games = Vec::new();
    for entry in archive
        .entries()
        .with_context(|| format!("failed to read archive {}", path.display()))?
    {
        let mut entry = entry.context("corrupt archive entry")?;
        let name = entry.path().context("archive entry has no path")?.display().to_string();
        if !name.ends_with(".sgf") {
            debug!("skipping non-sgf entry {name}");
            continue;
        }
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read archive entry {name}"))?;
        games.push(ArchiveEntry { name, bytes });
    }
    Ok(games)
}
