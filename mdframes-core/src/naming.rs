//! File naming shared by every pipeline stage.
//!
//! Downstream training tools pair frames with labels purely by these names.

use std::path::{Path, PathBuf};

/// `frame_00012.png`
pub fn frame_file_name(index: usize, ext: &str) -> String {
    format!("frame_{index:05}.{}", ext.trim_start_matches('.'))
}

/// `frame_00012.txt`
pub fn label_file_name(index: usize) -> String {
    frame_file_name(index, "txt")
}

/// `frame_00012_overlay.png`
pub fn overlay_file_name(index: usize) -> String {
    format!("frame_{index:05}_overlay.png")
}

/// Label file for frame `index` inside `label_dir`.
pub fn label_path(label_dir: &Path, index: usize) -> PathBuf {
    label_dir.join(label_file_name(index))
}

/// Subfolder used for one stack when extracting a whole directory.
pub fn stack_output_dir(output_root: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stack".to_string());
    output_root.join(format!("{stem}_frames"))
}
