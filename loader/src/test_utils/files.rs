use std::path::Path;

use crate::task::LoadTask;

/// Contents written into the `index`-th source file.
pub fn source_contents(index: usize) -> Vec<u8> {
    format!("contents of file {index}\n").into_bytes()
}

/// Destination of the `index`-th source file.
pub fn source_destination(index: usize) -> String {
    format!("file_{index:03}.txt")
}

/// Writes `count` files into `dir` and returns one task per file, in index order.
///
/// # Panics
///
/// Panics if a file cannot be written.
pub fn create_source_files(dir: &Path, count: usize) -> Vec<LoadTask> {
    (0..count)
        .map(|index| {
            let destination = source_destination(index);
            let source = dir.join(&destination);
            std::fs::write(&source, source_contents(index)).unwrap_or_else(|err| {
                panic!("failed to write source file {}: {err}", source.display())
            });

            LoadTask::new(source, destination)
        })
        .collect()
}
