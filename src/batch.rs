use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use log::{debug, error, info, warn};

use crate::extract::{container_name, extract_file, ExtractOptions, ExtractStats};

/// Containers under `root` with a matching extension, sorted by path.
///
/// Only the top level is searched unless `recursive` is set. A file is taken
/// as is, whatever its extension.
pub fn collect_containers(root: &Path, recursive: bool, extension: &str) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(if recursive { None } else { Some(1) })
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut found = Vec::new();
    for entry in walker {
        match entry {
            Ok(e) => {
                let is_file = e.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                let matches = e
                    .path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .map(|x| x.eq_ignore_ascii_case(extension))
                    .unwrap_or(false);

                if is_file && matches {
                    found.push(e.into_path());
                } else {
                    debug!("SKIP: {}", e.path().display());
                }
            }
            Err(e) => warn!("walk: {}", e),
        }
    }
    found
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<(PathBuf, ExtractStats)>,
    pub failed: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn pages_written(&self) -> usize {
        self.processed.iter().map(|(_, s)| s.pages_written).sum()
    }

    pub fn documents_written(&self) -> usize {
        self.processed
            .iter()
            .filter(|(_, s)| s.document.is_some())
            .count()
    }
}

/// Extract every container in turn, a failing container doesn't stop the run.
///
/// Output mirrors the folders below `root`, so same named containers in
/// different folders land in different directories.
pub fn extract_all(root: &Path, paths: &[PathBuf], options: &ExtractOptions) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let mut claimed = HashSet::new();

    for (i, path) in paths.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, paths.len(), path.display());

        let mut file_options = options.clone();
        if let Some(sub) = path
            .strip_prefix(root)
            .ok()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
        {
            file_options.output_root.push(sub);
        }

        let out_dir = file_options.output_root.join(container_name(path));
        if !claimed.insert(out_dir.clone()) {
            error!(
                "{}: {} already holds another container's output, skipping",
                path.display(),
                out_dir.display()
            );
            summary.failed.push(path.clone());
            continue;
        }

        match extract_file(path, &file_options) {
            Ok(stats) => summary.processed.push((path.clone(), stats)),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                summary.failed.push(path.clone());
            }
        }
    }

    info!(
        "{} containers, {} failed, {} pages, {} documents",
        paths.len(),
        summary.failed.len(),
        summary.pages_written(),
        summary.documents_written()
    );
    summary
}
