use crate::{IngestError, PdfDocument};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads each file into a [`PdfDocument`] named after its file name.
/// Parsing happens later, so unreadable PDFs are not detected here.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<PdfDocument>, IngestError> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
            let bytes = fs::read(path)?;
            Ok(PdfDocument::new(name, bytes))
        })
        .collect()
}

/// Expands `folder` (recursively) and appends explicitly named files.
pub fn collect_documents(
    files: &[PathBuf],
    folder: Option<&Path>,
) -> Result<Vec<PdfDocument>, IngestError> {
    let mut paths = files.to_vec();
    if let Some(folder) = folder {
        let found = discover_pdf_files(folder);
        if found.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }
        paths.extend(found);
    }

    if paths.is_empty() {
        return Err(IngestError::InvalidArgument(
            "no pdf files given".to_string(),
        ));
    }

    load_documents(&paths)
}
