//! Workspace loading: from paths on disk to one `Compilation`
//!
//! Architecture: Repository Pattern - Workspace hides where sources come from
//! - Discovery walks directories through the `PathFilter`
//! - Scanning runs through the `SourceFrontend`, in parallel with rayon when enabled
//! - Files are always bound in sorted path order so results do not depend on walk order

pub mod path_filter;

pub use path_filter::{PathFilter, DEFAULT_IGNORE_FILE};

use crate::analyzer::SourceFrontend;
use crate::domain::diagnostics::{StacksError, StacksResult};
use crate::symbols::declarations::SourceFile;
use crate::symbols::{Compilation, CompilationBuilder};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Workspace {
    filter: PathFilter,
    frontend: Arc<dyn SourceFrontend>,
    parallel: bool,
}

impl Workspace {
    pub fn new(filter: PathFilter, frontend: Arc<dyn SourceFrontend>) -> Self {
        Self { filter, frontend, parallel: true }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Expand files and directories into the sorted set of source files to analyze.
    /// Explicitly named files still pass through the filter.
    pub fn discover<P: AsRef<Path>>(&self, paths: &[P]) -> StacksResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                files.extend(
                    self.filter.find_files(path)?.into_iter().filter(|file| self.frontend.handles_file(file)),
                );
            } else if path.is_file() {
                if self.frontend.handles_file(path) && self.filter.should_analyze(path)? {
                    files.push(path.to_path_buf());
                }
            } else {
                return Err(StacksError::from(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Path does not exist: {}", path.display()),
                )));
            }
        }

        files.sort();
        files.dedup();
        debug!("Discovered {} source files", files.len());
        Ok(files)
    }

    /// Read and scan files, then bind them into a compilation.
    /// Unreadable or unscannable files are skipped with a warning unless `fail_fast`.
    pub fn load(&self, files: &[PathBuf], root_identity: &str, fail_fast: bool) -> StacksResult<Compilation> {
        let scan = |path: &PathBuf| -> StacksResult<SourceFile> {
            let content = fs::read_to_string(path)?;
            self.frontend.scan(path, &content)
        };

        let scanned: Vec<(PathBuf, StacksResult<SourceFile>)> = if self.parallel {
            files.par_iter().map(|path| (path.clone(), scan(path))).collect()
        } else {
            files.iter().map(|path| (path.clone(), scan(path))).collect()
        };

        self.bind(scanned, root_identity, fail_fast)
    }

    /// Scan in-memory sources; any scan error fails the whole compilation
    pub fn compile(&self, sources: &[(PathBuf, String)], root_identity: &str) -> StacksResult<Compilation> {
        let scanned = sources
            .iter()
            .map(|(path, content)| (path.clone(), self.frontend.scan(path, content)))
            .collect();
        self.bind(scanned, root_identity, true)
    }

    fn bind(
        &self,
        mut scanned: Vec<(PathBuf, StacksResult<SourceFile>)>,
        root_identity: &str,
        fail_fast: bool,
    ) -> StacksResult<Compilation> {
        scanned.sort_by(|a, b| a.0.cmp(&b.0));

        let mut builder = CompilationBuilder::new(root_identity);
        for (path, result) in scanned {
            match result {
                Ok(file) => {
                    builder.add_source(file);
                }
                Err(e) if fail_fast => return Err(e),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        debug!("Binding {} source files", builder.source_count());
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::csharp::CSharpScanner;
    use tempfile::TempDir;

    fn workspace(parallel: bool) -> Workspace {
        Workspace::new(PathFilter::with_defaults().unwrap(), Arc::new(CSharpScanner::new())).with_parallel(parallel)
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/Messaging")).unwrap();
        fs::create_dir_all(root.join("src/bin/Debug")).unwrap();
        fs::write(root.join("src/Messaging/AddCommand.cs"), "public class AddCommand : Command {}").unwrap();
        fs::write(root.join("src/Add.cs"), "public class Add : UseCase<AddCommand> {}").unwrap();
        fs::write(root.join("src/bin/Debug/Copy.cs"), "public class Copy : Command {}").unwrap();
        fs::write(root.join("src/notes.txt"), "class NotCode : Command {}").unwrap();
        temp_dir
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp_dir = fixture();
        let root = temp_dir.path();

        let files = workspace(true).discover(&[root]).unwrap();
        assert_eq!(files, vec![root.join("src/Add.cs"), root.join("src/Messaging/AddCommand.cs")]);
    }

    #[test]
    fn test_discover_missing_path() {
        let result = workspace(true).discover(&[Path::new("/definitely/not/here")]);
        assert!(matches!(result, Err(StacksError::Io { .. })));
    }

    #[test]
    fn test_load_binds_across_files() {
        let temp_dir = fixture();
        let workspace = workspace(false);
        let files = workspace.discover(&[temp_dir.path()]).unwrap();

        let compilation = workspace.load(&files, "System.Object", true).unwrap();
        assert_eq!(compilation.files().len(), 2);

        let add = compilation.declared_types().find(|t| t.name == "Add").unwrap();
        let command = add.base.as_ref().and_then(|b| b.first_argument()).and_then(|a| a.target);
        assert_eq!(command.and_then(|id| compilation.get(id)).map(|t| t.name.as_str()), Some("AddCommand"));
    }

    #[test]
    fn test_load_skips_broken_files_unless_fail_fast() {
        let temp_dir = fixture();
        let broken = temp_dir.path().join("src/Broken.cs");
        fs::write(&broken, "class Broken { /* unterminated").unwrap();
        let workspace = workspace(true);
        let files = workspace.discover(&[temp_dir.path()]).unwrap();

        let compilation = workspace.load(&files, "System.Object", false).unwrap();
        assert_eq!(compilation.files().len(), 2);

        let result = workspace.load(&files, "System.Object", true);
        assert!(matches!(result, Err(StacksError::Source { .. })));
    }
}
