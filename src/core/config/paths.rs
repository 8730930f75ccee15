//! On-disk layout of the service.
//!
//! ```text
//! <root>/config.yml      shipped defaults
//! <data>/config.yml      local override
//! <data>/secrets.yaml
//! <data>/docs/           corpus when `ingestion.docs_dir` is unset
//! <data>/logs/
//! ```
//!
//! `<root>` comes from `RAGQ_ROOT`, else the working directory. `<data>`
//! comes from `RAGQ_DATA_DIR`, else it is `<root>` itself.

use std::env;
use std::fs;
use std::path::PathBuf;

const ROOT_VAR: &str = "RAGQ_ROOT";
const DATA_DIR_VAR: &str = "RAGQ_DATA_DIR";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = dir_from_env(ROOT_VAR)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let user_data_dir = dir_from_env(DATA_DIR_VAR).unwrap_or_else(|| project_root.clone());
        Self::with_dirs(project_root, user_data_dir)
    }

    /// Layout under explicit directories. Only the log directory is created;
    /// a missing corpus directory is reported at ingestion time.
    pub fn with_dirs(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let _ = fs::create_dir_all(&log_dir);

        AppPaths {
            docs_dir: user_data_dir.join("docs"),
            secrets_path: user_data_dir.join("secrets.yaml"),
            project_root,
            user_data_dir,
            log_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Unset and empty variables both count as absent.
fn dir_from_env(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_files_live_under_the_data_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let data = root.path().join("data");
        let paths = AppPaths::with_dirs(root.path().to_path_buf(), data.clone());

        assert_eq!(paths.docs_dir, data.join("docs"));
        assert_eq!(paths.secrets_path, data.join("secrets.yaml"));
        assert!(paths.log_dir.is_dir());
        assert!(!paths.docs_dir.exists());
    }

    #[test]
    fn unset_variable_is_absent() {
        assert_eq!(dir_from_env("RAGQ_TEST_UNSET_DIR_VARIABLE"), None);
    }
}
