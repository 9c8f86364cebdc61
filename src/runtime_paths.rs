use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn platform_app_root() -> PathBuf {
    if let Some(project_dirs) = ProjectDirs::from("", "", "remembot") {
        return project_dirs.data_dir().to_path_buf();
    }

    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.data_local_dir().join("remembot");
    }

    std::env::temp_dir().join("remembot")
}

pub fn app_root() -> PathBuf {
    platform_app_root()
}

pub fn default_db_path() -> String {
    app_root()
        .join("data")
        .join("remembot.db")
        .to_string_lossy()
        .to_string()
}
