mod temp_dir_workspace;

pub use temp_dir_workspace::{TempDirWorkspace, TempDirWorkspaceProvider, safe_file_name};
