//! CLI command implementations

mod config;
mod host;
mod package;

pub use config::{config_init, config_path, config_show, load_resource_config};
pub use host::{host_add, host_export, host_list, host_remove, host_show, host_update};
pub use package::{
    package_download, package_list, package_remove, package_show, package_update, package_upload,
};
