use crate::config::config::Config;
use crate::core::tasks::ManagerOptions;
use crate::err::Result;
use crate::fs::util::expand_tilde;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
struct ProfileSettings {
    name: String,
}

#[derive(Debug, Clone)]
struct StorageSettings {
    misc_dir: PathBuf,
    log_file: PathBuf,
}

#[derive(Debug, Clone)]
struct ManagerSettings {
    pending_init_timeout: Option<Duration>,
    worker_queue_bound: usize,
    remote_service_enabled: bool,
}

/// Runtime settings resolved from a [`Config`]: paths are expanded and
/// defaults are applied.
#[derive(Debug, Clone)]
pub struct EnvVar {
    profile: ProfileSettings,
    storage: StorageSettings,
    manager: ManagerSettings,
}

impl EnvVar {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.profile.name.trim().is_empty() {
            return Err("profile name must not be empty".into());
        }
        let misc_dir = PathBuf::from(expand_tilde(&config.storage.misc_dir));
        let log_file = match &config.logging.log_file {
            Some(p) => PathBuf::from(expand_tilde(p)),
            None => misc_dir.join("logs").join("tasks.log"),
        };
        let pending_init_timeout = match config.manager.pending_init_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            profile: ProfileSettings {
                name: config.profile.name.clone(),
            },
            storage: StorageSettings { misc_dir, log_file },
            manager: ManagerSettings {
                pending_init_timeout,
                worker_queue_bound: config.manager.worker_queue_bound,
                remote_service_enabled: config.remote.service_enabled,
            },
        })
    }

    pub fn get_profile_name(&self) -> &str {
        &self.profile.name
    }
    pub fn get_misc_dir(&self) -> &Path {
        &self.storage.misc_dir
    }
    pub fn get_log_file(&self) -> &Path {
        &self.storage.log_file
    }
    pub fn is_remote_service_enabled(&self) -> bool {
        self.manager.remote_service_enabled
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            pending_init_timeout: self.manager.pending_init_timeout,
            worker_queue_bound: self.manager.worker_queue_bound,
        }
    }
}
