use crate::err::Result;
use crate::fs::util::expand_tilde;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap as Map;
use std::fs;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::LazyLock;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Profile {
    pub(crate) name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Storage {
    pub(crate) misc_dir: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Manager {
    /// 0 means wait for pending initializations forever
    #[serde(default = "default_pending_init_timeout_secs")]
    pub(crate) pending_init_timeout_secs: u64,
    #[serde(default = "default_worker_queue_bound")]
    pub(crate) worker_queue_bound: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Remote {
    #[serde(default = "default_service_enabled")]
    pub(crate) service_enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct Logging {
    #[serde(default)]
    pub(crate) log_file: Option<String>,
}

fn default_pending_init_timeout_secs() -> u64 {
    120
}

fn default_worker_queue_bound() -> usize {
    1024
}

fn default_service_enabled() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub(crate) profile: Profile,
    pub(crate) storage: Storage,
    #[serde(default = "Manager::default_section")]
    pub(crate) manager: Manager,
    #[serde(default = "Remote::default_section")]
    pub(crate) remote: Remote,
    #[serde(default)]
    pub(crate) logging: Logging,
}

impl Manager {
    fn default_section() -> Self {
        Self {
            pending_init_timeout_secs: default_pending_init_timeout_secs(),
            worker_queue_bound: default_worker_queue_bound(),
        }
    }
}

impl Remote {
    fn default_section() -> Self {
        Self {
            service_enabled: default_service_enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            profile: Profile {
                name: String::from("default"),
            },
            storage: Storage {
                misc_dir: String::from("~/.persistent_tasks"),
            },
            manager: Manager::default_section(),
            remote: Remote::default_section(),
            logging: Logging::default(),
        }
    }

    /// Config rooted at `misc_dir`, mostly useful for tests and embedding.
    pub fn with_misc_dir(profile: &str, misc_dir: &str) -> Self {
        let mut config = Self::new();
        config.profile.name = profile.to_string();
        config.storage.misc_dir = misc_dir.to_string();
        config
    }

    pub fn set_pending_init_timeout_secs(&mut self, secs: u64) {
        self.manager.pending_init_timeout_secs = secs;
    }

    pub fn set_remote_service_enabled(&mut self, enabled: bool) {
        self.remote.service_enabled = enabled;
    }

    pub fn from_config(config_path: Option<&str>) -> Result<Self> {
        match config_path {
            Some(p) => {
                let path = expand_tilde(p);
                let content = fs::read_to_string(&path)?;
                match toml::from_str(&content) {
                    Ok(config) => Ok(config),
                    Err(e) => Err(e.into()),
                }
            }
            None => Err("No config file provided".into()),
        }
    }

    pub fn dump(&self, config_path: &str) -> Result<()> {
        let path = Path::new(config_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let p = fs::File::create(path)?;
        let mut f_writer = std::io::BufWriter::new(p);
        f_writer.write_all(toml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

enum ConfigInputValue {
    String(String),
    Uint(u64),
    Bool(bool),
}

impl ConfigInputValue {
    pub fn to_string(&self) -> String {
        match self {
            ConfigInputValue::String(s) => s.to_string(),
            ConfigInputValue::Uint(u) => u.to_string(),
            ConfigInputValue::Bool(b) => b.to_string(),
        }
    }
}

struct ConfigInput {
    name: String,
    pattern: String,
    description: String,
    default: Option<ConfigInputValue>,
}

impl ConfigInput {
    pub fn to_prompt(&self) -> String {
        let mut s = String::from(&self.description);
        if let Some(default) = &self.default {
            s.push_str(&format!(" (default: {})", default.to_string()));
        }
        s.push_str(": ");
        s
    }

    pub fn to_error_msg(&self, input: &str) -> String {
        format!(
            "expect input to follow pattern /{}/, the input '{}' does not meet requirements. please input again: ",
            self.pattern, input
        )
    }

    pub fn test_pattern(&self, input: &str) -> bool {
        if self.pattern.is_empty() {
            return true;
        }
        if self.default.is_some() && input.is_empty() {
            return true;
        }
        match Regex::new(&self.pattern) {
            Ok(re) => re.is_match(input),
            Err(err) => {
                eprintln!("Invalid regex in config: {}", err);
                false
            }
        }
    }
}

static CONFIG_INPUT_LIST: LazyLock<Vec<ConfigInput>> = LazyLock::new(|| {
    vec![
        ConfigInput {
            name: String::from("profile_name"),
            pattern: String::from(r"^[-a-zA-Z0-9_.]+$"),
            description: String::from(
                "Name of this configuration profile, used to name the task store",
            ),
            default: Some(ConfigInputValue::String(String::from("default"))),
        },
        ConfigInput {
            name: String::from("misc_dir"),
            pattern: String::from(r"^[-0-9a-zA-Z_/.~\\]+$"),
            description: String::from("Directory for task stores and logs"),
            default: Some(ConfigInputValue::String(String::from(
                "~/.persistent_tasks",
            ))),
        },
        ConfigInput {
            name: String::from("service_enabled"),
            pattern: String::from(r"^(true|false)$"),
            description: String::from("Enable calls against the remote service"),
            default: Some(ConfigInputValue::Bool(true)),
        },
        ConfigInput {
            name: String::from("pending_init_timeout_secs"),
            pattern: String::from(r"^[0-9]{1,6}$"),
            description: String::from(
                "Seconds to wait for a task initialization before it is abandoned, 0 waits forever",
            ),
            default: Some(ConfigInputValue::Uint(default_pending_init_timeout_secs())),
        },
    ]
});

fn read_input(required_input: &ConfigInput) -> Result<(String, String)> {
    let mut input = String::new();
    print!("{}", required_input.to_prompt());
    std::io::stdout().flush()?;
    std::io::stdin().read_line(&mut input)?;
    input = input.trim().to_string();

    loop {
        if required_input.test_pattern(&input) {
            if input.is_empty() {
                if let Some(default) = &required_input.default {
                    return Ok((required_input.name.clone(), default.to_string()));
                }
            }
            return Ok((required_input.name.clone(), input));
        }
        print!("{}", required_input.to_error_msg(&input));
        std::io::stdout().flush()?;
        input.clear();
        std::io::stdin().read_line(&mut input)?;
        input = input.trim().to_string();
    }
}

fn take_input(input_map: &mut Map<String, String>, name: &str) -> Result<String> {
    input_map
        .remove(name)
        .ok_or_else(|| format!("missing configuration input '{}'", name).into())
}

fn config_from_inputs(input_map: &mut Map<String, String>) -> Result<Config> {
    let mut config = Config::new();
    config.profile.name = take_input(input_map, "profile_name")?;
    config.storage.misc_dir = take_input(input_map, "misc_dir")?;
    config.remote.service_enabled = take_input(input_map, "service_enabled")?.parse::<bool>()?;
    config.manager.pending_init_timeout_secs =
        take_input(input_map, "pending_init_timeout_secs")?.parse::<u64>()?;
    Ok(config)
}

pub fn interactive_config_setup(default_config_path: &str) -> Result<Config> {
    let mut input_map = Map::<String, String>::new();

    for required_input in CONFIG_INPUT_LIST.iter() {
        let (name, input) = read_input(required_input)?;
        input_map.insert(name, input);
    }

    // last question: where do you want to store this config?
    let config_file_input = ConfigInput {
        name: String::from("config_path"),
        pattern: String::from(r"^[-0-9a-zA-Z_/.~\\]+$"),
        description: String::from("Where do you want to store this config"),
        default: Some(ConfigInputValue::String(String::from(default_config_path))),
    };
    let (name, input) = read_input(&config_file_input)?;
    input_map.insert(name, input);

    let config = config_from_inputs(&mut input_map)?;
    let save_path = expand_tilde(&take_input(&mut input_map, "config_path")?);

    // Parent directories are created in dump().
    config.dump(&save_path)?;

    Ok(config)
}

pub fn get_or_create_config(config_path: Option<&str>) -> Result<Config> {
    match Config::from_config(config_path) {
        Ok(config) => Ok(config),
        Err(e) => {
            if !std::io::stdin().is_terminal() {
                return Err(format!(
                    "Cannot load configuration ({}) and stdin is not a TTY; run in a terminal to create a config or provide --config pointing to a valid file.",
                    e
                )
                .into());
            }
            interactive_config_setup(config_path.unwrap_or("~/.persistent_tasks/config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::temp_dir::TmpDirGuard;
    use serial_test::serial;
    use std::env;

    #[test]
    fn prompt_formats_with_and_without_default() {
        let with_default = ConfigInput {
            name: "pending_init_timeout_secs".to_string(),
            pattern: String::new(),
            description: "Set a timeout".to_string(),
            default: Some(ConfigInputValue::Uint(120)),
        };
        let without_default = ConfigInput {
            name: "name".to_string(),
            pattern: String::new(),
            description: "Profile name".to_string(),
            default: None,
        };
        let p1 = with_default.to_prompt();
        assert!(p1.contains("default: 120"));
        assert!(p1.ends_with(": "));
        let p2 = without_default.to_prompt();
        assert!(!p2.contains("default:"));
        assert!(p2.ends_with(": "));
    }

    #[test]
    fn test_pattern_empty_and_invalid_regex() {
        let empty = ConfigInput {
            name: "any".to_string(),
            pattern: String::new(),
            description: String::new(),
            default: None,
        };
        assert!(empty.test_pattern("anything should pass"));

        let invalid = ConfigInput {
            name: "bad".to_string(),
            pattern: "[".to_string(),
            description: String::new(),
            default: None,
        };
        assert!(!invalid.test_pattern("doesn't matter"));
    }

    #[test]
    fn service_enabled_input_only_accepts_booleans() {
        let input = CONFIG_INPUT_LIST
            .iter()
            .find(|i| i.name == "service_enabled")
            .expect("service_enabled input present");
        assert!(input.test_pattern("true"));
        assert!(input.test_pattern("false"));
        assert!(input.test_pattern(""));
        assert!(!input.test_pattern("yes"));
    }

    #[test]
    fn config_from_inputs_parses_values() {
        let mut inputs = Map::new();
        inputs.insert("profile_name".to_string(), "laptop".to_string());
        inputs.insert("misc_dir".to_string(), "/tmp/misc".to_string());
        inputs.insert("service_enabled".to_string(), "false".to_string());
        inputs.insert("pending_init_timeout_secs".to_string(), "0".to_string());
        let config = config_from_inputs(&mut inputs).expect("inputs should parse");
        assert_eq!(config.profile.name, "laptop");
        assert_eq!(config.storage.misc_dir, "/tmp/misc");
        assert!(!config.remote.service_enabled);
        assert_eq!(config.manager.pending_init_timeout_secs, 0);

        let mut missing = Map::new();
        assert!(config_from_inputs(&mut missing).is_err());
    }

    #[test]
    fn dump_creates_parent_dirs_and_writes_toml() {
        let dir = TmpDirGuard::new("config_dump");
        let path = dir.join("nested").join("config.toml");
        let mut cfg = Config::with_misc_dir("work", "/srv/tasks");
        cfg.set_pending_init_timeout_secs(30);
        cfg.dump(path.to_str().unwrap()).expect("dump should succeed");
        assert!(path.exists());

        let loaded = Config::from_config(path.to_str()).expect("reload");
        assert_eq!(loaded.profile.name, "work");
        assert_eq!(loaded.storage.misc_dir, "/srv/tasks");
        assert_eq!(loaded.manager.pending_init_timeout_secs, 30);
        assert!(loaded.remote.service_enabled);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let toml_src = r#"
            [profile]
            name = "minimal"

            [storage]
            misc_dir = "/var/lib/tasks"
        "#;
        let cfg: Config = toml::from_str(toml_src).expect("parse minimal config");
        assert_eq!(cfg.manager.pending_init_timeout_secs, 120);
        assert_eq!(cfg.manager.worker_queue_bound, 1024);
        assert!(cfg.remote.service_enabled);
        assert!(cfg.logging.log_file.is_none());
    }

    #[test]
    #[serial]
    fn from_config_expands_tilde_with_home() {
        let tmp_home = TmpDirGuard::new("config_home");
        let prev_home = env::var_os("HOME");
        unsafe {
            env::set_var("HOME", tmp_home.as_path());
        }
        let config_path = tmp_home.join("tasks_config.toml");
        Config::with_misc_dir("home", "~/misc")
            .dump(config_path.to_str().unwrap())
            .unwrap();

        let loaded =
            Config::from_config(Some("~/tasks_config.toml")).expect("should load via ~ expansion");
        assert_eq!(loaded.profile.name, "home");

        if let Some(prev) = prev_home {
            unsafe {
                env::set_var("HOME", prev);
            }
        } else {
            unsafe {
                env::remove_var("HOME");
            }
        }
    }

    #[test]
    fn from_config_without_path_errors() {
        assert!(Config::from_config(None).is_err());
    }
}
