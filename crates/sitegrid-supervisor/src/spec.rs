//! Service definitions and their PM2 ecosystem descriptors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Supervisor name, e.g. `demo-backend`.
    pub name: String,
    pub working_dir: PathBuf,
    pub interpreter: String,
    /// Script path, relative to `working_dir`.
    pub script: String,
    pub port: u16,
    pub env: BTreeMap<String, String>,
    /// Where the supervisor writes stdout/stderr.
    pub log_dir: PathBuf,
}

impl ServiceSpec {
    pub fn new(name: &str, working_dir: impl Into<PathBuf>, port: u16) -> Self {
        let working_dir = working_dir.into();
        Self {
            name: name.to_string(),
            log_dir: working_dir.join("logs"),
            working_dir,
            interpreter: "python3".to_string(),
            script: "main.py".to_string(),
            port,
            env: BTreeMap::new(),
        }
    }

    pub fn with_command(mut self, interpreter: &str, script: &str) -> Self {
        self.interpreter = interpreter.to_string();
        self.script = script.to_string();
        self
    }

    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// Descriptor file name under the supervisor's descriptor directory.
    pub fn descriptor_file(name: &str) -> String {
        format!("{name}.config.json")
    }

    pub(crate) fn descriptor(&self) -> Ecosystem<'_> {
        Ecosystem {
            apps: vec![App {
                name: &self.name,
                script: &self.script,
                cwd: &self.working_dir,
                interpreter: &self.interpreter,
                env: &self.env,
                error_file: self.log_dir.join(format!("{}-error.log", self.name)),
                out_file: self.log_dir.join(format!("{}-out.log", self.name)),
                log_date_format: "YYYY-MM-DD HH:mm:ss Z",
                autorestart: true,
            }],
        }
    }
}

/// PM2 ecosystem file: `{"apps": [ ... ]}`.
#[derive(Debug, Serialize)]
pub(crate) struct Ecosystem<'a> {
    apps: Vec<App<'a>>,
}

#[derive(Debug, Serialize)]
struct App<'a> {
    name: &'a str,
    script: &'a str,
    cwd: &'a Path,
    interpreter: &'a str,
    env: &'a BTreeMap<String, String>,
    error_file: PathBuf,
    out_file: PathBuf,
    log_date_format: &'static str,
    autorestart: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_carries_command_env_and_logs() {
        let spec = ServiceSpec::new("demo-backend", "/srv/demo/backend", 8010)
            .with_command("python3", "main.py")
            .with_env("BACKEND_PORT", "8010")
            .with_env("DATABASE_URL", "postgresql://demo_user:x@localhost:5432/demo_db")
            .with_log_dir("/srv/demo/logs");

        let json = serde_json::to_value(spec.descriptor()).unwrap();
        let app = &json["apps"][0];
        assert_eq!(app["name"], "demo-backend");
        assert_eq!(app["script"], "main.py");
        assert_eq!(app["cwd"], "/srv/demo/backend");
        assert_eq!(app["interpreter"], "python3");
        assert_eq!(app["env"]["BACKEND_PORT"], "8010");
        assert_eq!(app["error_file"], "/srv/demo/logs/demo-backend-error.log");
        assert_eq!(app["out_file"], "/srv/demo/logs/demo-backend-out.log");
    }

    #[test]
    fn default_log_dir_is_under_working_dir() {
        let spec = ServiceSpec::new("demo-frontend", "/srv/demo/frontend/dist", 3000);
        assert_eq!(spec.log_dir, PathBuf::from("/srv/demo/frontend/dist/logs"));
        assert_eq!(ServiceSpec::descriptor_file(&spec.name), "demo-frontend.config.json");
    }
}
