use std::path::PathBuf;

pub const ENV_DEMO_API_KEY: &str = "WIDGETFORGE_DEMO_API_KEY";
pub const ENV_TELEMETRY: &str = "WIDGETFORGE_TELEMETRY";
pub const ENV_LOG_DIR: &str = "WIDGETFORGE_LOG_DIR";

/**
 * \brief 进程级配置，全部来自环境变量。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /** \brief 内置演示模型使用的默认凭据 */
    pub demo_api_key: Option<String>,
    pub telemetry_enabled: bool,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            demo_api_key: None,
            telemetry_enabled: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /**
     * \brief 以任意键值来源构建配置，便于测试。
     */
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let demo_api_key = lookup(ENV_DEMO_API_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let telemetry_enabled = lookup(ENV_TELEMETRY)
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let log_dir = lookup(ENV_LOG_DIR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));
        Config {
            demo_api_key,
            telemetry_enabled,
            log_dir,
        }
    }

    /**
     * \brief 将日志相关配置应用到遥测模块。
     */
    pub fn apply_telemetry(&self) {
        crate::telemetry::set_log_dir(&self.log_dir);
        crate::telemetry::set_enabled(self.telemetry_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_reads_values() {
        let env: HashMap<&str, &str> = [
            (ENV_DEMO_API_KEY, " sk-demo "),
            (ENV_TELEMETRY, "TRUE"),
            (ENV_LOG_DIR, "/tmp/wf"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.demo_api_key.as_deref(), Some("sk-demo"));
        assert!(cfg.telemetry_enabled);
        assert_eq!(cfg.log_dir, PathBuf::from("/tmp/wf"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(|k| match k {
            ENV_DEMO_API_KEY => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(cfg, Config::default());
    }
}
