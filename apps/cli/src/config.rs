use std::{collections::HashMap, env, fs, path::Path};

pub const SETTINGS_FILE: &str = "dialog.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            tenant_id: "default".into(),
            session_id: None,
            user_id: None,
            page_size: 50,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| env::var(key).ok())
}

/// `path` first, then `DIALOG_*` and finally `APP__*` variables from `lookup`.
pub fn load_settings_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("tenant_id") {
                settings.tenant_id = v.clone();
            }
            if let Some(v) = file_cfg.get("session_id") {
                settings.session_id = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("user_id") {
                settings.user_id = Some(v.clone());
            }
            if let Some(parsed) = file_cfg.get("page_size").and_then(|v| v.parse().ok()) {
                settings.page_size = parsed;
            }
        }
    }

    for prefix in ["DIALOG_", "APP__"] {
        let var = |name: &str| lookup(&format!("{prefix}{name}"));

        if let Some(v) = var("SERVER_URL") {
            settings.server_url = v;
        }
        if let Some(v) = var("TENANT_ID") {
            settings.tenant_id = v;
        }
        if let Some(v) = var("SESSION_ID") {
            settings.session_id = Some(v);
        }
        if let Some(v) = var("USER_ID") {
            settings.user_id = Some(v);
        }
        if let Some(v) = var("PAGE_SIZE") {
            if let Ok(parsed) = v.parse::<usize>() {
                settings.page_size = parsed;
            }
        }
    }

    settings
}
