use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

/// 設定ファイル名。
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// プラットフォームの設定ディレクトリ配下で利用するディレクトリ名。
pub const APP_DIR_NAME: &str = "toggl-reporter";

const DEFAULT_API_URL: &str = "https://toggl.com/reports/api/v2";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SMTP_PORT: u16 = 587;

/// Toggl APIの認証方式。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// API tokenをユーザー名、`api_token`をパスワードとするBasic認証。
    #[default]
    Basic,
    /// API tokenをそのまま`Authorization`ヘッダに設定する。
    Header,
}

/// 設定ファイルの内容。
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Toggl APIに`user_agent`として送るアカウント識別子。
    #[serde(alias = "email")]
    pub user: String,
    pub workspace: u64,
    #[serde(alias = "api_key")]
    pub api_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// user id → 表示名。
    #[serde(default)]
    pub reportees: BTreeMap<u64, String>,
    pub report_file: Option<PathBuf>,
    pub mail: Option<MailSettings>,
}

/// `mail`サブコマンドで利用するSMTPの設定。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MailSettings {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub login: String,
    pub app_password: String,
    /// エンベロープの送信者。省略時は`from`のアドレスを利用する。
    pub sender: Option<String>,
    pub from: String,
    pub to: String,
    /// エンベロープの宛先。省略時は`to`のアドレスを利用する。
    #[serde(default)]
    pub recipients: Vec<String>,
    pub report_file: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl Config {
    /// 設定ファイルを読み込む。
    ///
    /// `path`が指定されていない場合は、カレントディレクトリの`config.yaml`、
    /// プラットフォームの設定ディレクトリの`toggl-reporter/config.yaml`の順に探す。
    ///
    /// # Arguments
    ///
    /// * `path` - コマンドラインで指定された設定ファイルのパス
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = resolve_path(path)?;
        debug!("Loading config from {}", path.display());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// YAML文字列から設定を作成する。
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content).context("Invalid config format")?;
        Ok(config)
    }
}

/// 読み込む設定ファイルのパスを決定する。
fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }

    let config_dir = dirs::config_dir().context("Failed to locate the config directory")?;
    Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}
