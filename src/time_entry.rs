use chrono::{DateTime, FixedOffset};

/// 課金対象を表すタグ。
pub const BILLABLE_TAG: &str = "Billable";

/// プロジェクトが設定されていないtime entryを集計する際のプロジェクト名。
pub const NO_PROJECT: &str = "(No project)";

/// Togglの詳細レポートから取得した1件のtime entry。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntry {
    pub user_id: u64,
    pub project: Option<String>,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
    /// 経過時間(ミリ秒)。
    pub duration: i64,
    pub tags: Vec<String>,
}

impl TimeEntry {
    /// 集計に利用するプロジェクト名を返す。
    pub fn project_name(&self) -> &str {
        self.project.as_deref().unwrap_or(NO_PROJECT)
    }

    /// `Billable`タグが付与されているかを返す。
    pub fn is_billable(&self) -> bool {
        self.tags.iter().any(|tag| tag == BILLABLE_TAG)
    }
}
