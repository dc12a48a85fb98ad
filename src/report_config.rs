use std::path::PathBuf;

use chrono::NaiveDate;

use crate::toggl::DetailsQuery;

/// レポートの出力形式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ArgEnum)]
pub enum OutputFormat {
    /// Togglが生成したPDFをそのまま出力する。
    Pdf,
    /// 詳細レポートのJSONをそのまま出力する。
    Json,
    Html,
    Text,
}

impl OutputFormat {
    /// 出力先が指定されていない場合のファイル名。
    pub fn default_file_name(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "report.pdf",
            OutputFormat::Json => "report.json",
            OutputFormat::Html => "report.html",
            OutputFormat::Text => "report.txt",
        }
    }
}

/// 個別に集計を出力するユーザー。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reportee {
    pub id: u64,
    pub name: String,
}

/// 1回のレポート生成で利用するパラメータ。
///
/// 起動時にコマンドライン引数と設定ファイルから作成し、以降は変更しない。
#[derive(Clone, Debug, PartialEq)]
pub struct ReportConfig {
    pub user_agent: String,
    pub workspace_id: u64,
    /// user idの昇順。
    pub reportees: Vec<Reportee>,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub client_ids: Vec<u64>,
    pub format: OutputFormat,
    pub output: PathBuf,
    pub verbose: bool,
    pub check_overlaps: bool,
}

impl ReportConfig {
    /// レポート対象のuser idを返す。
    pub fn user_ids(&self) -> Vec<u64> {
        self.reportees.iter().map(|reportee| reportee.id).collect()
    }

    /// 詳細レポートAPIの検索条件を返す。
    pub fn query(&self) -> DetailsQuery {
        DetailsQuery {
            user_agent: self.user_agent.clone(),
            workspace_id: self.workspace_id,
            user_ids: self.user_ids(),
            since: self.since,
            until: self.until,
            client_ids: self.client_ids.clone(),
        }
    }
}
