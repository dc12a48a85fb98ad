use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::UsageError;
use crate::fetch::{DetailedReport, ReportFetcher};
use crate::overlap::warn_overlaps;
use crate::render::{render_timesheet, HtmlTimesheet, TextTimesheet};
use crate::report_config::{OutputFormat, ReportConfig, Reportee};
use crate::toggl::TogglRepository;

/// `report`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    #[clap(
        help = "Start date in the format YYYY-MM-DD",
        parse(try_from_str = parse_date)
    )]
    since: NaiveDate,

    #[clap(
        help = "End date in the format YYYY-MM-DD (inclusive)",
        parse(try_from_str = parse_date)
    )]
    until: NaiveDate,

    #[clap(short = 'p', long = "pdf", help = "Export the PDF report instead of a timesheet")]
    pdf: bool,

    #[clap(
        short = 'f',
        long = "format",
        arg_enum,
        default_value = "html",
        help = "Output format"
    )]
    format: OutputFormat,

    #[clap(
        long = "client",
        use_value_delimiter = true,
        help = "Comma separated client ids to filter by"
    )]
    client_ids: Vec<u64>,

    #[clap(
        short = 'u',
        long = "users",
        use_value_delimiter = true,
        help = "Comma separated user ids to report on (defaults to the configured reportees)"
    )]
    users: Vec<u64>,

    #[clap(
        short = 'o',
        long = "output",
        parse(from_os_str),
        help = "Output file (defaults to report_file or report.<format>)"
    )]
    output: Option<PathBuf>,

    #[clap(long = "check-overlaps", help = "Warn about overlapping time entries")]
    check_overlaps: bool,
}

impl ReportArgs {
    /// 引数と設定ファイルからレポートのパラメータを作成する。
    ///
    /// `--users`が指定されていない場合は設定ファイルの`reportees`を対象とする。
    /// 出力先は`--output`、(html, textの場合のみ)`report_file`、形式ごとの既定値の順に決定する。
    pub fn resolve(self, config: &Config, verbose: bool) -> Result<ReportConfig, UsageError> {
        if self.since > self.until {
            return Err(UsageError::InvertedRange {
                since: self.since.to_string(),
                until: self.until.to_string(),
            });
        }

        let format = if self.pdf {
            OutputFormat::Pdf
        } else {
            self.format
        };

        let reportees: Vec<Reportee> = if self.users.is_empty() {
            config
                .reportees
                .iter()
                .map(|(id, name)| Reportee {
                    id: *id,
                    name: name.clone(),
                })
                .collect()
        } else {
            let mut users = self.users;
            users.sort_unstable();
            users.dedup();
            users
                .into_iter()
                .map(|id| Reportee {
                    id,
                    name: config
                        .reportees
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| id.to_string()),
                })
                .collect()
        };
        if reportees.is_empty() {
            return Err(UsageError::NoUsers);
        }

        let configured_file = match format {
            OutputFormat::Html | OutputFormat::Text => config.report_file.clone(),
            OutputFormat::Json | OutputFormat::Pdf => None,
        };
        let output = self
            .output
            .or(configured_file)
            .unwrap_or_else(|| PathBuf::from(format.default_file_name()));

        Ok(ReportConfig {
            user_agent: config.user.clone(),
            workspace_id: config.workspace,
            reportees,
            since: self.since,
            until: self.until,
            client_ids: self.client_ids,
            format,
            output,
            verbose,
            check_overlaps: self.check_overlaps,
        })
    }
}

pub struct ReportCommand<'a, T: TogglRepository> {
    toggl_client: &'a T,
}

impl<'a, T: TogglRepository> ReportCommand<'a, T> {
    /// 新しい`ReportCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    pub fn new(toggl_client: &'a T) -> Self {
        Self { toggl_client }
    }

    /// `report`サブコマンドの処理を行う。
    ///
    /// 詳細レポートを取得して指定の形式で出力し、書き込んだファイルのパスを返す。
    /// 取得に失敗した場合はファイルを書き込まない。
    pub async fn run(&self, config: &ReportConfig) -> Result<PathBuf> {
        info!(
            "Running {:?} report from {} to {}",
            config.format, config.since, config.until
        );
        debug!("Report config: {:?}", config);

        let fetcher = ReportFetcher::new(self.toggl_client).verbose(config.verbose);
        let query = config.query();
        let document = if config.format == OutputFormat::Pdf {
            fetcher
                .fetch_pdf(&query)
                .await
                .context("Failed to fetch PDF report")?
        } else {
            let report = fetcher
                .fetch(&query)
                .await
                .context("Failed to fetch detailed report")?;
            info!(
                "Time entries retrieved successfully: {}",
                report.entries.len()
            );
            if config.check_overlaps {
                let count = warn_overlaps(&report.entries);
                if count > 0 {
                    warn!("{} overlapping pair(s) found", count);
                }
            }
            render_document(config, &report)?
        };

        write_report(&config.output, &document)?;
        info!(
            "Wrote {} bytes to {}",
            document.len(),
            config.output.display()
        );

        Ok(config.output.clone())
    }
}

/// 取得した詳細レポートを出力形式に合わせて変換する。
fn render_document(config: &ReportConfig, report: &DetailedReport) -> Result<Vec<u8>> {
    let mut document = Vec::new();
    match config.format {
        OutputFormat::Html => {
            let mut presenter = HtmlTimesheet::new(&mut document);
            render_timesheet(&mut presenter, config, &report.entries)
                .context("Failed to render HTML timesheet")?;
        }
        OutputFormat::Text => {
            let mut presenter = TextTimesheet::new(&mut document);
            render_timesheet(&mut presenter, config, &report.entries)
                .context("Failed to render text timesheet")?;
        }
        // PDFは取得したバイト列をそのまま書き込むため、ここには来ない
        OutputFormat::Json | OutputFormat::Pdf => {
            serde_json::to_writer(&mut document, &report.raw)
                .context("Failed to serialize detailed report")?;
        }
    }
    Ok(document)
}

/// レポートをファイルに書き込む。既存のファイルは上書きする。
fn write_report(path: &Path, document: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, document)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

/// 日付をパースする。
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Failed to parse date: {}", s))
}
