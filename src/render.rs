use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};

use crate::report_config::{ReportConfig, Reportee};
use crate::tally::{Durations, ProjectTally};
use crate::time_entry::TimeEntry;

/// 全ユーザー分の集計結果の見出しに利用する名前。
pub const ALL_EMPLOYEES: &str = "All Employees";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const SECTION_RULE: &str = "____________________________";

/// ミリ秒を小数点以下2桁の時間表記にする。
pub fn format_hours(millis: i64) -> String {
    format!("{:.2}h", millis as f64 / MILLIS_PER_HOUR)
}

/// 全ユーザー分とユーザーごとの集計結果。
#[derive(Debug)]
pub struct Timesheet<'a> {
    pub all: ProjectTally,
    pub reportees: Vec<(&'a Reportee, ProjectTally)>,
}

impl<'a> Timesheet<'a> {
    /// time entryを全reportee分と、reporteeごとに集計する。
    pub fn build(entries: &[TimeEntry], reportees: &'a [Reportee]) -> Self {
        let all_ids: HashSet<u64> = reportees.iter().map(|reportee| reportee.id).collect();
        let all = ProjectTally::aggregate(entries, &all_ids);
        let reportees = reportees
            .iter()
            .map(|reportee| {
                let ids = HashSet::from([reportee.id]);
                (reportee, ProjectTally::aggregate(entries, &ids))
            })
            .collect();

        Self { all, reportees }
    }
}

/// タイムシートを出力するためのtrait。
pub trait TimesheetPresenter {
    /// レポート全体の見出しを出力する。
    fn write_header(&mut self, config: &ReportConfig) -> Result<()>;

    /// 1人分(または全員分)の集計結果を出力する。
    ///
    /// # Arguments
    ///
    /// * `reportee` - 見出しに表示する名前
    /// * `config` - レポートのパラメータ
    /// * `tally` - プロジェクトごとの集計結果
    fn write_section(
        &mut self,
        reportee: &str,
        config: &ReportConfig,
        tally: &ProjectTally,
    ) -> Result<()>;

    /// 全員分とユーザーごとの集計結果の区切りを出力する。
    fn write_divider(&mut self) -> Result<()>;

    /// レポートの末尾を出力する。
    fn write_footer(&mut self) -> Result<()>;
}

/// 全員分、reporteeごとの順にタイムシートを出力する。
pub fn render_timesheet<P: TimesheetPresenter>(
    presenter: &mut P,
    config: &ReportConfig,
    entries: &[TimeEntry],
) -> Result<()> {
    let timesheet = Timesheet::build(entries, &config.reportees);

    presenter.write_header(config)?;
    presenter.write_section(ALL_EMPLOYEES, config, &timesheet.all)?;
    presenter.write_divider()?;
    for (reportee, tally) in &timesheet.reportees {
        presenter.write_section(&reportee.name, config, tally)?;
    }
    presenter.write_footer()
}

/// HTML形式のタイムシート。
pub struct HtmlTimesheet<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> HtmlTimesheet<'a, W> {
    /// 新しい`HtmlTimesheet`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_project(&mut self, project: &str, durations: &Durations) -> Result<()> {
        writeln!(self.writer, "<br/><b>{}</b><br/>", escape_html(project))?;
        writeln!(
            self.writer,
            "&nbsp;&nbsp;Total: {}<br/>",
            format_hours(durations.total)
        )?;
        writeln!(
            self.writer,
            "&nbsp;&nbsp;<b style='color:blue;'>Billable: {}</b><br/>",
            format_hours(durations.billable)
        )?;
        writeln!(
            self.writer,
            "&nbsp;&nbsp;Discounted: {}<br/>",
            format_hours(durations.non_billable)
        )?;
        Ok(())
    }
}

impl<'a, W: Write> TimesheetPresenter for HtmlTimesheet<'a, W> {
    fn write_header(&mut self, config: &ReportConfig) -> Result<()> {
        writeln!(self.writer, "<html>")?;
        writeln!(
            self.writer,
            "<h2>Summary Timesheet Report for {}<br/>",
            ALL_EMPLOYEES
        )?;
        writeln!(self.writer, "from {} to {}</h2>", config.since, config.until)?;
        writeln!(
            self.writer,
            "A similar report for this date range can be viewed <a href='{}'>here</a>.<br/><br/>",
            escape_html(&config.query().summary_url())
        )
        .context("Failed to write report header")
    }

    fn write_section(
        &mut self,
        reportee: &str,
        config: &ReportConfig,
        tally: &ProjectTally,
    ) -> Result<()> {
        writeln!(self.writer, "{} <br/>", SECTION_RULE)?;
        writeln!(
            self.writer,
            "<h3>Timesheet Report for {} ({}-{})</h3>",
            escape_html(reportee),
            config.since,
            config.until
        )?;
        for (project, durations) in tally.iter() {
            self.write_project(project, durations)
                .with_context(|| format!("Failed to write project: {}", project))?;
        }
        Ok(())
    }

    fn write_divider(&mut self) -> Result<()> {
        writeln!(
            self.writer,
            "<br/><br/><br/>Additional reports below...<br/><br/>"
        )
        .context("Failed to write divider")
    }

    fn write_footer(&mut self) -> Result<()> {
        writeln!(self.writer, "</html>").context("Failed to write report footer")
    }
}

/// プレーンテキスト形式のタイムシート。
pub struct TextTimesheet<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> TextTimesheet<'a, W> {
    /// 新しい`TextTimesheet`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W: Write> TimesheetPresenter for TextTimesheet<'a, W> {
    fn write_header(&mut self, config: &ReportConfig) -> Result<()> {
        writeln!(self.writer, "Summary Timesheet Report for {}", ALL_EMPLOYEES)?;
        writeln!(self.writer, "from {} to {}", config.since, config.until)?;
        writeln!(
            self.writer,
            "A similar report for this date range can be viewed at: {}",
            config.query().summary_url()
        )
        .context("Failed to write report header")
    }

    fn write_section(
        &mut self,
        reportee: &str,
        config: &ReportConfig,
        tally: &ProjectTally,
    ) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", SECTION_RULE)?;
        writeln!(
            self.writer,
            "Timesheet Report for {} ({} - {})",
            reportee, config.since, config.until
        )?;
        for (project, durations) in tally.iter() {
            writeln!(self.writer)?;
            writeln!(self.writer, "{}", project)?;
            writeln!(self.writer, "  Total: {}", format_hours(durations.total))?;
            writeln!(
                self.writer,
                "  Billable: {}",
                format_hours(durations.billable)
            )?;
            writeln!(
                self.writer,
                "  Discounted: {}",
                format_hours(durations.non_billable)
            )
            .with_context(|| format!("Failed to write project: {}", project))?;
        }
        Ok(())
    }

    fn write_divider(&mut self) -> Result<()> {
        writeln!(self.writer).context("Failed to write divider")?;
        writeln!(self.writer, "Additional reports below...").context("Failed to write divider")
    }

    fn write_footer(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush report")
    }
}

/// HTMLの特殊文字をエスケープする。
fn escape_html(s: &str) -> String {
    s.chars().fold(String::with_capacity(s.len()), |mut escaped, c| {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
        escaped
    })
}
