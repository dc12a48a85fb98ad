use log::{debug, info};
use serde_json::Value;

use crate::error::FetchError;
use crate::time_entry::TimeEntry;
use crate::toggl::{join_ids, DetailsQuery, TogglRepository};

/// 全ページ分を結合した詳細レポート。
#[derive(Clone, Debug, PartialEq)]
pub struct DetailedReport {
    /// ページ順に結合したtime entry。
    pub entries: Vec<TimeEntry>,
    /// 1ページ目のレスポンスの`data`を全ページ分の`data`で置き換えたJSON。
    pub raw: Value,
}

/// 詳細レポートを全ページ取得する。
pub struct ReportFetcher<'a, T: TogglRepository> {
    toggl_client: &'a T,
    verbose: bool,
}

impl<'a, T: TogglRepository> ReportFetcher<'a, T> {
    /// 新しい`ReportFetcher`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    pub fn new(toggl_client: &'a T) -> Self {
        Self {
            toggl_client,
            verbose: false,
        }
    }

    /// `true`の場合、ページごとにリクエストの内容を出力する。
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 1ページ目を取得し、`total_count`と`per_page`から残りのページを順に取得する。
    ///
    /// いずれかのページの取得に失敗した場合は、途中までの結果を返さずにエラーとする。
    pub async fn fetch(&self, query: &DetailsQuery) -> Result<DetailedReport, FetchError> {
        debug!(
            "Fetching detailed report for user(s) {} from {} to {}",
            join_ids(&query.user_ids),
            query.since,
            query.until
        );
        self.log_request(query, 1);
        let first = self.toggl_client.read_details(query, 1).await?;
        let pages = page_count(first.total_count, first.per_page);
        info!(
            "Detailed report has {} entries in {} page(s)",
            first.total_count, pages
        );

        let mut raw = first.raw;
        let mut raw_data = take_data(&mut raw);
        let mut entries = first.entries;

        for page in 2..=pages {
            self.log_request(query, page);
            let mut next = self.toggl_client.read_details(query, page).await?;
            raw_data.extend(take_data(&mut next.raw));
            entries.extend(next.entries);
        }

        if let Value::Object(envelope) = &mut raw {
            envelope.insert("data".to_string(), Value::Array(raw_data));
        }

        Ok(DetailedReport { entries, raw })
    }

    /// PDFのレポートを取得する。
    pub async fn fetch_pdf(&self, query: &DetailsQuery) -> Result<Vec<u8>, FetchError> {
        if self.verbose {
            info!(
                "Requesting PDF report for user(s) {} with {:?}",
                join_ids(&query.user_ids),
                query.params(None)
            );
        }
        self.toggl_client.read_details_pdf(query).await
    }

    fn log_request(&self, query: &DetailsQuery, page: u32) {
        if self.verbose {
            info!(
                "Requesting page {} for user(s) {} with {:?}",
                page,
                join_ids(&query.user_ids),
                query.params(Some(page))
            );
        }
    }
}

/// 取得が必要なページ数を返す。
///
/// `ceil(total_count / per_page)`とし、1ページ目は常に取得済みなので最小値は1とする。
pub fn page_count(total_count: u64, per_page: u64) -> u32 {
    if per_page == 0 {
        return 1;
    }
    let pages = total_count.div_ceil(per_page).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// レスポンスのJSONから`data`配列を取り出す。
fn take_data(raw: &mut Value) -> Vec<Value> {
    match raw.get_mut("data").map(Value::take) {
        Some(Value::Array(data)) => data,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use reqwest::StatusCode;
    use rstest::rstest;
    use serde_json::json;

    use super::{page_count, ReportFetcher};
    use crate::error::FetchError;
    use crate::time_entry::TimeEntry;
    use crate::toggl::{DetailsPage, DetailsQuery, MockTogglRepository};

    fn query() -> DetailsQuery {
        DetailsQuery {
            user_agent: "reporter@example.com".to_string(),
            workspace_id: 1,
            user_ids: vec![10, 20],
            since: NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2016, 3, 15).unwrap(),
            client_ids: vec![],
        }
    }

    /// ページ番号をdescriptionに持つtime entryを1件含むページを作成する。
    fn page(number: u32, total_count: u64, per_page: u64) -> DetailsPage {
        let description = format!("page{}", number);
        DetailsPage {
            total_count,
            per_page,
            entries: vec![TimeEntry {
                user_id: 10,
                project: Some("X".to_string()),
                description: description.clone(),
                start: Utc.with_ymd_and_hms(2016, 3, 1, 9, 0, 0).unwrap().fixed_offset(),
                end: None,
                duration: 1000,
                tags: vec![],
            }],
            raw: json!({
                "total_count": total_count,
                "per_page": per_page,
                "data": [{ "description": description }],
            }),
        }
    }

    #[rstest]
    #[case::empty(0, 50, 1)]
    #[case::single(10, 50, 1)]
    #[case::exact_single(50, 50, 1)]
    #[case::remainder(250, 100, 3)]
    #[case::exact_multiple(300, 100, 3)]
    #[case::one_over(301, 100, 4)]
    #[case::zero_per_page(10, 0, 1)]
    fn test_page_count(#[case] total: u64, #[case] per_page: u64, #[case] expected: u32) {
        assert_eq!(page_count(total, per_page), expected);
    }

    /// total_count=250, per_page=100 の場合に1,2,3ページだけを順に取得することを確認する。
    /// verboseの指定は取得するページに影響しない。
    #[rstest]
    #[case::quiet(false)]
    #[case::verbose(true)]
    #[tokio::test]
    async fn test_fetch_requests_each_page_once(#[case] verbose: bool) {
        let mut toggl = MockTogglRepository::new();
        let mut seq = Sequence::new();
        for number in 1..=3u32 {
            toggl
                .expect_read_details()
                .with(eq(query()), eq(number))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, page_number| Ok(page(page_number, 250, 100)));
        }

        let fetcher = ReportFetcher::new(&toggl).verbose(verbose);
        let report = fetcher.fetch(&query()).await.unwrap();

        let descriptions: Vec<_> = report
            .entries
            .iter()
            .map(|entry| entry.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["page1", "page2", "page3"]);
        assert_eq!(
            report.raw,
            json!({
                "total_count": 250,
                "per_page": 100,
                "data": [
                    { "description": "page1" },
                    { "description": "page2" },
                    { "description": "page3" },
                ],
            })
        );
    }

    #[tokio::test]
    async fn test_fetch_exact_multiple_does_not_overfetch() {
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_read_details()
            .times(2)
            .returning(|_, page_number| Ok(page(page_number, 200, 100)));

        let fetcher = ReportFetcher::new(&toggl);
        let report = fetcher.fetch(&query()).await.unwrap();

        assert_eq!(report.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_single_page() {
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_read_details()
            .with(eq(query()), eq(1))
            .times(1)
            .returning(|_, page_number| Ok(page(page_number, 1, 50)));

        let fetcher = ReportFetcher::new(&toggl);
        let report = fetcher.fetch(&query()).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.raw, page(1, 1, 50).raw);
    }

    /// 途中のページで失敗した場合はエラーを返し、以降のページは取得しない。
    #[tokio::test]
    async fn test_fetch_fails_fast() {
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_read_details()
            .with(eq(query()), eq(1))
            .times(1)
            .returning(|_, page_number| Ok(page(page_number, 250, 100)));
        toggl
            .expect_read_details()
            .with(eq(query()), eq(2))
            .times(1)
            .returning(|_, _| {
                Err(FetchError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: "slow down".to_string(),
                })
            });

        let fetcher = ReportFetcher::new(&toggl);
        let err = fetcher.fetch(&query()).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Status { status, .. } if status == StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn test_fetch_pdf() {
        let mut toggl = MockTogglRepository::new();
        toggl
            .expect_read_details_pdf()
            .times(1)
            .returning(|_| Ok(b"%PDF".to_vec()));
        toggl.expect_read_details().never();

        let fetcher = ReportFetcher::new(&toggl).verbose(true);
        let bytes = fetcher.fetch_pdf(&query()).await.unwrap();

        assert_eq!(bytes, b"%PDF".to_vec());
    }
}
