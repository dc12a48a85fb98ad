use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use log::{debug, error, info};
use reqwest::{header::AUTHORIZATION, Client, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{AuthScheme, Config};
use crate::error::FetchError;
use crate::time_entry::TimeEntry;

const DETAILS_PATH: &str = "details";
const DETAILS_PDF_PATH: &str = "details.pdf";
const SUMMARY_URL: &str = "https://www.toggl.com/app/reports/summary";

/// 詳細レポートAPIに渡す検索条件。
#[derive(Clone, Debug, PartialEq)]
pub struct DetailsQuery {
    pub user_agent: String,
    pub workspace_id: u64,
    pub user_ids: Vec<u64>,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub client_ids: Vec<u64>,
}

impl DetailsQuery {
    /// クエリパラメータを返す。
    ///
    /// `client_ids`は指定されている場合のみ含める。`page`は1始まり。
    pub fn params(&self, page: Option<u32>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("user_agent", self.user_agent.clone()),
            ("workspace_id", self.workspace_id.to_string()),
            ("user_ids", join_ids(&self.user_ids)),
            ("since", self.since.format("%Y-%m-%d").to_string()),
            ("until", self.until.format("%Y-%m-%d").to_string()),
        ];
        if !self.client_ids.is_empty() {
            params.push(("client_ids", join_ids(&self.client_ids)));
        }
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        params
    }

    /// 同じ期間をTogglのWeb画面で確認するためのサマリーレポートのURLを返す。
    pub fn summary_url(&self) -> String {
        format!(
            "{}/{}/from/{}/to/{}/users/{}/billable/both",
            SUMMARY_URL,
            self.workspace_id,
            self.since.format("%Y-%m-%d"),
            self.until.format("%Y-%m-%d"),
            join_ids(&self.user_ids)
        )
    }
}

/// idの一覧をカンマ区切りの文字列にする。
pub fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// 詳細レポートの1ページ分。
#[derive(Clone, Debug, PartialEq)]
pub struct DetailsPage {
    pub total_count: u64,
    pub per_page: u64,
    pub entries: Vec<TimeEntry>,
    /// レスポンスのJSONそのもの。
    pub raw: Value,
}

/// 詳細レポートAPIのレスポンスをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglDetailsEnvelope {
    total_count: u64,
    per_page: u64,
    data: Vec<TogglDetailedEntry>,
}

/// 詳細レポートAPIのtime entryをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglDetailedEntry {
    uid: u64,
    #[serde(default)]
    description: Option<String>,
    project: Option<String>,
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
    dur: i64,
    #[serde(default)]
    tags: Vec<String>,
}

impl From<TogglDetailedEntry> for TimeEntry {
    fn from(entry: TogglDetailedEntry) -> Self {
        TimeEntry {
            user_id: entry.uid,
            project: entry.project,
            description: entry.description.unwrap_or_default(),
            start: entry.start,
            end: entry.end,
            duration: entry.dur,
            tags: entry.tags,
        }
    }
}

/// レスポンスボディを1ページ分の詳細レポートに変換する。
fn parse_details_page(url: &str, body: &str) -> Result<DetailsPage, FetchError> {
    let decode = |source| FetchError::Decode {
        url: url.to_string(),
        source,
    };
    let raw: Value = serde_json::from_str(body).map_err(decode)?;
    let envelope = TogglDetailsEnvelope::deserialize(&raw).map_err(decode)?;

    Ok(DetailsPage {
        total_count: envelope.total_count,
        per_page: envelope.per_page,
        entries: envelope.data.into_iter().map(TimeEntry::from).collect(),
        raw,
    })
}

/// Togglの詳細レポートを取得するためのtrait。
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait TogglRepository {
    /// 詳細レポートの指定ページを取得する。
    ///
    /// # Arguments
    ///
    /// * `query` - 検索条件
    /// * `page` - 1始まりのページ番号
    async fn read_details(&self, query: &DetailsQuery, page: u32)
        -> Result<DetailsPage, FetchError>;

    /// 詳細レポートをPDFで取得する。
    async fn read_details_pdf(&self, query: &DetailsQuery) -> Result<Vec<u8>, FetchError>;
}

/// Toggl Reports APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new(&config).unwrap();
/// let page = client.read_details(&query, 1).await.unwrap();
/// ```
pub struct TogglClient {
    client: Client,
    api_url: String,
    api_token: String,
    auth: AuthScheme,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    ///
    /// 設定ファイルの`timeout_secs`をリクエストのタイムアウトとして利用する。
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            auth: config.auth,
        })
    }

    /// GETリクエストを送信し、2xx以外のステータスは`FetchError::Status`として返す。
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Response, FetchError> {
        let url = format!("{}/{}", self.api_url, path);
        debug!("Sending GET request to: {}", url);
        debug!("Query: {:?}", params);

        let request = self.client.get(&url).query(params);
        let request = match self.auth {
            AuthScheme::Basic => request.basic_auth(&self.api_token, Some("api_token")),
            AuthScheme::Header => request.header(AUTHORIZATION, self.api_token.as_str()),
        };
        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|source| FetchError::Request { url, source })?;
            error!("Error running API request, status: {}", status);
            error!("{}", body);
            return Err(FetchError::Status { status, body });
        }
        debug!("Toggl response OK");

        Ok(response)
    }
}

impl TogglRepository for TogglClient {
    async fn read_details(
        &self,
        query: &DetailsQuery,
        page: u32,
    ) -> Result<DetailsPage, FetchError> {
        info!(
            "Getting report page {} for user(s): {}",
            page,
            join_ids(&query.user_ids)
        );
        let url = format!("{}/{}", self.api_url, DETAILS_PATH);
        let body = self
            .get(DETAILS_PATH, &query.params(Some(page)))
            .await?
            .text()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        parse_details_page(&url, &body)
    }

    async fn read_details_pdf(&self, query: &DetailsQuery) -> Result<Vec<u8>, FetchError> {
        info!(
            "Getting PDF report for user(s): {}",
            join_ids(&query.user_ids)
        );
        let url = format!("{}/{}", self.api_url, DETAILS_PDF_PATH);
        let bytes = self
            .get(DETAILS_PDF_PATH, &query.params(None))
            .await?
            .bytes()
            .await
            .map_err(|source| FetchError::Request { url, source })?;

        Ok(bytes.to_vec())
    }
}
