use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// 成功時の終了コード。
pub const EXIT_OK: u8 = 0;
/// 設定ファイルやファイルI/Oなど、分類されないエラーの終了コード。
pub const EXIT_FAILURE: u8 = 1;
/// 引数が不正な場合の終了コード。clapのパースエラーと同じ値にしている。
pub const EXIT_USAGE: u8 = 2;
/// Toggl APIからの取得に失敗した場合の終了コード。
pub const EXIT_FETCH: u8 = 3;
/// メール送信に失敗した場合の終了コード。
pub const EXIT_MAIL: u8 = 4;

/// コマンドライン引数の組み合わせが不正な場合のエラー。
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("since ({since}) must not be after until ({until})")]
    InvertedRange { since: String, until: String },

    #[error("no user ids to report on: configure reportees or pass --users")]
    NoUsers,
}

/// Toggl APIからレポートを取得する際のエラー。
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Toggl API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to send request to Toggl API at {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// メール送信時のエラー。
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to read report file: {path}")]
    ReadReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid mail address '{address}'")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build mail message")]
    Message(#[source] lettre::error::Error),

    #[error("Failed to build mail envelope")]
    Envelope(#[source] lettre::error::Error),

    #[error("Failed to deliver mail via {server}")]
    Delivery {
        server: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// エラーチェーンを辿り、終了コードを決定する。
///
/// 型付きのエラーが見つからなかった場合は`EXIT_FAILURE`を返す。
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return EXIT_USAGE;
        }
        if cause.downcast_ref::<FetchError>().is_some() {
            return EXIT_FETCH;
        }
        if cause.downcast_ref::<MailError>().is_some() {
            return EXIT_MAIL;
        }
    }
    EXIT_FAILURE
}
