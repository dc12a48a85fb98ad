use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{error, info};

use crate::config::MailSettings;
use crate::error::MailError;

const DEFAULT_REPORT_FILE: &str = "report.txt";

/// `mail`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct MailArgs {
    #[clap(
        short = 'f',
        long = "file",
        help = "Report file to send (defaults to mail.report_file or report.txt)"
    )]
    file: Option<PathBuf>,

    #[clap(short = 's', long = "subject", help = "Overrides the mail subject")]
    subject: Option<String>,
}

/// メールを送信するためのtrait。
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait MailTransport {
    /// 組み立て済みのメッセージをエンベロープの宛先に送信する。
    async fn send(&self, envelope: &Envelope, message: &[u8]) -> Result<(), MailError>;
}

/// STARTTLSで接続し、認証してから送信するSMTPリレー。
pub struct SmtpRelay {
    server: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    /// 新しい`SmtpRelay`を返す。
    ///
    /// # Arguments
    ///
    /// * `settings` - SMTPの設定
    /// * `timeout` - SMTPセッションのタイムアウト
    pub fn new(settings: &MailSettings, timeout: Duration) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
            .map_err(|source| MailError::Delivery {
                server: settings.server.clone(),
                source: Box::new(source),
            })?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.login.clone(),
                settings.app_password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            server: format!("{}:{}", settings.server, settings.port),
            transport,
        })
    }
}

impl MailTransport for SmtpRelay {
    async fn send(&self, envelope: &Envelope, message: &[u8]) -> Result<(), MailError> {
        let response = self
            .transport
            .send_raw(envelope, message)
            .await
            .map_err(|source| MailError::Delivery {
                server: self.server.clone(),
                source: Box::new(source),
            })?;
        info!("SMTP server responded with {}", response.code());

        Ok(())
    }
}

pub struct MailCommand<'a, T: MailTransport> {
    transport: &'a T,
    settings: &'a MailSettings,
}

impl<'a, T: MailTransport> MailCommand<'a, T> {
    /// 新しい`MailCommand`を返す。
    ///
    /// # Arguments
    /// * `transport` - メールを送信するためのトランスポート
    /// * `settings` - 設定ファイルの`mail`セクション
    pub fn new(transport: &'a T, settings: &'a MailSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// `mail`サブコマンドの処理を行う。
    ///
    /// レポートファイルを読み込み、本文とした`text/plain`のメールを送信する。
    pub async fn run(&self, args: MailArgs) -> Result<()> {
        let path = args
            .file
            .or_else(|| self.settings.report_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_FILE));
        let body = std::fs::read_to_string(&path).map_err(|source| MailError::ReadReport {
            path: path.clone(),
            source,
        })?;
        info!("Read {} bytes from {}", body.len(), path.display());

        let subject = args.subject.unwrap_or_else(|| default_subject(&path));
        let message = build_message(self.settings, &subject, body)?;
        let envelope = build_envelope(self.settings)?;

        info!(
            "Sending '{}' to {} recipient(s)",
            subject,
            envelope.to().len()
        );
        if let Err(err) = self.transport.send(&envelope, &message.formatted()).await {
            error!("Failed to send mail: {}", err);
            return Err(err).context("Failed to send report mail");
        }
        info!("Mail sent successfully.");

        Ok(())
    }
}

/// 件名の既定値を返す。
fn default_subject(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("The contents of {}", name)
}

/// 単一パートのテキストメールを組み立てる。
fn build_message(settings: &MailSettings, subject: &str, body: String) -> Result<Message, MailError> {
    let from: Mailbox = parse_address(&settings.from)?;
    let to: Mailboxes = parse_address(&settings.to)?;

    let builder = to
        .into_iter()
        .fold(Message::builder().from(from), |builder, mailbox| {
            builder.to(mailbox)
        });

    builder
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(MailError::Message)
}

/// エンベロープを組み立てる。
///
/// 送信者は`sender`、未設定なら`from`のアドレスとする。
/// 宛先は`recipients`、未設定なら`to`のアドレスとする。
fn build_envelope(settings: &MailSettings) -> Result<Envelope, MailError> {
    let sender: Address = match &settings.sender {
        Some(sender) => parse_address(sender)?,
        None => parse_address::<Mailbox>(&settings.from)?.email,
    };

    let recipients: Vec<Address> = if settings.recipients.is_empty() {
        parse_address::<Mailboxes>(&settings.to)?
            .into_iter()
            .map(|mailbox| mailbox.email)
            .collect()
    } else {
        settings
            .recipients
            .iter()
            .map(|recipient| parse_address::<Address>(recipient))
            .collect::<Result<_, _>>()?
    };

    new_envelope(sender, recipients)
}

/// エンベロープを作成する。宛先が空の場合はエラーとする。
fn new_envelope(sender: Address, recipients: Vec<Address>) -> Result<Envelope, MailError> {
    Envelope::new(Some(sender), recipients).map_err(MailError::Envelope)
}

fn parse_address<A>(address: &str) -> Result<A, MailError>
where
    A: std::str::FromStr<Err = lettre::address::AddressError>,
{
    address.parse().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use lettre::Address;
    use mockall::predicate::always;
    use tempfile::TempDir;

    use super::{
        build_envelope, build_message, default_subject, new_envelope, MailArgs, MailCommand,
        MockMailTransport,
    };
    use crate::config::MailSettings;
    use crate::error::MailError;

    fn settings(report_file: Option<PathBuf>, recipients: &[&str]) -> MailSettings {
        MailSettings {
            server: "smtp.example.com".to_string(),
            port: 587,
            login: "reporter@example.com".to_string(),
            app_password: "app-password".to_string(),
            sender: None,
            from: "Reporter <reporter@example.com>".to_string(),
            to: "Boss <boss@example.com>, team@example.com".to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            report_file,
        }
    }

    /// 一時ディレクトリに`report.txt`を作成する。
    fn write_report(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("report.txt");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_subject() {
        assert_eq!(
            default_subject(Path::new("out/report.txt")),
            "The contents of report.txt"
        );
    }

    #[test]
    fn test_build_message() {
        let message = build_message(
            &settings(None, &[]),
            "The contents of report.txt",
            "Total: 1.50h".to_string(),
        )
        .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: The contents of report.txt"));
        assert!(formatted.contains("From: Reporter <reporter@example.com>"));
        assert!(formatted.contains("boss@example.com"));
        assert!(formatted.contains("team@example.com"));
        assert!(formatted.contains("Content-Type: text/plain"));
        assert!(formatted.contains("Total: 1.50h"));
    }

    #[test]
    fn test_build_envelope_defaults_to_headers() {
        let envelope = build_envelope(&settings(None, &[])).unwrap();

        assert_eq!(
            envelope.from().map(|address| address.to_string()),
            Some("reporter@example.com".to_string())
        );
        let to: Vec<_> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["boss@example.com", "team@example.com"]);
    }

    #[test]
    fn test_build_envelope_with_recipients() {
        let envelope =
            build_envelope(&settings(None, &["archive@example.com"])).unwrap();

        let to: Vec<_> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["archive@example.com"]);
    }

    #[test]
    fn test_build_envelope_invalid_recipient() {
        let err = build_envelope(&settings(None, &["not an address"])).unwrap_err();

        assert!(matches!(err, MailError::Address { address, .. } if address == "not an address"));
    }

    #[test]
    fn test_new_envelope_without_recipients() {
        let sender: Address = "reporter@example.com".parse().unwrap();

        let err = new_envelope(sender, vec![]).unwrap_err();

        assert!(matches!(err, MailError::Envelope(_)));
        assert_eq!(err.to_string(), "Failed to build mail envelope");
    }

    #[tokio::test]
    async fn test_mail_command_sends_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, "Total: 1.50h\n");
        let settings = settings(Some(path), &["archive@example.com"]);
        let mut transport = MockMailTransport::new();
        transport
            .expect_send()
            .with(always(), always())
            .times(1)
            .returning(|envelope, message| {
                let message = String::from_utf8_lossy(message);
                assert_eq!(envelope.to().len(), 1);
                assert!(message.contains("Total: 1.50h"));
                assert!(message.contains("Subject: The contents of report.txt"));
                Ok(())
            });

        let command = MailCommand::new(&transport, &settings);
        let result = command
            .run(MailArgs {
                file: None,
                subject: None,
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_mail_command_missing_report() {
        let settings = settings(None, &[]);
        let mut transport = MockMailTransport::new();
        transport.expect_send().never();

        let command = MailCommand::new(&transport, &settings);
        let err = command
            .run(MailArgs {
                file: Some(PathBuf::from("does/not/exist/report.txt")),
                subject: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MailError>(),
            Some(MailError::ReadReport { .. })
        ));
    }

    #[tokio::test]
    async fn test_mail_command_propagates_delivery_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir, "report");
        let settings = settings(None, &[]);
        let mut transport = MockMailTransport::new();
        transport.expect_send().times(1).returning(|_, _| {
            Err(MailError::Delivery {
                server: "smtp.example.com:587".to_string(),
                source: "535 authentication failed".into(),
            })
        });

        let command = MailCommand::new(&transport, &settings);
        let err = command
            .run(MailArgs {
                file: Some(path),
                subject: Some("Weekly".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MailError>(),
            Some(MailError::Delivery { .. })
        ));
    }
}
