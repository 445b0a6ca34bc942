use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::fmt::Write;
use tracing::{info, warn};

use crate::{
    configuration::EmailSettings,
    error::ReservationError,
    outcome::RunOutcome,
    types::RunReport,
};

const FALLBACK_SENDER: &str = "gym-reservation@localhost.localdomain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub html_body: String,
    pub success: bool,
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ReservationError>;
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn results_table(report: &RunReport, reason_header: &str) -> String {
    let mut rows = String::new();
    for (slot, result) in &report.results {
        let status = match result.success {
            true => r#"<span style="color: green;">✅ SUCCESS</span>"#,
            false => r#"<span style="color: red;">❌ FAILED</span>"#,
        };
        let _ = write!(
            rows,
            r#"
    <tr>
        <td style="padding: 8px;">{}</td>
        <td style="padding: 8px;">{status}</td>
        <td style="padding: 8px;">{}</td>
    </tr>"#,
            slot.spaced(),
            escape_html(&result.message)
        );
    }
    format!(
        r#"<table border="1" style="border-collapse: collapse; width: 100%;">
    <tr style="background-color: #f2f2f2;">
        <th style="padding: 8px; text-align: left;">Time Slot</th>
        <th style="padding: 8px; text-align: left;">Status</th>
        <th style="padding: 8px; text-align: left;">{reason_header}</th>
    </tr>{rows}
</table>"#
    )
}

fn manual_link_section(manual_link: &str, prompt: &str) -> String {
    format!(
        r#"<p><strong>Manual Reservation Link:</strong></p>
<p>{prompt}</p>
<p><a href="{}" style="background-color: #4CAF50; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; display: inline-block;">🏋️ Reserve Manually on Condomisoft</a></p>"#,
        escape_html(manual_link)
    )
}

fn wrap(title: &str, content: &str) -> String {
    format!(
        r#"<html>
<body>
<h2>{title}</h2>
{content}
<hr>
<p><small>This is an automated message from your Gym Reservation System.</small></p>
</body>
</html>"#
    )
}

/// Builds the one notification a finished run sends, picking the template by
/// outcome.
pub fn compose(report: &RunReport, apartment: &str, manual_link: &str) -> Notification {
    let apartment = escape_html(apartment);
    let total = report.results.len();
    let started = report.started_at.format("%Y-%m-%d %H:%M:%S");
    let summary = format!(
        r#"<ul>
    <li><strong>Date:</strong> {}</li>
    <li><strong>Location:</strong> Gym - {apartment}</li>
    <li><strong>Reservation Made:</strong> {started}</li>
    <li><strong>Duration:</strong> {:.1} seconds</li>
    <li><strong>Successful Slots:</strong> {}/{total}</li>
</ul>"#,
        report.target_date,
        report.duration_secs,
        report.successful_slots()
    );

    match report.outcome {
        RunOutcome::AllSuccess => {
            let content = format!(
                r#"<p><strong>Reservation Summary:</strong></p>
{summary}
<h3>📋 Detailed Results:</h3>
{}
<p><strong>Overall Status:</strong> <span style="color: green;">✅ All slots reserved successfully!</span></p>"#,
                results_table(report, "Message")
            );
            Notification {
                subject: "✅ Gym Reservation - All Slots Reserved!".into(),
                html_body: wrap("🏋️ Gym Reservation Results", &content),
                success: true,
            }
        }
        RunOutcome::PartialSuccess => {
            let content = format!(
                r#"<p><strong>Reservation Summary:</strong></p>
{summary}
<h3>📋 Detailed Results:</h3>
{}
<p><strong>Overall Status:</strong> <span style="color: orange;">⚠️ {}/{total} slots reserved</span></p>
{}"#,
                results_table(report, "Message"),
                report.successful_slots(),
                manual_link_section(
                    manual_link,
                    "You can try to manually reserve the failed slot by clicking the link below:"
                )
            );
            Notification {
                subject: "⚠️ Gym Reservation - Partial Success".into(),
                html_body: wrap("⚠️ Gym Reservation - Partial Success", &content),
                success: true,
            }
        }
        RunOutcome::NoSuccess => {
            let reason = report
                .error
                .clone()
                .unwrap_or_else(|| "All time slots failed".to_string());
            let content = format!(
                r#"<p><strong>Attempted Reservation:</strong></p>
{summary}
<p><strong>Status:</strong> <span style="color: red;">❌ FAILED - Not successful</span></p>
<h3>📋 Detailed Failure Results:</h3>
{}
<p><strong>Overall Failure Reason:</strong></p>
<p style="background-color: #ffebee; padding: 10px; border-radius: 5px; color: #c62828;">{}</p>
<p><strong>Possible causes:</strong></p>
<ul>
    <li>Time slots were already reserved by another user</li>
    <li>System did not confirm the reservations properly</li>
    <li>Network or website issues during reservation</li>
    <li>Time slots show "Disponible" instead of "Confirmado para {apartment}"</li>
</ul>
{}
<p>Please check the logs for more details.</p>"#,
                results_table(report, "Failure Reason"),
                escape_html(&reason),
                manual_link_section(
                    manual_link,
                    "You can try to make the reservation manually by clicking the link below:"
                )
            );
            Notification {
                subject: "❌ Gym Reservation Failed".into(),
                html_body: wrap("🏋️ Gym Reservation Failed", &content),
                success: false,
            }
        }
    }
}

pub fn test_message() -> Notification {
    Notification {
        subject: "🧪 Gym Reservation - Test Email".into(),
        html_body: wrap(
            "🧪 Test Email",
            "<p>Email notifications are configured correctly.</p>",
        ),
        success: true,
    }
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Disabled,
}

pub struct EmailNotifier {
    transport: EmailTransport,
    from: String,
    to: String,
}

impl EmailNotifier {
    /// SMTP when user and password are set, the outbox directory when one is
    /// configured, otherwise notifications are skipped.
    pub fn new(settings: &EmailSettings) -> Result<Self, ReservationError> {
        let transport = match (&settings.outbox_dir, &settings.user, &settings.password) {
            (Some(directory), _, _) => {
                std::fs::create_dir_all(directory).map_err(|err| {
                    ReservationError::Notification(format!("create outbox directory: {err}"))
                })?;
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(directory))
            }
            (None, Some(user), Some(password)) => {
                let smtp = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|err| {
                        ReservationError::Notification(format!("create SMTP transport: {err}"))
                    })?
                    .port(settings.port)
                    .credentials(Credentials::new(user.clone(), password.clone()))
                    .build();
                EmailTransport::Smtp(smtp)
            }
            _ => EmailTransport::Disabled,
        };

        let from = settings
            .user
            .clone()
            .unwrap_or_else(|| FALLBACK_SENDER.to_string());
        let to = settings.to.clone().unwrap_or_else(|| from.clone());
        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message, ReservationError> {
        let from = self.from.parse::<Mailbox>().map_err(|err| {
            ReservationError::Notification(format!("parse from email: {err}"))
        })?;
        let to = self
            .to
            .parse::<Mailbox>()
            .map_err(|err| ReservationError::Notification(format!("parse to email: {err}")))?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(notification.html_body.clone())
            .map_err(|err| ReservationError::Notification(format!("build email message: {err}")))
    }
}

impl Notifier for EmailNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ReservationError> {
        match &self.transport {
            EmailTransport::Disabled => {
                warn!("Email credentials not configured. Skipping email notification.");
            }
            EmailTransport::Smtp(smtp) => {
                smtp.send(self.message(notification)?)
                    .await
                    .map_err(|err| ReservationError::Notification(format!("send SMTP email: {err}")))?;
                info!(to = %self.to, "Email notification sent");
            }
            EmailTransport::File(file) => {
                file.send(self.message(notification)?)
                    .await
                    .map_err(|err| ReservationError::Notification(format!("write email file: {err}")))?;
                info!(to = %self.to, "Email notification written to outbox");
            }
        }
        Ok(())
    }
}
