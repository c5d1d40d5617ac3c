use lettre::{
    Message, SmtpTransport, Transport,
    message::header,
    transport::smtp::authentication::Credentials,
};
use std::env;

/// Send a plain-text email using SMTP.
///
/// SMTP credentials come from the environment. Errors are returned to the
/// caller; whether a delivery failure matters is the caller's decision
/// (confirmation-code dispatch is deliberately fire-and-forget).
pub async fn send_email(
    to_email: &str,
    subject: &str,
    body: String,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let smtp_username = env::var("SMTP_USERNAME")?;
    let smtp_password = env::var("SMTP_PASSWORD")?;
    let smtp_server = env::var("SMTP_SERVER")?;
    let smtp_port: u16 = env::var("SMTP_PORT")?.parse()?;

    let email = Message::builder()
        .from(smtp_username.parse()?)
        .to(to_email.parse()?)
        .subject(subject)
        .header(header::ContentType::TEXT_PLAIN)
        .body(body)?;

    // STARTTLS: starts unencrypted, upgrades to TLS
    let creds = Credentials::new(smtp_username, smtp_password);
    let mailer = SmtpTransport::starttls_relay(&smtp_server)?
        .credentials(creds)
        .port(smtp_port)
        .build();

    mailer.send(&email)?;

    Ok(())
}
