use tracing::info;

/// Outbound account mail. Only password resets are sent today.
pub trait Mailer: Send + Sync {
    fn send_password_reset(&self, email: &str, link: &str) -> anyhow::Result<()>;
}

/// Writes the mail to the log instead of delivering it. Suitable for
/// development and single-operator installs.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_password_reset(&self, email: &str, link: &str) -> anyhow::Result<()> {
        info!("Password reset for {}: {}", email, link);
        Ok(())
    }
}
