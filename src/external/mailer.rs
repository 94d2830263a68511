use crate::config::MailConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct MailService {
    client: Client,
    config: MailConfig,
}

impl MailService {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.api_url.is_empty()
    }

    fn from_header(&self) -> String {
        match &self.config.from_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.config.from_address),
            _ => self.config.from_address.clone(),
        }
    }

    /// Posts one message to the mail API. Returns `Ok(false)` without sending
    /// when no API key is configured.
    pub async fn send(&self, message: &MailMessage) -> AppResult<bool> {
        if !self.is_enabled() {
            log::warn!("Mail delivery disabled, skipping message to {}", message.to);
            return Ok(false);
        }

        let body = SendMailRequest {
            from: self.from_header(),
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            log::info!("Mail sent successfully: {}", message.to);
            Ok(true)
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!(
                "Mail failed to send: {}, status: {}, error: {}",
                message.to,
                status,
                error_text
            );
            Err(AppError::ExternalApiError(format!(
                "Mail sending failed: {error_text}"
            )))
        }
    }
}

/// 中奖通知邮件
pub fn winner_notification(
    to: &str,
    teacher_name: &str,
    class_name: &str,
    drawing_name: &str,
    prize: &str,
) -> MailMessage {
    let subject = format!("Your class won the {drawing_name} drawing!");
    let text = format!(
        "Hello {teacher_name},\n\nCongratulations! Your class {class_name} was drawn as a winner \
         of \"{drawing_name}\".\n\nPrize: {prize}\n\nThank you for taking part in the scavenger hunt."
    );
    let html = format!(
        "<p>Hello {teacher_name},</p>\
         <p>Congratulations! Your class <strong>{class_name}</strong> was drawn as a winner of \
         <strong>{drawing_name}</strong>.</p>\
         <p>Prize: {prize}</p>\
         <p>Thank you for taking part in the scavenger hunt.</p>"
    );
    MailMessage {
        to: to.to_string(),
        subject,
        text,
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_notification_mentions_class_and_prize() {
        let msg = winner_notification("t@school.org", "Ms. Rivera", "4B", "Spring Hunt", "Pizza");
        assert_eq!(msg.to, "t@school.org");
        assert!(msg.subject.contains("Spring Hunt"));
        assert!(msg.text.contains("4B"));
        assert!(msg.text.contains("Pizza"));
        assert!(msg.html.contains("<strong>4B</strong>"));
    }

    #[actix_web::test]
    async fn test_send_without_api_key_is_skipped() {
        let mailer = MailService::new(MailConfig::default());
        assert!(!mailer.is_enabled());
        let msg = winner_notification("t@school.org", "T", "4B", "Hunt", "Prize");
        assert!(!mailer.send(&msg).await.unwrap());
    }

    #[test]
    fn test_from_header_with_name() {
        let mailer = MailService::new(MailConfig {
            api_url: "https://mail.example".into(),
            api_key: "k".into(),
            from_address: "hunt@school.org".into(),
            from_name: Some("Scavenger Hunt".into()),
        });
        assert!(mailer.is_enabled());
        assert_eq!(mailer.from_header(), "Scavenger Hunt <hunt@school.org>");
    }
}
