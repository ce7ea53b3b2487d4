use anyhow::Result;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header},
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

use crate::config::SmtpSettings;
use crate::models::{Order, Payment, User};
use crate::statement::{BUSINESS_NAME, OrderStatement};

/// Outgoing notification mail over an authenticated SMTP relay
#[derive(Clone)]
pub struct Mailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let transport = SmtpTransport::relay(&settings.host)?.credentials(creds).build();

        Ok(Self {
            transport,
            from: settings.from.parse()?,
        })
    }

    pub fn welcome_message(&self, user: &User) -> Result<Message> {
        let body = format!(
            "Hello {},\n\nYour {} account at {BUSINESS_NAME} is ready. \
             Sign in with {} to follow your orders and projects.\n",
            user.first_name, user.user_type, user.email
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(user.email.parse()?)
            .subject(format!("Welcome to {BUSINESS_NAME}"))
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)?;

        Ok(message)
    }

    /// Receipt for a payment with the order statement attached
    pub fn receipt_message(&self, to: &str, payment: &Payment, order: &Order, statement: &OrderStatement) -> Result<Message> {
        let body = format!(
            "We received {:.2} by {} for order #{}.\nRemaining balance: {:.2}\n",
            payment.amount,
            payment.method,
            order.order_id,
            order.balance().balance_due()
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(format!("Payment received for order #{}", order.order_id))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(
                        Attachment::new(statement.file_name())
                            .body(statement.to_markdown(), header::ContentType::parse("text/markdown")?),
                    ),
            )?;

        Ok(message)
    }

    /// Send in the background; failures are logged and never reach the caller
    pub fn deliver(&self, message: Message) {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            let subject = message
                .headers()
                .get_raw("Subject")
                .unwrap_or_default()
                .to_string();
            match transport.send(&message) {
                Ok(_) => info!("Sent mail '{subject}'"),
                Err(e) => warn!("Failed to send mail '{subject}': {e}"),
            }
        });
    }
}
