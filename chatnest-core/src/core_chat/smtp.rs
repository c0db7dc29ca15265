//! SMTP delivery of invitation tokens

use super::error::CollabError;
use super::notify::Notifier;
use super::token::InvitationToken;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::fmt;
use std::time::Duration;

/// Connection and sender settings for [`SmtpNotifier`]
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Implicit TLS on port 465, STARTTLS otherwise
    pub use_tls: bool,

    /// Upper bound for one SMTP exchange
    pub timeout: Duration,

    /// Sender mailbox, e.g. `ChatNest <invites@example.com>`
    pub from: String,

    /// Public base URL of the API, used to print an accept link
    pub accept_url: Option<String>,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .field("from", &self.from)
            .field("accept_url", &self.accept_url)
            .finish()
    }
}

/// Notifier that mails the token to the invitee
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    accept_url: Option<String>,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Result<Self, CollabError> {
        let invalid = |what: &str, e: &dyn fmt::Display| {
            CollabError::Internal(format!("invalid SMTP {}: {}", what, e))
        };

        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| invalid("sender address", &e))?;

        let mut builder = if settings.use_tls {
            let tls = TlsParameters::new(settings.host.clone())
                .map_err(|e| invalid("TLS configuration", &e))?;

            if settings.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                    .map_err(|e| invalid("relay", &e))?
                    .port(settings.port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| invalid("relay", &e))?
                    .port(settings.port)
                    .tls(Tls::Required(tls))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
        };

        if let (Some(user), Some(pass)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.timeout(Some(settings.timeout)).build(),
            from,
            accept_url: settings.accept_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    /// Plain-text body carrying the token on a line of its own
    fn body(&self, token: &InvitationToken, chat_name: &str) -> String {
        let mut body = format!(
            "You have been invited to collaborate on the chat \"{}\".\n\n\
             Your invitation token:\n\n{}\n\n",
            chat_name,
            token.as_str()
        );

        match &self.accept_url {
            Some(url) => body.push_str(&format!(
                "To accept, sign in and POST to\n{}/users/<your user id>/invitations/<token>\n",
                url
            )),
            None => body.push_str("Redeem the token from your ChatNest account.\n"),
        }

        body.push_str("\nThe token can only be used once and expires.\n");
        body
    }

    fn message(
        &self,
        to_email: &str,
        token: &InvitationToken,
        chat_name: &str,
    ) -> Result<Message, CollabError> {
        let failed = |reason: String| CollabError::DeliveryFailed {
            email: to_email.to_string(),
            reason,
        };

        let to: Mailbox = to_email
            .parse()
            .map_err(|e| failed(format!("invalid recipient: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("Invitation to \"{}\"", chat_name))
            .header(ContentType::TEXT_PLAIN)
            .body(self.body(token, chat_name))
            .map_err(|e| failed(format!("failed to build email: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        to_email: &str,
        token: &InvitationToken,
        chat_name: &str,
    ) -> Result<(), CollabError> {
        let message = self.message(to_email, token, chat_name)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CollabError::DeliveryFailed {
                email: to_email.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(to = %to_email, chat = %chat_name, "Invitation mailed");
        Ok(())
    }
}
