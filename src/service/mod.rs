use crate::dto::{EmailRequest, EmailResponse};

/// Mail service shared by the gRPC and REST handlers.
///
/// There is no delivery backend yet: the request message is echoed back in the
/// `error` field of the response.
#[derive(Debug, Clone, Default)]
pub struct MailService;

impl MailService {
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn send_mail(&self, request: EmailRequest) -> EmailResponse {
        tracing::debug!("Handling send mail request ({} bytes)", request.message.len());

        EmailResponse {
            error: request.message,
        }
    }
}
