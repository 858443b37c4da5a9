use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::service::MailService;

// Include the generated proto code
pub mod email {
    tonic::include_proto!("email.v1alpha1");
}

use email::{
    EmailRequest, EmailResponse,
    email_service_server::{EmailService as EmailServiceTrait, EmailServiceServer},
};

// gRPC service implementation
pub struct GrpcMailService {
    service: Arc<MailService>,
}

impl GrpcMailService {
    pub const fn new(service: Arc<MailService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl EmailServiceTrait for GrpcMailService {
    async fn send_mail(
        &self,
        request: Request<EmailRequest>,
    ) -> Result<Response<EmailResponse>, Status> {
        let req = request.into_inner();
        let dto_req = crate::dto::EmailRequest {
            message: req.message,
        };

        let response = self.service.send_mail(dto_req);
        Ok(Response::new(EmailResponse {
            error: response.error,
        }))
    }
}

pub fn create_grpc_server(service: Arc<MailService>) -> EmailServiceServer<GrpcMailService> {
    EmailServiceServer::new(GrpcMailService::new(service))
}
