use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::services::firebase_service::FirebaseAuth;

/// Caller identity decoded from a verified bearer token.
#[derive(Debug, Clone)]
pub struct RequesterEmail(pub String);

/// Decorates the request with the caller's email when a valid
/// `Authorization: Bearer <token>` header is present. Absent or invalid
/// tokens pass through untouched; admin handlers enforce access
/// themselves.
pub struct VerifyToken;

impl<S, B> Transform<S, ServiceRequest> for VerifyToken
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = VerifyTokenMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(VerifyTokenMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct VerifyTokenMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for VerifyTokenMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.to_string());

        Box::pin(async move {
            if let Some(token) = token {
                let firebase = req.app_data::<web::Data<FirebaseAuth>>().cloned();

                if let Some(firebase) = firebase {
                    match firebase.verify_id_token(&token).await {
                        Ok(claims) => {
                            if let Some(email) = claims.email {
                                req.extensions_mut().insert(RequesterEmail(email));
                            }
                        }
                        // Invalid tokens degrade to anonymous
                        Err(e) => log::debug!("Bearer token rejected: {}", e),
                    }
                }
            }

            service.call(req).await
        })
    }
}
