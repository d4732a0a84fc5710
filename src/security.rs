use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, http::header};
use futures_util::future::{LocalBoxFuture, ready, Ready};
use std::rc::Rc;

use crate::config::AppConfig;

/// Adds the standard hardening headers to every response unless a handler
/// already set them.
#[derive(Clone)]
pub struct SecurityHeaders {
    pub enable_hsts: bool,
    csp: header::HeaderValue,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self { enable_hsts: false, csp: header::HeaderValue::from_static(Self::BASE_CSP) }
    }
}

impl SecurityHeaders {
    const BASE_CSP: &'static str = "default-src 'self'; img-src 'self' data:; object-src 'none'; base-uri 'none'; frame-ancestors 'none'; form-action 'self'";

    /// Allows images from the configured media origin when it is not this host.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut this = Self::default().with_hsts(config.enable_hsts);
        if let Some(origin) = media_origin(&config.media_public_url) {
            let csp = format!(
                "default-src 'self'; img-src 'self' data: {origin}; object-src 'none'; base-uri 'none'; frame-ancestors 'none'; form-action 'self'"
            );
            match header::HeaderValue::from_str(&csp) {
                Ok(v) => this.csp = v,
                Err(_) => tracing::warn!("MEDIA_PUBLIC_URL is not header-safe; keeping default CSP"),
            }
        }
        this
    }

    pub fn with_hsts(mut self, enable: bool) -> Self {
        self.enable_hsts = enable;
        self
    }
}

/// `scheme://host[:port]` of an absolute URL; `None` for relative paths.
fn media_origin(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() || rest.is_empty() {
        return None;
    }
    let host_len = rest.find('/').unwrap_or(rest.len());
    Some(&url[..scheme.len() + 3 + host_len])
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddleware {
            service: Rc::new(service),
            cfg: self.clone(),
        }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: Rc<S>,
    cfg: SecurityHeaders,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let cfg = self.cfg.clone();
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            let headers = res.response_mut().headers_mut();
            let defaults = [
                (header::CONTENT_SECURITY_POLICY, cfg.csp.clone()),
                (header::REFERRER_POLICY, header::HeaderValue::from_static("no-referrer")),
                (header::X_CONTENT_TYPE_OPTIONS, header::HeaderValue::from_static("nosniff")),
                (header::X_FRAME_OPTIONS, header::HeaderValue::from_static("DENY")),
                (header::X_XSS_PROTECTION, header::HeaderValue::from_static("0")),
            ];
            for (name, value) in defaults {
                if !headers.contains_key(&name) {
                    headers.insert(name, value);
                }
            }
            if cfg.enable_hsts && !headers.contains_key(header::STRICT_TRANSPORT_SECURITY) {
                headers.insert(header::STRICT_TRANSPORT_SECURITY, header::HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"));
            }
            Ok(res)
        })
    }
}
