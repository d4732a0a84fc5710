#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App, HttpResponse};
use quackstack::{config, AppConfig, SecurityHeaders};

#[actix_web::test]
async fn test_security_headers_present() {
    let (state, _) = common::test_state();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_config(&state.config))
            .app_data(web::Data::new(state))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/ducks").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
async fn test_security_headers_on_errors() {
    let (state, _) = common::test_state();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .app_data(web::Data::new(state))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/ducks/12345").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
}

#[actix_web::test]
async fn test_hsts_enabled_via_config() {
    let cfg = AppConfig { enable_hsts: true, ..common::test_config() };
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_config(&cfg))
            .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
async fn test_csp_allows_external_media_origin() {
    let cfg = AppConfig { media_public_url: "https://cdn.quack.example/media".into(), ..common::test_config() };
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_config(&cfg))
            .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert!(csp.contains("img-src 'self' data: https://cdn.quack.example;"), "{csp}");
}

#[actix_web::test]
async fn test_existing_header_not_overwritten() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .route(
                "/custom",
                web::get().to(|| async {
                    HttpResponse::Ok().insert_header(("X-Frame-Options", "SAMEORIGIN")).finish()
                }),
            ),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/custom").to_request()).await;
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "SAMEORIGIN");
}
