#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::{http::StatusCode, test};
use serde_json::json;

#[actix_web::test]
async fn register_login_and_me() {
    let (state, _) = common::test_state();
    let app = init_app!(state);

    let (token, id) = register!(app, "puddles");

    let (status, body) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/user/login")
            .set_json(json!({ "email": "PUDDLES@pond.test", "password": "hunter22" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], id);
    assert!(body["user"].get("passwordHash").is_none());

    let (status, me) = call_json!(
        app,
        test::TestRequest::get().uri("/api/user/me").insert_header(common::bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "puddles");
    assert_eq!(me["email"], "puddles@pond.test");
    assert_eq!(me["likedDucks"], json!([]));
}

#[actix_web::test]
async fn login_failures_share_one_message() {
    let (state, _) = common::test_state();
    let app = init_app!(state);
    register!(app, "waddles");

    let (s1, b1) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/user/login")
            .set_json(json!({ "email": "waddles@pond.test", "password": "wrong-password" }))
    );
    let (s2, b2) = call_json!(
        app,
        test::TestRequest::post()
            .uri("/api/user/login")
            .set_json(json!({ "email": "nobody@pond.test", "password": "hunter22" }))
    );
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, b2);
}

#[actix_web::test]
async fn register_rejects_duplicates_and_bad_input() {
    let (state, _) = common::test_state();
    let app = init_app!(state);
    register!(app, "mallory");

    let cases = [
        json!({ "username": "Mallory", "email": "other@pond.test", "password": "hunter22" }),
        json!({ "username": "someone", "email": "mallory@pond.test", "password": "hunter22" }),
        json!({ "username": "x", "email": "x@pond.test", "password": "hunter22" }),
        json!({ "username": "valid_name", "email": "not-an-email", "password": "hunter22" }),
        json!({ "username": "valid_name", "email": "v@pond.test", "password": "123" }),
    ];
    for case in cases {
        let (status, body) = call_json!(
            app,
            test::TestRequest::post().uri("/api/user/register").set_json(&case)
        );
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case} -> {body}");
        assert!(body["error"].is_string());
    }
}

#[actix_web::test]
async fn me_requires_token() {
    let (state, _) = common::test_state();
    let app = init_app!(state);

    let (status, body) = call_json!(app, test::TestRequest::get().uri("/api/user/me"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization required");

    let (status, _) = call_json!(
        app,
        test::TestRequest::get().uri("/api/user/me").insert_header(common::bearer("not.a.token"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn refresh_issues_a_usable_token() {
    let (state, _) = common::test_state();
    let app = init_app!(state);
    let (token, _) = register!(app, "refresher");

    let (status, body) = call_json!(
        app,
        test::TestRequest::post().uri("/api/user/refresh").insert_header(common::bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap().to_string();

    let (status, _) = call_json!(
        app,
        test::TestRequest::get().uri("/api/user/me").insert_header(common::bearer(&fresh))
    );
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn public_profile_counts_ducks_and_hides_email() {
    let (state, _) = common::test_state();
    let app = init_app!(state);
    let (token, id) = register!(app, "uploader");
    post_duck!(app, token, "Alpha");
    post_duck!(app, token, "Beta");

    let (status, body) = call_json!(app, test::TestRequest::get().uri(&format!("/api/user/{id}")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duckCount"], 2);
    assert!(body.get("email").is_none());

    let (status, _) = call_json!(app, test::TestRequest::get().uri("/api/user/9999"));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn update_bio_with_limit() {
    let (state, _) = common::test_state();
    let app = init_app!(state);
    let (token, _) = register!(app, "bio_writer");

    let (status, body) = call_json!(
        app,
        test::TestRequest::put()
            .uri("/api/user/profile")
            .insert_header(common::bearer(&token))
            .set_json(json!({ "bio": "  Professional bread critic.  " }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bio"], "Professional bread critic.");

    let (status, _) = call_json!(
        app,
        test::TestRequest::put()
            .uri("/api/user/profile")
            .insert_header(common::bearer(&token))
            .set_json(json!({ "bio": "q".repeat(301) }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn profile_picture_replaces_and_cleans_up_old_file() {
    let (state, media) = common::test_state();
    let app = init_app!(state);
    let (token, _) = register!(app, "selfie");
    let png = common::sample_png();

    let mut urls = Vec::new();
    for _ in 0..2 {
        let (ct, body) = common::multipart(&[], Some(("image", &png)));
        let (status, user) = call_json!(
            app,
            test::TestRequest::post()
                .uri("/api/user/profile/picture")
                .insert_header(common::bearer(&token))
                .insert_header(("content-type", ct))
                .set_payload(body)
        );
        assert_eq!(status, StatusCode::OK, "{user}");
        urls.push(user["profilePicture"].as_str().unwrap().to_string());
    }

    assert_ne!(urls[0], urls[1]);
    let keys = media.keys();
    assert_eq!(keys.len(), 1, "old picture should be deleted: {keys:?}");
    assert!(urls[1].ends_with(&keys[0]));
    assert!(keys[0].starts_with("avatars/"));
}
