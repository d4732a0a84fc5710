use std::sync::Arc;

use actix_web::web;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::repo::Repo;

pub mod comments;
pub mod ducks;
pub mod media;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media_store: Arc<dyn MediaStore>,
    pub config: Arc<AppConfig>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(format!("Malformed JSON: {err}")).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(format!("Bad query string: {err}")).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|_err, _req| ApiError::not_found("Nothing here but pond water").into()),
    );

    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/user")
                    .service(web::resource("/register").route(web::post().to(users::register)))
                    .service(web::resource("/login").route(web::post().to(users::login)))
                    .service(web::resource("/me").route(web::get().to(users::me)))
                    .service(web::resource("/refresh").route(web::post().to(users::refresh_token)))
                    .service(web::resource("/profile").route(web::put().to(users::update_profile)))
                    .service(web::resource("/profile/picture").route(web::post().to(users::upload_profile_picture)))
                    .service(web::resource("/{id}").route(web::get().to(users::get_profile))),
            )
            .service(
                web::scope("/ducks")
                    .service(
                        web::resource("")
                            .route(web::get().to(ducks::list_ducks))
                            .route(web::post().to(ducks::create_duck)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(ducks::get_duck))
                            .route(web::put().to(ducks::update_duck))
                            .route(web::delete().to(ducks::delete_duck)),
                    )
                    .service(web::resource("/{id}/like").route(web::post().to(ducks::like_duck)))
                    .service(web::resource("/{id}/unlike").route(web::post().to(ducks::unlike_duck)))
                    .service(web::resource("/{id}/check-likes").route(web::get().to(ducks::check_likes))),
            )
            .service(
                web::scope("/comments")
                    .service(web::resource("").route(web::post().to(comments::create_comment)))
                    .service(web::resource("/duck/{duck_id}").route(web::get().to(comments::list_for_duck)))
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(comments::edit_comment))
                            .route(web::delete().to(comments::delete_comment)),
                    )
                    .service(web::resource("/{id}/like").route(web::post().to(comments::like_comment)))
                    .service(web::resource("/{id}/unlike").route(web::post().to(comments::unlike_comment))),
            ),
    );
    // Outside /api so image URLs can be used directly in <img src>.
    cfg.route("/media/{key:.*}", web::get().to(media::get_media));
}
