use actix_web::HttpResponse;

/// Liveness probe. Public and independent of the revocation store.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
