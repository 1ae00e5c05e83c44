/// Handlers behind role and permission rules
///
/// Access is decided entirely by the gatekeeper's route policy; these
/// handlers only read the identity it attached.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::IdentityClaims;

#[derive(Deserialize)]
pub struct ArticleRequest {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ArticleResponse {
    pub id: String,
    pub title: String,
    pub author_id: String,
}

/// GET /admin/overview (admin only)
pub async fn admin_overview(identity: web::ReqData<IdentityClaims>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "viewer": identity.sub,
        "role": identity.role,
    }))
}

/// GET /articles (read on `article`)
pub async fn list_articles(identity: web::ReqData<IdentityClaims>) -> HttpResponse {
    tracing::debug!(user_id = %identity.sub, "Listing articles");
    HttpResponse::Ok().json(Vec::<ArticleResponse>::new())
}

/// POST /articles (create on `article`)
pub async fn create_article(
    form: web::Json<ArticleRequest>,
    identity: web::ReqData<IdentityClaims>,
) -> HttpResponse {
    let article = ArticleResponse {
        id: Uuid::new_v4().to_string(),
        title: form.into_inner().title,
        author_id: identity.into_inner().sub,
    };

    tracing::info!(article_id = %article.id, author_id = %article.author_id, "Article created");
    HttpResponse::Created().json(article)
}

/// PUT /articles/{id} (update on `article`)
pub async fn update_article(
    path: web::Path<String>,
    form: web::Json<ArticleRequest>,
    identity: web::ReqData<IdentityClaims>,
) -> HttpResponse {
    HttpResponse::Ok().json(ArticleResponse {
        id: path.into_inner(),
        title: form.into_inner().title,
        author_id: identity.into_inner().sub,
    })
}

/// DELETE /articles/{id} (delete on `article`)
pub async fn delete_article(
    path: web::Path<String>,
    identity: web::ReqData<IdentityClaims>,
) -> HttpResponse {
    tracing::info!(article_id = %path, user_id = %identity.sub, "Article deleted");
    HttpResponse::NoContent().finish()
}
