use std::fmt::Debug;

use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use anyhow::Context;
use sqlx::{types::chrono::Utc, PgPool};
use tera::Context as TemplateContext;
use uuid::Uuid;

use crate::{
    domain::Subscriber,
    mail::{MailError, Mailer, Message, Templates},
    util::error_chain_fmt,
};

#[derive(serde::Deserialize)]
pub struct FormData {
    pub name: String,
    pub email: String,
}

#[tracing::instrument(
    name = "adding a new subscriber",
    skip(form, pool, mailer),
    fields(
        subscriber_name = %form.name,
        subscriber_email = %form.email,
    )
)]
pub async fn subscribe(
    form: web::Form<FormData>,
    pool: web::Data<PgPool>,
    mailer: web::Data<Mailer>,
) -> Result<HttpResponse, SubscribeError> {
    // 入队完成之前关闭流程不会关闭邮件通道
    let _tracked = mailer.track();
    let subscriber: Subscriber = form.0.try_into().map_err(SubscribeError::ValidationError)?;

    insert_subscriber(&pool, &subscriber)
        .await
        .context("failed to insert the new subscriber.")?;

    // 入队即返回，投递失败只在消费端记录
    let message = welcome_message(mailer.templates(), &subscriber)
        .context("failed to render the welcome email.")?;
    mailer
        .enqueue(message)
        .await
        .context("failed to queue the welcome email.")?;

    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip_all)]
async fn insert_subscriber(pool: &PgPool, subscriber: &Subscriber) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscription (id, email, name, subscribed_at, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subscriber.email.as_ref())
    .bind(subscriber.name.as_ref())
    .bind(Utc::now())
    .bind(subscriber.status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

fn welcome_message(templates: &Templates, subscriber: &Subscriber) -> Result<Message, MailError> {
    let mut context = TemplateContext::new();
    context.insert("name", subscriber.name.as_ref());
    let body = templates.render("welcome", &context)?;

    let message = Message::new(subscriber.email.clone(), "Welcome!", body.text);
    Ok(match body.html {
        Some(html) => message.html(html),
        None => message,
    })
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SubscribeError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
