use actix_web::{test, web, App};

use crate::helper::mail;

#[actix_web::test]
async fn health_check_works() {
    let mail = mail().build();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(mail.mailer.clone()))
            .configure(subscription::startup::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health_check").to_request();
    let res = test::call_service(&app, req).await;

    assert!(res.status().is_success());
}
