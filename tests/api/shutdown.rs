use std::time::Duration;

use claim::{assert_matches, assert_ok};
use subscription::{
    mail::MailError,
    shutdown::{listen_for_shutdown, shutdown},
};
use tokio::{sync::oneshot, time::timeout};

use crate::helper::{mail, message};

#[tokio::test]
async fn nothing_is_closed_while_work_is_in_flight() {
    let mut mail = mail().build();
    mail.start();
    let handler_work = mail.in_flight.track();

    let shutting_down = tokio::spawn({
        let mailer = mail.mailer.clone();
        let in_flight = mail.in_flight.clone();
        async move { shutdown(&mailer, &in_flight).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutting_down.is_finished());
    assert!(!mail.mailer.is_closed());

    // 等待期间的入队照常投递
    assert_ok!(mail.mailer.enqueue(message("late")).await);

    drop(handler_work);
    let result = assert_ok!(timeout(Duration::from_secs(1), shutting_down).await);
    assert_ok!(result.unwrap());
    assert!(mail.mailer.is_closed());
    assert_eq!(mail.delivered(), ["late"]);
}

#[tokio::test]
async fn request_in_progress_keeps_the_channels_open() {
    let mut mail = mail().build();
    mail.start();
    let (inserted, insert_done) = oneshot::channel::<()>();

    // 处理函数先取得 guard，等待数据库写入，再入队
    let tracked = mail.mailer.track();
    let handler = tokio::spawn({
        let mailer = mail.mailer.clone();
        async move {
            let _tracked = tracked;
            let _ = insert_done.await;
            mailer.enqueue(message("Welcome!")).await
        }
    });

    let shutting_down = tokio::spawn({
        let mailer = mail.mailer.clone();
        let in_flight = mail.in_flight.clone();
        async move { shutdown(&mailer, &in_flight).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutting_down.is_finished());
    assert!(!mail.mailer.is_closed());

    inserted.send(()).unwrap();
    assert_ok!(handler.await.unwrap());
    let result = assert_ok!(timeout(Duration::from_secs(1), shutting_down).await);
    assert_ok!(result.unwrap());

    assert!(mail.mailer.is_closed());
    assert_eq!(mail.delivered(), ["Welcome!"]);
}

#[tokio::test]
async fn queued_mail_is_delivered_before_channels_close() {
    let mut mail = mail().capacity(10).build();
    let subjects = ["one", "two", "three", "four", "five"];
    for subject in subjects {
        assert_ok!(mail.mailer.enqueue(message(subject)).await);
    }
    mail.start();

    assert_ok!(shutdown(&mail.mailer, &mail.in_flight).await);

    assert_eq!(mail.delivered(), subjects);
    assert!(mail.mailer.is_closed());
    assert_eq!(mail.in_flight.count(), 0);
}

#[tokio::test]
async fn enqueue_after_shutdown_is_rejected() {
    let mut mail = mail().build();
    mail.start();
    assert_ok!(shutdown(&mail.mailer, &mail.in_flight).await);

    assert_matches!(
        mail.mailer.enqueue(message("too late")).await,
        Err(MailError::QueueClosed)
    );
    assert_matches!(mail.mailer.signal_done().await, Err(MailError::QueueClosed));
}

#[tokio::test]
async fn channels_are_closed_even_if_the_consumer_is_gone() {
    let mut mail = mail().build();
    mail.discard_consumer();

    assert_matches!(
        shutdown(&mail.mailer, &mail.in_flight).await,
        Err(MailError::ConsumerStopped)
    );
    assert!(mail.mailer.is_closed());
}

#[tokio::test]
async fn shutdown_starts_when_triggered() {
    let mut mail = mail().build();
    let consumer = mail.start();
    let (trigger, triggered) = oneshot::channel::<()>();

    let listener = tokio::spawn({
        let mailer = mail.mailer.clone();
        let in_flight = mail.in_flight.clone();
        async move {
            let trigger = async {
                let _ = triggered.await;
            };
            listen_for_shutdown(trigger, &mailer, &in_flight).await;
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!mail.mailer.is_closed());

    trigger.send(()).unwrap();
    assert_ok!(timeout(Duration::from_secs(1), listener).await);
    assert_ok!(timeout(Duration::from_secs(1), consumer).await);
    assert!(mail.mailer.is_closed());
}
