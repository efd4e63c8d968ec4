use std::{sync::Arc, time::Duration};

use claim::{assert_err, assert_ok};
use subscription::{mail::MailError, shutdown::shutdown};
use tokio::{sync::Semaphore, time::timeout};

use crate::helper::{mail, message};

#[quickcheck_macros::quickcheck]
fn deliveries_follow_enqueue_order(subjects: Vec<String>) -> bool {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        // 容量小于邮件数时入队方会被挂起
        let mut mail = mail().capacity(3).build();
        mail.start();

        for subject in &subjects {
            mail.mailer.enqueue(message(subject)).await.unwrap();
        }
        mail.in_flight.wait().await;

        mail.delivered() == subjects
    })
}

#[tokio::test]
async fn full_queue_blocks_until_one_message_is_taken() {
    let gate = Arc::new(Semaphore::new(0));
    let mut mail = mail().capacity(1).gated(gate.clone()).build();
    let mailer = mail.mailer.clone();

    assert_ok!(mailer.enqueue(message("A")).await);
    assert_err!(timeout(Duration::from_millis(50), mailer.enqueue(message("dropped"))).await);

    let b = tokio::spawn({
        let mailer = mailer.clone();
        async move { mailer.enqueue(message("B")).await }
    });
    let c = tokio::spawn({
        let mailer = mailer.clone();
        async move { mailer.enqueue(message("C")).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!b.is_finished());
    assert!(!c.is_finished());

    // 消费端取走 A 后停在 gate 上，只空出一个位置
    mail.start();
    assert_eq!(mail.attempts.recv().await.as_deref(), Some("A"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let unblocked = [b.is_finished(), c.is_finished()]
        .into_iter()
        .filter(|finished| *finished)
        .count();
    assert_eq!(unblocked, 1);

    gate.add_permits(3);
    assert_ok!(b.await.unwrap());
    assert_ok!(c.await.unwrap());
    mail.in_flight.wait().await;

    let delivered = mail.delivered();
    assert_eq!(delivered.len(), 3);
    assert_eq!(delivered[0], "A");
    assert!(!delivered.contains(&"dropped".to_string()));
}

#[tokio::test]
async fn failed_delivery_is_reported_and_the_rest_are_sent() {
    let mut mail = mail().fail_on("B").build();
    mail.start();

    for subject in ["A", "B", "C"] {
        assert_ok!(mail.mailer.enqueue(message(subject)).await);
    }
    assert_ok!(shutdown(&mail.mailer, &mail.in_flight).await);

    assert_eq!(mail.delivered(), ["A", "C"]);
    let errors = mail.reported_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].subject, "B");
    assert!(matches!(errors[0].source, MailError::Transport(_)));
}

#[tokio::test]
async fn one_failure_does_not_stop_the_queue() {
    let subjects: Vec<String> = (1..=10).map(|i| format!("issue #{i}")).collect();
    let mut mail = mail().fail_on("issue #4").build();
    mail.start();

    for subject in &subjects {
        assert_ok!(mail.mailer.enqueue(message(subject)).await);
    }
    mail.in_flight.wait().await;

    let expected: Vec<String> = subjects
        .into_iter()
        .filter(|s| s != "issue #4")
        .collect();
    assert_eq!(mail.delivered(), expected);
}

#[tokio::test]
async fn done_signal_stops_without_draining_the_queue() {
    let mut mail = mail().build();
    for subject in ["A", "B", "C"] {
        assert_ok!(mail.mailer.enqueue(message(subject)).await);
    }
    assert_eq!(mail.in_flight.count(), 3);

    let signal = tokio::spawn({
        let mailer = mail.mailer.clone();
        async move { mailer.signal_done().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let consumer = mail.start();

    assert_ok!(signal.await.unwrap());
    assert_ok!(timeout(Duration::from_secs(1), consumer).await);

    // 队列中的邮件被丢弃
    assert!(mail.delivered().is_empty());
    assert!(mail.attempts.try_recv().is_err());
    assert_ok!(timeout(Duration::from_secs(1), mail.in_flight.wait()).await);
}
