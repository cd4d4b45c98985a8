use std::sync::{Arc, Mutex};

use rstest::rstest;
use topicbus::{Broker, BrokerConfig, BrokerError, HandlerRef, TopicAddr};

type Received = Arc<Mutex<Vec<(String, TopicAddr, Vec<u8>)>>>;

fn recorder(
    name: &str,
    received: &Received,
) -> HandlerRef {
    let name = name.to_string();
    let received = Arc::clone(received);
    Arc::new(move |topic: TopicAddr, payload: &[u8]| {
        received
            .lock()
            .unwrap()
            .push((name.clone(), topic, payload.to_vec()));
    })
}

fn names(received: &Received) -> Vec<String> {
    let mut names: Vec<String> = received
        .lock()
        .unwrap()
        .iter()
        .map(|(n, ..)| n.clone())
        .collect();
    names.sort();
    names
}

/// Тест проверяет сквозной сценарий с запущенным диспетчером: событие группы
/// 1 получает только подписчик группы 1, группы 5 только подписчик группы
/// 5, широковещательное событие оба.
#[tokio::test]
async fn test_group_routing_with_dispatcher() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let h1 = broker.register();
    let h2 = broker.register();
    h1.subscribe(TopicAddr::new(1, 1), recorder("h1", &received))
        .unwrap();
    h2.subscribe(TopicAddr::new(1, 5), recorder("h2", &received))
        .unwrap();

    let dispatcher = broker.spawn().unwrap();
    broker.publish(TopicAddr::new(1, 1), &[1, 2, 3, 4, 5]).unwrap();
    broker.publish(TopicAddr::new(1, 5), &[1, 2, 3]).unwrap();
    broker.publish(TopicAddr::wildcard(1), &[1]).unwrap();
    assert_eq!(dispatcher.shutdown().await, 3);

    let got = received.lock().unwrap().clone();
    assert_eq!(got.len(), 4);
    assert_eq!(got[0], ("h1".into(), TopicAddr::from_raw(0x0101), vec![1, 2, 3, 4, 5]));
    assert_eq!(got[1], ("h2".into(), TopicAddr::from_raw(0x0501), vec![1, 2, 3]));
    assert!(got[2..].iter().all(|(_, t, p)| t.raw() == 0x0001 && p == &[1]));
}

/// Тест проверяет, что девятая подписка отклоняется, а восемь прежних
/// продолжают получать события.
#[test]
fn test_ninth_subscription_rejected() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let registrants: Vec<_> = (0..8).map(|_| broker.register()).collect();
    for (i, r) in registrants.iter().enumerate() {
        r.subscribe(TopicAddr::new(7, 1), recorder(&format!("r{i}"), &received))
            .unwrap();
    }

    let extra = broker.register();
    let err = extra
        .subscribe(TopicAddr::new(7, 1), recorder("extra", &received))
        .unwrap_err();
    assert!(matches!(err, BrokerError::RegistryFull { topic_id: 7, capacity: 8 }));

    broker.publish(TopicAddr::new(7, 1), b"ping").unwrap();
    broker.drain().unwrap();
    assert_eq!(received.lock().unwrap().len(), 8);
    assert!(!names(&received).contains(&"extra".to_string()));
}

/// Тест проверяет, что ёмкость корзины берётся из настроек.
#[test]
fn test_custom_bucket_capacity() {
    let broker = Broker::new(&BrokerConfig {
        bucket_capacity: 2,
        ..BrokerConfig::default()
    });
    let a = broker.register();
    let b = broker.register();
    let c = broker.register();
    a.subscribe(TopicAddr::new(1, 1), Arc::new(|_: TopicAddr, _: &[u8]| {}))
        .unwrap();
    b.subscribe(TopicAddr::new(1, 2), Arc::new(|_: TopicAddr, _: &[u8]| {}))
        .unwrap();
    assert!(c
        .subscribe(TopicAddr::new(1, 3), Arc::new(|_: TopicAddr, _: &[u8]| {}))
        .is_err());
}

/// Тест проверяет отказ повторной подписки владельца и то, что реестр после
/// отказа не изменился.
#[test]
fn test_duplicate_subscription() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let r = broker.register();
    r.subscribe(TopicAddr::new(2, 1), recorder("first", &received))
        .unwrap();
    let err = r
        .subscribe(TopicAddr::new(2, 9), recorder("second", &received))
        .unwrap_err();
    assert!(matches!(err, BrokerError::DuplicateSubscription { topic_id: 2, .. }));

    broker.publish(TopicAddr::wildcard(2), b"x").unwrap();
    broker.drain().unwrap();
    assert_eq!(names(&received), vec!["first"]);
}

/// Тест проверяет, что завершившийся подписчик больше не получает событий.
#[test]
fn test_dropped_registrant_receives_nothing() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let stays = broker.register();
    stays
        .subscribe(TopicAddr::new(4, 1), recorder("stays", &received))
        .unwrap();
    {
        let leaves = broker.register();
        leaves
            .subscribe(TopicAddr::new(4, 2), recorder("leaves", &received))
            .unwrap();
    }

    broker.publish(TopicAddr::wildcard(4), b"x").unwrap();
    broker.drain().unwrap();
    assert_eq!(names(&received), vec!["stays"]);
}

/// Тест проверяет, что отписка до обработки события исключает обработчик.
#[test]
fn test_unsubscribe_before_dispatch() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let r = broker.register();
    r.subscribe(TopicAddr::new(5, 1), recorder("r", &received))
        .unwrap();

    broker.publish(TopicAddr::new(5, 1), b"x").unwrap();
    r.unsubscribe(TopicAddr::new(5, 1)).unwrap();
    let report = broker.dispatch_next().unwrap().unwrap();

    assert_eq!(report.matched, 0);
    assert!(received.lock().unwrap().is_empty());
}

/// Тест проверяет FIFO для длинной серии с ростом очереди.
#[rstest]
#[case(1, 100)]
#[case(10, 37)]
#[case(3, 1000)]
fn test_fifo_preserved(
    #[case] initial: usize,
    #[case] events: u32,
) {
    let broker = Broker::new(&BrokerConfig {
        initial_queue_capacity: initial,
        ..BrokerConfig::default()
    });
    let received: Received = Arc::default();
    let r = broker.register();
    r.subscribe(TopicAddr::wildcard(9), recorder("r", &received))
        .unwrap();

    for n in 0..events {
        broker.publish_word(TopicAddr::wildcard(9), n).unwrap();
        // периодически извлекаем, чтобы голова уезжала от нуля
        if n % 7 == 3 {
            broker.dispatch_next().unwrap();
        }
    }
    broker.drain().unwrap();

    let words: Vec<u32> = received
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, p)| u32::from_le_bytes(p.as_slice().try_into().unwrap()))
        .collect();
    assert_eq!(words, (0..events).collect::<Vec<_>>());
}

/// Тест проверяет, что нагрузка копируется при публикации.
#[test]
fn test_payload_is_copied() {
    let broker = Broker::default();
    let received: Received = Arc::default();
    let r = broker.register();
    r.subscribe(TopicAddr::new(6, 1), recorder("r", &received))
        .unwrap();

    let mut buf = vec![1u8, 2, 3];
    broker.publish(TopicAddr::new(6, 1), &buf).unwrap();
    buf.fill(0);
    broker.publish(TopicAddr::new(6, 1), &[]).unwrap();
    broker.drain().unwrap();

    let got = received.lock().unwrap();
    assert_eq!(got[0].2, vec![1, 2, 3]);
    assert!(got[1].2.is_empty());
}

/// Тест проверяет публикацию из нескольких потоков: события каждого
/// издателя приходят в порядке публикации.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers() {
    let broker = Broker::new(&BrokerConfig {
        initial_queue_capacity: 2,
        ..BrokerConfig::default()
    });
    let received: Received = Arc::default();
    let r = broker.register();
    r.subscribe(TopicAddr::wildcard(3), recorder("r", &received))
        .unwrap();
    let dispatcher = broker.spawn().unwrap();

    let publishers: Vec<_> = (0..4u8)
        .map(|p| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for n in 0..250u8 {
                    broker.publish(TopicAddr::wildcard(3), &[p, n]).unwrap();
                }
            })
        })
        .collect();
    for p in publishers {
        p.await.unwrap();
    }
    assert_eq!(dispatcher.shutdown().await, 1000);

    let got = received.lock().unwrap();
    for p in 0..4u8 {
        let seq: Vec<u8> = got
            .iter()
            .filter(|(_, _, d)| d[0] == p)
            .map(|(_, _, d)| d[1])
            .collect();
        assert_eq!(seq, (0..250).collect::<Vec<_>>());
    }
}
