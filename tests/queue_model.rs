use std::collections::VecDeque;

use proptest::prelude::*;
use topicbus::{
    pubsub::{Event, EventQueue},
    Payload, TopicAddr,
};

#[derive(Debug, Clone)]
enum Op {
    Push(u16),
    Pop,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u16>().prop_map(Op::Push),
        2 => Just(Op::Pop),
    ]
}

proptest! {
    /// Очередь ведёт себя как `VecDeque` при любой последовательности
    /// вставок и извлечений, в том числе через рост.
    #[test]
    fn prop_queue_matches_vecdeque(
        initial in 1usize..6,
        ops in prop::collection::vec(op_strategy(), 0..300),
    ) {
        let mut queue = EventQueue::with_capacity(initial);
        let mut model: VecDeque<u16> = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(raw) => {
                    let event = Event::new(
                        TopicAddr::from_raw(raw),
                        Payload::copy_from(&raw.to_le_bytes()).unwrap(),
                    );
                    queue.push(event).unwrap();
                    model.push_back(raw);
                }
                Op::Pop => {
                    let got = queue.pop().map(|e| e.topic.raw());
                    prop_assert_eq!(got, model.pop_front());
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert!(queue.len() <= queue.capacity());
        }

        let pending: Vec<u16> = queue.iter().map(|e| e.topic.raw()).collect();
        prop_assert_eq!(pending, model.iter().copied().collect::<Vec<_>>());
    }
}
