//! Message delivery: ordering, replies, capability discipline
//!
//! TigerStyle: Every scenario runs to quiescence under a timeout.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{hypervisor_with_store, stored_record, text, within, Journal, Recorder};
use lamport_core::{ActorId, ContainerType, Error, Result};
use lamport_runtime::{derive_actor_id, is_exception_reply, ActorContext, Capability, Container, Message};
use std::sync::{Arc, Mutex};

const RECORDER: ContainerType = ContainerType::new(1);
const COUNTER: ContainerType = ContainerType::new(2);
const ECHO: ContainerType = ContainerType::new(3);
const CALLER: ContainerType = ContainerType::new(4);
const SENDER: ContainerType = ContainerType::new(5);
const HUB: ContainerType = ContainerType::new(6);
const KEEPER: ContainerType = ContainerType::new(7);
const LATE_SENDER: ContainerType = ContainerType::new(8);

const LATE_SENDER_YIELDS_COUNT: u64 = 50;

// =============================================================================
// Containers
// =============================================================================

/// Counts delivered messages in its persisted data
struct Counter;

#[async_trait]
impl Container for Counter {
    async fn on_message(&mut self, ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        let count = ctx.data()["count"].as_u64().unwrap_or(0) + 1;
        *ctx.data_mut() = serde_json::json!({ "count": count });
        Ok(Bytes::from(count.to_string()))
    }
}

/// Replies with the payload, or fails on "fail"
struct Echo;

#[async_trait]
impl Container for Echo {
    async fn on_message(&mut self, _ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        if message.data().as_ref() == b"fail" {
            return Err(Error::container("asked to fail"));
        }
        Ok(message.data().clone())
    }
}

/// Creates an echo, asks it two questions, and journals the replies
struct Caller {
    journal: Journal,
}

#[async_trait]
impl Container for Caller {
    async fn on_creation(&mut self, ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        let echo = ctx.create_actor(ECHO, Message::new("")).await?;

        let ok_cap = ctx.mint_cap(7);
        ctx.send(echo, Message::new("ping").with_response_cap(ok_cap))
            .await?;
        let reply = ctx.wait_on_tag(&[7], 100).await?.expect("reply");
        self.journal.push(text(reply.data()));

        let fail_cap = ctx.mint_cap(8);
        ctx.send(echo, Message::new("fail").with_response_cap(fail_cap))
            .await?;
        let reply = ctx.wait_on_tag(&[8], 100).await?.expect("exception");
        assert!(is_exception_reply(reply.data()));
        let body: serde_json::Value = serde_json::from_slice(reply.data()).unwrap();
        self.journal
            .push(body["error"].as_str().unwrap_or_default().to_string());
        Ok(Bytes::new())
    }

    async fn on_message(&mut self, _ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

/// Sends `(increment, payload)` steps to the capability it was created with
struct Sender;

#[async_trait]
impl Container for Sender {
    async fn on_creation(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        let dest = message.caps()[0];
        let steps: Vec<(u64, String)> = serde_json::from_slice(message.data()).unwrap();
        for (increment, payload) in steps {
            if increment > 0 {
                ctx.increment_ticks(increment);
            }
            ctx.send(dest, Message::new(payload)).await?;
        }
        Ok(Bytes::new())
    }

    async fn on_message(&mut self, _ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

/// Lets the runtime make progress elsewhere before sending one payload
struct LateSender;

#[async_trait]
impl Container for LateSender {
    async fn on_creation(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        let dest = message.caps()[0];
        let plan: serde_json::Value = serde_json::from_slice(message.data()).unwrap();
        for _ in 0..plan["yields"].as_u64().unwrap_or(0) {
            tokio::task::yield_now().await;
        }
        let payload = plan["payload"].as_str().unwrap_or_default().to_string();
        ctx.send(dest, Message::new(payload)).await?;
        Ok(Bytes::new())
    }

    async fn on_message(&mut self, _ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

/// Creates senders from a JSON script, then journals what it receives
///
/// A sender given as an object is a [`LateSender`] plan; an array is a list
/// of [`Sender`] steps.
struct Hub {
    journal: Journal,
    log_sender: bool,
}

#[async_trait]
impl Container for Hub {
    async fn on_creation(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        let script: serde_json::Value = serde_json::from_slice(message.data()).unwrap();
        for steps in script["senders"].as_array().unwrap() {
            let me = ctx.mint_cap(0);
            let creation = Message::new(serde_json::to_vec(steps).unwrap()).with_caps([me]);
            let kind = if steps.is_object() { LATE_SENDER } else { SENDER };
            ctx.create_actor(kind, creation).await?;
        }
        Ok(Bytes::new())
    }

    async fn on_message(&mut self, _ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        if self.log_sender {
            let from = message.from_id().map(|id| id.short()).unwrap_or_default();
            self.journal.push(from);
        } else {
            self.journal.push(text(message.data()));
        }
        Ok(Bytes::new())
    }
}

/// Exercises capability lifetimes; the remembered capability outlives
/// the container instance on purpose
struct Keeper {
    journal: Journal,
    remembered: Arc<Mutex<Option<Capability>>>,
}

fn outcome(result: Result<()>) -> String {
    match result {
        Ok(()) => "sent".into(),
        Err(Error::CapabilityNotHeld { .. }) => "not-held".into(),
        Err(Error::MessageContainsBoundCapability { .. }) => "bound".into(),
        Err(e) => format!("other: {}", e),
    }
}

#[async_trait]
impl Container for Keeper {
    async fn on_message(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        match message.data().as_ref() {
            b"hold" => {
                let cap = message.caps()[0];
                *self.remembered.lock().unwrap() = Some(cap);
                let result = ctx.send(cap, Message::new("while-held")).await;
                self.journal.push(outcome(result));
            }
            b"use-remembered" => {
                let cap = self.remembered.lock().unwrap().expect("remembered");
                let result = ctx.send(cap, Message::new("after-message")).await;
                self.journal.push(outcome(result));
            }
            b"keep" => {
                ctx.bind("target", message.caps()[0])?;
                self.journal.push("bound");
            }
            b"use-port" => {
                let cap = ctx.port("target").expect("bound port");
                let result = ctx.send(cap, Message::new("through-port")).await;
                self.journal.push(outcome(result));
            }
            b"leak-port" => {
                let cap = ctx.port("target").expect("bound port");
                let me = ctx.mint_cap(0);
                let result = ctx.send(me, Message::new("noop").with_caps([cap])).await;
                self.journal.push(outcome(result));
            }
            b"noop" => {}
            other => panic!("unexpected command {:?}", other),
        }
        Ok(Bytes::new())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_external_messages_are_delivered_and_persisted() {
    let (hypervisor, store) = hypervisor_with_store();
    hypervisor.register_container(COUNTER, |_: &ActorId| Box::new(Counter) as Box<dyn Container>);

    let cap = hypervisor.create_actor(COUNTER, Message::new("")).await.unwrap();
    for _ in 0..3 {
        hypervisor.send(cap, Message::new("inc")).await.unwrap();
    }
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    let record = stored_record(&store, &cap.dest_id()).await.unwrap();
    assert_eq!(record["data"]["count"], 3);
    assert!(!hypervisor.is_resident(&cap.dest_id()));
}

#[tokio::test]
async fn test_response_caps_carry_values_and_exceptions() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    hypervisor.register_container(ECHO, |_: &ActorId| Box::new(Echo) as Box<dyn Container>);
    {
        let journal = journal.clone();
        hypervisor.register_container(CALLER, move |_: &ActorId| {
            Box::new(Caller {
                journal: journal.clone(),
            }) as Box<dyn Container>
        });
    }

    hypervisor.create_actor(CALLER, Message::new("")).await.unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    assert_eq!(
        journal.entries(),
        vec!["ping".to_string(), "Container fault: asked to fail".to_string()]
    );
}

fn register_hub(hypervisor: &lamport_runtime::Hypervisor, journal: &Journal, log_sender: bool) {
    hypervisor.register_container(SENDER, |_: &ActorId| Box::new(Sender) as Box<dyn Container>);
    hypervisor.register_container(LATE_SENDER, |_: &ActorId| {
        Box::new(LateSender) as Box<dyn Container>
    });
    let journal = journal.clone();
    hypervisor.register_container(HUB, move |_: &ActorId| {
        Box::new(Hub {
            journal: journal.clone(),
            log_sender,
        }) as Box<dyn Container>
    });
}

#[tokio::test]
async fn test_sequential_sends_arrive_in_tick_order() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    register_hub(&hypervisor, &journal, false);

    let script = serde_json::json!({
        "senders": [[[0, "t0"], [1, "t1"], [1, "t2"]]]
    });
    hypervisor
        .create_actor(HUB, Message::new(serde_json::to_vec(&script).unwrap()))
        .await
        .unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    assert_eq!(journal.entries(), vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn test_causal_order_across_senders() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    register_hub(&hypervisor, &journal, false);

    // A sends at ticks 0 and 2, C sends at tick 1
    let script = serde_json::json!({
        "senders": [
            [[0, "a0"], [2, "a2"]],
            [[1, "c1"]]
        ]
    });
    hypervisor
        .create_actor(HUB, Message::new(serde_json::to_vec(&script).unwrap()))
        .await
        .unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    assert_eq!(journal.entries(), vec!["a0", "c1", "a2"]);
}

#[tokio::test]
async fn test_equal_ticks_break_ties_by_sender_id() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    register_hub(&hypervisor, &journal, true);

    let script = serde_json::json!({
        "senders": [[[0, "x"]], [[0, "y"]], [[0, "z"]]]
    });
    let hub = hypervisor
        .create_actor(HUB, Message::new(serde_json::to_vec(&script).unwrap()))
        .await
        .unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    let mut senders: Vec<ActorId> = (0..3)
        .map(|nonce| derive_actor_id(nonce, Some(&hub.dest_id())))
        .collect();
    senders.sort();
    let expected: Vec<String> = senders.iter().map(ActorId::short).collect();
    assert_eq!(journal.entries(), expected);
}

/// Two senders at tick 0; the one at `delayed` yields before sending
async fn equal_tick_arrivals(delayed: usize) -> (Vec<String>, Vec<String>) {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    register_hub(&hypervisor, &journal, true);

    let senders: Vec<serde_json::Value> = (0..2)
        .map(|index| {
            let yields = if index == delayed { LATE_SENDER_YIELDS_COUNT } else { 0 };
            serde_json::json!({ "yields": yields, "payload": format!("s{}", index) })
        })
        .collect();
    let script = serde_json::json!({ "senders": senders });
    let hub = hypervisor
        .create_actor(HUB, Message::new(serde_json::to_vec(&script).unwrap()))
        .await
        .unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    let mut ids: Vec<ActorId> = (0..2)
        .map(|nonce| derive_actor_id(nonce, Some(&hub.dest_id())))
        .collect();
    ids.sort();
    (journal.entries(), ids.iter().map(ActorId::short).collect())
}

#[tokio::test]
async fn test_equal_ticks_order_ignores_arrival_order() {
    // One of the two runs delays the sender with the smaller id
    for delayed in 0..2 {
        let (observed, expected) = equal_tick_arrivals(delayed).await;
        assert_eq!(observed, expected, "delayed sender {}", delayed);
    }
}

#[tokio::test]
async fn test_received_capabilities_expire_with_the_message() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    let delivered = Journal::new();
    let remembered = Arc::new(Mutex::new(None));
    {
        let delivered = delivered.clone();
        hypervisor.register_container(RECORDER, move |_: &ActorId| {
            Box::new(Recorder {
                journal: delivered.clone(),
            }) as Box<dyn Container>
        });
    }
    {
        let journal = journal.clone();
        let remembered = remembered.clone();
        hypervisor.register_container(KEEPER, move |_: &ActorId| {
            Box::new(Keeper {
                journal: journal.clone(),
                remembered: remembered.clone(),
            }) as Box<dyn Container>
        });
    }

    let target = hypervisor.create_actor(RECORDER, Message::new("")).await.unwrap();
    let keeper = hypervisor.create_actor(KEEPER, Message::new("")).await.unwrap();

    for (command, caps) in [
        ("hold", vec![target]),
        ("use-remembered", vec![]),
        ("keep", vec![target]),
        ("use-port", vec![]),
        ("leak-port", vec![]),
    ] {
        hypervisor
            .send(keeper, Message::new(command).with_caps(caps))
            .await
            .unwrap();
        within(hypervisor.create_state_root_at_quiescence())
            .await
            .unwrap();
    }

    assert_eq!(
        journal.entries(),
        vec!["sent", "not-held", "bound", "sent", "bound"]
    );
    assert_eq!(delivered.entries(), vec!["while-held", "through-port"]);
}
