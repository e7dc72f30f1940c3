//! Tagged waits pull replies out of order without losing the rest

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{hypervisor_with_store, text, within, Journal};
use lamport_core::{ActorId, ContainerType, Result};
use lamport_runtime::{ActorContext, Container, Message};

const RESPONDER: ContainerType = ContainerType::new(1);
const WAITER: ContainerType = ContainerType::new(2);

/// Answers "go" with x on the first cap, y on the second, z on the first
struct Responder;

#[async_trait]
impl Container for Responder {
    async fn on_message(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        let (first, second) = (message.caps()[0], message.caps()[1]);
        ctx.send(first, Message::new("x")).await?;
        ctx.increment_ticks(1);
        ctx.send(second, Message::new("y")).await?;
        ctx.increment_ticks(1);
        ctx.send(first, Message::new("z")).await?;
        Ok(Bytes::new())
    }
}

struct Waiter {
    journal: Journal,
}

#[async_trait]
impl Container for Waiter {
    async fn on_creation(&mut self, ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        let responder = ctx.create_actor(RESPONDER, Message::new("")).await?;
        let caps = [ctx.mint_cap(1), ctx.mint_cap(2)];
        ctx.send(responder, Message::new("go").with_caps(caps))
            .await?;

        for tag in [2, 1] {
            let message = ctx.wait_on_tag(&[tag], 100).await?.expect("tagged reply");
            assert_eq!(message.tag(), Some(tag));
            self.journal.push(format!("tag:{}", text(message.data())));
        }
        Ok(Bytes::new())
    }

    async fn on_message(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        self.journal
            .push(format!("main:{}@{}", text(message.data()), ctx.ticks()));
        Ok(Bytes::new())
    }
}

#[tokio::test]
async fn test_tagged_waits_leave_other_messages_queued() {
    let (hypervisor, _store) = hypervisor_with_store();
    let journal = Journal::new();
    hypervisor.register_container(RESPONDER, |_: &ActorId| Box::new(Responder) as Box<dyn Container>);
    {
        let journal = journal.clone();
        hypervisor.register_container(WAITER, move |_: &ActorId| {
            Box::new(Waiter {
                journal: journal.clone(),
            }) as Box<dyn Container>
        });
    }

    hypervisor.create_actor(WAITER, Message::new("")).await.unwrap();
    within(hypervisor.create_state_root_at_quiescence())
        .await
        .unwrap();

    // The responder handles "go" at tick 1 and sends z at 3; z is delivered
    // once the waiter's clock has moved past it
    assert_eq!(journal.entries(), vec!["tag:y", "tag:x", "main:z@4"]);
}
