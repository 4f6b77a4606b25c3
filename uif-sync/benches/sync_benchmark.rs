use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::net::SocketAddr;
use uif_core::{EditCommand, Node, Transaction, ROOT_ID};
use uif_sync::engine::SyncEngine;
use uif_sync::protocol::{Event, ServerMessage, WireMessage};

fn form_transaction(rows: u32) -> Transaction {
    let mut tx = Transaction::new("bench");
    tx.push(EditCommand::AppendChild {
        parent_id: ROOT_ID,
        object_id: 2,
        node: Node::window("Form"),
    });
    for row in 0..rows {
        tx.push(EditCommand::AppendChild {
            parent_id: 2,
            object_id: 10 + row,
            node: Node::text_input("", format!("field-{row}")),
        });
    }
    tx
}

fn bench_transaction_decode(c: &mut Criterion) {
    let encoded = form_transaction(50).encode().unwrap();

    c.bench_function("transaction_decode_50_edits", |b| {
        b.iter(|| {
            black_box(Transaction::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_event_encode(c: &mut Criterion) {
    let msg = ServerMessage::Event(Event::text_changed("9f1c2e4a-field", "some typed text"));

    c.bench_function("event_encode", |b| {
        b.iter(|| {
            black_box(black_box(&msg).encode().unwrap());
        })
    });
}

fn bench_engine_submit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let addr: SocketAddr = "127.0.0.1:3012".parse().unwrap();
    let tx = form_transaction(50);

    c.bench_function("engine_submit_50_edits", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine = SyncEngine::new(16, 16);
                let (session, _rx) = engine.open_session(addr).await;
                black_box(engine.submit(session, tx.clone()).await.unwrap());
            })
        })
    });
}

fn bench_route_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let addr: SocketAddr = "127.0.0.1:3012".parse().unwrap();
    let engine = SyncEngine::new(1024, 16);
    let mut rx = rt.block_on(async {
        let (session, rx) = engine.open_session(addr).await;
        engine.submit(session, form_transaction(1000)).await.unwrap();
        rx
    });
    let event = Event::text_changed("field-500", "x");

    c.bench_function("route_event_1000_subscriptions", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(engine.route(black_box(&event)).await);
                black_box(rx.recv().await);
            })
        })
    });
}

criterion_group!(
    benches,
    bench_transaction_decode,
    bench_event_encode,
    bench_engine_submit,
    bench_route_event,
);
criterion_main!(benches);
