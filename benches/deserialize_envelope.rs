/// Benchmarks for inbound envelope parsing and dispatch.
///
/// Every frame the server sends goes through `InboundEnvelope` parsing, and most of
/// them through the full dispatcher, so both are measured per message kind.
use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use marketplace_realtime::realtime::dispatch::Dispatcher;
use marketplace_realtime::realtime::listeners::ListenerRegistry;
use marketplace_realtime::realtime::{InboundEnvelope, MessageKind, OrderUpdate};
use marketplace_realtime::store::Store;
use marketplace_realtime::ws::FrameHandler as _;

const ORDER_UPDATE: &str = r#"{
    "type": "order_update",
    "payload": {
        "orderId": "abc123",
        "status": "shipped",
        "carrier": "DHL",
        "trackingNumber": "1Z999AA10123456784"
    }
}"#;

const NOTIFICATION: &str = r#"{
    "type": "notification",
    "payload": {
        "id": "n-1",
        "type": "warning",
        "title": "Low stock",
        "message": "Listing l-42 has 2 units left",
        "data": { "listingId": "l-42", "remaining": 2 }
    }
}"#;

const FLAT_NOTIFICATION: &str =
    r#"{"type":"notification","title":"Payout sent","message":"Your payout is on its way"}"#;

const LISTING_UPDATE: &str = r#"{
    "type": "listing_update",
    "payload": { "listingId": "l-42", "price": "19.99", "stock": 2 }
}"#;

const PONG: &str = r#"{"type":"pong"}"#;

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope/parse");

    for (name, frame) in [
        ("order_update", ORDER_UPDATE),
        ("notification", NOTIFICATION),
        ("notification_flat", FLAT_NOTIFICATION),
        ("listing_update", LISTING_UPDATE),
        ("pong", PONG),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let envelope: InboundEnvelope = serde_json::from_str(black_box(frame))
                    .expect("Deserialization should succeed");
                black_box(envelope.into_body());
            });
        });
    }

    group.finish();
}

fn bench_order_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope/order_update");

    let envelope: InboundEnvelope =
        serde_json::from_str(ORDER_UPDATE).expect("Deserialization should succeed");
    let body = envelope.into_body();

    group.bench_function("body_to_notification", |b| {
        b.iter(|| {
            let update: OrderUpdate = serde_json::from_value(black_box(body.clone()))
                .expect("Deserialization should succeed");
            black_box(update.to_notification());
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope/dispatch");

    let listeners = Arc::new(ListenerRegistry::default());
    for kind in MessageKind::ALL {
        listeners.add(kind, |payload| {
            black_box(payload);
        });
    }
    let dispatcher = Dispatcher::new(Arc::new(Store::default()), None, listeners);

    for (name, frame) in [
        ("order_update", ORDER_UPDATE),
        ("notification", NOTIFICATION),
        ("listing_update", LISTING_UPDATE),
        ("malformed", "not json"),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| dispatcher.handle_text(black_box(frame)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope,
    bench_order_update,
    bench_dispatch
);
criterion_main!(benches);
