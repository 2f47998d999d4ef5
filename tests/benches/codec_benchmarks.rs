//! # Cross-Channel Hot-Path Benchmarks
//!
//! | Path | Work per iteration |
//! |------|--------------------|
//! | xc-01 Wire Codec | encode / decode one frame |
//! | xc-06 Signer | sign and recover one frame |
//! | xc-03 Storage | append one state change |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use shared_types::{secrethash, Signature, U256};
use std::time::Duration;
use xc_01_wire_codec::{
    decode, encode, CrossLockedTransfer, Lock, LockedTransfer, Message, Ping,
};
use xc_03_storage::{InMemoryKVStore, Storage};
use xc_06_message_handler::{recover_sender, Secp256k1Signer};

fn locked_transfer(payment_string: String) -> Message {
    let secret: [u8; 32] = rand::thread_rng().gen();
    Message::CrossLockedTransfer(CrossLockedTransfer {
        transfer: LockedTransfer {
            nonce: 1,
            chain_id: U256::from(337),
            message_identifier: 9,
            payment_identifier: 9,
            token_network_address: [0xee; 20],
            token: [0xdd; 20],
            channel: [0xc1; 20],
            recipient: [0xbb; 20],
            target: [0xbb; 20],
            initiator: [0xaa; 20],
            locksroot: [0x11; 32],
            lock: Lock {
                amount: U256::from(30),
                expiration: U256::from(1_000),
                secrethash: secrethash(&secret),
            },
            transferred_amount: U256::zero(),
            locked_amount: U256::from(30),
            fee: U256::zero(),
            signature: Signature::EMPTY,
        },
        cross_id: U256::from(0xabcdef_u64),
        payment_string,
        signature: Signature::EMPTY,
    })
}

// ============================================================================
// XC-01: Wire Codec
// ============================================================================

fn bench_wire_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-01-wire-codec");
    group.measurement_time(Duration::from_secs(5));

    let ping = Message::Ping(Ping {
        nonce: 7,
        signature: Signature::EMPTY,
    });
    let ping_bytes = encode(&ping).unwrap();
    group.bench_function("ping_encode", |b| b.iter(|| black_box(encode(&ping).unwrap())));
    group.bench_function("ping_decode", |b| {
        b.iter(|| black_box(decode(&ping_bytes).unwrap()))
    });

    // Invoice length dominates the variable part of a cross locked transfer.
    for invoice_len in [32usize, 256, 1024] {
        let message = locked_transfer("x".repeat(invoice_len));
        let bytes = encode(&message).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("cross_locked_transfer_encode", invoice_len),
            &message,
            |b, m| b.iter(|| black_box(encode(m).unwrap())),
        );
        group.bench_with_input(
            BenchmarkId::new("cross_locked_transfer_decode", invoice_len),
            &bytes,
            |b, raw| b.iter(|| black_box(decode(raw).unwrap())),
        );
    }

    group.finish();
}

// ============================================================================
// XC-06: Signing
// ============================================================================

fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-06-signer");
    group.measurement_time(Duration::from_secs(10));

    let signer = Secp256k1Signer::random();
    let template = locked_transfer("lnbc300n1pbench".into());

    group.bench_function("sign_cross_locked_transfer", |b| {
        b.iter(|| {
            let mut message = template.clone();
            signer.sign_message(&mut message).unwrap();
            black_box(message)
        })
    });

    let mut signed = template.clone();
    signer.sign_message(&mut signed).unwrap();
    group.bench_function("recover_cross_locked_transfer", |b| {
        b.iter(|| black_box(recover_sender(&signed).unwrap()))
    });

    group.finish();
}

// ============================================================================
// XC-03: Storage
// ============================================================================

fn bench_state_change_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-03-storage");

    let storage = Storage::open(InMemoryKVStore::new()).unwrap();
    let change = locked_transfer("lnbc300n1pbench".into());
    group.throughput(Throughput::Elements(1));
    group.bench_function("write_state_change", |b| {
        b.iter(|| black_box(storage.write_state_change(&change).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_wire_codec,
    bench_signing,
    bench_state_change_append
);
criterion_main!(benches);
