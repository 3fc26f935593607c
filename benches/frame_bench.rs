use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use secure_channel::crypto::{Authenticator, BlockCipher, CtrCounter};
use secure_channel::protocol::framing::SymmetricFrame;
use secure_channel::Mailbox;

fn keyed_counter(series: i64) -> CtrCounter {
    let mut counter = CtrCounter::new();
    counter.start();
    let mut scratch = [0u8; 16];
    counter.emit(&mut scratch);
    counter.change_series(series);
    counter
}

#[allow(clippy::unwrap_used)]
fn bench_seal_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_seal_open");
    let payload_sizes = [64usize, 512, 4096, 65536];

    let cipher = BlockCipher::new(&[0x11u8; 32]);
    let auth = Authenticator::new(&[0x22u8; 32]);

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("seal_{size}b"), |b| {
            b.iter_batched(
                || {
                    let mut message = Mailbox::new();
                    message.allocate(SymmetricFrame::frame_len(size));
                    let frame = SymmetricFrame::prepare(&mut message, size);
                    frame.body_mut(&mut message).fill(0xA5);
                    frame
                        .header()
                        .write(&mut message, 42, 1, frame.len() as i32);
                    (message, frame, keyed_counter(42))
                },
                |(mut message, frame, mut counter)| {
                    frame.authenticate_encrypt(&mut message, &auth, &cipher, &mut counter);
                    message
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("open_{size}b"), |b| {
            b.iter_batched(
                || {
                    let mut message = Mailbox::new();
                    message.allocate(SymmetricFrame::frame_len(size));
                    let frame = SymmetricFrame::prepare(&mut message, size);
                    frame.body_mut(&mut message).fill(0xA5);
                    frame
                        .header()
                        .write(&mut message, 42, 1, frame.len() as i32);
                    let mut counter = keyed_counter(42);
                    frame.authenticate_encrypt(&mut message, &auth, &cipher, &mut counter);
                    (message, frame, keyed_counter(42))
                },
                |(mut message, frame, mut counter)| {
                    frame
                        .decrypt_verify(&mut message, &auth, &cipher, &mut counter)
                        .unwrap();
                    message
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_seal_open);
criterion_main!(benches);
