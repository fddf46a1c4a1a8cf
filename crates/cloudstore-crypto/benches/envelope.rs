use cloudstore_crypto::{decrypt_payload, derive_wrapping_key, encrypt_payload, reshare_key};

const OWNER: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
const RECIPIENT: &str = "0x8617e340b3d01fa5f11f306f4090fd50e238070d";

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench]
fn bench_derive_wrapping_key() {
    derive_wrapping_key(divan::black_box(OWNER)).unwrap();
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_payload(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_payload(divan::black_box(&data), OWNER).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_payload(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let (sealed, wrapped) = encrypt_payload(&data, OWNER).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt_payload(
                divan::black_box(&sealed),
                divan::black_box(&wrapped),
                OWNER,
            )
            .unwrap()
        });
}

#[divan::bench]
fn bench_reshare_key(bencher: divan::Bencher) {
    let (_, wrapped) = encrypt_payload(b"payload", OWNER).unwrap();
    bencher.bench(|| reshare_key(divan::black_box(&wrapped), OWNER, RECIPIENT).unwrap());
}

fn main() {
    divan::main();
}
