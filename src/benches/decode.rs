use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use wps::{DICTIONARY_FORMAT_ID, FormatId, decode_store};

const SHELL_FORMAT_ID: FormatId =
    FormatId::new(0xB725_F130, 0x47EF, 0x101A, 0xA5F1, 0x0260_8C9E_EBAC);

fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(Some(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn lpwstr_value(id: u32, s: &str) -> Vec<u8> {
    let chars = utf16z(s);
    let mut payload = 0x001F_u32.to_le_bytes().to_vec();
    payload.extend_from_slice(&((chars.len() / 2) as u32).to_le_bytes());
    payload.extend(chars);
    while payload.len() % 4 != 0 {
        payload.push(0);
    }

    let mut out = ((9 + payload.len()) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&id.to_le_bytes());
    out.push(0);
    out.extend(payload);
    out
}

fn named_i4_value(name: &str, value: i32) -> Vec<u8> {
    let name = utf16z(name);
    let mut out = ((9 + name.len() + 8) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.push(0);
    out.extend(name);
    out.extend_from_slice(&0x0003_u32.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out
}

fn storage(format_id: FormatId, values: Vec<Vec<u8>>) -> Vec<u8> {
    let body = values.concat();
    let mut out = ((24 + body.len() + 4) as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&0x5350_5331_u32.to_le_bytes());
    out.extend_from_slice(&format_id.to_bytes());
    out.extend(body);
    out.extend_from_slice(&[0; 4]);
    out
}

fn store_with(values_per_storage: usize) -> Vec<u8> {
    let integer_named = (0..values_per_storage)
        .map(|i| lpwstr_value(i as u32 + 2, "C:\\Windows\\System32\\notepad.exe"))
        .collect();
    let string_named = (0..values_per_storage)
        .map(|i| named_i4_value(&format!("property {i}"), i as i32))
        .collect();

    let body = [
        storage(SHELL_FORMAT_ID, integer_named),
        storage(DICTIONARY_FORMAT_ID, string_named),
    ]
    .concat();
    let mut out = ((4 + body.len() + 4) as u32).to_le_bytes().to_vec();
    out.extend(body);
    out.extend_from_slice(&[0; 4]);
    out
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_store");
    for values in [8, 256] {
        let store = store_with(values);
        group.throughput(Throughput::Bytes(store.len() as u64));
        group.bench_function(format!("{values} values per storage"), |b| {
            b.iter(|| decode_store(black_box(&store)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
