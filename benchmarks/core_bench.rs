use criterion::{black_box, criterion_group, criterion_main, Criterion};
use svdview_core::node::NodeArena;
use svdview_core::{refresh, Access, PeripheralCollection, PeripheralDesc, RegisterDesc};

fn device(peripherals: usize, registers: u32) -> Vec<PeripheralDesc> {
    (0..peripherals)
        .map(|i| PeripheralDesc {
            name: format!("PERIPH{:03}", (i * 7919) % peripherals),
            base_address: 0x4000_0000 + 0x400 * i as u64,
            description: None,
            group_name: None,
            registers: (0..registers)
                .map(|r| RegisterDesc {
                    name: format!("R{r}"),
                    address_offset: r * 4,
                    description: None,
                    size: 32,
                    access: Access::ReadWrite,
                    reset_value: None,
                    fields: Vec::new(),
                })
                .collect(),
        })
        .collect()
}

fn bench_toggle_pin(c: &mut Criterion) {
    let mut collection = PeripheralCollection::new();
    collection.replace(device(200, 16));
    let ids = collection.peripherals().to_vec();
    let mut n = 0usize;
    c.bench_function("toggle_pin_200_peripherals", |b| {
        b.iter(|| {
            n = (n + 37) % ids.len();
            black_box(collection.toggle_pin(ids[n]));
        })
    });
}

fn bench_read_planning(c: &mut Criterion) {
    let arena = NodeArena::build(1, device(1, 256));
    let peripheral = arena.roots()[0];
    c.bench_function("plan_256_registers", |b| {
        b.iter(|| black_box(refresh::plan(&arena, peripheral, 16)))
    });
}

criterion_group!(benches, bench_toggle_pin, bench_read_planning);
criterion_main!(benches);
