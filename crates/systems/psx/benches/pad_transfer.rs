use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_psx::pad::{JoyCtrl, JOY_BAUD, JOY_CTRL, JOY_DATA, JOY_STAT, MEMORY_CARD_ACK_TICKS};
use emu_psx::{Controller, ControllerType, InterruptSink, Irq, MemoryCard, Pad};

const BAUD: u32 = 0x88;

/// Discards interrupts
struct NullSink;

impl InterruptSink for NullSink {
    fn raise(&mut self, _irq: Irq) {}
}

fn ctrl() -> u32 {
    u32::from((JoyCtrl::TXEN | JoyCtrl::SELECT | JoyCtrl::ACKINTEN).bits())
}

/// Run one packet the way firmware polls: write, wait, read, ack
fn run_packet(pad: &mut Pad, bytes: &[u8]) -> u8 {
    let mut sink = NullSink;
    let mut last = 0;
    pad.write_register(JOY_CTRL, ctrl());
    for &byte in bytes {
        pad.write_register(JOY_DATA, u32::from(byte));
        pad.execute(BAUD as i32 * 8, &mut sink);
        last = pad.read_register(JOY_DATA, &mut sink) as u8;
        pad.execute(MEMORY_CARD_ACK_TICKS, &mut sink);
        pad.read_register(JOY_STAT, &mut sink);
        pad.write_register(JOY_CTRL, ctrl() | u32::from(JoyCtrl::ACK.bits()));
    }
    pad.write_register(JOY_CTRL, 0);
    last
}

fn pad_with(controller: ControllerType) -> Pad {
    let mut pad = Pad::new();
    pad.write_register(JOY_BAUD, BAUD);
    pad.set_controller(0, Controller::create(controller))
        .expect("slot 0");
    pad
}

fn bench_controller_packet(c: &mut Criterion) {
    let mut group = c.benchmark_group("pad_controller_packet");

    let packets: [(ControllerType, &[u8]); 2] = [
        (ControllerType::DigitalController, &[0x01, 0x42, 0x00, 0x00, 0x00]),
        (
            ControllerType::NeGcon,
            &[0x01, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ),
    ];

    for (controller, bytes) in packets.iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(controller.name()),
            bytes,
            |b, bytes| {
                let mut pad = pad_with(*controller);
                b.iter(|| black_box(run_packet(&mut pad, bytes)));
            },
        );
    }

    group.finish();
}

fn bench_memory_card_read(c: &mut Criterion) {
    let mut read = vec![0x81, 0x52, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00];
    read.extend(std::iter::repeat(0x00).take(130));

    c.bench_function("pad_memory_card_sector_read", |b| {
        let mut pad = Pad::new();
        pad.write_register(JOY_BAUD, BAUD);
        pad.set_memory_card(0, Some(MemoryCard::new()))
            .expect("slot 0");
        b.iter(|| black_box(run_packet(&mut pad, &read)));
    });
}

fn bench_idle_execute(c: &mut Criterion) {
    c.bench_function("pad_idle_execute", |b| {
        let mut pad = pad_with(ControllerType::DigitalController);
        let mut sink = NullSink;
        b.iter(|| {
            pad.execute(black_box(2048), &mut sink);
        });
    });
}

criterion_group!(
    benches,
    bench_controller_packet,
    bench_memory_card_read,
    bench_idle_execute
);
criterion_main!(benches);
