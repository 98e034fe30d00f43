use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lowmesh_core::{Dispatch, LinkAddr, Timestamp};
use lowmesh_protocol::{AdmissionConfig, MemoryMonitor, TrafficClass};
use lowmesh_transport::fhss::{ChannelFunction, FhssConfig, FhssStructure, HoppingSequence};
use lowmesh_transport::frag::{Fragmenter, ReassemblyConfig, ReassemblyTable};

const PEER: LinkAddr = LinkAddr::new([0x42; 8]);

fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");

    for function in [ChannelFunction::Tr51, ChannelFunction::Dh1cf] {
        let seq = HoppingSequence::build(function, 129, &[10, 11, 12], 0xCAFE).unwrap();
        group.bench_function(BenchmarkId::new("select", format!("{function:?}")), |b| {
            let mut slot = 0u16;
            b.iter(|| {
                slot = slot.wrapping_add(1);
                seq.channel(black_box(slot), black_box(0x1234))
            });
        });
    }

    group.bench_function("build_tr51", |b| {
        b.iter(|| HoppingSequence::build(ChannelFunction::Tr51, 129, &[], black_box(7)).unwrap());
    });

    let mut fhss = FhssStructure::new(FhssConfig::default(), LinkAddr::new([1; 8]));
    fhss.rederive(0xBEEF).unwrap();
    group.bench_function("tx_channel", |b| {
        let mut ms = 0u64;
        b.iter(|| {
            ms += 37;
            fhss.tx_channel(&PEER, Timestamp::from_millis(black_box(ms))).unwrap()
        });
    });

    group.finish();
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    for size in [600usize, 1280, 2000] {
        let datagram = vec![0x5A; size];
        let inbound = ReassemblyTable::new(ReassemblyConfig::default());
        let mut fragmenter = Fragmenter::new(248, 0).unwrap();
        let frames = fragmenter.split(PEER, &datagram, &inbound).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("split", size), &datagram, |b, d| {
            b.iter(|| fragmenter.split(PEER, black_box(d), &inbound).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("reassemble", size), &frames, |b, frames| {
            let mut monitor = MemoryMonitor::new(AdmissionConfig::default());
            b.iter(|| {
                let mut table = ReassemblyTable::new(ReassemblyConfig::default());
                let mut out = None;
                for payload in frames {
                    if let Ok(Dispatch::Fragment { header, data }) = Dispatch::parse(payload) {
                        out = table
                            .accept(PEER, header, data, TrafficClass::Normal, &mut monitor, Timestamp::ZERO)
                            .unwrap();
                    }
                }
                out
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_channel, bench_reassembly);
criterion_main!(benches);
