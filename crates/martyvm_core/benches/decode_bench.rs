/*
    MartyVM
    https://github.com/dbalsom/martyvm

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    ---------------------------------------------------------------------------

    benches::decode_bench.rs

    Decode throughput over random byte windows in each execution mode.

*/

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use martyvm_core::{cpu_x86::decode::decode, CodeWindow, CpuMode, CpuModel};

const WINDOW: usize = 0x10000;

pub fn decode_bench(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xB105_F00D);
    let mut bytes = vec![0u8; WINDOW];
    rng.fill(&mut bytes[..]);

    for (name, mode, model) in [
        ("decode_16", CpuMode::Mode16, CpuModel::Cpu80386),
        ("decode_32", CpuMode::Mode32, CpuModel::Cpu64),
        ("decode_64", CpuMode::Mode64, CpuModel::Cpu64),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut pos = 0usize;
                let mut decoded = 0u32;
                while pos + 16 < WINDOW {
                    let mut q = CodeWindow::new(&bytes[pos..pos + 16], pos as u64);
                    match decode(&mut q, mode, model) {
                        Ok(i) => pos += i.size as usize,
                        Err(_) => pos += 1,
                    }
                    decoded += 1;
                }
                black_box(decoded)
            })
        });
    }
}

criterion_group!(benches, decode_bench);
criterion_main!(benches);
