// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vela_data::allocators::VirtualAllocator;
use vela_data::SlotPool;

fn slot_pool_churn(c: &mut Criterion) {
    c.bench_function("slot_pool_allocate_release_reclaim_1024", |b| {
        let mut pool = SlotPool::new(1024);
        b.iter(|| {
            let handles: Vec<_> = (0..1024).map(|_| pool.allocate()).collect();
            for handle in handles.iter().step_by(2) {
                pool.release(*handle);
            }
            pool.reclaim();
            for _ in 0..512 {
                black_box(pool.allocate());
            }
            for index in 0..1024 {
                if let Some(handle) = pool.handle_at(index) {
                    pool.release(handle);
                }
            }
            pool.reclaim();
        });
    });
}

fn virtual_allocator_fragmentation(c: &mut Criterion) {
    c.bench_function("virtual_allocator_mixed_sizes_4096", |b| {
        let mut allocator = VirtualAllocator::new(4096);
        b.iter(|| {
            let ranges: Vec<_> = (0..256u32)
                .map(|i| allocator.allocate(1 + i % 8))
                .collect();
            for range in ranges.iter().step_by(3) {
                allocator.free(*range);
            }
            for range in ranges.iter().skip(1).step_by(3) {
                allocator.free(*range);
            }
            black_box(allocator.free_range_count());
            for range in ranges.iter().skip(2).step_by(3) {
                allocator.free(*range);
            }
        });
    });
}

criterion_group!(benches, slot_pool_churn, virtual_allocator_fragmentation);
criterion_main!(benches);
