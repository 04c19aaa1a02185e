#![no_main]
use covsync::batch::{plan_batches, BatchLimits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<String>, u16)| {
    let (paths, max_chars) = input;
    let limits = BatchLimits {
        max_chars: max_chars as usize,
        ..BatchLimits::default()
    };
    let batches = plan_batches(&paths, limits);
    let total: usize = batches.iter().map(|b| b.len()).sum();
    assert_eq!(total, paths.len());
});
